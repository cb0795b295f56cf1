//! Line-based keyboard controls: `p` toggles pause, `c` cancels.
//!
//! Stdin is read on a plain thread so a pending read never holds up runtime
//! shutdown. Each line is one command; the first non-blank character decides.

use std::io::BufRead;
use std::sync::Arc;

use dirpull::{SessionController, SessionRunState};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A command typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyCommand {
    TogglePause,
    Cancel,
}

/// Maps one input line to a command.
pub(crate) fn parse_command(line: &str) -> Option<KeyCommand> {
    match line.trim_start().chars().next()?.to_ascii_lowercase() {
        'p' => Some(KeyCommand::TogglePause),
        'c' => Some(KeyCommand::Cancel),
        _ => None,
    }
}

/// Starts reading stdin and applying commands to `controller`.
///
/// The returned task ends when stdin closes; abort it once the session is
/// over.
pub(crate) fn spawn_keyboard_controls(controller: Arc<SessionController>) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if let Some(command) = parse_command(&line)
                && tx.send(command).is_err()
            {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            apply(&controller, command);
        }
    })
}

fn apply(controller: &SessionController, command: KeyCommand) {
    match command {
        KeyCommand::TogglePause if controller.state() == SessionRunState::Paused => {
            if controller.resume() {
                info!("Resumed");
            }
        }
        KeyCommand::TogglePause => {
            if !controller.pause() {
                debug!(state = %controller.state(), "pause ignored");
            }
        }
        KeyCommand::Cancel => {
            if controller.cancel() {
                info!("Cancelling...");
            }
        }
    }
}
