//! CLI entry point for dirpull.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dirpull::config::{DEFAULT_FILE_TYPES, timestamped_destination};
use dirpull::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use dirpull::progress::format::format_byte_count;
use dirpull::retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
use dirpull::{
    ExtensionFilter, FileHistory, HistorySink, HttpClient, NullHistory, RetryPolicy,
    SessionConfig, SessionController, SessionOptions, SessionOutcome,
};
use tracing::{debug, info, warn};

mod app;
mod app_config;
mod cli;

use app::keyboard::spawn_keyboard_controls;
use app::progress_ui::{spawn_progress_ui, stop_progress_ui};
use app_config::{FileConfig, load_default_file_config};
use cli::Args;

/// Depth used when neither the CLI nor the config file sets one.
const DEFAULT_DEPTH: u32 = 1;

/// History file name used when no path is configured.
const DEFAULT_HISTORY_FILE: &str = "download_history.log";

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILURES: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let file_config = load_default_file_config()?.unwrap_or_default();
    init_tracing(&args, &file_config);
    debug!(?args, ?file_config, "configuration loaded");

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file_config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let depth = args.depth.or(file_config.max_depth).unwrap_or(DEFAULT_DEPTH);
    let types = args
        .types
        .clone()
        .or_else(|| file_config.file_types.clone())
        .unwrap_or_else(|| DEFAULT_FILE_TYPES.to_string());

    let extensions = ExtensionFilter::parse(&types)?;
    let config = SessionConfig::new(
        &args.url,
        depth,
        extensions,
        timestamped_destination(&output_dir),
    )?;

    let file_history = if args.no_history {
        None
    } else {
        let path = args
            .history_file
            .clone()
            .or_else(|| file_config.history_file.clone())
            .unwrap_or_else(|| output_dir.join(DEFAULT_HISTORY_FILE));
        let history = FileHistory::open(&path, args.history_format.into())
            .await
            .context("could not open history file")?;
        debug!(path = %history.path().display(), "history enabled");
        Some(Arc::new(history))
    };
    let history: Arc<dyn HistorySink> = match &file_history {
        Some(history) => Arc::clone(history) as Arc<dyn HistorySink>,
        None => Arc::new(NullHistory),
    };

    let client = HttpClient::new_with_timeouts(
        file_config.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        file_config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    );
    let options = session_options(&args, &file_config);
    let controller = Arc::new(SessionController::new(client, options, history)?);

    controller.start(config)?;
    info!(
        url = %args.url,
        depth,
        types = %types,
        concurrency = options.concurrency,
        "Session started"
    );

    let (ui_handle, ui_stop) = spawn_progress_ui(
        !args.quiet && io::stderr().is_terminal(),
        Arc::clone(&controller),
    );
    let keyboard = io::stdin()
        .is_terminal()
        .then(|| spawn_keyboard_controls(Arc::clone(&controller)));
    let interrupt = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted");
                controller.cancel();
            }
        })
    };

    let outcome = controller.wait().await;

    stop_progress_ui(ui_handle, &ui_stop).await;
    if let Some(keyboard) = keyboard {
        keyboard.abort();
    }
    interrupt.abort();
    if let Some(history) = &file_history {
        history.flush().await;
    }

    let Some(outcome) = outcome else {
        anyhow::bail!("session ended without an outcome");
    };
    report(&controller, &outcome);
    Ok(ExitCode::from(exit_status(&outcome)))
}

/// Log level priority: `RUST_LOG` > `--quiet` > `-v` > config file > info.
fn init_tracing(args: &Args, file_config: &FileConfig) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config
                .verbosity
                .map_or("info", app_config::VerbositySetting::filter_directive),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn session_options(args: &Args, file_config: &FileConfig) -> SessionOptions {
    let concurrency = args
        .concurrency
        .map(usize::from)
        .or(file_config.concurrency)
        .unwrap_or(SessionOptions::default().concurrency);
    let max_rounds = args
        .max_retries
        .map(u32::from)
        .or(file_config.max_retries)
        .unwrap_or(DEFAULT_MAX_RETRIES);
    let delay = args
        .retry_delay
        .or(file_config.retry_delay_secs)
        .map_or(DEFAULT_RETRY_DELAY, Duration::from_secs);

    SessionOptions {
        concurrency,
        retry: RetryPolicy::new(max_rounds, delay),
        skip_count_pass: args.skip_count,
        ..SessionOptions::default()
    }
}

fn report(controller: &SessionController, outcome: &SessionOutcome) {
    let counters = controller.counters();
    info!(
        files = counters.downloaded_files,
        total_files = counters.total_files,
        bytes = %format_byte_count(counters.downloaded_bytes),
        failed = counters.failed_files,
        "{outcome}"
    );
    for failure in controller.failures() {
        warn!(
            url = %failure.task.source_url(),
            attempts = failure.attempt,
            reason = %failure.reason,
            "Download failed"
        );
    }
}

/// Maps the final outcome to the process exit status.
fn exit_status(outcome: &SessionOutcome) -> u8 {
    match outcome {
        SessionOutcome::Completed { .. } => EXIT_SUCCESS,
        SessionOutcome::CompletedWithFailures { .. } => EXIT_FAILURES,
        SessionOutcome::Cancelled { .. } => EXIT_CANCELLED,
    }
}
