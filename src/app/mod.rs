//! Presentation helpers for the binary: progress bar and keyboard controls.

pub(crate) mod keyboard;
pub(crate) mod progress_ui;
