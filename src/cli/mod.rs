//! CLI-specific utilities for drive-mirror
//!
//! Code used only by the command-line binary, kept apart from the library.

pub mod progress;

pub use progress::ProgressManager;
