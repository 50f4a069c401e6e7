//! CLI-specific progress handling for drive-mirror
//!
//! Files are discovered while earlier ones are already transferring, so the
//! bar length grows with the number of submitted files.

use std::sync::Arc;

use drive_mirror::ProgressCallback;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} files {msg}";

/// Creates a file-count progress bar drawn on stderr
pub fn create_progress_bar(hidden: bool) -> ProgressBar {
    let target = if hidden {
        ProgressDrawTarget::hidden()
    } else {
        ProgressDrawTarget::stderr()
    };
    let pb = ProgressBar::with_draw_target(Some(0), target);
    let style = ProgressStyle::default_bar()
        .template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Progress bar plus the callback that feeds it
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    pub fn new(message: &str, hidden: bool) -> Self {
        if !hidden {
            eprintln!("{message}");
        }
        Self {
            pb: create_progress_bar(hidden),
        }
    }

    /// Callback reporting `(completed, submitted)` into the bar
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.pb.clone();
        Arc::new(move |completed, submitted| {
            if pb.length().unwrap_or(0) < submitted {
                pb.set_length(submitted);
            }
            pb.set_position(completed);
        })
    }

    pub fn finish(&self, message: &'static str) {
        self.pb.finish_with_message(message);
    }
}
