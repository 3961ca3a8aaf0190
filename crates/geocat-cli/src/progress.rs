use geocat_core::models::TaskState;
use geocat_import::ImportProgress;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner for indeterminate progress
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a progress bar for determinate progress
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n[{bar:40.cyan/blue}] {pos}/{len} ({percent}%) ETA: {eta}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░ ");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Finish a progress bar with success message
pub fn finish_success(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("✓ {}", message));
}

/// Finish a progress bar with error message
pub fn finish_error(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("✗ {}", message));
}

/// Progress of one running import context; hidden in JSON mode
pub struct ImportProgressBar {
    bar: ProgressBar,
    failed: usize,
}

impl ImportProgressBar {
    pub fn new(total: usize, hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            create_progress_bar(total as u64, "Importing")
        };
        Self { bar, failed: 0 }
    }

    /// Feed one progress event from the importer
    pub fn update(&mut self, progress: &ImportProgress) {
        match progress.state {
            TaskState::Running => self.bar.set_message(format!("Importing {}", progress.layer_name)),
            TaskState::Error => {
                self.failed += 1;
                self.bar.set_message(format!("Failed {}", progress.layer_name));
            }
            state => self.bar.set_message(format!("{} {}", progress.layer_name, state)),
        }
        self.bar.set_position(progress.current as u64);
    }

    pub fn finish(&self, summary: &str) {
        if self.failed > 0 {
            finish_error(&self.bar, summary);
        } else {
            finish_success(&self.bar, summary);
        }
    }
}
