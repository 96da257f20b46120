//! Terminal progress bar driven by download events.

use std::time::Duration;

use blockdl::DownloadListener;
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}";

/// [`DownloadListener`] rendering an indicatif progress bar.
///
/// Starts as a spinner and switches to a bar once the total size is known.
pub struct BarListener {
    bar: ProgressBar,
}

impl BarListener {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Stop the bar, leaving its last state on screen.
    pub fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }

    fn show_total(&self, total: u64) {
        if total > 0 && self.bar.length() != Some(total) {
            self.bar.set_length(total);
            self.bar.set_style(bar_style());
        }
    }
}

impl Default for BarListener {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadListener for BarListener {
    fn on_start(&self, _id: u64, total: u64, current: u64) {
        self.show_total(total);
        self.bar.set_position(current);
        if current > 0 {
            self.bar.set_message("resuming");
        }
    }

    fn on_progress(&self, _id: u64, total: u64, current: u64) {
        self.show_total(total);
        self.bar.set_position(current);
    }

    fn on_complete(&self, _id: u64) {
        self.bar.finish_with_message("done");
    }

    fn on_error(&self, _id: u64, code: u16) {
        self.bar.abandon_with_message(format!("failed (code {})", code));
    }

    fn on_cancel(&self, _id: u64) {
        self.bar.abandon_with_message("canceled");
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(SPINNER_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switches_to_bar_on_known_total() {
        let listener = BarListener::new();
        listener.on_start(0, 0, 0);
        assert_eq!(listener.bar.length(), None);

        listener.on_progress(0, 1000, 250);
        assert_eq!(listener.bar.length(), Some(1000));
        assert_eq!(listener.bar.position(), 250);

        listener.on_complete(0);
        assert!(listener.bar.is_finished());
    }
}
