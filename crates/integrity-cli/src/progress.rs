use indicatif::{ProgressBar, ProgressStyle};
use integrity_core::{Error, SessionReporter, SessionResult};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// CLI progress reporter using indicatif progress bars.
///
/// - Filling: spinner with running file and byte counts
/// - Draining: progress bar over the live set (total known up front)
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn start_fill_spinner(&self) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        pb.set_message("Filling...");
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }
}

impl SessionReporter for CliReporter {
    fn on_session_start(&self, _directory: &Path, _seed: u64) {
        self.start_fill_spinner();
    }

    fn on_file_created(&self, _path: &Path, _size: u64, files_created: u64, bytes_written: u64) {
        self.with_bar(|pb| {
            pb.set_message(format!(
                "Filling... {} files, {} bytes written",
                files_created, bytes_written
            ))
        });
    }

    fn on_drain_start(&self, live_files: usize) {
        let pb = ProgressBar::new(live_files as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "  {spinner:.cyan} Verifying [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
        ) {
            pb.set_style(
                style
                    .progress_chars("━╸─")
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_file_verified(&self, verified: usize, _total: usize) {
        self.with_bar(|pb| pb.set_position(verified as u64));
    }

    fn on_cull_complete(&self, removed: usize, survivors: usize) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Verified and culled: {} removed, {} remain",
            removed, survivors
        );
        self.start_fill_spinner();
    }

    fn on_session_stop(&self, _result: &SessionResult) {
        self.finish_bar();
    }

    fn on_session_error(&self, _error: &Error) {
        self.finish_bar();
    }
}
