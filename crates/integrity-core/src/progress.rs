use crate::engine::SessionResult;
use crate::error::Error;
use std::path::Path;

/// Trait for observing a fill/verify/cull session.
///
/// CLI implements with indicatif; tests use it to steer the driver.
/// All methods have default no-op implementations.
pub trait SessionReporter {
    fn on_session_start(&self, _directory: &Path, _seed: u64) {}
    fn on_file_created(&self, _path: &Path, _size: u64, _files_created: u64, _bytes_written: u64) {}
    fn on_drain_start(&self, _live_files: usize) {}
    fn on_file_verified(&self, _verified: usize, _total: usize) {}
    fn on_file_removed(&self, _path: &Path) {}
    fn on_cull_complete(&self, _removed: usize, _survivors: usize) {}
    fn on_session_stop(&self, _result: &SessionResult) {}
    /// The session ended on an I/O error instead of a [`SessionResult`].
    fn on_session_error(&self, _error: &Error) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl SessionReporter for SilentReporter {}
