use crate::config::IntegrityConfig;
use crate::content::ContentGenerator;
use crate::error::{Error, VerifyError};
use crate::platform::{SpaceProbe, StatvfsProbe};
use crate::progress::SessionReporter;
use crate::scanner;
use crate::verifier::{self, VerifyOutcome};
use crate::writer::{self, CreateOutcome, CreatedFile, FileSink, FileWriter};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Per-run switches that are not part of the persistent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Seeds the session RNG, and the shared buffer in duplicate mode.
    pub seed: u64,
    /// Stop after this many files have been created in total.
    pub file_count_cap: Option<u64>,
    /// Stop the first time the free-space threshold is hit instead of culling.
    pub quit_on_full: bool,
    pub duplicate: bool,
}

impl SessionOptions {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            file_count_cap: None,
            quit_on_full: false,
            duplicate: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Filling,
    Draining,
    Stopped,
}

#[derive(Debug)]
pub enum StopReason {
    Interrupted,
    QuitOnFull,
    FileCountReached,
    /// The threshold was hit with nothing left to cull.
    NoSpace,
    IntegrityFailure(VerifyError),
}

#[derive(Debug)]
pub struct SessionResult {
    pub stop_reason: StopReason,
    pub seed: u64,
    pub files_created: u64,
    pub bytes_written: u64,
    pub cull_cycles: u64,
    pub files_removed: u64,
    pub live_files: usize,
    pub duration: Duration,
}

impl SessionResult {
    pub fn integrity_failure(&self) -> Option<&VerifyError> {
        match &self.stop_reason {
            StopReason::IntegrityFailure(e) => Some(e),
            _ => None,
        }
    }
}

enum Verification {
    Passed,
    Failed(VerifyError),
    Interrupted,
}

/// Drives `FILLING -> DRAINING -> FILLING -> ... -> STOPPED` over one directory.
///
/// Owns every piece of mutable session state: the live file list in creation
/// order, the counters, the session RNG and the content generator.
pub struct SessionEngine<P: SpaceProbe = StatvfsProbe> {
    writer: FileWriter<P>,
    options: SessionOptions,
    rng: StdRng,
    live: Vec<PathBuf>,
    state: SessionState,
    files_created: u64,
    bytes_written: u64,
    cull_cycles: u64,
    files_removed: u64,
    stop: Arc<AtomicBool>,
}

impl SessionEngine<StatvfsProbe> {
    pub fn new(
        directory: impl Into<PathBuf>,
        config: IntegrityConfig,
        options: SessionOptions,
    ) -> Result<Self, Error> {
        Self::with_probe(directory, config, options, StatvfsProbe)
    }
}

impl<P: SpaceProbe> SessionEngine<P> {
    pub fn with_probe(
        directory: impl Into<PathBuf>,
        config: IntegrityConfig,
        options: SessionOptions,
        probe: P,
    ) -> Result<Self, Error> {
        let directory = directory.into();
        ensure_directory(&directory)?;
        config.validate()?;

        let generator = session_generator(&config, options.duplicate, options.seed)?;
        Ok(Self {
            writer: FileWriter::new(directory, config, generator, probe),
            rng: StdRng::seed_from_u64(options.seed),
            options,
            live: Vec::new(),
            state: SessionState::Filling,
            files_created: 0,
            bytes_written: 0,
            cull_cycles: 0,
            files_removed: 0,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share an externally owned stop flag, typically one a signal handler sets.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Route file data through `sink` instead of writing it directly.
    pub fn with_sink(mut self, sink: impl FileSink + 'static) -> Self {
        self.writer.set_sink(sink);
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Live files in creation order.
    pub fn live_files(&self) -> &[PathBuf] {
        &self.live
    }

    pub fn directory(&self) -> &Path {
        self.writer.directory()
    }

    /// Run the state machine until it stops.
    ///
    /// Integrity failures are reported through [`StopReason::IntegrityFailure`];
    /// `Err` is reserved for I/O problems that prevent the session from
    /// continuing at all. Calling `run` again resumes filling with the
    /// surviving live set.
    pub fn run(&mut self, reporter: &dyn SessionReporter) -> Result<SessionResult, Error> {
        let start = Instant::now();
        info!(
            "Starting session in {} (seed {}, threshold {:.1}%, duplicate {})",
            self.directory().display(),
            self.options.seed,
            self.writer.config().threshold_fraction * 100.0,
            self.options.duplicate,
        );
        reporter.on_session_start(self.directory(), self.options.seed);

        self.state = SessionState::Filling;
        let outcome = self.drive(reporter);
        self.state = SessionState::Stopped;

        let stop_reason = match outcome {
            Ok(reason) => reason,
            Err(e) => {
                error!("Session aborted: {}", e);
                info!(
                    "We created {} files with a total of {} bytes! ({} still live)",
                    self.files_created,
                    self.bytes_written,
                    self.live.len()
                );
                reporter.on_session_error(&e);
                return Err(e);
            }
        };
        let result = SessionResult {
            stop_reason,
            seed: self.options.seed,
            files_created: self.files_created,
            bytes_written: self.bytes_written,
            cull_cycles: self.cull_cycles,
            files_removed: self.files_removed,
            live_files: self.live.len(),
            duration: start.elapsed(),
        };

        match &result.stop_reason {
            StopReason::IntegrityFailure(e) => error!("Session stopped on integrity failure: {}", e),
            reason => info!("Session stopped: {:?}", reason),
        }
        info!(
            "We created {} files with a total of {} bytes!",
            result.files_created, result.bytes_written
        );
        reporter.on_session_stop(&result);
        Ok(result)
    }

    fn drive(&mut self, reporter: &dyn SessionReporter) -> Result<StopReason, Error> {
        loop {
            match self.state {
                SessionState::Filling => {
                    if self.interrupted() {
                        return Ok(StopReason::Interrupted);
                    }

                    if let Some(cap) = self.options.file_count_cap {
                        if self.files_created >= cap {
                            info!("File count cap {} reached, final verification", cap);
                            return Ok(match self.verify_live(reporter) {
                                Verification::Passed => StopReason::FileCountReached,
                                Verification::Failed(e) => StopReason::IntegrityFailure(e),
                                Verification::Interrupted => StopReason::Interrupted,
                            });
                        }
                    }

                    match self.writer.create_file(&mut self.rng)? {
                        CreateOutcome::Created(created) => self.record(created, reporter),
                        CreateOutcome::Full { usage, reserved } => {
                            if self.options.quit_on_full {
                                info!("Exiting on full request");
                                return Ok(StopReason::QuitOnFull);
                            }
                            if self.live.is_empty() {
                                warn!(
                                    "Free space {} is at or below reserve {} with no files to cull",
                                    usage.free, reserved
                                );
                                return Ok(StopReason::NoSpace);
                            }
                            info!("Full, verify and delete sequence starting...");
                            self.state = SessionState::Draining;
                        }
                    }
                }
                SessionState::Draining => {
                    match self.verify_live(reporter) {
                        Verification::Passed => {}
                        Verification::Failed(e) => return Ok(StopReason::IntegrityFailure(e)),
                        Verification::Interrupted => return Ok(StopReason::Interrupted),
                    }
                    if !self.cull(reporter)? {
                        return Ok(StopReason::Interrupted);
                    }
                    self.state = SessionState::Filling;
                }
                SessionState::Stopped => return Ok(StopReason::Interrupted),
            }
        }
    }

    fn record(&mut self, created: CreatedFile, reporter: &dyn SessionReporter) {
        self.files_created += 1;
        self.bytes_written += created.size;
        reporter.on_file_created(
            &created.path,
            created.size,
            self.files_created,
            self.bytes_written,
        );
        self.live.push(created.path);
    }

    fn verify_live(&self, reporter: &dyn SessionReporter) -> Verification {
        let total = self.live.len();
        reporter.on_drain_start(total);
        let chunk_size = self.writer.config().verify_chunk_size;

        for (index, path) in self.live.iter().enumerate() {
            if self.interrupted() {
                return Verification::Interrupted;
            }
            if let Err(e) = verifier::verify_file(path, chunk_size) {
                error!("File {} not validating! {}", path.display(), e);
                return Verification::Failed(e);
            }
            reporter.on_file_verified(index + 1, total);
        }

        debug!("All {} live files verified", total);
        Verification::Passed
    }

    /// Delete every second live file, walking from the newest down: positions
    /// `n-1, n-3, ...`. Returns false if interrupted part way; the live list
    /// still matches what is on disk.
    fn cull(&mut self, reporter: &dyn SessionReporter) -> Result<bool, Error> {
        let n = self.live.len();
        let mut lowest_removed = n;
        let mut outcome = Ok(true);

        for index in (0..n).rev().step_by(2) {
            if self.interrupted() {
                outcome = Ok(false);
                break;
            }
            let path = &self.live[index];
            if let Err(e) = fs::remove_file(path) {
                outcome = Err(io::Error::new(
                    e.kind(),
                    format!("Unable to remove file {}: {}", path.display(), e),
                ));
                break;
            }
            debug!("Removed {}", path.display());
            reporter.on_file_removed(path);
            lowest_removed = index;
        }

        let mut position = 0;
        self.live.retain(|_| {
            let index = position;
            position += 1;
            !(index >= lowest_removed && (n - 1 - index) % 2 == 0)
        });

        let removed = n - self.live.len();
        self.files_removed += removed as u64;
        if removed > 0 {
            writer::sync_directory(self.directory())?;
        }

        let completed = outcome?;
        if completed {
            self.cull_cycles += 1;
            info!("Removed {} files, {} remain", removed, self.live.len());
            reporter.on_cull_complete(removed, self.live.len());
        }
        Ok(completed)
    }

    fn interrupted(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

fn session_generator(
    config: &IntegrityConfig,
    duplicate: bool,
    seed: u64,
) -> Result<ContentGenerator, Error> {
    if !duplicate {
        return Ok(ContentGenerator::plain());
    }
    let buffer_len = usize::try_from(config.max_file_size).map_err(|_| {
        Error::InvalidConfig(format!(
            "max_file_size {} does not fit in memory",
            config.max_file_size
        ))
    })?;
    Ok(ContentGenerator::duplicate(seed, buffer_len))
}

/// Fails with [`Error::NotADirectory`] unless `path` is an existing directory.
pub fn ensure_directory(path: &Path) -> Result<(), Error> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        _ => Err(Error::NotADirectory(path.to_path_buf())),
    }
}

/// Run a complete session against the real filesystem.
pub fn run_fill_drain_cycle(
    directory: &Path,
    config: IntegrityConfig,
    options: SessionOptions,
    stop: Arc<AtomicBool>,
    reporter: &dyn SessionReporter,
) -> Result<SessionResult, Error> {
    SessionEngine::new(directory, config, options)?
        .with_stop_flag(stop)
        .run(reporter)
}

/// Regenerate a file from the seed and size embedded in an earlier name.
///
/// In duplicate mode `seed` is the buffer seed, which is what duplicate-mode
/// files embed.
pub fn recreate_file(
    directory: &Path,
    config: &IntegrityConfig,
    seed: u64,
    size: u64,
    duplicate: bool,
) -> Result<CreatedFile, Error> {
    ensure_directory(directory)?;
    config.validate()?;
    let generator = session_generator(config, duplicate, seed)?;
    let mut writer = FileWriter::new(directory, config.clone(), generator, StatvfsProbe);
    let created = writer.recreate_file(seed, size)?;
    info!("File recreated as {}", created.path.display());
    Ok(created)
}

/// Verify every integrity file found directly inside `directory`.
pub fn verify_directory(directory: &Path, chunk_size: usize) -> Result<Vec<VerifyOutcome>, Error> {
    ensure_directory(directory)?;
    let files = scanner::find_integrity_files(directory)?;
    info!("Verifying {} files in {}", files.len(), directory.display());
    Ok(verifier::verify_files(files, chunk_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DiskUsage;
    use crate::progress::SilentReporter;
    use std::cell::Cell;
    use tempfile::tempdir;

    struct Roomy;

    impl SpaceProbe for Roomy {
        fn disk_usage(&self, _path: &Path) -> io::Result<DiskUsage> {
            Ok(DiskUsage {
                total: 1 << 30,
                free: 1 << 30,
            })
        }
    }

    /// Raises the stop flag once `after` files have been removed.
    struct StopAfterRemovals {
        stop: Arc<AtomicBool>,
        after: usize,
        removed: Cell<usize>,
    }

    impl SessionReporter for StopAfterRemovals {
        fn on_file_removed(&self, _path: &Path) {
            self.removed.set(self.removed.get() + 1);
            if self.removed.get() >= self.after {
                self.stop.store(true, Ordering::Relaxed);
            }
        }
    }

    fn filled_engine(directory: &Path, files: u64) -> SessionEngine<Roomy> {
        let config = IntegrityConfig {
            min_file_size: 16,
            max_file_size: 1024,
            ..IntegrityConfig::default()
        };
        let options = SessionOptions {
            file_count_cap: Some(files),
            ..SessionOptions::new(31)
        };
        let mut engine = SessionEngine::with_probe(directory, config, options, Roomy).unwrap();
        let result = engine.run(&SilentReporter).unwrap();
        assert!(matches!(result.stop_reason, StopReason::FileCountReached));
        engine
    }

    fn sorted(paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut paths = paths.to_vec();
        paths.sort();
        paths
    }

    fn listing(directory: &Path) -> Vec<PathBuf> {
        let paths: Vec<PathBuf> = fs::read_dir(directory)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        sorted(&paths)
    }

    #[test]
    fn test_interrupted_cull_keeps_live_list_in_sync_with_disk() {
        let n = 7;
        for after in 1..=3 {
            let dir = tempdir().unwrap();
            let mut engine = filled_engine(dir.path(), n as u64);
            let created = engine.live_files().to_vec();
            let reporter = StopAfterRemovals {
                stop: engine.stop_flag(),
                after,
                removed: Cell::new(0),
            };

            assert!(!engine.cull(&reporter).unwrap());
            assert_eq!(engine.files_removed, after as u64);
            assert_eq!(engine.cull_cycles, 0);
            assert_eq!(sorted(engine.live_files()), listing(dir.path()));

            // Removal runs newest first over positions n-1, n-3, ...
            let expected: Vec<PathBuf> = created
                .iter()
                .enumerate()
                .filter(|(i, _)| !((n - 1 - i) % 2 == 0 && i + 2 * after >= n + 1))
                .map(|(_, p)| p.clone())
                .collect();
            assert_eq!(engine.live_files(), &expected[..]);
        }
    }

    #[test]
    fn test_cull_interrupted_before_first_removal() {
        let dir = tempdir().unwrap();
        let mut engine = filled_engine(dir.path(), 4);
        engine.stop_flag().store(true, Ordering::Relaxed);

        assert!(!engine.cull(&SilentReporter).unwrap());
        assert_eq!(engine.files_removed, 0);
        assert_eq!(engine.live_files().len(), 4);
        assert_eq!(listing(dir.path()).len(), 4);
    }

    #[test]
    fn test_survivors_of_interrupted_cull_still_verify() {
        let dir = tempdir().unwrap();
        let mut engine = filled_engine(dir.path(), 6);
        let reporter = StopAfterRemovals {
            stop: engine.stop_flag(),
            after: 2,
            removed: Cell::new(0),
        };
        assert!(!engine.cull(&reporter).unwrap());

        engine.stop_flag().store(false, Ordering::Relaxed);
        let result = engine.run(&SilentReporter).unwrap();
        assert!(matches!(result.stop_reason, StopReason::FileCountReached));
        assert_eq!(result.live_files, 4);
        assert_eq!(result.files_removed, 2);
    }
}
