use crate::config::IntegrityConfig;
use crate::content::ContentGenerator;
use crate::error::Error;
use crate::hasher;
use crate::name::{self, IntegrityName};
use crate::platform::{self, DiskUsage, SpaceProbe};
use rand::Rng;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// A file that was written and synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedFile {
    pub path: PathBuf,
    pub seed: u64,
    pub size: u64,
}

/// Result of an auto-sized create. Running out of allowance is an expected
/// outcome, so it is a variant here rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(CreatedFile),
    Full { usage: DiskUsage, reserved: u64 },
}

/// Puts a new file's bytes on storage and makes them durable.
pub trait FileSink {
    fn write_synced(&self, file: &mut File, data: &[u8]) -> io::Result<()>;
}

/// `write_all`, `flush`, then `sync_all`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectSink;

impl FileSink for DirectSink {
    fn write_synced(&self, file: &mut File, data: &[u8]) -> io::Result<()> {
        file.write_all(data)?;
        file.flush()?;
        file.sync_all()
    }
}

enum Written {
    File(CreatedFile),
    /// The filesystem refused the data; nothing was left behind.
    NoSpace(io::Error),
}

/// Writes integrity files into one directory.
pub struct FileWriter<P: SpaceProbe> {
    directory: PathBuf,
    config: IntegrityConfig,
    generator: ContentGenerator,
    probe: P,
    sink: Box<dyn FileSink>,
}

impl<P: SpaceProbe> FileWriter<P> {
    pub fn new(
        directory: impl Into<PathBuf>,
        config: IntegrityConfig,
        generator: ContentGenerator,
        probe: P,
    ) -> Self {
        Self {
            directory: directory.into(),
            config,
            generator,
            probe,
            sink: Box::new(DirectSink),
        }
    }

    pub fn set_sink(&mut self, sink: impl FileSink + 'static) {
        self.sink = Box::new(sink);
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    pub fn disk_usage(&self) -> io::Result<DiskUsage> {
        self.probe.disk_usage(&self.directory)
    }

    /// Bytes that must stay free: `total * threshold_fraction`.
    pub fn reserved_bytes(&self, usage: &DiskUsage) -> u64 {
        (usage.total as f64 * self.config.threshold_fraction) as u64
    }

    /// Create one file of a random size bounded by the space left above the
    /// threshold. `rng` supplies the size and, outside duplicate mode, the
    /// per-file seed.
    ///
    /// A filesystem that reports `ENOSPC` before the threshold is reached
    /// also yields [`CreateOutcome::Full`].
    pub fn create_file<R: Rng>(&mut self, rng: &mut R) -> Result<CreateOutcome, Error> {
        let usage = self.disk_usage()?;
        let reserved = self.reserved_bytes(&usage);
        if usage.free <= reserved {
            debug!(
                "Free space {} at or below reserve {} (total {})",
                usage.free, reserved, usage.total
            );
            return Ok(CreateOutcome::Full { usage, reserved });
        }

        let allowance = usage.free - reserved;
        let drawn = rng.gen_range(self.config.min_file_size..=self.config.max_file_size);
        let mut size = drawn.min(allowance);
        if self.generator.is_duplicate() {
            size = self.config.round_to_block(size);
        }

        let seed = match self.generator.duplicate_seed() {
            Some(seed) => seed,
            None => rng.gen(),
        };

        match self.write_file(seed, size)? {
            Written::File(created) => Ok(CreateOutcome::Created(created)),
            Written::NoSpace(e) => {
                warn!(
                    "Filesystem full with {} bytes reported free above the reserve: {}",
                    allowance, e
                );
                Ok(CreateOutcome::Full { usage, reserved })
            }
        }
    }

    /// Reproduce a file from an explicit `(seed, size)`, as embedded in a
    /// previous file's name. No free-space gate is applied.
    pub fn recreate_file(&mut self, seed: u64, size: u64) -> Result<CreatedFile, Error> {
        match self.write_file(seed, size)? {
            Written::File(created) => Ok(created),
            Written::NoSpace(e) => Err(e.into()),
        }
    }

    fn write_file(&mut self, seed: u64, size: u64) -> Result<Written, Error> {
        let length = usize::try_from(size).map_err(|_| {
            Error::InvalidConfig(format!("file size {} does not fit in memory", size))
        })?;
        let data = self.generator.generate(seed, length);
        let content_hash = hasher::hash_bytes(&data);
        let base_name = IntegrityName::new(&content_hash, seed, size).to_string();

        let (path, mut file) = match open_unique(&self.directory, &base_name) {
            Ok(opened) => opened,
            Err(e) if platform::is_storage_full(&e) => return Ok(Written::NoSpace(e)),
            Err(e) => return Err(e.into()),
        };
        trace!("Writing {} bytes to {}", size, path.display());

        if let Err(e) = self.sink.write_synced(&mut file, &data) {
            drop(file);
            fs::remove_file(&path).map_err(|remove_err| {
                io::Error::new(
                    remove_err.kind(),
                    format!(
                        "Unable to remove partially written {} after \"{}\": {}",
                        path.display(),
                        e,
                        remove_err
                    ),
                )
            })?;
            if platform::is_storage_full(&e) {
                return Ok(Written::NoSpace(e));
            }
            return Err(e.into());
        }
        drop(file);
        sync_directory(&self.directory)?;

        debug!("Created {} ({} bytes)", path.display(), size);
        Ok(Written::File(CreatedFile { path, seed, size }))
    }
}

/// Pick the first free name and create it exclusively. Never truncates an
/// existing file.
fn open_unique(directory: &Path, base_name: &str) -> io::Result<(PathBuf, File)> {
    loop {
        let path = name::resolve_collision(directory, base_name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                trace!("{} appeared while creating, retrying", path.display());
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// fsync the directory itself so newly created or removed entries survive a crash.
pub fn sync_directory(directory: &Path) -> io::Result<()> {
    File::open(directory)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::Cell;
    use tempfile::tempdir;

    struct FixedProbe(Cell<DiskUsage>);

    impl SpaceProbe for FixedProbe {
        fn disk_usage(&self, _path: &Path) -> io::Result<DiskUsage> {
            Ok(self.0.get())
        }
    }

    fn small_config() -> IntegrityConfig {
        IntegrityConfig {
            min_file_size: 16,
            max_file_size: 4096,
            ..IntegrityConfig::default()
        }
    }

    #[test]
    fn test_full_when_at_threshold() {
        let dir = tempdir().unwrap();
        let probe = FixedProbe(Cell::new(DiskUsage {
            total: 1000,
            free: 500,
        }));
        let mut writer = FileWriter::new(dir.path(), small_config(), ContentGenerator::plain(), probe);
        let mut rng = StdRng::seed_from_u64(1);

        match writer.create_file(&mut rng).unwrap() {
            CreateOutcome::Full { reserved, .. } => assert_eq!(reserved, 500),
            other => panic!("expected Full, got {:?}", other),
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_size_bounded_by_allowance() {
        let dir = tempdir().unwrap();
        let probe = FixedProbe(Cell::new(DiskUsage {
            total: 1000,
            free: 510,
        }));
        let mut writer = FileWriter::new(dir.path(), small_config(), ContentGenerator::plain(), probe);
        let mut rng = StdRng::seed_from_u64(1);

        let CreateOutcome::Created(created) = writer.create_file(&mut rng).unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(created.size, 10);
        assert_eq!(fs::metadata(&created.path).unwrap().len(), 10);
        verifier::verify_file(&created.path, 4096).unwrap();
    }

    #[test]
    fn test_duplicate_mode_rounds_to_block_and_embeds_buffer_seed() {
        let dir = tempdir().unwrap();
        let probe = FixedProbe(Cell::new(DiskUsage {
            total: 1 << 30,
            free: 1 << 30,
        }));
        let mut writer = FileWriter::new(
            dir.path(),
            small_config(),
            ContentGenerator::duplicate(77, 4096),
            probe,
        );
        let mut rng = StdRng::seed_from_u64(9);

        for _ in 0..5 {
            let CreateOutcome::Created(created) = writer.create_file(&mut rng).unwrap() else {
                panic!("expected a file");
            };
            assert_eq!(created.size % 512, 0);
            assert_eq!(created.seed, 77);
            verifier::verify_file(&created.path, 4096).unwrap();
        }
    }

    /// Accepts `room` bytes in total, then fails the way a full disk does.
    #[cfg(unix)]
    struct TinyVolume {
        room: Cell<usize>,
    }

    #[cfg(unix)]
    impl FileSink for TinyVolume {
        fn write_synced(&self, file: &mut File, data: &[u8]) -> io::Result<()> {
            let room = self.room.get();
            if data.len() > room {
                file.write_all(&data[..room])?;
                self.room.set(0);
                return Err(io::Error::from(nix::errno::Errno::ENOSPC));
            }
            self.room.set(room - data.len());
            DirectSink.write_synced(file, data)
        }
    }

    struct BrokenSink;

    impl FileSink for BrokenSink {
        fn write_synced(&self, file: &mut File, data: &[u8]) -> io::Result<()> {
            file.write_all(&data[..data.len() / 2])?;
            Err(io::Error::new(io::ErrorKind::Other, "controller reset"))
        }
    }

    fn roomy_probe() -> FixedProbe {
        FixedProbe(Cell::new(DiskUsage {
            total: 1 << 30,
            free: 1 << 30,
        }))
    }

    #[cfg(unix)]
    #[test]
    fn test_enospc_before_threshold_reports_full() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::new(dir.path(), small_config(), ContentGenerator::plain(), roomy_probe());
        writer.set_sink(TinyVolume {
            room: Cell::new(8 * 1024),
        });
        let mut rng = StdRng::seed_from_u64(4);

        let mut created = Vec::new();
        let reserved = loop {
            match writer.create_file(&mut rng).unwrap() {
                CreateOutcome::Created(file) => created.push(file.path),
                CreateOutcome::Full { reserved, .. } => break reserved,
            }
        };
        assert_eq!(reserved, 1 << 29);
        assert!(!created.is_empty());

        // The refused file was removed; only complete files remain.
        let mut on_disk: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        on_disk.sort();
        created.sort();
        assert_eq!(on_disk, created);
        for path in &created {
            verifier::verify_file(path, 4096).unwrap();
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_enospc_on_recreate_is_an_error() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::new(dir.path(), small_config(), ContentGenerator::plain(), roomy_probe());
        writer.set_sink(TinyVolume { room: Cell::new(10) });

        match writer.recreate_file(1, 100) {
            Err(Error::Io(e)) => assert!(platform::is_storage_full(&e)),
            other => panic!("expected a storage-full error, got {:?}", other),
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_other_write_errors_propagate_and_clean_up() {
        let dir = tempdir().unwrap();
        let mut writer = FileWriter::new(dir.path(), small_config(), ContentGenerator::plain(), roomy_probe());
        writer.set_sink(BrokenSink);
        let mut rng = StdRng::seed_from_u64(4);

        assert!(matches!(writer.create_file(&mut rng), Err(Error::Io(_))));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_recreate_zero_length() {
        let dir = tempdir().unwrap();
        let probe = FixedProbe(Cell::new(DiskUsage { total: 0, free: 0 }));
        let mut writer = FileWriter::new(dir.path(), small_config(), ContentGenerator::plain(), probe);

        let created = writer.recreate_file(3, 0).unwrap();
        assert_eq!(fs::metadata(&created.path).unwrap().len(), 0);
        verifier::verify_file(&created.path, 4096).unwrap();
    }
}
