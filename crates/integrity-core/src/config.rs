use crate::error::Error;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

pub const DEFAULT_THRESHOLD_FRACTION: f64 = 0.5;
pub const DEFAULT_MIN_FILE_SIZE: u64 = 512;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 8 * 1024 * 1024;
pub const DEFAULT_BLOCK_SIZE: u64 = 512;
pub const DEFAULT_VERIFY_CHUNK_SIZE: usize = 64 * 1024;

/// Tunables shared by the writer, verifier and session driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Stop creating files once free space is at or below `total * threshold_fraction`.
    pub threshold_fraction: f64,
    /// Lower bound for automatically sized files.
    pub min_file_size: u64,
    /// Upper bound for automatically sized files, and the duplicate buffer length.
    pub max_file_size: u64,
    /// Duplicate mode rounds file sizes up to a multiple of this.
    pub block_size: u64,
    pub verify_chunk_size: usize,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            threshold_fraction: DEFAULT_THRESHOLD_FRACTION,
            min_file_size: DEFAULT_MIN_FILE_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            verify_chunk_size: DEFAULT_VERIFY_CHUNK_SIZE,
        }
    }
}

impl IntegrityConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..1.0).contains(&self.threshold_fraction) {
            return Err(Error::InvalidConfig(format!(
                "threshold_fraction must be in [0, 1), got {}",
                self.threshold_fraction
            )));
        }
        if self.min_file_size > self.max_file_size {
            return Err(Error::InvalidConfig(format!(
                "min_file_size ({}) is larger than max_file_size ({})",
                self.min_file_size, self.max_file_size
            )));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidConfig("block_size must be non-zero".to_string()));
        }
        if self.verify_chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "verify_chunk_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Round `size` up to the next multiple of `block_size`.
    pub fn round_to_block(&self, size: u64) -> u64 {
        match size % self.block_size {
            0 => size,
            rem => size + (self.block_size - rem),
        }
    }
}

/// Load from an optional `Integrity.{toml,yaml,json}` in the working
/// directory, then `INTEGRITY_*` environment variables.
pub fn load_configuration() -> Result<IntegrityConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Integrity").required(false))
        .add_source(Environment::with_prefix("INTEGRITY"))
        .build()?;
    builder.try_deserialize::<IntegrityConfig>()
}

/// Time-derived seed for runs that were not given one.
pub fn time_seed() -> u64 {
    chrono::Utc::now().timestamp_micros().unsigned_abs()
}
