use crate::error::NameError;
use crate::hasher;
use std::fmt;
use std::path::{Path, PathBuf};

/// Fixed tail of every integrity file name, before any collision suffix.
pub const INTEGRITY_EXTENSION: &str = "integrity";

/// The fields embedded in an integrity file name:
/// `<content_hash>-<seed>-<size>:<meta_hash>:<extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityName {
    pub content_hash: String,
    pub seed: u64,
    pub size: u64,
    pub meta_hash: String,
    /// `integrity`, or `integrity.<n>` when the name was suffixed on collision.
    pub extension: String,
}

impl IntegrityName {
    /// Build the name for freshly generated content.
    pub fn new(content_hash: &str, seed: u64, size: u64) -> Self {
        let triple = triple(content_hash, seed, size);
        Self {
            content_hash: content_hash.to_string(),
            seed,
            size,
            meta_hash: hasher::hash_str(&triple),
            extension: INTEGRITY_EXTENSION.to_string(),
        }
    }

    /// The `<content_hash>-<seed>-<size>` field the meta hash is computed over.
    pub fn triple(&self) -> String {
        triple(&self.content_hash, self.seed, self.size)
    }

    /// Collision suffix, if the extension carries one.
    pub fn suffix(&self) -> Option<u32> {
        self.extension
            .strip_prefix(INTEGRITY_EXTENSION)?
            .strip_prefix('.')?
            .parse()
            .ok()
    }
}

impl fmt::Display for IntegrityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.triple(), self.meta_hash, self.extension)
    }
}

fn triple(content_hash: &str, seed: u64, size: u64) -> String {
    format!("{}-{}-{}", content_hash, seed, size)
}

/// `"{content_hash}-{seed}-{size}:{meta_hash}:integrity"`, without any suffix.
pub fn encode(content_hash: &str, seed: u64, size: u64) -> String {
    IntegrityName::new(content_hash, seed, size).to_string()
}

/// Split a file name back into its fields.
///
/// Only the shape is checked here; whether the meta hash actually matches is
/// the verifier's job.
pub fn decode(file_name: &str) -> Result<IntegrityName, NameError> {
    let malformed = |reason: String| NameError::MalformedName {
        name: file_name.to_string(),
        reason,
    };

    let fields: Vec<&str> = file_name.split(':').collect();
    let [name, meta_hash, extension] = fields[..] else {
        return Err(malformed(format!(
            "expected 3 ':'-separated fields, found {}",
            fields.len()
        )));
    };

    let parts: Vec<&str> = name.split('-').collect();
    let [content_hash, seed, size] = parts[..] else {
        return Err(malformed(format!(
            "expected 3 '-'-separated fields before the meta hash, found {}",
            parts.len()
        )));
    };

    let seed = seed
        .parse::<u64>()
        .map_err(|e| malformed(format!("seed '{}' is not an integer: {}", seed, e)))?;
    let size = size
        .parse::<u64>()
        .map_err(|e| malformed(format!("size '{}' is not an integer: {}", size, e)))?;

    Ok(IntegrityName {
        content_hash: content_hash.to_string(),
        seed,
        size,
        meta_hash: meta_hash.to_string(),
        extension: extension.to_string(),
    })
}

/// Decode the final component of `path`.
pub fn decode_path(path: &Path) -> Result<IntegrityName, NameError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| NameError::MalformedName {
            name: path.to_string_lossy().into_owned(),
            reason: "file name is missing or not valid UTF-8".to_string(),
        })?;
    decode(file_name)
}

/// First path under `directory` for `base_name` that does not exist yet:
/// the bare name, then `.0`, `.1`, and so on.
pub fn resolve_collision(directory: &Path, base_name: &str) -> PathBuf {
    let candidate = directory.join(base_name);
    if !exists(&candidate) {
        return candidate;
    }

    (0u64..)
        .map(|n| directory.join(format!("{}.{}", base_name, n)))
        .find(|path| !exists(path))
        .unwrap_or(candidate)
}

// symlink_metadata so a dangling link still counts as taken.
fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
