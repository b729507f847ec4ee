use crate::error::{NameError, VerifyError};
use crate::hasher;
use crate::name::{self, IntegrityName, INTEGRITY_EXTENSION};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Check a file against the hashes embedded in its own name.
///
/// In order: the name decodes, the extension starts with `integrity`, the
/// meta hash matches the `<hash>-<seed>-<size>` field, the on-disk length
/// matches `size`, and the streamed MD5 of the content matches `hash`.
/// Read-only.
pub fn verify_file(path: &Path, chunk_size: usize) -> Result<IntegrityName, VerifyError> {
    let decoded = name::decode_path(path).map_err(|NameError::MalformedName { reason, .. }| {
        VerifyError::MalformedName {
            path: path.to_path_buf(),
            reason,
        }
    })?;

    if !decoded.extension.starts_with(INTEGRITY_EXTENSION) {
        return Err(VerifyError::BadExtension {
            path: path.to_path_buf(),
            extension: decoded.extension,
        });
    }

    // Meta hash covers the name field verbatim.
    let raw_triple = raw_triple(path).unwrap_or_else(|| decoded.triple());
    let calculated = hasher::hash_str(&raw_triple);
    if calculated != decoded.meta_hash {
        return Err(VerifyError::MetadataMismatch {
            path: path.to_path_buf(),
            stored: decoded.meta_hash,
            calculated,
        });
    }

    let unreadable = |source: std::io::Error| VerifyError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let actual_size = fs::metadata(path).map_err(unreadable)?.len();
    if actual_size != decoded.size {
        return Err(VerifyError::SizeMismatch {
            path: path.to_path_buf(),
            expected: decoded.size,
            actual: actual_size,
        });
    }

    let file = File::open(path).map_err(unreadable)?;
    let (actual_hash, bytes_read) = hasher::hash_reader(file, chunk_size).map_err(unreadable)?;
    if bytes_read != decoded.size {
        // Length changed between the stat and the read.
        return Err(VerifyError::SizeMismatch {
            path: path.to_path_buf(),
            expected: decoded.size,
            actual: bytes_read,
        });
    }
    if actual_hash != decoded.content_hash {
        return Err(VerifyError::ContentMismatch {
            path: path.to_path_buf(),
            expected: decoded.content_hash,
            actual: actual_hash,
        });
    }

    debug!("Verified {}", path.display());
    Ok(decoded)
}

fn raw_triple(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    file_name.split(':').next().map(str::to_string)
}

/// Per-file result of a batch verification.
#[derive(Debug)]
pub struct VerifyOutcome {
    pub path: PathBuf,
    pub result: Result<IntegrityName, VerifyError>,
}

impl VerifyOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Verify every path, continuing past failures so the caller sees them all.
pub fn verify_files<I, P>(paths: I, chunk_size: usize) -> Vec<VerifyOutcome>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .map(|p| {
            let path = p.as_ref().to_path_buf();
            let result = verify_file(&path, chunk_size);
            if let Err(e) = &result {
                error!("{}", e);
            }
            VerifyOutcome { path, result }
        })
        .collect()
}

/// True when any outcome in the batch failed.
pub fn any_failed(outcomes: &[VerifyOutcome]) -> bool {
    outcomes.iter().any(|o| !o.is_ok())
}
