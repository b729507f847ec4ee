use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{} is not a directory!", .0.display())]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

/// A file name that does not follow `<hash>-<seed>-<size>:<meta>:integrity[.N]`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("malformed integrity name '{name}': {reason}")]
    MalformedName { name: String, reason: String },
}

/// Reasons a file on disk fails its self-check.
///
/// Every variant carries the offending path and, where there is one, the
/// value embedded in the name next to the value observed on disk.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("File {} has a malformed name: {reason}", .path.display())]
    MalformedName { path: PathBuf, reason: String },

    #[error("File extension {} does not begin with \"integrity\" (found \"{extension}\")", .path.display())]
    BadExtension { path: PathBuf, extension: String },

    #[error("File {} meta data not valid! (stored = {stored}, calculated = {calculated})", .path.display())]
    MetadataMismatch {
        path: PathBuf,
        stored: String,
        calculated: String,
    },

    #[error("File {} incorrect size! (expected = {expected}, current = {actual})", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("File {} md5 mismatch! (expected = {expected}, current = {actual})", .path.display())]
    ContentMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("File {} could not be read: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl VerifyError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            VerifyError::MalformedName { path, .. }
            | VerifyError::BadExtension { path, .. }
            | VerifyError::MetadataMismatch { path, .. }
            | VerifyError::SizeMismatch { path, .. }
            | VerifyError::ContentMismatch { path, .. }
            | VerifyError::Unreadable { path, .. } => path,
        }
    }

    /// Short stable label for the failure kind, used in logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::MalformedName { .. } => "MalformedName",
            VerifyError::BadExtension { .. } => "BadExtension",
            VerifyError::MetadataMismatch { .. } => "MetadataMismatch",
            VerifyError::SizeMismatch { .. } => "SizeMismatch",
            VerifyError::ContentMismatch { .. } => "ContentMismatch",
            VerifyError::Unreadable { .. } => "Unreadable",
        }
    }
}
