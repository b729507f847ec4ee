pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod name;
pub mod platform;
pub mod progress;
pub mod scanner;
pub mod verifier;
pub mod writer;

pub use config::IntegrityConfig;
pub use content::ContentGenerator;
pub use engine::{
    recreate_file, run_fill_drain_cycle, verify_directory, SessionEngine, SessionOptions,
    SessionResult, SessionState, StopReason,
};
pub use error::{Error, NameError, VerifyError};
pub use name::IntegrityName;
pub use platform::{DiskUsage, SpaceProbe, StatvfsProbe};
pub use progress::{SessionReporter, SilentReporter};
pub use verifier::{verify_file, verify_files, VerifyOutcome};
pub use writer::{CreateOutcome, CreatedFile, DirectSink, FileSink, FileWriter};
