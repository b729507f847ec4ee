use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "integrity")]
#[command(about = "Fill a filesystem with self-verifying files and check them as it churns", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fill the directory, verify everything, delete every other file, repeat
    Run {
        /// Directory to run the test in
        directory: PathBuf,
        /// Session seed; derived from the clock when omitted
        #[arg(short, long)]
        seed: Option<u64>,
        /// Fraction of capacity to keep free, e.g. 0.5
        #[arg(short, long, conflicts_with = "file_count")]
        threshold: Option<f64>,
        /// Stop after creating this many files
        #[arg(short = 'n', long)]
        file_count: Option<u64>,
        /// Exit the first time the threshold is reached
        #[arg(short, long)]
        quit_on_full: bool,
        /// Create files which contain data that is similar
        #[arg(short, long)]
        duplicate: bool,
    },
    /// Verify one or more files against their names
    Verify {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Verify every integrity file in a directory
    VerifyDir { directory: PathBuf },
    /// Recreate a file from the seed and size in its name
    Recreate {
        directory: PathBuf,
        seed: u64,
        size: u64,
        /// The file was written in duplicate mode
        #[arg(short, long)]
        duplicate: bool,
    },
    /// Print configuration values
    PrintConfig,
}
