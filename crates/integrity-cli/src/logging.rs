use std::env;
use std::path::Path;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "./logs/integrity.log";

/// Console events go to stderr, leaving stdout to command results such as
/// the `[OK]`/`[ERROR]` lines. A second, plain-text layer appends to
/// `LOG_FILE_PATH`; an empty value turns the file layer off.
///
/// The returned guard flushes the file writer when dropped.
pub fn init_logger() -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_env("TRACING_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));

    let log_file_path = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let (file_layer, guard) = if log_file_path.is_empty() {
        (None, None)
    } else {
        let path = Path::new(&log_file_path);
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "integrity.log".into());

        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_ids(true);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(file_layer)
        .init();

    debug!(
        "Logging to stderr{}",
        if log_file_path.is_empty() {
            String::new()
        } else {
            format!(" and {}", log_file_path)
        }
    );

    guard
}
