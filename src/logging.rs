use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "weather_pipeline=info,tower_http=info";
const LOG_FILE_PREFIX: &str = "pipeline.log";

/// Non-blocking writer for the daily-rotated log file in `log_dir`.
fn file_writer(log_dir: &Path) -> (NonBlocking, WorkerGuard) {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("Could not create log directory {}: {}", log_dir.display(), e);
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    tracing_appender::non_blocking(file_appender)
}

/// Console output plus a daily-rotated JSON log file in `log_dir`.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process and let it drop before exiting.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    let (non_blocking_writer, guard) = file_writer(log_dir);

    let file_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
