use std::path::Path;

use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "TIDYDIR_LOG";
const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "tidydir.log";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber: compact output on stderr plus a daily
/// rolling file in `log_dir`. Keep the returned guard alive for as long as
/// file logging is wanted; dropping it flushes the writer.
///
/// Calling this more than once keeps the first subscriber.
pub fn init(log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(filter())
        .try_init();

    match installed {
        Ok(()) => info!(dir = %log_dir.display(), "logging initialized"),
        Err(_) => debug!("tracing subscriber already installed"),
    }

    guard
}
