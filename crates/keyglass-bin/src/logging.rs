use std::path::Path;

use anyhow::Result;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber.
///
/// Logs go to stderr so they never interleave with the overlay text on
/// stdout. With `log_dir`, a daily-rolling file is written as well.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("keyglass=debug,warn")
    } else {
        EnvFilter::new("keyglass=info,warn")
    };

    let registry = tracing_subscriber::registry().with(filter);
    let stderr = fmt::layer().with_target(true).with_writer(std::io::stderr);

    if let Some(dir) = log_dir {
        let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "keyglass.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // The writer must outlive every log call; init_logging runs once per process.
        std::mem::forget(guard);

        registry
            .with(stderr)
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .try_init()?;
    } else {
        registry.with(stderr).try_init()?;
    }

    Ok(())
}
