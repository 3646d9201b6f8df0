//! Tracing subscriber setup for the `docket` binary.
//!
//! Logs go to stderr (so stdout stays clean for answers) and, when
//! enabled, to `<dir>/docket.log` through a non-blocking writer. `RUST_LOG`
//! overrides the configured level.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

pub const LOG_FILE: &str = "docket.log";

/// Dependencies whose info/debug output drowns ours.
const QUIET_TARGETS: [&str; 6] = ["ort", "sqlx", "hyper", "reqwest", "pdf_extract", "hf_hub"];

/// Filter directives for `level` with noisy dependencies capped at `warn`.
pub fn filter_directives(level: &str) -> String {
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{}=warn", t)));
    directives.join(",")
}

/// Install the global subscriber. The returned guard flushes the file log
/// on drop and must be kept alive for the life of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(&config.level)))
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    let console = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .boxed();

    let (file, guard) = if config.file {
        std::fs::create_dir_all(&config.dir)
            .with_context(|| format!("Failed to create log dir: {}", config.dir.display()))?;
        let appender = tracing_appender::rolling::never(&config.dir, LOG_FILE);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_cap_noisy_crates() {
        let d = filter_directives("debug");
        assert!(d.starts_with("debug,"));
        assert!(d.contains("sqlx=warn"));
        assert!(d.contains("pdf_extract=warn"));
        assert!(EnvFilter::try_new(d).is_ok());
    }
}
