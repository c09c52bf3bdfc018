//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSection;

/// Build a filter from the `--log-level` flag, then `RUST_LOG`, then the
/// configured level; the first that parses wins.
pub fn env_filter(flag: Option<&str>, rust_log: Option<&str>, level: &str) -> EnvFilter {
    flag.and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| rust_log.and_then(|directives| EnvFilter::try_new(directives).ok()))
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process, or buffered file output is lost.
pub fn init(config: &LoggingSection, flag: Option<&str>) -> Result<Option<WorkerGuard>> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = env_filter(flag, rust_log.as_deref(), &config.level);

    let (writer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "pmboard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match (writer, config.json) {
        (Some(w), true) => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(w))
            .try_init(),
        (Some(w), false) => registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(w))
            .try_init(),
        (None, true) => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (None, false) => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    result.context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_uses_configured_level() {
        let filter = env_filter(None, None, "pmboard=debug");
        assert!(filter.to_string().contains("pmboard=debug"));
    }

    #[test]
    fn test_env_filter_prefers_rust_log() {
        let filter = env_filter(None, Some("tower_http=trace"), "pmboard=debug");
        assert!(filter.to_string().contains("tower_http=trace"));
        assert!(!filter.to_string().contains("pmboard=debug"));
    }

    #[test]
    fn test_env_filter_falls_back_on_garbage() {
        let filter = env_filter(None, Some("pmboard=loud"), "pmboard=quiet");
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_env_filter_flag_beats_rust_log() {
        let filter = env_filter(Some("warn"), Some("tower_http=trace"), "pmboard=debug");
        assert_eq!(filter.to_string(), "warn");

        let filter = env_filter(Some("pmboard=loud"), Some("tower_http=trace"), "info");
        assert!(filter.to_string().contains("tower_http=trace"));
    }
}
