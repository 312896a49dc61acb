//! ---
//! fleetsim_section: "01-core-functionality"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Tracing subscriber setup shared by simulator binaries."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "FLEETSIM_LOG";

/// Flush guards for the non-blocking writers; dropped at process exit.
static WRITER_GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Pick the first usable directive: `FLEETSIM_LOG`, then `RUST_LOG`, then the configured level.
pub fn resolve_filter(
    fleetsim_log: Option<&str>,
    rust_log: Option<&str>,
    configured: &str,
) -> EnvFilter {
    [fleetsim_log, rust_log, Some(configured)]
        .into_iter()
        .flatten()
        .find_map(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global subscriber for `service_name`.
///
/// Stdout gets pretty or JSON lines per [`LogFormat`]. When `config.file` is set,
/// every event is also written as JSON to `<directory>/<service_name>.log.<date>`.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let fleetsim_log = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = resolve_filter(fleetsim_log.as_deref(), rust_log.as_deref(), &config.level);

    let mut guards = Vec::with_capacity(2);
    let (stdout_writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(guard);
    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = if config.file {
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!("failed to create log directory {}", config.directory.display())
        })?;
        let appender =
            tracing_appender::rolling::daily(&config.directory, format!("{service_name}.log"));
        let (file_writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        Some(
            fmt::layer()
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(file_writer)
                .boxed(),
        )
    } else {
        None
    };

    let _ = WRITER_GUARDS.set(guards);
    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        format = ?config.format,
        log_file = config.file.then(|| config.directory.display().to_string()),
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fleetsim_log_wins() {
        let filter = resolve_filter(Some("fleetsim_engine=trace"), Some("warn"), "info");
        assert_eq!(filter.to_string(), "fleetsim_engine=trace");
    }

    #[test]
    fn rust_log_is_second() {
        assert_eq!(resolve_filter(None, Some("warn"), "info").to_string(), "warn");
    }

    #[test]
    fn configured_level_is_the_fallback() {
        assert_eq!(resolve_filter(None, None, "debug").to_string(), "debug");
    }
}
