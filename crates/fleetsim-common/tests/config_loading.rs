//! ---
//! fleetsim_section: "01-core-functionality"
//! fleetsim_subsection: "tests"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Configuration loading integration tests."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use std::io::Write;
use std::time::Duration;

use fleetsim_common::{ConfigError, FleetConfig, LogFormat, Role};
use tempfile::NamedTempFile;

const SAMPLE: &str = r#"
[simulation]
iterations = 120
seed = 7
job = "loadgen"
pacing_interval = 0.25

[failover]
threshold = 90
cooldown_ticks = 20

[[servers]]
name = "db-a"
role = "database"

[[servers]]
name = "db-b"
role = "database"

[[servers]]
name = "web-1"
role = "frontend"

[[servers]]
name = "cache-1"
role = "cache"

[remote_write]
url = "http://ingest.internal:9009/api/v1/push"
timeout = 2

[logging]
format = "structured-json"
level = "debug"
file = false
"#;

#[test]
fn parses_full_document() {
    let config: FleetConfig = SAMPLE.parse().unwrap();
    assert_eq!(config.iteration_limit().unwrap(), Some(120));
    assert_eq!(config.simulation.seed, 7);
    assert_eq!(config.simulation.job, "loadgen");
    assert_eq!(config.simulation.pacing_interval, Duration::from_millis(250));
    assert_eq!(config.failover.threshold, 90);
    assert_eq!(config.failover.cooldown_ticks, 20);
    assert_eq!(config.servers.len(), 4);
    assert_eq!(config.servers[3].role, Role::Other("cache".into()));
    assert_eq!(config.initial_primary(), Some("db-a"));
    assert_eq!(config.remote_write.url.path(), "/api/v1/push");
    assert_eq!(config.remote_write.timeout, Duration::from_secs(2));
    assert_eq!(config.logging.format, LogFormat::StructuredJson);
    assert_eq!(config.logging.level, "debug");
    assert!(!config.logging.file);
    assert!(!config.metrics.enabled);
}

#[test]
fn empty_document_uses_defaults() {
    let config: FleetConfig = "".parse().unwrap();
    assert_eq!(config.servers.len(), 9);
    assert_eq!(config.remote_write.url.as_str(), "http://localhost:9090/api/v1/write");
}

#[test]
fn negative_iterations_fail_parsing() {
    let err = "[simulation]\niterations = -5\n"
        .parse::<FleetConfig>()
        .unwrap_err();
    assert!(matches!(err, ConfigError::NegativeIterations(-5)));
}

#[test]
fn load_picks_first_existing_candidate() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();
    file.flush().unwrap();

    let missing = std::env::temp_dir().join("fleetsim-does-not-exist.toml");
    let loaded = FleetConfig::load_with_source(&[missing, file.path().to_path_buf()]).unwrap();
    assert_eq!(loaded.source, file.path());
    assert_eq!(loaded.config.simulation.seed, 7);
}

#[test]
fn load_reports_inspected_candidates() {
    let missing = std::env::temp_dir().join("fleetsim-also-missing.toml");
    let err = FleetConfig::load(&[missing.clone()]).unwrap_err();
    match err {
        ConfigError::NotFound(inspected) => {
            assert!(inspected.contains("fleetsim-also-missing.toml"))
        }
        other => panic!("unexpected error {other:?}"),
    }
}
