//! ---
//! fleetsim_section: "01-core-functionality"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Simulator configuration model, loading, and validation."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds, DurationSecondsWithFrac};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

fn default_seed() -> u64 {
    0xF1EE7u64
}

fn default_job() -> String {
    "exporter".to_owned()
}

fn default_iterations() -> Option<i64> {
    Some(500)
}

fn default_pacing_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_threshold() -> u8 {
    96
}

fn default_cooldown_ticks() -> u32 {
    50
}

fn default_remote_write_url() -> Url {
    Url::parse("http://localhost:9090/api/v1/write").expect("valid default remote-write url")
}

fn default_remote_write_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_to_file() -> bool {
    true
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_metrics_listen() -> SocketAddr {
    "127.0.0.1:9899"
        .parse()
        .expect("valid default metrics address")
}

/// Fatal configuration problems detected before a run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration files found. inspected: {0}")]
    NotFound(String),
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("server roster must contain at least one server")]
    EmptyRoster,
    #[error("server name '{0}' is declared more than once")]
    DuplicateServer(String),
    #[error("server roster must contain at least one database server")]
    NoDatabase,
    #[error("initial primary '{0}' is not in the server roster")]
    UnknownPrimary(String),
    #[error("initial primary '{0}' is not a database server")]
    PrimaryNotDatabase(String),
    #[error("iteration count must not be negative (got {0})")]
    NegativeIterations(i64),
    #[error("failover threshold must be within 0..=100 (got {0})")]
    ThresholdOutOfRange(u8),
}

/// Server role as declared in the roster.
///
/// Labels outside the known set are kept verbatim in [`Role::Other`] so the
/// generator can fall back to its constant value instead of rejecting the roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Database,
    Frontend,
    Backend,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Database => "database",
            Role::Frontend => "frontend",
            Role::Backend => "backend",
            Role::Other(label) => label,
        }
    }

    pub fn is_database(&self) -> bool {
        matches!(self, Role::Database)
    }
}

impl From<String> for Role {
    fn from(label: String) -> Self {
        match label.to_lowercase().as_str() {
            "database" => Role::Database,
            "frontend" => Role::Frontend,
            "backend" => Role::Backend,
            _ => Role::Other(label),
        }
    }
}

impl From<&str> for Role {
    fn from(label: &str) -> Self {
        Role::from(label.to_owned())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_owned()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub role: Role,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// Default roster: one primary database, two replicas, three frontends, three backends.
pub fn default_roster() -> Vec<ServerConfig> {
    vec![
        ServerConfig::new("db-primary", Role::Database),
        ServerConfig::new("db-replica-1", Role::Database),
        ServerConfig::new("db-replica-2", Role::Database),
        ServerConfig::new("frontend-1", Role::Frontend),
        ServerConfig::new("frontend-2", Role::Frontend),
        ServerConfig::new("frontend-3", Role::Frontend),
        ServerConfig::new("backend-1", Role::Backend),
        ServerConfig::new("backend-2", Role::Backend),
        ServerConfig::new("backend-3", Role::Backend),
    ]
}

/// Primary configuration object for a simulator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default = "default_roster")]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub remote_write: RemoteWriteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where a [`FleetConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedFleetConfig {
    pub config: FleetConfig,
    pub source: PathBuf,
}

impl FleetConfig {
    pub const ENV_CONFIG_PATH: &'static str = "FLEETSIM_CONFIG";

    /// Load configuration from disk, respecting the `FLEETSIM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self, ConfigError> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(
        candidates: &[P],
    ) -> Result<LoadedFleetConfig, ConfigError> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedFleetConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedFleetConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(ConfigError::NotFound(
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        ))
    }

    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        contents.parse()
    }

    /// Name of the database that starts as active primary.
    ///
    /// Falls back to the first database in roster order; `None` only when the
    /// roster has no database, which [`FleetConfig::validate`] rejects.
    pub fn initial_primary(&self) -> Option<&str> {
        match &self.simulation.initial_primary {
            Some(name) => Some(name.as_str()),
            None => self
                .servers
                .iter()
                .find(|server| server.role.is_database())
                .map(|server| server.name.as_str()),
        }
    }

    /// Iteration limit with the sign already checked; `None` means unbounded.
    pub fn iteration_limit(&self) -> Result<Option<u64>, ConfigError> {
        let limit = match self.simulation.iterations {
            Some(count) if count < 0 => return Err(ConfigError::NegativeIterations(count)),
            Some(count) => Some(count as u64),
            None => None,
        };
        Ok(limit.filter(|_| !self.simulation.unbounded))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::DuplicateServer(server.name.clone()));
            }
        }
        if !self.servers.iter().any(|server| server.role.is_database()) {
            return Err(ConfigError::NoDatabase);
        }
        if let Some(primary) = &self.simulation.initial_primary {
            match self.servers.iter().find(|server| &server.name == primary) {
                None => return Err(ConfigError::UnknownPrimary(primary.clone())),
                Some(server) if !server.role.is_database() => {
                    return Err(ConfigError::PrimaryNotDatabase(primary.clone()))
                }
                Some(_) => {}
            }
        }
        self.iteration_limit()?;
        if self.failover.threshold > 100 {
            return Err(ConfigError::ThresholdOutOfRange(self.failover.threshold));
        }
        Ok(())
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            failover: FailoverConfig::default(),
            servers: default_roster(),
            remote_write: RemoteWriteConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl std::str::FromStr for FleetConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of ticks to run; ignored when `unbounded` is set.
    #[serde(default = "default_iterations")]
    pub iterations: Option<i64>,
    /// Run until cancelled.
    #[serde(default)]
    pub unbounded: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_job")]
    pub job: String,
    #[serde(default = "default_pacing_interval")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub pacing_interval: Duration,
    #[serde(default)]
    pub initial_primary: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            unbounded: false,
            seed: default_seed(),
            job: default_job(),
            pacing_interval: default_pacing_interval(),
            initial_primary: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailoverConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default = "default_cooldown_ticks")]
    pub cooldown_ticks: u32,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            cooldown_ticks: default_cooldown_ticks(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteWriteConfig {
    #[serde(default = "default_remote_write_url")]
    pub url: Url,
    #[serde(default = "default_remote_write_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for RemoteWriteConfig {
    fn default() -> Self {
        Self {
            url: default_remote_write_url(),
            timeout: default_remote_write_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when neither `FLEETSIM_LOG` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Also write a daily rolling JSON log under `directory`.
    #[serde(default = "default_log_to_file")]
    pub file: bool,
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: default_log_to_file(),
            directory: default_logging_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}
