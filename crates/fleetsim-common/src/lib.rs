//! ---
//! fleetsim_section: "01-core-functionality"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Shared primitives for the fleet telemetry simulator."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
//! Shared configuration and logging primitives for the fleet telemetry
//! simulator workspace.

pub mod config;
pub mod logging;

pub use config::{
    default_roster, ConfigError, FailoverConfig, FleetConfig, LoadedFleetConfig, LoggingConfig,
    MetricsConfig, RemoteWriteConfig, Role, ServerConfig, SimulationConfig,
};
pub use logging::{init_tracing, LogFormat};
