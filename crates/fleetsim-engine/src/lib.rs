//! ---
//! fleetsim_section: "11-simulation"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Simulation engine module exports."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
//! Simulation engine for the fleet telemetry simulator.
//!
//! A [`SimulationLoop`] owns the roster and the per-run [`SimulationState`].
//! Each tick it asks a [`SignalSource`] for every server's utilization, lets
//! the [`FailoverController`] react to the active database's load, and pushes
//! the resulting batches to a [`MetricSink`].

pub mod failover;
pub mod generator;
pub mod random;
pub mod runner;
pub mod sample;
pub mod server;
pub mod sink;
pub mod state;

pub use failover::{FailoverController, FailoverDecision, FailoverEvent, FailoverPhase};
pub use fleetsim_common::config::Role;
pub use generator::{generate, simulated_time, RoleSignalGenerator, SignalSource};
pub use random::{RandomSource, SeededRandom, SequenceRandom};
pub use runner::{RateLimiter, RunSummary, SimulationLoop, TickReport};
pub use sample::{Sample, SampleBatch, CPU_USAGE, DB_IS_ACTIVE};
pub use server::Server;
pub use sink::{CountingSink, MemorySink, MetricSink, PushOutcome, SinkError};
pub use state::SimulationState;
