//! ---
//! fleetsim_section: "11-simulation"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Mutable per-run simulation state."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---

/// State owned by one simulation run and discarded when it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationState {
    /// Index of the next tick to execute.
    pub tick: u64,
    /// Name of the single active database.
    pub active_primary: String,
    /// Ticks left before another failover may fire.
    pub failover_cooldown: u32,
}

impl SimulationState {
    pub fn new(active_primary: impl Into<String>) -> Self {
        Self {
            tick: 0,
            active_primary: active_primary.into(),
            failover_cooldown: 0,
        }
    }

    pub fn is_active(&self, server: &str) -> bool {
        self.active_primary == server
    }
}
