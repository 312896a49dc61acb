//! ---
//! fleetsim_section: "07-failover"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Load-driven active/passive database failover."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use fleetsim_common::config::FailoverConfig;
use tracing::{debug, info};

use crate::server::{databases, Server};
use crate::state::SimulationState;

/// Phase of the failover state machine, derived from the cooldown counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverPhase {
    Stable,
    CoolingDown { remaining: u32 },
}

/// Role change of two databases: `demoted` goes passive, `promoted` goes active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverEvent {
    pub tick: u64,
    pub demoted: String,
    pub promoted: String,
    /// Load of the demoted database that crossed the threshold.
    pub load: u8,
}

/// Outcome of one [`FailoverController::evaluate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverDecision {
    /// Load below threshold, nothing to do.
    Hold,
    /// Inside the cooldown window; overload is ignored.
    CoolingDown { remaining: u32 },
    /// Overloaded but no passive database exists.
    NoTarget,
    Promoted(FailoverEvent),
}

impl FailoverDecision {
    pub fn event(&self) -> Option<&FailoverEvent> {
        match self {
            FailoverDecision::Promoted(event) => Some(event),
            _ => None,
        }
    }

    pub fn into_event(self) -> Option<FailoverEvent> {
        match self {
            FailoverDecision::Promoted(event) => Some(event),
            _ => None,
        }
    }
}

/// Promotes a passive database when the active one is overloaded.
///
/// The controller holds policy only; the active primary and cooldown counter
/// live in [`SimulationState`] so a run can be inspected between ticks.
#[derive(Debug, Clone)]
pub struct FailoverController {
    threshold: u8,
    cooldown_window: u32,
    databases: Vec<String>,
}

impl FailoverController {
    pub fn new(threshold: u8, cooldown_window: u32, roster: &[Server]) -> Self {
        Self {
            threshold,
            cooldown_window,
            databases: databases(roster).map(|server| server.name.clone()).collect(),
        }
    }

    pub fn from_config(config: &FailoverConfig, roster: &[Server]) -> Self {
        Self::new(config.threshold, config.cooldown_ticks, roster)
    }

    pub fn phase(state: &SimulationState) -> FailoverPhase {
        match state.failover_cooldown {
            0 => FailoverPhase::Stable,
            remaining => FailoverPhase::CoolingDown { remaining },
        }
    }

    /// First database in roster order that is not the active primary.
    pub fn failover_target(&self, active_primary: &str) -> Option<&str> {
        self.databases
            .iter()
            .map(String::as_str)
            .find(|name| *name != active_primary)
    }

    /// Feed the active database's load for the tick in `state.tick`.
    ///
    /// A pending cooldown is decremented first; a transition may only fire once
    /// the counter is zero. A transition resets the counter to the full window.
    pub fn evaluate(&self, state: &mut SimulationState, load: u8) -> FailoverDecision {
        if state.failover_cooldown > 0 {
            state.failover_cooldown -= 1;
            if state.failover_cooldown > 0 {
                return FailoverDecision::CoolingDown {
                    remaining: state.failover_cooldown,
                };
            }
        }

        if load < self.threshold {
            return FailoverDecision::Hold;
        }

        let Some(target) = self.failover_target(&state.active_primary) else {
            debug!(
                tick = state.tick,
                active = %state.active_primary,
                load,
                "active database overloaded but no passive database available"
            );
            return FailoverDecision::NoTarget;
        };

        let promoted = target.to_owned();
        let demoted = std::mem::replace(&mut state.active_primary, promoted.clone());
        state.failover_cooldown = self.cooldown_window;

        let event = FailoverEvent {
            tick: state.tick,
            demoted,
            promoted,
            load,
        };
        info!(
            tick = event.tick,
            demoted = %event.demoted,
            promoted = %event.promoted,
            load = event.load,
            cooldown = state.failover_cooldown,
            "database failover: {} -> passive, {} -> active",
            event.demoted,
            event.promoted
        );
        FailoverDecision::Promoted(event)
    }
}
