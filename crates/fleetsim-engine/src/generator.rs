//! ---
//! fleetsim_section: "11-simulation"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Per-role utilization signal generators."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
//! Utilization models, one per server role.
//!
//! Each model is additive (periodic wave, occasional burst, noise) and every
//! output is clamped to `[0, 100]` and floored before it leaves this module.
//! Periodic terms are driven by simulated time `t = tick / 100`, so two runs
//! with the same seed and tick count produce identical series.

use std::f64::consts::PI;

use fleetsim_common::config::Role;

use crate::random::{RandomSource, SeededRandom};
use crate::server::Server;

/// Value emitted for roles outside the modelled set.
pub const FALLBACK_UTILIZATION: f64 = 50.0;

/// Ticks per simulated second.
pub const TICKS_PER_SECOND: f64 = 100.0;

/// Simulated time in seconds for a tick index.
pub fn simulated_time(tick: u64) -> f64 {
    tick as f64 / TICKS_PER_SECOND
}

/// Produce one bounded utilization sample for `server` at simulated time `t`.
pub fn generate<R: RandomSource + ?Sized>(
    server: &Server,
    is_active: bool,
    t: f64,
    rng: &mut R,
) -> u8 {
    let raw = match &server.role {
        Role::Database if is_active => active_database(t, rng),
        Role::Database => passive_database(rng),
        Role::Frontend => frontend(t, rng),
        Role::Backend => backend(t, rng),
        Role::Other(_) => FALLBACK_UTILIZATION,
    };
    quantize(raw)
}

/// Clamp to `[0, 100]` and floor. NaN collapses to zero.
pub fn quantize(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0).floor() as u8
}

fn active_database<R: RandomSource + ?Sized>(t: f64, rng: &mut R) -> f64 {
    let wave = 8.0 * (2.0 * PI * 6.0 * t).sin();
    let spike = if rng.chance(0.15) { 10.0 } else { 0.0 };
    let noise = rng.symmetric(2.5);
    80.0 + wave + spike + noise
}

fn passive_database<R: RandomSource + ?Sized>(rng: &mut R) -> f64 {
    20.0 + rng.symmetric(3.0)
}

fn frontend<R: RandomSource + ?Sized>(t: f64, rng: &mut R) -> f64 {
    let traffic = 30.0 + 40.0 * (2.0 * PI * t - PI / 2.0).sin();
    let burst = if rng.chance(0.08) { 20.0 } else { 0.0 };
    let variance = rng.standard_normal() * 10.0;
    traffic + burst + variance
}

fn backend<R: RandomSource + ?Sized>(t: f64, rng: &mut R) -> f64 {
    let base = 45.0 + 15.0 * (2.0 * PI * 3.0 * t).sin();
    let job_processing = if rng.chance(0.12) { 30.0 } else { 0.0 };
    let noise = rng.standard_normal() * 8.0;
    base + job_processing + noise
}

/// Produces the utilization value of a server for a tick.
///
/// The loop depends on this seam rather than on [`generate`] directly so
/// scenarios can pin values for specific servers and ticks.
pub trait SignalSource {
    fn sample(&mut self, server: &Server, is_active: bool, tick: u64) -> u8;
}

/// Default [`SignalSource`]: the role models driven by an injected [`RandomSource`].
#[derive(Debug, Clone)]
pub struct RoleSignalGenerator<R = SeededRandom> {
    rng: R,
}

impl RoleSignalGenerator<SeededRandom> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(SeededRandom::new(seed))
    }
}

impl<R: RandomSource> RoleSignalGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: RandomSource> SignalSource for RoleSignalGenerator<R> {
    fn sample(&mut self, server: &Server, is_active: bool, tick: u64) -> u8 {
        generate(server, is_active, simulated_time(tick), &mut self.rng)
    }
}

impl<F> SignalSource for F
where
    F: FnMut(&Server, bool, u64) -> u8,
{
    fn sample(&mut self, server: &Server, is_active: bool, tick: u64) -> u8 {
        self(server, is_active, tick)
    }
}
