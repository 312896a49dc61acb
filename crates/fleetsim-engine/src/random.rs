//! ---
//! fleetsim_section: "11-simulation"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Injectable randomness for the signal generators."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform draws in `[0, 1)`.
///
/// Every random term the generators use is derived from [`RandomSource::uniform`],
/// so a scripted implementation fully determines the output.
pub trait RandomSource {
    fn uniform(&mut self) -> f64;

    /// Bernoulli draw that succeeds with probability `p`.
    fn chance(&mut self, p: f64) -> bool {
        self.uniform() > 1.0 - p
    }

    /// Uniform draw in `[-half_width, half_width)`.
    fn symmetric(&mut self, half_width: f64) -> f64 {
        (self.uniform() - 0.5) * 2.0 * half_width
    }

    /// Standard normal draw via the Box-Muller transform over two uniforms.
    fn standard_normal(&mut self) -> f64 {
        // 1 - u keeps the logarithm argument in (0, 1].
        let u1 = 1.0 - self.uniform();
        let u2 = self.uniform();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn uniform(&mut self) -> f64 {
        (**self).uniform()
    }
}

/// Production randomness backed by a seeded [`StdRng`].
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed sequence of uniforms, cycling once exhausted.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: VecDeque<f64>,
}

impl SequenceRandom {
    /// Panics if `values` is empty.
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let values: VecDeque<f64> = values.into_iter().collect();
        assert!(!values.is_empty(), "sequence must hold at least one value");
        Self { values }
    }

    /// Always returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new([value])
    }
}

impl RandomSource for SequenceRandom {
    fn uniform(&mut self) -> f64 {
        let value = self.values.pop_front().unwrap_or_default();
        self.values.push_back(value);
        value
    }
}
