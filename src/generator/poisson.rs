//! Poisson stimulation driven by a rate profile.
//!
//! Each neuron fires at step `t` with probability `rate * dt / 1000`. Draws are counter based:
//! the uniform variate of (neuron, step) comes from a ChaCha8 stream keyed by the seed and the
//! population, at stream `neuron` and word position `2 * step`. Any backend, thread count or
//! visiting order therefore yields the same spikes.
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{PopulationId, SpikeTime, TIMESTEP_MS};

/// Mixes the population into the seed, so populations sharing a seed are uncorrelated.
const POPULATION_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// The implicit generator of a population bound to a rate profile.
#[derive(Debug, Clone)]
pub struct PoissonDriver {
    base: ChaCha8Rng,
    refractory_ms: SpikeTime,
}

impl PoissonDriver {
    pub fn new(seed: u64, population: PopulationId, refractory_ms: SpikeTime) -> Self {
        let key = seed ^ (population as u64 + 1).wrapping_mul(POPULATION_MIX);
        PoissonDriver {
            base: ChaCha8Rng::seed_from_u64(key),
            refractory_ms,
        }
    }

    /// Returns the absolute refractory period (ms).
    pub fn refractory_ms(&self) -> SpikeTime {
        self.refractory_ms
    }

    /// Probability to fire within one timestep at the given rate (Hz).
    pub fn spike_probability(rate: f64) -> f64 {
        (rate * TIMESTEP_MS as f64 / 1000.0).clamp(0.0, 1.0)
    }

    /// Uniform variate in [0, 1) attached to a neuron and a step.
    pub fn draw(&self, neuron: usize, step: SpikeTime) -> f64 {
        let mut rng = self.base.clone();
        rng.set_stream(neuron as u64);
        rng.set_word_pos(2 * step as u128);
        rng.gen::<f64>()
    }

    /// Whether a neuron fires at `step`, given its rate and its last spike.
    pub fn fires(&self, neuron: usize, step: SpikeTime, rate: f64, last: Option<SpikeTime>) -> bool {
        if let Some(last) = last {
            if step.saturating_sub(last) <= self.refractory_ms {
                return false;
            }
        }
        let p = PoissonDriver::spike_probability(rate);
        p > 0.0 && self.draw(neuron, step) < p
    }
}
