//! Periodic spike generator.
use crate::error::{Result, StimError};
use crate::generator::{Generator, NextSpike};
use crate::{PopulationId, SpikeTime, MAX_RATE_HZ};

/// Spikes at every multiple of the inter-spike interval `1000 / rate` ms.
/// The same schedule applies to every neuron of the population.
#[derive(Debug, PartialEq, Clone)]
pub struct PeriodicGenerator {
    rate: f64,
    isi: f64,
    spike_at_zero: bool,
}

impl PeriodicGenerator {
    /// Create a periodic generator firing at `rate` Hz.
    /// If `spike_at_zero` is set, the first spike is at t=0, otherwise it is at t=ISI.
    /// The function returns an error if the rate is not in (0, 1000] Hz.
    pub fn new(rate: f64, spike_at_zero: bool) -> Result<Self> {
        if !(rate.is_finite() && rate > 0.0 && rate <= MAX_RATE_HZ) {
            return Err(StimError::InvalidParameter(format!(
                "The periodic rate must be in (0, {}] Hz, got {}",
                MAX_RATE_HZ, rate
            )));
        }
        Ok(PeriodicGenerator {
            rate,
            isi: 1000.0 / rate,
            spike_at_zero,
        })
    }

    /// Returns the rate of the generator (Hz).
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the inter-spike interval (ms).
    pub fn isi(&self) -> f64 {
        self.isi
    }

    /// Time of the k-th spike, k = 0 being the spike at zero.
    fn kth_spike(&self, k: u64) -> Option<SpikeTime> {
        let t = (k as f64 * self.isi).round();
        if t > SpikeTime::MAX as f64 {
            return None;
        }
        Some(t as SpikeTime)
    }
}

impl Generator for PeriodicGenerator {
    fn next_spike_time(
        &mut self,
        _population: PopulationId,
        _neuron: usize,
        current_time: SpikeTime,
        last_scheduled: Option<SpikeTime>,
    ) -> Result<NextSpike> {
        let first = if self.spike_at_zero { 0 } else { 1 };
        // Start a little before the candidate index, rounding may shift spikes by half a millisecond.
        let from = match last_scheduled {
            Some(last) => last.max(current_time) as f64,
            None => current_time as f64,
        };
        let mut k = ((from / self.isi).floor() as u64).saturating_sub(1).max(first);
        loop {
            match self.kth_spike(k) {
                Some(t) if t >= current_time && last_scheduled.map_or(true, |last| t > last) => {
                    return Ok(NextSpike::At(t))
                }
                Some(_) => k += 1,
                None => return Ok(NextSpike::Silent),
            }
        }
    }

    fn name(&self) -> &str {
        "periodic"
    }
}
