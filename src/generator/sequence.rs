//! Spike generator replaying a fixed list of times.
use itertools::Itertools;

use crate::error::{Result, StimError};
use crate::generator::{Generator, NextSpike};
use crate::{PopulationId, SpikeTime};

/// Spikes at a fixed, strictly ascending list of times, identical for every neuron.
/// Once the list is exhausted, the neurons stay silent.
///
/// The list is shared by the whole population, so its length is unrelated to the number of
/// neurons: a sequence has no neuron dimension and binds to a population of any size. This
/// differs from a rate profile, whose length must equal the population size.
#[derive(Debug, PartialEq, Clone)]
pub struct SequenceGenerator {
    times: Vec<SpikeTime>,
}

impl SequenceGenerator {
    /// Create a sequence generator.
    /// The function returns an error if the times are not strictly ascending.
    pub fn new(times: Vec<SpikeTime>) -> Result<Self> {
        if let Some((t1, t2)) = times.iter().tuple_windows().find(|(t1, t2)| t1 >= t2) {
            return Err(StimError::InvalidParameter(format!(
                "Spike times must be strictly ascending, got {} before {}",
                t1, t2
            )));
        }
        Ok(SequenceGenerator { times })
    }

    /// Returns the spike times of the sequence.
    pub fn times(&self) -> &[SpikeTime] {
        &self.times[..]
    }
}

impl Generator for SequenceGenerator {
    /// The cursor of each neuron is the position right after its last scheduled spike,
    /// so the neurons consume the shared list independently.
    fn next_spike_time(
        &mut self,
        _population: PopulationId,
        _neuron: usize,
        current_time: SpikeTime,
        last_scheduled: Option<SpikeTime>,
    ) -> Result<NextSpike> {
        let cursor = match last_scheduled {
            Some(last) => self.times.partition_point(|&t| t <= last),
            None => 0,
        };
        let cursor = cursor + self.times[cursor..].partition_point(|&t| t < current_time);
        match self.times.get(cursor) {
            Some(&t) => Ok(NextSpike::At(t)),
            None => Ok(NextSpike::Silent),
        }
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str {
        "sequence"
    }
}
