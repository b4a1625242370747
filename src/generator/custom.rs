//! Spike generator backed by a caller-supplied function.
use crate::error::Result;
use crate::generator::{Generator, NextSpike};
use crate::{PopulationId, SpikeTime};

/// Wraps a closure `(population, neuron, current_time, last_scheduled) -> Option<time>`.
/// `None` means the neuron stays silent. The scheduler applies the same monotonicity
/// checks as for any other generator.
pub struct CustomGenerator<F> {
    name: String,
    next: F,
}

impl<F> CustomGenerator<F>
where
    F: FnMut(PopulationId, usize, SpikeTime, Option<SpikeTime>) -> Option<SpikeTime> + Send,
{
    pub fn new(name: &str, next: F) -> Self {
        CustomGenerator {
            name: name.to_string(),
            next,
        }
    }
}

impl<F> Generator for CustomGenerator<F>
where
    F: FnMut(PopulationId, usize, SpikeTime, Option<SpikeTime>) -> Option<SpikeTime> + Send,
{
    fn next_spike_time(
        &mut self,
        population: PopulationId,
        neuron: usize,
        current_time: SpikeTime,
        last_scheduled: Option<SpikeTime>,
    ) -> Result<NextSpike> {
        Ok(
            match (self.next)(population, neuron, current_time, last_scheduled) {
                Some(t) => NextSpike::At(t),
                None => NextSpike::Silent,
            },
        )
    }

    fn name(&self) -> &str {
        &self.name
    }
}
