//! Capture of delivered spikes, for inspection and later replay.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::codec::{SpikeFileWriter, SpikeRecord};
use crate::error::{Result, StimError};
use crate::scheduler::{CurrentSink, SpikeSink};
use crate::{PopulationId, SpikeTime};

/// A spike of a neuron in a population.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct RecordedSpike {
    pub population: PopulationId,
    pub neuron: usize,
    pub time: SpikeTime,
}

impl RecordedSpike {
    pub fn new(population: PopulationId, neuron: usize, time: SpikeTime) -> Self {
        RecordedSpike {
            population,
            neuron,
            time,
        }
    }
}

/// An engine wrapper that records every enqueued spike before forwarding it.
///
/// Spikes are kept in delivery order, i.e., by non-decreasing time.
#[derive(Debug, Default, Clone)]
pub struct SpikeRecorder<E = ()> {
    inner: E,
    spikes: Vec<RecordedSpike>,
}

impl SpikeRecorder<()> {
    /// A recorder that forwards nothing.
    pub fn new() -> Self {
        SpikeRecorder::wrap(())
    }
}

impl<E> SpikeRecorder<E> {
    /// Record the spikes delivered to `inner`.
    pub fn wrap(inner: E) -> Self {
        SpikeRecorder {
            inner,
            spikes: vec![],
        }
    }

    /// Returns all recorded spikes.
    pub fn spikes(&self) -> &[RecordedSpike] {
        &self.spikes
    }

    /// Returns the recorded spikes of a population, as recording entries.
    /// The function returns an error if a neuron index does not fit a recording.
    pub fn population_spikes(&self, population: PopulationId) -> Result<Vec<SpikeRecord>> {
        self.spikes
            .iter()
            .filter(|spike| spike.population == population)
            .map(|spike| {
                let neuron = u32::try_from(spike.neuron).map_err(|_| {
                    StimError::InvalidParameter(format!("Neuron index {} does not fit a recording", spike.neuron))
                })?;
                Ok(SpikeRecord::new(neuron, spike.time))
            })
            .collect()
    }

    /// Returns the wrapped engine.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Consume the recorder and return the wrapped engine.
    pub fn into_inner(self) -> E {
        self.inner
    }

    /// Forget all recorded spikes.
    pub fn clear(&mut self) {
        self.spikes.clear();
    }

    /// Encode the spikes of a population as a recording and return the number of records written.
    pub fn write_population<W: Write>(&self, population: PopulationId, neuron_count: usize, writer: W) -> Result<u64> {
        let neuron_count = u32::try_from(neuron_count)
            .map_err(|_| StimError::InvalidParameter(format!("Too many neurons to record: {}", neuron_count)))?;
        let mut writer = SpikeFileWriter::new(writer, neuron_count)?;
        for record in self.population_spikes(population)? {
            writer.write(record)?;
        }
        let num_records = writer.num_records();
        writer.finish()?;
        log::info!("Recorded {} spikes of population {}", num_records, population);
        Ok(num_records)
    }

    /// Save the spikes of a population to a recording file.
    pub fn save_population<P: AsRef<Path>>(&self, population: PopulationId, neuron_count: usize, path: P) -> Result<u64> {
        let file = File::create(path)?;
        self.write_population(population, neuron_count, BufWriter::new(file))
    }
}

impl<E: SpikeSink> SpikeSink for SpikeRecorder<E> {
    fn enqueue_spike(&mut self, population: PopulationId, neuron: usize, time: SpikeTime) {
        self.spikes.push(RecordedSpike::new(population, neuron, time));
        self.inner.enqueue_spike(population, neuron, time);
    }
}

impl<E: CurrentSink> CurrentSink for SpikeRecorder<E> {
    fn add_current(&mut self, population: PopulationId, neuron: usize, value: f64) {
        self.inner.add_current(population, neuron, value);
    }
}
