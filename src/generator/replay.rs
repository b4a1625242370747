//! Spike generator streaming a recording back into a population.
use log;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::codec::{SpikeFileReader, SpikeRecord};
use crate::error::{Result, StimError};
use crate::generator::{Generator, NextSpike};
use crate::{PopulationId, SpikeTime};

/// Replays a recording at its original per-neuron times (shifted by an optional offset).
///
/// Records are read lazily: only those within `lookahead` ms of the current time are buffered,
/// in one queue per neuron. A neuron with nothing buffered is told to ask again when the next
/// unread record becomes due, so memory stays bounded for arbitrarily long recordings.
pub struct FileReplayGenerator<R: Read> {
    reader: SpikeFileReader<R>,
    queues: Vec<VecDeque<SpikeTime>>,
    /// First record not yet dispatched to a queue.
    pending: Option<SpikeRecord>,
    exhausted: bool,
    lookahead: SpikeTime,
    offset: SpikeTime,
}

impl FileReplayGenerator<File> {
    /// Open a recording file.
    pub fn open<P: AsRef<Path>>(path: P, lookahead: SpikeTime) -> Result<Self> {
        let file = File::open(path)?;
        FileReplayGenerator::from_reader(SpikeFileReader::new(file)?, lookahead)
    }
}

impl<R: Read> FileReplayGenerator<R> {
    /// Create a replay from a recording reader (with or without header).
    /// The function returns an error for a zero look-ahead.
    pub fn from_reader(reader: SpikeFileReader<R>, lookahead: SpikeTime) -> Result<Self> {
        if lookahead == 0 {
            return Err(StimError::InvalidParameter(
                "The replay look-ahead must be at least one timestep.".to_string(),
            ));
        }
        let num_neurons = reader.header().neuron_count as usize;
        Ok(FileReplayGenerator {
            reader,
            queues: vec![VecDeque::new(); num_neurons],
            pending: None,
            exhausted: false,
            lookahead,
            offset: 0,
        })
    }

    /// Shift every replayed spike by `offset` ms.
    pub fn with_offset(mut self, offset: SpikeTime) -> Self {
        self.offset = offset;
        self
    }

    /// Returns the number of spikes currently buffered.
    pub fn num_buffered(&self) -> usize {
        self.queues.iter().map(|queue| queue.len()).sum()
    }

    /// Next undispatched record, reading it if needed.
    fn next_pending(&mut self) -> Result<Option<SpikeRecord>> {
        if self.pending.is_none() && !self.exhausted {
            self.pending = self.reader.read_record()?;
            if self.pending.is_none() {
                log::debug!(
                    "Replay exhausted after {} records",
                    self.reader.num_records()
                );
                self.exhausted = true;
            }
        }
        Ok(self.pending)
    }

    /// Dispatch every record due before `horizon` to the neuron queues.
    /// Returns the (shifted) time of the first record left unread, if any.
    fn fill(&mut self, horizon: SpikeTime) -> Result<Option<SpikeTime>> {
        while let Some(record) = self.next_pending()? {
            let time = record.time.saturating_add(self.offset);
            if time > horizon {
                return Ok(Some(time));
            }
            self.queues[record.neuron as usize].push_back(time);
            self.pending = None;
        }
        Ok(None)
    }
}

impl<R: Read + Send> Generator for FileReplayGenerator<R> {
    fn next_spike_time(
        &mut self,
        _population: PopulationId,
        neuron: usize,
        current_time: SpikeTime,
        last_scheduled: Option<SpikeTime>,
    ) -> Result<NextSpike> {
        if neuron >= self.queues.len() {
            return Err(StimError::IndexOutOfRange {
                index: neuron,
                len: self.queues.len(),
            });
        }
        let frontier = self.fill(current_time.saturating_add(self.lookahead))?;

        let queue = &mut self.queues[neuron];
        // Drop duplicates within a step and spikes that are already in the past
        while let Some(&t) = queue.front() {
            if t < current_time || last_scheduled.map_or(false, |last| t <= last) {
                queue.pop_front();
            } else {
                break;
            }
        }
        match (queue.pop_front(), frontier) {
            (Some(t), _) => Ok(NextSpike::At(t)),
            (None, Some(t)) => Ok(NextSpike::Defer(t)),
            (None, None) => Ok(NextSpike::Silent),
        }
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.queues.len())
    }

    fn name(&self) -> &str {
        "file-replay"
    }
}
