//! Configuration of the stimulus layer.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Result, StimError};
use crate::SpikeTime;

/// Minimum number of neurons before the host backend switches to parallel iteration.
pub const MIN_PARALLEL_NEURONS: usize = 100;
/// Default read-ahead window of file replays, in milliseconds.
pub const DEFAULT_REPLAY_LOOKAHEAD: SpikeTime = 1000;

/// The execution backend used for the data-parallel parts of a step.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub enum BackendKind {
    /// Host memory, parallelized with rayon for large populations.
    #[default]
    Host,
    /// Device-mirrored buffers, processed in fixed-size work groups.
    Device,
}

/// Settings shared by the scheduler, its backend and the stochastic generators.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct StimulusConfig {
    /// Seed of the Poisson draws.
    pub seed: u64,
    /// Backend used for Poisson draws and current application.
    pub backend: BackendKind,
    /// Minimum population size to parallelize on the host.
    pub parallel_threshold: usize,
    /// Read-ahead window (ms) of file replays.
    pub replay_lookahead_ms: SpikeTime,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        StimulusConfig {
            seed: 42,
            backend: BackendKind::Host,
            parallel_threshold: MIN_PARALLEL_NEURONS,
            replay_lookahead_ms: DEFAULT_REPLAY_LOOKAHEAD,
        }
    }
}

impl StimulusConfig {
    /// Returns an error if the configuration cannot be used by a scheduler.
    pub fn validate(&self) -> Result<()> {
        if self.replay_lookahead_ms == 0 {
            return Err(StimError::InvalidParameter(
                "The replay look-ahead must be at least one timestep.".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: StimulusConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}
