//! Error module for the Rusty Stim library.
use thiserror::Error;

use crate::{PopulationId, SpikeTime};

/// Error types for the library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StimError {
    /// Error for a vector or profile whose length does not match the population size.
    #[error("Dimension mismatch: expected {expected} entries, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// Error for out of bounds access to a single neuron.
    #[error("Index out of range: {index} is not below {len}")]
    IndexOutOfRange { index: usize, len: usize },
    /// Error for a binding attempted outside the configuration phase.
    #[error("Invalid phase: population {population} is no longer being configured")]
    InvalidPhase { population: PopulationId },
    /// Error for a binding on a population that receives synaptic input, or a current injection on a generator population.
    #[error("Ineligible population {population}: {reason}")]
    IneligiblePopulation {
        population: PopulationId,
        reason: String,
    },
    /// Error for a non-monotonic or otherwise malformed schedule returned by a generator.
    #[error("Invalid generator output for neuron {neuron} of population {population}: {reason}")]
    InvalidGeneratorOutput {
        population: PopulationId,
        neuron: usize,
        reason: String,
    },
    /// Error for a malformed, truncated or out-of-order spike recording.
    #[error("Corrupt recording: {0}")]
    CorruptRecording(String),
    /// Error for a malformed recording detected while replaying it into a population.
    #[error("Corrupt recording replayed into neuron {neuron} of population {population}: {reason}")]
    CorruptReplay {
        population: PopulationId,
        neuron: usize,
        reason: String,
    },
    /// Error for a generator or rate profile instance that is already bound to another population.
    #[error("Stimulus already bound to population {bound_to}, cannot bind it to population {population}")]
    GeneratorAlreadyBound {
        population: PopulationId,
        bound_to: PopulationId,
    },
    /// Error for a population unknown to the directory.
    #[error("Unknown population {0}")]
    UnknownPopulation(PopulationId),
    /// Error for invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameter(String),
    /// Error for I/O operations.
    #[error("I/O error: {0}")]
    Io(String),
    /// Error for a step requested after the run was aborted by a fatal error.
    #[error("Run aborted at t={time} ms: {cause}")]
    RunAborted { time: SpikeTime, cause: String },
}

impl From<std::io::Error> for StimError {
    fn from(e: std::io::Error) -> Self {
        StimError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StimError {
    fn from(e: serde_json::Error) -> Self {
        StimError::InvalidParameter(format!("Invalid configuration: {}", e))
    }
}

impl StimError {
    /// Whether the error is fatal to a running simulation (as opposed to a rejected configuration call).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StimError::InvalidGeneratorOutput { .. }
                | StimError::CorruptRecording(_)
                | StimError::CorruptReplay { .. }
                | StimError::RunAborted { .. }
        )
    }
}

/// Result type for stimulus operations.
pub type Result<T> = std::result::Result<T, StimError>;
