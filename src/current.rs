//! Per-neuron input currents held constant across timesteps.
use crate::buffer::{MirroredBuffer, Residency, Side};
use crate::error::{Result, StimError};

/// A current vector attached to a population.
/// It is applied unchanged at every timestep until it is overwritten or cleared.
#[derive(Debug, PartialEq, Clone)]
pub struct CurrentInjection {
    currents: MirroredBuffer,
}

impl CurrentInjection {
    /// Create an injection with one current per neuron.
    pub fn new(currents: Vec<f64>, residency: Residency) -> Result<Self> {
        if let Some(c) = currents.iter().find(|c| !c.is_finite()) {
            return Err(StimError::InvalidParameter(format!(
                "Injected currents must be finite, got {}",
                c
            )));
        }
        Ok(CurrentInjection {
            currents: MirroredBuffer::from_vec(currents, residency),
        })
    }

    /// Create an injection applying the same current to all neurons.
    pub fn uniform(num_neurons: usize, current: f64, residency: Residency) -> Result<Self> {
        CurrentInjection::new(vec![current; num_neurons], residency)
    }

    /// Returns the number of neurons receiving the current.
    pub fn num_neurons(&self) -> usize {
        self.currents.len()
    }

    pub fn residency(&self) -> Residency {
        self.currents.residency()
    }

    /// Returns the currents, as last written.
    pub fn currents(&self) -> &[f64] {
        self.currents.latest()
    }

    /// Whether every neuron receives zero current.
    pub fn is_zero(&self) -> bool {
        self.currents.latest().iter().all(|&c| c == 0.0)
    }

    pub(crate) fn consume(&mut self, side: Side) -> Result<&[f64]> {
        self.currents.consume(side)
    }
}
