//! Spike generators: the polymorphic source of per-neuron spike times.
//!
//! A generator answers one question: given the time of the last spike scheduled for a neuron,
//! when is the next one? The scheduler asks again each time a spike fires, so sparse generators
//! are not queried every millisecond.
//!
//! - [`PeriodicGenerator`]: regular spikes at a fixed rate.
//! - [`SequenceGenerator`]: a fixed list of times shared by every neuron.
//! - [`FileReplayGenerator`]: per-neuron times streamed from a spike recording.
//! - [`CustomGenerator`]: a caller-supplied closure.
//!
//! Poisson stimulation is not a generator: binding a [`crate::rate::RateProfile`] drives the
//! population with independent per-step draws (see [`poisson`]).
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::{PopulationId, SpikeTime};

pub mod custom;
pub mod periodic;
pub mod poisson;
pub mod replay;
pub mod sequence;

pub use custom::CustomGenerator;
pub use periodic::PeriodicGenerator;
pub use replay::FileReplayGenerator;
pub use sequence::SequenceGenerator;

/// The answer of a generator for one neuron.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NextSpike {
    /// The neuron spikes at the given time.
    At(SpikeTime),
    /// No spike before the given time; the generator must be asked again then.
    Defer(SpikeTime),
    /// The neuron stays silent for the rest of the run.
    Silent,
}

/// Capability shared by all spike generators.
pub trait Generator: Send {
    /// Returns the next spike time of a neuron.
    ///
    /// `last_scheduled` is the time of the last spike returned for this neuron (if any).
    /// A returned [`NextSpike::At`] time must be strictly greater than `last_scheduled` and not earlier than `current_time`.
    fn next_spike_time(
        &mut self,
        population: PopulationId,
        neuron: usize,
        current_time: SpikeTime,
        last_scheduled: Option<SpikeTime>,
    ) -> Result<NextSpike>;

    /// The number of neurons the generator is built for, if it depends on it.
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// A short name for logging.
    fn name(&self) -> &str;
}

/// A shared handle on a generator.
///
/// The caller keeps ownership through its own clone; the binding table uses the handle identity
/// to make sure a generator is bound to at most one population at a time.
#[derive(Clone)]
pub struct GeneratorHandle(Arc<Mutex<dyn Generator>>);

impl GeneratorHandle {
    pub fn new<G: Generator + 'static>(generator: G) -> Self {
        GeneratorHandle(Arc::new(Mutex::new(generator)))
    }

    /// Lock the generator, blocking until it is available.
    /// Do not hold the guard across [`crate::scheduler::InjectionScheduler::advance`].
    pub fn lock(&self) -> MutexGuard<'_, dyn Generator> {
        self.0.lock()
    }

    /// Lock the generator if nobody else holds it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, dyn Generator>> {
        self.0.try_lock()
    }

    /// Whether both handles refer to the same generator.
    pub fn same_as(&self, other: &GeneratorHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for GeneratorHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.try_lock() {
            Some(generator) => write!(f, "GeneratorHandle({})", generator.name()),
            None => write!(f, "GeneratorHandle(<locked>)"),
        }
    }
}
