//! Population lifecycle, as seen by the stimulus layer.
use log;

use crate::PopulationId;

/// Lifecycle phase of a population.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Phase {
    /// Stimuli can be bound and unbound.
    Configuring,
    /// The simulation has started; bindings are frozen.
    Running,
}

/// What the stimulus layer needs to know about a population.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PopulationInfo {
    /// Number of neurons in the population.
    pub neuron_count: usize,
    /// Whether the population is driven only by exogenous stimulation (no synaptic input).
    pub generator_eligible: bool,
    /// Current lifecycle phase.
    pub phase: Phase,
}

/// Lookup of populations owned by the enclosing simulator.
pub trait PopulationDirectory {
    /// Returns the population with the given id, or `None` if there is no such population.
    fn population(&self, id: PopulationId) -> Option<PopulationInfo>;
}

#[derive(Debug, PartialEq, Clone)]
struct PopulationEntry {
    name: String,
    neuron_count: usize,
    generator_eligible: bool,
}

/// A simple in-memory population directory with a single, network-wide phase.
#[derive(Debug, PartialEq, Clone)]
pub struct PopulationTable {
    populations: Vec<PopulationEntry>,
    phase: Phase,
}

impl Default for PopulationTable {
    fn default() -> Self {
        PopulationTable::new()
    }
}

impl PopulationTable {
    pub fn new() -> Self {
        PopulationTable {
            populations: vec![],
            phase: Phase::Configuring,
        }
    }

    /// Add a population and return its id.
    /// Ids are assigned in insertion order, starting at zero.
    pub fn add_population(&mut self, name: &str, neuron_count: usize, generator_eligible: bool) -> PopulationId {
        self.populations.push(PopulationEntry {
            name: name.to_string(),
            neuron_count,
            generator_eligible,
        });
        self.populations.len() - 1
    }

    /// Returns the id of the population with the given name.
    pub fn find(&self, name: &str) -> Option<PopulationId> {
        self.populations.iter().position(|p| p.name == name)
    }

    /// Returns the name of a population.
    pub fn name(&self, id: PopulationId) -> Option<&str> {
        self.populations.get(id).map(|p| p.name.as_str())
    }

    /// Returns the number of populations.
    pub fn num_populations(&self) -> usize {
        self.populations.len()
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Switch from configuration to running. The transition is irreversible.
    pub fn start_running(&mut self) {
        if self.phase == Phase::Configuring {
            log::info!("Starting run with {} populations", self.populations.len());
        }
        self.phase = Phase::Running;
    }
}

impl PopulationDirectory for PopulationTable {
    fn population(&self, id: PopulationId) -> Option<PopulationInfo> {
        self.populations.get(id).map(|p| PopulationInfo {
            neuron_count: p.neuron_count,
            generator_eligible: p.generator_eligible,
            phase: self.phase,
        })
    }
}
