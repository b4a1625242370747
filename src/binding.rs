//! The per-population stimulus state: at most one spike-producing binding, or a current injection.
use log;
use std::collections::BTreeMap;

use crate::current::CurrentInjection;
use crate::error::{Result, StimError};
use crate::generator::GeneratorHandle;
use crate::population::{Phase, PopulationDirectory, PopulationInfo};
use crate::rate::RateHandle;
use crate::{PopulationId, SpikeTime};

/// Something that produces spikes for a population.
#[derive(Debug, Clone)]
pub enum Stimulus {
    /// A spike generator queried for per-neuron spike times.
    Generator(GeneratorHandle),
    /// A rate profile driving Poisson spikes, with an optional absolute refractory period (ms).
    Rates {
        profile: RateHandle,
        refractory_ms: SpikeTime,
    },
}

impl From<GeneratorHandle> for Stimulus {
    fn from(generator: GeneratorHandle) -> Self {
        Stimulus::Generator(generator)
    }
}

impl From<RateHandle> for Stimulus {
    fn from(profile: RateHandle) -> Self {
        Stimulus::Rates {
            profile,
            refractory_ms: 0,
        }
    }
}

impl Stimulus {
    /// The number of neurons the stimulus is built for, if it depends on it.
    /// The function returns an error if the generator is currently locked by its owner.
    pub fn dimension(&self) -> Result<Option<usize>> {
        match self {
            Stimulus::Generator(generator) => generator
                .try_lock()
                .map(|generator| generator.dimension())
                .ok_or_else(|| {
                    StimError::InvalidParameter("The generator is locked and cannot be bound.".to_string())
                }),
            Stimulus::Rates { profile, .. } => Ok(Some(profile.read().num_neurons())),
        }
    }

    /// Whether both stimuli wrap the same generator or profile instance.
    pub fn same_as(&self, other: &Stimulus) -> bool {
        match (self, other) {
            (Stimulus::Generator(g1), Stimulus::Generator(g2)) => g1.same_as(g2),
            (Stimulus::Rates { profile: p1, .. }, Stimulus::Rates { profile: p2, .. }) => {
                p1.same_as(p2)
            }
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            Stimulus::Generator(generator) => match generator.try_lock() {
                Some(generator) => format!("{} generator", generator.name()),
                None => "locked generator".to_string(),
            },
            Stimulus::Rates { refractory_ms, .. } => {
                format!("Poisson rates (refractory {} ms)", refractory_ms)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    stimulus: Stimulus,
    neuron_count: usize,
}

/// The stimulus state of one population.
/// It persists across runs until explicitly replaced or cleared.
#[derive(Debug, Default)]
pub struct StimulusRecord {
    binding: Option<Binding>,
    current: Option<CurrentInjection>,
}

impl StimulusRecord {
    pub fn binding(&self) -> Option<&Stimulus> {
        self.binding.as_ref().map(|binding| &binding.stimulus)
    }

    /// The bound stimulus with the size of the population it drives.
    pub(crate) fn bound(&self) -> Option<(&Stimulus, usize)> {
        self.binding
            .as_ref()
            .map(|binding| (&binding.stimulus, binding.neuron_count))
    }

    pub fn current(&self) -> Option<&CurrentInjection> {
        self.current.as_ref()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut CurrentInjection> {
        self.current.as_mut()
    }

    fn is_empty(&self) -> bool {
        self.binding.is_none() && self.current.is_none()
    }
}

/// Process-wide map from population to its stimulus record.
#[derive(Debug, Default)]
pub struct BindingTable {
    records: BTreeMap<PopulationId, StimulusRecord>,
}

impl BindingTable {
    pub fn new() -> Self {
        BindingTable::default()
    }

    /// Bind a stimulus to a population and return the stimulus it replaces, if any.
    ///
    /// The function returns an error, and leaves the table untouched, if the population is unknown,
    /// not in its configuration phase, not generator-eligible, if the stimulus dimension differs
    /// from the population size, or if the stimulus is already bound to another population.
    /// A generator whose lock is held elsewhere cannot be bound either.
    pub fn bind<D: PopulationDirectory>(
        &mut self,
        population: PopulationId,
        stimulus: Stimulus,
        directory: &D,
    ) -> Result<Option<Stimulus>> {
        let info = configurable(population, directory)?;
        if !info.generator_eligible {
            log::warn!("Refusing to bind a stimulus to population {}: it receives synaptic input", population);
            return Err(StimError::IneligiblePopulation {
                population,
                reason: "the population receives synaptic input".to_string(),
            });
        }
        if let Some(dimension) = stimulus.dimension()? {
            if dimension != info.neuron_count {
                return Err(StimError::DimensionMismatch {
                    expected: info.neuron_count,
                    found: dimension,
                });
            }
        }
        let owner = self.records.iter().find_map(|(&id, record)| match &record.binding {
            Some(bound) if id != population && bound.stimulus.same_as(&stimulus) => Some(id),
            _ => None,
        });
        if let Some(bound_to) = owner {
            return Err(StimError::GeneratorAlreadyBound {
                population,
                bound_to,
            });
        }

        log::info!("Binding {} to population {}", stimulus.describe(), population);
        let record = self.records.entry(population).or_default();
        let previous = record.binding.replace(Binding {
            stimulus,
            neuron_count: info.neuron_count,
        });
        Ok(previous.map(|binding| binding.stimulus))
    }

    /// Remove the binding of a population, which then produces no spikes.
    /// Returns the removed stimulus, if any.
    pub fn unbind<D: PopulationDirectory>(
        &mut self,
        population: PopulationId,
        directory: &D,
    ) -> Result<Option<Stimulus>> {
        configurable(population, directory)?;
        let removed = self
            .records
            .get_mut(&population)
            .and_then(|record| record.binding.take())
            .map(|binding| binding.stimulus);
        if removed.is_some() {
            log::info!("Unbinding population {}", population);
        }
        self.prune(population);
        Ok(removed)
    }

    /// Attach a current injection to a population and return the injection it replaces, if any.
    /// Currents can be changed in any phase, but only on populations that are not generator-eligible.
    pub fn set_current<D: PopulationDirectory>(
        &mut self,
        population: PopulationId,
        injection: CurrentInjection,
        directory: &D,
    ) -> Result<Option<CurrentInjection>> {
        let info = directory
            .population(population)
            .ok_or(StimError::UnknownPopulation(population))?;
        if info.generator_eligible {
            return Err(StimError::IneligiblePopulation {
                population,
                reason: "currents cannot be injected into a generator population".to_string(),
            });
        }
        if injection.num_neurons() != info.neuron_count {
            return Err(StimError::DimensionMismatch {
                expected: info.neuron_count,
                found: injection.num_neurons(),
            });
        }
        log::debug!("Setting current injection of population {}", population);
        let record = self.records.entry(population).or_default();
        Ok(record.current.replace(injection))
    }

    /// Remove the current injection of a population.
    pub fn clear_current(&mut self, population: PopulationId) -> Option<CurrentInjection> {
        let removed = self
            .records
            .get_mut(&population)
            .and_then(|record| record.current.take());
        self.prune(population);
        removed
    }

    /// Returns the stimulus bound to a population.
    pub fn binding(&self, population: PopulationId) -> Option<&Stimulus> {
        self.records.get(&population).and_then(|record| record.binding())
    }

    /// Returns the current injected into a population.
    pub fn current(&self, population: PopulationId) -> Option<&CurrentInjection> {
        self.records.get(&population).and_then(|record| record.current())
    }

    /// Returns the number of populations with a stimulus.
    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    /// Iterate over the stimulus records, in ascending population order.
    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = (PopulationId, &mut StimulusRecord)> + '_ {
        self.records.iter_mut().map(|(&id, record)| (id, record))
    }

    /// Drop every binding and injection, e.g., at simulation teardown.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn prune(&mut self, population: PopulationId) {
        if self.records.get(&population).map_or(false, |record| record.is_empty()) {
            self.records.remove(&population);
        }
    }
}

/// Returns the population info if its bindings may still change.
fn configurable<D: PopulationDirectory>(population: PopulationId, directory: &D) -> Result<PopulationInfo> {
    let info = directory
        .population(population)
        .ok_or(StimError::UnknownPopulation(population))?;
    if info.phase != Phase::Configuring {
        log::warn!("Population {} is running, its binding cannot change", population);
        return Err(StimError::InvalidPhase { population });
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Residency;
    use crate::generator::{FileReplayGenerator, PeriodicGenerator, SequenceGenerator};
    use crate::codec::{encode, SpikeFileReader, SpikeRecord};
    use crate::population::PopulationTable;
    use crate::rate::RateProfile;
    use std::io::Cursor;

    fn populations() -> (PopulationTable, PopulationId, PopulationId, PopulationId) {
        let mut table = PopulationTable::new();
        let small = table.add_population("small", 5, true);
        let large = table.add_population("large", 10, true);
        let excitatory = table.add_population("excitatory", 10, false);
        (table, small, large, excitatory)
    }

    fn rates(num_neurons: usize) -> Stimulus {
        Stimulus::from(RateHandle::new(RateProfile::new(num_neurons, Residency::Host)))
    }

    #[test]
    fn test_rate_dimension() {
        let (table, small, large, _) = populations();
        let mut bindings = BindingTable::new();
        assert!(matches!(
            bindings.bind(large, rates(5), &table),
            Err(StimError::DimensionMismatch { expected: 10, found: 5 })
        ));
        assert!(bindings.binding(large).is_none());
        assert!(bindings.bind(small, rates(5), &table).unwrap().is_none());
        assert!(bindings.binding(small).is_some());
    }

    #[test]
    fn test_replay_dimension() {
        let (table, small, large, _) = populations();
        let bytes = encode(&[SpikeRecord::new(0, 1)], 5).unwrap();
        let replay = || {
            let reader = SpikeFileReader::new(Cursor::new(bytes.clone())).unwrap();
            GeneratorHandle::new(FileReplayGenerator::from_reader(reader, 10).unwrap())
        };
        let mut bindings = BindingTable::new();
        assert!(matches!(
            bindings.bind(large, Stimulus::from(replay()), &table),
            Err(StimError::DimensionMismatch { expected: 10, found: 5 })
        ));
        assert!(bindings.bind(small, Stimulus::from(replay()), &table).is_ok());
    }

    #[test]
    fn test_bind_locked_generator() {
        let (table, small, _, _) = populations();
        let mut bindings = BindingTable::new();
        let sequence = GeneratorHandle::new(SequenceGenerator::new(vec![1, 2]).unwrap());
        let guard = sequence.lock();
        assert!(matches!(
            bindings.bind(small, Stimulus::from(sequence.clone()), &table),
            Err(StimError::InvalidParameter(_))
        ));
        assert!(bindings.binding(small).is_none());
        drop(guard);
        assert!(bindings.bind(small, Stimulus::from(sequence), &table).is_ok());
    }

    #[test]
    fn test_ineligible_population() {
        let (table, _, _, excitatory) = populations();
        let mut bindings = BindingTable::new();
        assert!(matches!(
            bindings.bind(excitatory, rates(10), &table),
            Err(StimError::IneligiblePopulation { .. })
        ));
        assert!(matches!(
            bindings.bind(7, rates(10), &table),
            Err(StimError::UnknownPopulation(7))
        ));
    }

    #[test]
    fn test_replace_binding() {
        let (table, _, large, _) = populations();
        let mut bindings = BindingTable::new();
        let periodic = GeneratorHandle::new(PeriodicGenerator::new(10.0, false).unwrap());
        let sequence = GeneratorHandle::new(SequenceGenerator::new(vec![1, 2]).unwrap());
        bindings.bind(large, Stimulus::from(periodic.clone()), &table).unwrap();
        let previous = bindings.bind(large, Stimulus::from(sequence.clone()), &table).unwrap();
        assert!(previous.unwrap().same_as(&Stimulus::from(periodic)));
        assert!(bindings.binding(large).unwrap().same_as(&Stimulus::from(sequence)));
    }

    #[test]
    fn test_exclusive_binding() {
        let (table, small, large, _) = populations();
        let mut bindings = BindingTable::new();
        let sequence = GeneratorHandle::new(SequenceGenerator::new(vec![1, 2]).unwrap());
        bindings.bind(small, Stimulus::from(sequence.clone()), &table).unwrap();
        assert_eq!(
            bindings.bind(large, Stimulus::from(sequence.clone()), &table).unwrap_err(),
            StimError::GeneratorAlreadyBound {
                population: large,
                bound_to: small
            }
        );
        // Rebinding to the same population is a plain replacement
        assert!(bindings.bind(small, Stimulus::from(sequence.clone()), &table).is_ok());
        // Once released, the generator can move
        bindings.unbind(small, &table).unwrap();
        assert!(bindings.bind(large, Stimulus::from(sequence), &table).is_ok());
    }

    #[test]
    fn test_bind_after_running() {
        let (mut table, _, large, _) = populations();
        let mut bindings = BindingTable::new();
        let periodic = GeneratorHandle::new(PeriodicGenerator::new(10.0, false).unwrap());
        bindings.bind(large, Stimulus::from(periodic.clone()), &table).unwrap();
        table.start_running();

        assert_eq!(
            bindings.bind(large, rates(10), &table).unwrap_err(),
            StimError::InvalidPhase { population: large }
        );
        assert_eq!(
            bindings.unbind(large, &table).unwrap_err(),
            StimError::InvalidPhase { population: large }
        );
        assert!(bindings.binding(large).unwrap().same_as(&Stimulus::from(periodic)));
    }

    #[test]
    fn test_current_injection() {
        let (mut table, small, _, excitatory) = populations();
        let mut bindings = BindingTable::new();
        let injection = CurrentInjection::uniform(10, 1.5, Residency::Host).unwrap();
        assert!(matches!(
            bindings.set_current(small, injection.clone(), &table),
            Err(StimError::IneligiblePopulation { .. })
        ));
        assert!(matches!(
            bindings.set_current(
                excitatory,
                CurrentInjection::uniform(3, 1.5, Residency::Host).unwrap(),
                &table
            ),
            Err(StimError::DimensionMismatch { expected: 10, found: 3 })
        ));
        // Currents may change while running
        table.start_running();
        assert!(bindings.set_current(excitatory, injection, &table).unwrap().is_none());
        assert_eq!(bindings.current(excitatory).unwrap().currents(), &[1.5; 10]);
        assert!(bindings.clear_current(excitatory).is_some());
        assert_eq!(bindings.num_records(), 0);
    }
}
