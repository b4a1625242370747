//! # Injection Scheduler
//!
//! Once per simulated millisecond, the run loop calls [`InjectionScheduler::advance`], which
//! delivers the stimulation of every bound population to the external engine:
//!
//! 1. current injections are applied unchanged to each neuron of their population;
//! 2. generator bindings enqueue the spikes due at the current time, and the generator is asked
//!    for the following spike time right away (prefetch-on-fire);
//! 3. rate bindings draw one Poisson trial per neuron on the configured backend.
//!
//! A step is computed entirely before anything is handed to the engine, so a step that fails
//! delivers nothing. Run-time failures are latched: every later step returns [`StimError::RunAborted`].
use log;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::backend::{create_backend, ComputeBackend};
use crate::binding::{BindingTable, Stimulus};
use crate::buffer::Residency;
use crate::config::{BackendKind, StimulusConfig};
use crate::current::CurrentInjection;
use crate::error::{Result, StimError};
use crate::generator::poisson::PoissonDriver;
use crate::generator::{FileReplayGenerator, Generator, NextSpike};
use crate::population::PopulationDirectory;
use crate::recorder::RecordedSpike;
use crate::{PopulationId, SpikeTime};

/// Receives the spikes produced by the stimulus layer (the synaptic propagation engine).
pub trait SpikeSink {
    fn enqueue_spike(&mut self, population: PopulationId, neuron: usize, time: SpikeTime);
}

/// Receives the currents injected for the current step (the neuron state integrator).
/// Values are additive to any intrinsic current the integrator computes.
pub trait CurrentSink {
    fn add_current(&mut self, population: PopulationId, neuron: usize, value: f64);
}

impl SpikeSink for () {
    fn enqueue_spike(&mut self, _population: PopulationId, _neuron: usize, _time: SpikeTime) {}
}

impl CurrentSink for () {
    fn add_current(&mut self, _population: PopulationId, _neuron: usize, _value: f64) {}
}

/// Summary of a delivered step.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct StepReport {
    /// The simulation time of the step.
    pub time: SpikeTime,
    /// Number of spikes enqueued.
    pub spikes: usize,
    /// Number of populations that received a current.
    pub currents: usize,
}

/// Everything a step delivers, in delivery order.
#[derive(Debug, Default, PartialEq, Clone)]
struct StepOutput {
    currents: Vec<(PopulationId, Vec<f64>)>,
    spikes: Vec<RecordedSpike>,
}

/// What the scheduler knows about the next spike of one neuron.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Pending {
    /// The generator has not been asked yet.
    Unqueried,
    /// The next spike is due at this time.
    Spike(SpikeTime),
    /// The generator must be asked again at this time.
    Recheck(SpikeTime),
    Silent,
}

#[derive(Debug, Clone)]
struct NeuronSchedule {
    last: Option<SpikeTime>,
    pending: Pending,
}

impl NeuronSchedule {
    fn new() -> Self {
        NeuronSchedule {
            last: None,
            pending: Pending::Unqueried,
        }
    }
}

/// Run-time state of a bound population, reset whenever its binding changes.
#[derive(Debug, Clone)]
enum PopulationSchedule {
    Generator(Vec<NeuronSchedule>),
    Poisson {
        driver: PoissonDriver,
        last_spikes: Vec<Option<SpikeTime>>,
    },
}

impl PopulationSchedule {
    fn new(config: &StimulusConfig, population: PopulationId, stimulus: &Stimulus, neuron_count: usize) -> Self {
        match stimulus {
            Stimulus::Generator(_) => PopulationSchedule::Generator(vec![NeuronSchedule::new(); neuron_count]),
            Stimulus::Rates { refractory_ms, .. } => PopulationSchedule::Poisson {
                driver: PoissonDriver::new(config.seed, population, *refractory_ms),
                last_spikes: vec![None; neuron_count],
            },
        }
    }
}

/// Ties the binding table to the external engine, one timestep at a time.
pub struct InjectionScheduler {
    config: StimulusConfig,
    backend: Box<dyn ComputeBackend>,
    bindings: BindingTable,
    schedules: BTreeMap<PopulationId, PopulationSchedule>,
    last_time: Option<SpikeTime>,
    fault: Option<(SpikeTime, StimError)>,
}

impl InjectionScheduler {
    /// Create a scheduler with no bindings.
    /// The function returns an error if the configuration is invalid.
    pub fn new(config: StimulusConfig) -> Result<Self> {
        config.validate()?;
        let backend = create_backend(&config);
        Ok(InjectionScheduler {
            config,
            backend,
            bindings: BindingTable::new(),
            schedules: BTreeMap::new(),
            last_time: None,
            fault: None,
        })
    }

    /// Returns the configuration of the scheduler.
    pub fn config(&self) -> &StimulusConfig {
        &self.config
    }

    /// Returns the name of the compute backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Returns the binding table.
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Returns the time of the last delivered step.
    pub fn last_time(&self) -> Option<SpikeTime> {
        self.last_time
    }

    /// Returns the error that aborted the run, if any.
    pub fn fault(&self) -> Option<&StimError> {
        self.fault.as_ref().map(|(_, error)| error)
    }

    /// The buffer residency matching the configured backend.
    pub fn residency(&self) -> Residency {
        match self.config.backend {
            BackendKind::Host => Residency::Host,
            BackendKind::Device => Residency::Mirrored,
        }
    }

    /// Open a recording for replay, with the configured look-ahead window.
    pub fn open_replay<P: AsRef<Path>>(&self, path: P) -> Result<FileReplayGenerator<File>> {
        FileReplayGenerator::open(path, self.config.replay_lookahead_ms)
    }

    /// Bind a stimulus to a population, see [`BindingTable::bind`].
    pub fn bind<D: PopulationDirectory>(
        &mut self,
        population: PopulationId,
        stimulus: Stimulus,
        directory: &D,
    ) -> Result<Option<Stimulus>> {
        let previous = self.bindings.bind(population, stimulus, directory)?;
        self.schedules.remove(&population);
        Ok(previous)
    }

    /// Remove the binding of a population, see [`BindingTable::unbind`].
    pub fn unbind<D: PopulationDirectory>(&mut self, population: PopulationId, directory: &D) -> Result<Option<Stimulus>> {
        let removed = self.bindings.unbind(population, directory)?;
        self.schedules.remove(&population);
        Ok(removed)
    }

    /// Attach a current injection to a population, see [`BindingTable::set_current`].
    pub fn set_current<D: PopulationDirectory>(
        &mut self,
        population: PopulationId,
        injection: CurrentInjection,
        directory: &D,
    ) -> Result<Option<CurrentInjection>> {
        self.bindings.set_current(population, injection, directory)
    }

    /// Inject the same current into every neuron of a population.
    pub fn set_uniform_current<D: PopulationDirectory>(
        &mut self,
        population: PopulationId,
        current: f64,
        directory: &D,
    ) -> Result<Option<CurrentInjection>> {
        let info = directory
            .population(population)
            .ok_or(StimError::UnknownPopulation(population))?;
        let injection = CurrentInjection::uniform(info.neuron_count, current, self.residency())?;
        self.bindings.set_current(population, injection, directory)
    }

    /// Stop injecting current into a population.
    pub fn clear_current(&mut self, population: PopulationId) -> Option<CurrentInjection> {
        self.bindings.clear_current(population)
    }

    /// Drop every binding, injection and run-time state, e.g., at simulation teardown.
    pub fn teardown(&mut self) {
        log::info!("Tearing down {} stimulus records", self.bindings.num_records());
        self.bindings.clear();
        self.schedules.clear();
        self.last_time = None;
        self.fault = None;
    }

    /// Deliver the stimulation of the step at `time` to the engine.
    ///
    /// Times must be strictly increasing from one call to the next. The function returns an error,
    /// and delivers nothing, if a generator breaks its contract or a recording turns out corrupt;
    /// the run is then aborted and every later call fails with [`StimError::RunAborted`].
    pub fn advance<D, E>(&mut self, time: SpikeTime, directory: &D, engine: &mut E) -> Result<StepReport>
    where
        D: PopulationDirectory,
        E: SpikeSink + CurrentSink,
    {
        if let Some((aborted_at, cause)) = &self.fault {
            return Err(StimError::RunAborted {
                time: *aborted_at,
                cause: cause.to_string(),
            });
        }
        if let Some(last) = self.last_time {
            if time <= last {
                return Err(StimError::InvalidParameter(format!(
                    "Step time {} ms does not follow the last step at {} ms",
                    time, last
                )));
            }
        }

        let output = match self.step(time, directory) {
            Ok(output) => output,
            Err(error) => {
                log::error!("Aborting run at t={} ms: {}", time, error);
                self.fault = Some((time, error.clone()));
                return Err(error);
            }
        };
        self.last_time = Some(time);

        for (population, currents) in output.currents.iter() {
            for (neuron, &value) in currents.iter().enumerate() {
                engine.add_current(*population, neuron, value);
            }
        }
        for spike in output.spikes.iter() {
            engine.enqueue_spike(spike.population, spike.neuron, spike.time);
        }

        let report = StepReport {
            time,
            spikes: output.spikes.len(),
            currents: output.currents.len(),
        };
        log::trace!("Step {:?}", report);
        Ok(report)
    }

    /// Compute the output of a step without delivering it.
    fn step<D: PopulationDirectory>(&mut self, time: SpikeTime, directory: &D) -> Result<StepOutput> {
        let mut output = StepOutput::default();
        let backend = &self.backend;
        let schedules = &mut self.schedules;
        let config = &self.config;

        for (population, record) in self.bindings.records_mut() {
            if let Some(injection) = record.current_mut() {
                let currents = backend.currents(injection)?;
                output.currents.push((population, currents.to_vec()));
            }

            let (stimulus, neuron_count) = match record.bound() {
                Some(bound) => bound,
                None => continue,
            };
            let info = directory
                .population(population)
                .ok_or(StimError::UnknownPopulation(population))?;
            if info.neuron_count != neuron_count {
                return Err(StimError::DimensionMismatch {
                    expected: info.neuron_count,
                    found: neuron_count,
                });
            }

            let schedule = schedules
                .entry(population)
                .or_insert_with(|| PopulationSchedule::new(config, population, stimulus, neuron_count));
            match (stimulus, schedule) {
                (Stimulus::Generator(handle), PopulationSchedule::Generator(neurons)) => {
                    let mut generator = handle.lock();
                    for (neuron, schedule) in neurons.iter_mut().enumerate() {
                        if fire_due(&mut *generator, population, neuron, time, schedule)? {
                            output.spikes.push(RecordedSpike::new(population, neuron, time));
                        }
                    }
                }
                (Stimulus::Rates { profile, .. }, PopulationSchedule::Poisson { driver, last_spikes }) => {
                    let mut profile = profile.write();
                    let fired = backend.poisson_spikes(driver, &mut profile, last_spikes, time)?;
                    for neuron in fired {
                        last_spikes[neuron] = Some(time);
                        output.spikes.push(RecordedSpike::new(population, neuron, time));
                    }
                }
                _ => {
                    return Err(StimError::InvalidParameter(format!(
                        "Schedule of population {} does not match its binding",
                        population
                    )))
                }
            }
        }
        Ok(output)
    }
}

/// Whether a neuron fires at `time`, querying its generator as needed.
fn fire_due(
    generator: &mut dyn Generator,
    population: PopulationId,
    neuron: usize,
    time: SpikeTime,
    schedule: &mut NeuronSchedule,
) -> Result<bool> {
    loop {
        match schedule.pending {
            Pending::Unqueried => {
                schedule.pending = query(generator, population, neuron, time, schedule.last)?;
            }
            Pending::Recheck(t) if t <= time => {
                schedule.pending = query(generator, population, neuron, time, schedule.last)?;
            }
            Pending::Spike(t) if t <= time => {
                schedule.last = Some(t);
                schedule.pending = query(generator, population, neuron, time, schedule.last)?;
                return Ok(true);
            }
            _ => return Ok(false),
        }
    }
}

/// Ask a generator for the next spike of a neuron and validate the answer.
fn query(
    generator: &mut dyn Generator,
    population: PopulationId,
    neuron: usize,
    time: SpikeTime,
    last: Option<SpikeTime>,
) -> Result<Pending> {
    let invalid = |reason: String| StimError::InvalidGeneratorOutput {
        population,
        neuron,
        reason,
    };
    let next = match generator.next_spike_time(population, neuron, time, last) {
        Ok(next) => next,
        Err(StimError::CorruptRecording(reason)) => {
            return Err(StimError::CorruptReplay {
                population,
                neuron,
                reason,
            })
        }
        Err(error @ StimError::InvalidGeneratorOutput { .. }) => return Err(error),
        Err(error) => return Err(invalid(format!("{} failed: {}", generator.name(), error))),
    };
    match next {
        NextSpike::At(t) => {
            if let Some(last) = last.filter(|&last| t <= last) {
                return Err(invalid(format!(
                    "{} returned {} ms after a spike at {} ms",
                    generator.name(),
                    t,
                    last
                )));
            }
            if t < time {
                return Err(invalid(format!(
                    "{} returned {} ms, which is before t={} ms",
                    generator.name(),
                    t,
                    time
                )));
            }
            Ok(Pending::Spike(t))
        }
        NextSpike::Defer(t) => {
            if t <= time {
                return Err(invalid(format!(
                    "{} deferred to {} ms, which is not after t={} ms",
                    generator.name(),
                    t,
                    time
                )));
            }
            Ok(Pending::Recheck(t))
        }
        NextSpike::Silent => Ok(Pending::Silent),
    }
}
