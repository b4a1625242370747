//! This crate provides the stimulus side of a spiking neural network simulator: it produces,
//! schedules and delivers exogenous spikes and injected currents, one millisecond at a time.
//!
//! # Binding Stimuli
//!
//! ```rust
//! use rusty_stim::binding::Stimulus;
//! use rusty_stim::config::StimulusConfig;
//! use rusty_stim::generator::{GeneratorHandle, PeriodicGenerator};
//! use rusty_stim::population::PopulationTable;
//! use rusty_stim::rate::{RateHandle, RateProfile, Residency};
//! use rusty_stim::scheduler::InjectionScheduler;
//!
//! let mut populations = PopulationTable::new();
//! let clock = populations.add_population("clock", 4, true);
//! let noise = populations.add_population("noise", 100, true);
//!
//! let mut scheduler = InjectionScheduler::new(StimulusConfig::default()).unwrap();
//!
//! // A 10 Hz periodic generator: spikes at 100, 200, 300, ... ms
//! let periodic = GeneratorHandle::new(PeriodicGenerator::new(10.0, false).unwrap());
//! scheduler.bind(clock, Stimulus::from(periodic), &populations).unwrap();
//!
//! // Poisson noise at 20 Hz for every neuron
//! let mut profile = RateProfile::new(100, Residency::Host);
//! profile.set_rates(20.0).unwrap();
//! scheduler.bind(noise, Stimulus::from(RateHandle::new(profile)), &populations).unwrap();
//! ```
//!
//! # Running
//!
//! ```rust
//! use rusty_stim::binding::Stimulus;
//! use rusty_stim::config::StimulusConfig;
//! use rusty_stim::generator::{GeneratorHandle, SequenceGenerator};
//! use rusty_stim::population::PopulationTable;
//! use rusty_stim::recorder::SpikeRecorder;
//! use rusty_stim::scheduler::InjectionScheduler;
//!
//! let mut populations = PopulationTable::new();
//! let input = populations.add_population("input", 2, true);
//! let mut scheduler = InjectionScheduler::new(StimulusConfig::default()).unwrap();
//!
//! let sequence = GeneratorHandle::new(SequenceGenerator::new(vec![2, 14]).unwrap());
//! scheduler.bind(input, Stimulus::from(sequence), &populations).unwrap();
//! populations.start_running();
//!
//! let mut recorder = SpikeRecorder::new();
//! for t in 0..20 {
//!     scheduler.advance(t, &populations, &mut recorder).unwrap();
//! }
//! assert_eq!(recorder.spikes().len(), 4);
//! ```

pub mod backend;
pub mod binding;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod current;
pub mod error;
pub mod generator;
pub mod population;
pub mod rate;
pub mod recorder;
pub mod scheduler;

/// Integral simulation time in milliseconds.
pub type SpikeTime = u32;
/// Identifier of a population (group) of neurons.
pub type PopulationId = usize;

/// The duration of one simulation step, in milliseconds.
pub const TIMESTEP_MS: SpikeTime = 1;
/// The maximum firing rate (Hz) that fits one spike per timestep.
pub const MAX_RATE_HZ: f64 = 1000.0 / TIMESTEP_MS as f64;
