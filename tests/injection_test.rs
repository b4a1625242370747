use std::collections::HashMap;
use std::io::Cursor;

use rusty_stim::binding::Stimulus;
use rusty_stim::codec::{decode, encode, SpikeFileReader, SpikeRecord};
use rusty_stim::config::{BackendKind, StimulusConfig};
use rusty_stim::error::StimError;
use rusty_stim::generator::{
    CustomGenerator, FileReplayGenerator, GeneratorHandle, PeriodicGenerator, SequenceGenerator,
};
use rusty_stim::population::PopulationTable;
use rusty_stim::rate::{RateHandle, RateProfile, Residency};
use rusty_stim::recorder::{RecordedSpike, SpikeRecorder};
use rusty_stim::scheduler::{CurrentSink, InjectionScheduler, SpikeSink};
use rusty_stim::{PopulationId, SpikeTime};
use tempfile::NamedTempFile;

/// A minimal integrator: sums the currents it receives at each step.
#[derive(Debug, Default)]
struct Integrator {
    step_currents: HashMap<(PopulationId, usize), f64>,
}

impl SpikeSink for Integrator {
    fn enqueue_spike(&mut self, _population: PopulationId, _neuron: usize, _time: SpikeTime) {}
}

impl CurrentSink for Integrator {
    fn add_current(&mut self, population: PopulationId, neuron: usize, value: f64) {
        *self.step_currents.entry((population, neuron)).or_insert(0.0) += value;
    }
}

fn run(
    scheduler: &mut InjectionScheduler,
    populations: &PopulationTable,
    times: std::ops::Range<SpikeTime>,
) -> Vec<RecordedSpike> {
    let mut recorder = SpikeRecorder::new();
    for t in times {
        scheduler.advance(t, populations, &mut recorder).unwrap();
    }
    recorder.spikes().to_vec()
}

fn neuron_times(spikes: &[RecordedSpike], neuron: usize) -> Vec<SpikeTime> {
    spikes
        .iter()
        .filter(|spike| spike.neuron == neuron)
        .map(|spike| spike.time)
        .collect()
}

#[test]
fn test_periodic_10hz() {
    let mut populations = PopulationTable::new();
    let input = populations.add_population("input", 3, true);
    let mut scheduler = InjectionScheduler::new(StimulusConfig::default()).unwrap();
    let periodic = GeneratorHandle::new(PeriodicGenerator::new(10.0, false).unwrap());
    scheduler.bind(input, Stimulus::from(periodic), &populations).unwrap();
    populations.start_running();

    let spikes = run(&mut scheduler, &populations, 0..250);
    for neuron in 0..3 {
        assert_eq!(neuron_times(&spikes, neuron), vec![100, 200]);
    }
}

#[test]
fn test_sequence_then_silence() {
    let mut populations = PopulationTable::new();
    let input = populations.add_population("input", 2, true);
    let mut scheduler = InjectionScheduler::new(StimulusConfig::default()).unwrap();
    let sequence = GeneratorHandle::new(SequenceGenerator::new(vec![2, 14, 100, 1353]).unwrap());
    scheduler.bind(input, Stimulus::from(sequence), &populations).unwrap();
    populations.start_running();

    let spikes = run(&mut scheduler, &populations, 0..5000);
    assert_eq!(spikes.len(), 8);
    for neuron in 0..2 {
        assert_eq!(neuron_times(&spikes, neuron), vec![2, 14, 100, 1353]);
    }
}

#[test]
fn test_rate_profile_dimension_mismatch() {
    let mut populations = PopulationTable::new();
    let input = populations.add_population("input", 10, true);
    let mut scheduler = InjectionScheduler::new(StimulusConfig::default()).unwrap();
    let profile = RateHandle::new(RateProfile::new(5, Residency::Host));
    assert_eq!(
        scheduler.bind(input, Stimulus::from(profile), &populations).unwrap_err(),
        StimError::DimensionMismatch {
            expected: 10,
            found: 5
        }
    );
    assert!(scheduler.bindings().binding(input).is_none());
}

#[test]
fn test_bind_after_running() {
    let mut populations = PopulationTable::new();
    let input = populations.add_population("input", 2, true);
    let mut scheduler = InjectionScheduler::new(StimulusConfig::default()).unwrap();
    let sequence = GeneratorHandle::new(SequenceGenerator::new(vec![5]).unwrap());
    scheduler.bind(input, Stimulus::from(sequence.clone()), &populations).unwrap();
    populations.start_running();

    let periodic = GeneratorHandle::new(PeriodicGenerator::new(10.0, true).unwrap());
    assert_eq!(
        scheduler.bind(input, Stimulus::from(periodic), &populations).unwrap_err(),
        StimError::InvalidPhase { population: input }
    );
    assert!(scheduler
        .bindings()
        .binding(input)
        .unwrap()
        .same_as(&Stimulus::from(sequence)));

    // The original binding keeps driving the population
    let spikes = run(&mut scheduler, &populations, 0..10);
    assert_eq!(spikes.len(), 2);
}

#[test]
fn test_non_monotonic_generator_aborts_run() {
    let mut populations = PopulationTable::new();
    let input = populations.add_population("input", 1, true);
    let mut scheduler = InjectionScheduler::new(StimulusConfig::default()).unwrap();
    // Goes back in time after its second spike
    let broken = CustomGenerator::new("broken", |_, _, _, last: Option<SpikeTime>| match last {
        None => Some(3),
        Some(3) => Some(8),
        Some(_) => Some(1),
    });
    scheduler.bind(input, Stimulus::from(GeneratorHandle::new(broken)), &populations).unwrap();
    populations.start_running();

    let mut recorder = SpikeRecorder::new();
    for t in 0..8 {
        scheduler.advance(t, &populations, &mut recorder).unwrap();
    }
    let error = scheduler.advance(8, &populations, &mut recorder).unwrap_err();
    assert!(matches!(error, StimError::InvalidGeneratorOutput { .. }));
    assert!(error.is_fatal());
    assert_eq!(recorder.spikes(), &[RecordedSpike::new(input, 0, 3)]);

    assert!(matches!(
        scheduler.advance(9, &populations, &mut recorder),
        Err(StimError::RunAborted { time: 8, .. })
    ));
    assert_eq!(recorder.spikes().len(), 1);
}

#[test]
fn test_corrupt_replay_aborts_run() {
    let mut populations = PopulationTable::new();
    let clock = populations.add_population("clock", 1, true);
    let replayed = populations.add_population("replayed", 2, true);
    let mut scheduler = InjectionScheduler::new(StimulusConfig::default()).unwrap();

    // Would spike at t=0 if the step were delivered
    let sequence = GeneratorHandle::new(SequenceGenerator::new(vec![0, 1]).unwrap());
    scheduler.bind(clock, Stimulus::from(sequence), &populations).unwrap();

    let mut bytes = encode(&[SpikeRecord::new(0, 2), SpikeRecord::new(1, 5)], 2).unwrap();
    bytes.truncate(bytes.len() - 3);
    let reader = SpikeFileReader::new(Cursor::new(bytes)).unwrap();
    let replay = FileReplayGenerator::from_reader(reader, 1000).unwrap();
    scheduler
        .bind(replayed, Stimulus::from(GeneratorHandle::new(replay)), &populations)
        .unwrap();
    populations.start_running();

    let mut recorder = SpikeRecorder::new();
    let error = scheduler.advance(0, &populations, &mut recorder).unwrap_err();
    match &error {
        StimError::CorruptReplay { population, neuron, .. } => {
            assert_eq!((*population, *neuron), (replayed, 0));
        }
        other => panic!("Unexpected error {:?}", other),
    }
    assert!(error.is_fatal());
    assert!(recorder.spikes().is_empty());

    assert!(matches!(
        scheduler.advance(1, &populations, &mut recorder),
        Err(StimError::RunAborted { time: 0, .. })
    ));
    assert!(recorder.spikes().is_empty());
}

#[test]
fn test_current_injection_steps() {
    let mut populations = PopulationTable::new();
    let excitatory = populations.add_population("excitatory", 4, false);
    let mut scheduler = InjectionScheduler::new(StimulusConfig::default()).unwrap();
    scheduler.set_uniform_current(excitatory, 1.25, &populations).unwrap();
    populations.start_running();

    for t in 0..10 {
        if t == 6 {
            scheduler.set_uniform_current(excitatory, 0.0, &populations).unwrap();
        }
        let mut integrator = Integrator::default();
        scheduler.advance(t, &populations, &mut integrator).unwrap();
        let expected = if t < 6 { 1.25 } else { 0.0 };
        for neuron in 0..4 {
            assert_eq!(integrator.step_currents[&(excitatory, neuron)], expected);
        }
    }
}

#[test]
fn test_record_then_replay() {
    let mut populations = PopulationTable::new();
    let source = populations.add_population("source", 20, true);
    let replayed = populations.add_population("replayed", 20, true);

    let mut scheduler = InjectionScheduler::new(StimulusConfig::default()).unwrap();
    let mut profile = RateProfile::new(20, Residency::Host);
    profile.set_rates(80.0).unwrap();
    scheduler
        .bind(source, Stimulus::from(RateHandle::new(profile)), &populations)
        .unwrap();

    let mut recorder = SpikeRecorder::new();
    for t in 0..500 {
        scheduler.advance(t, &populations, &mut recorder).unwrap();
    }
    let file = NamedTempFile::new().unwrap();
    let num_records = recorder.save_population(source, 20, file.path()).unwrap();
    assert!(num_records > 0);
    let original = recorder.population_spikes(source).unwrap();
    assert_eq!(num_records as usize, original.len());

    // A short look-ahead forces several refills
    let config = StimulusConfig {
        replay_lookahead_ms: 16,
        ..StimulusConfig::default()
    };
    let mut scheduler = InjectionScheduler::new(config).unwrap();
    let replay = scheduler.open_replay(file.path()).unwrap();
    scheduler
        .bind(replayed, Stimulus::from(GeneratorHandle::new(replay)), &populations)
        .unwrap();
    populations.start_running();

    let mut recorder = SpikeRecorder::new();
    for t in 0..600 {
        scheduler.advance(t, &populations, &mut recorder).unwrap();
    }
    assert_eq!(recorder.population_spikes(replayed).unwrap(), original);
}

#[test]
fn test_codec_round_trip() {
    let records = vec![
        SpikeRecord::new(4, 0),
        SpikeRecord::new(1, 0),
        SpikeRecord::new(3, 7),
        SpikeRecord::new(1, 7),
        SpikeRecord::new(0, 1000),
    ];
    let (header, decoded) = decode(&encode(&records, 5).unwrap()).unwrap();
    assert_eq!(header.neuron_count, 5);
    assert_eq!(decoded, records);

    let mut bytes = encode(&records, 5).unwrap();
    bytes.pop();
    assert!(matches!(decode(&bytes), Err(StimError::CorruptRecording(_))));
}

#[test]
fn test_backends_produce_identical_schedules() {
    let spikes: Vec<Vec<RecordedSpike>> = [BackendKind::Host, BackendKind::Device]
        .into_iter()
        .map(|backend| {
            let config = StimulusConfig {
                seed: 7,
                backend,
                ..StimulusConfig::default()
            };
            let mut populations = PopulationTable::new();
            let noise = populations.add_population("noise", 600, true);
            let mut scheduler = InjectionScheduler::new(config).unwrap();
            let mut profile = RateProfile::new(600, scheduler.residency());
            let rates: Vec<f64> = (0..600).map(|n| (n % 5) as f64 * 25.0).collect();
            profile.set_rates(&rates).unwrap();
            let stimulus = Stimulus::Rates {
                profile: RateHandle::new(profile),
                refractory_ms: 2,
            };
            scheduler.bind(noise, stimulus, &populations).unwrap();
            populations.start_running();
            run(&mut scheduler, &populations, 0..200)
        })
        .collect();
    assert!(!spikes[0].is_empty());
    assert_eq!(spikes[0], spikes[1]);
}
