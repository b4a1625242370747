//! # Compute Backend Abstraction
//!
//! The data-parallel parts of a step (Poisson draws and current application) run on a backend.
//! Both backends evaluate the same per-neuron kernel, so a given seed, time and neuron index
//! produce the same spikes whichever backend is selected.
use log;
use rayon::prelude::*;

use crate::buffer::{Residency, Side};
use crate::config::{BackendKind, StimulusConfig};
use crate::current::CurrentInjection;
use crate::error::Result;
use crate::generator::poisson::PoissonDriver;
use crate::rate::RateProfile;
use crate::SpikeTime;

/// Number of neurons processed by one device work group.
pub const WORK_GROUP_SIZE: usize = 256;

/// Compute backend trait - abstracts host vs device execution.
pub trait ComputeBackend: Send + Sync {
    /// Get backend name for logging/debugging
    fn name(&self) -> &str;

    /// Indices (ascending) of the neurons firing at `time`.
    ///
    /// `last_spikes` holds the last Poisson spike of each neuron, for the refractory period.
    fn poisson_spikes(
        &self,
        driver: &PoissonDriver,
        profile: &mut RateProfile,
        last_spikes: &[Option<SpikeTime>],
        time: SpikeTime,
    ) -> Result<Vec<usize>>;

    /// The currents to deliver for this step, read from the side the backend computes on.
    fn currents<'a>(&self, injection: &'a mut CurrentInjection) -> Result<&'a [f64]>;
}

/// Whether a single neuron fires; shared by all backends.
fn poisson_kernel(
    driver: &PoissonDriver,
    rates: &[f64],
    last_spikes: &[Option<SpikeTime>],
    neuron: usize,
    time: SpikeTime,
) -> bool {
    driver.fires(neuron, time, rates[neuron], last_spikes[neuron])
}

/// Host backend: reads host buffers, parallelized with rayon for large populations.
#[derive(Debug, PartialEq, Clone)]
pub struct HostBackend {
    parallel_threshold: usize,
}

impl HostBackend {
    pub fn new(parallel_threshold: usize) -> Self {
        HostBackend { parallel_threshold }
    }
}

impl ComputeBackend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn poisson_spikes(
        &self,
        driver: &PoissonDriver,
        profile: &mut RateProfile,
        last_spikes: &[Option<SpikeTime>],
        time: SpikeTime,
    ) -> Result<Vec<usize>> {
        let rates = profile.consume(Side::Host)?;
        let fired = if rates.len() >= self.parallel_threshold {
            (0..rates.len())
                .into_par_iter()
                .filter(|&neuron| poisson_kernel(driver, rates, last_spikes, neuron, time))
                .collect()
        } else {
            (0..rates.len())
                .filter(|&neuron| poisson_kernel(driver, rates, last_spikes, neuron, time))
                .collect()
        };
        Ok(fired)
    }

    fn currents<'a>(&self, injection: &'a mut CurrentInjection) -> Result<&'a [f64]> {
        injection.consume(Side::Host)
    }
}

/// Device backend: reads the device mirror of buffers and processes neurons in work groups.
/// Host-only buffers are read in place.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct DeviceBackend;

impl DeviceBackend {
    pub fn new() -> Self {
        DeviceBackend
    }

    fn side(residency: Residency) -> Side {
        match residency {
            Residency::Mirrored => Side::Device,
            Residency::Host => Side::Host,
        }
    }
}

impl ComputeBackend for DeviceBackend {
    fn name(&self) -> &str {
        "device"
    }

    fn poisson_spikes(
        &self,
        driver: &PoissonDriver,
        profile: &mut RateProfile,
        last_spikes: &[Option<SpikeTime>],
        time: SpikeTime,
    ) -> Result<Vec<usize>> {
        let side = DeviceBackend::side(profile.residency());
        let rates = profile.consume(side)?;
        let fired = rates
            .par_chunks(WORK_GROUP_SIZE)
            .enumerate()
            .flat_map_iter(|(group, chunk)| {
                let offset = group * WORK_GROUP_SIZE;
                (offset..offset + chunk.len())
                    .filter(move |&neuron| poisson_kernel(driver, rates, last_spikes, neuron, time))
            })
            .collect();
        Ok(fired)
    }

    fn currents<'a>(&self, injection: &'a mut CurrentInjection) -> Result<&'a [f64]> {
        let side = DeviceBackend::side(injection.residency());
        injection.consume(side)
    }
}

/// Build the backend selected by the configuration.
pub fn create_backend(config: &StimulusConfig) -> Box<dyn ComputeBackend> {
    let backend: Box<dyn ComputeBackend> = match config.backend {
        BackendKind::Host => Box::new(HostBackend::new(config.parallel_threshold)),
        BackendKind::Device => Box::new(DeviceBackend::new()),
    };
    log::info!("Using {} stimulus backend", backend.name());
    backend
}
