//! Mean firing rates driving Poisson stimulation.
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

use crate::buffer::{MirroredBuffer, Side};
use crate::error::{Result, StimError};

pub use crate::buffer::Residency;

/// A per-neuron vector of mean firing rates (Hz).
/// The length is fixed at construction and every rate is non-negative.
#[derive(Debug, PartialEq, Clone)]
pub struct RateProfile {
    rates: MirroredBuffer,
}

impl RateProfile {
    /// Create a rate profile for `num_neurons` neurons, with all rates set to zero.
    pub fn new(num_neurons: usize, residency: Residency) -> Self {
        RateProfile {
            rates: MirroredBuffer::new(num_neurons, 0.0, residency),
        }
    }

    /// Returns the number of neurons covered by the profile.
    pub fn num_neurons(&self) -> usize {
        self.rates.len()
    }

    /// Returns the residency of the profile.
    pub fn residency(&self) -> Residency {
        self.rates.residency()
    }

    /// Set the rates of all neurons.
    /// The function accepts a scalar (same rate for every neuron) or a slice with one rate per neuron.
    /// It returns an error if a rate is negative or if the slice length differs from the number of neurons.
    pub fn set_rates<'a, R: Into<Rates<'a>>>(&mut self, rates: R) -> Result<()> {
        match rates.into() {
            Rates::Scalar(rate) => {
                check_rate(rate)?;
                self.rates.host_mut().fill(rate);
            }
            Rates::PerNeuron(rates) => {
                if rates.len() != self.num_neurons() {
                    return Err(StimError::DimensionMismatch {
                        expected: self.num_neurons(),
                        found: rates.len(),
                    });
                }
                rates.iter().try_for_each(|&rate| check_rate(rate))?;
                self.rates.host_mut().copy_from_slice(rates);
            }
        }
        Ok(())
    }

    /// Set the rate of a single neuron.
    pub fn set_rate(&mut self, index: usize, rate: f64) -> Result<()> {
        self.check_index(index)?;
        check_rate(rate)?;
        self.rates.host_mut()[index] = rate;
        Ok(())
    }

    /// Returns a copy of all rates.
    pub fn rates(&self) -> Vec<f64> {
        self.rates.latest().to_vec()
    }

    /// Returns the rate of a single neuron.
    pub fn rate(&self, index: usize) -> Result<f64> {
        self.check_index(index)?;
        Ok(self.rates.latest()[index])
    }

    /// Mutable access to the device copy of the rates, e.g., for rates computed by device kernels.
    /// The host copy is refreshed at the next host read.
    /// The caller is responsible for keeping the values non-negative.
    pub fn device_rates_mut(&mut self) -> Result<&mut [f64]> {
        self.rates.device_mut()
    }

    /// Synchronize the requested side and return the rates as seen from it.
    pub fn consume(&mut self, side: Side) -> Result<&[f64]> {
        self.rates.consume(side)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.num_neurons() {
            return Err(StimError::IndexOutOfRange {
                index,
                len: self.num_neurons(),
            });
        }
        Ok(())
    }
}

fn check_rate(rate: f64) -> Result<()> {
    if !(rate.is_finite() && rate >= 0.0) {
        return Err(StimError::InvalidParameter(format!(
            "Firing rates must be finite and non-negative, got {}",
            rate
        )));
    }
    Ok(())
}

/// Argument of [`RateProfile::set_rates`].
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Rates<'a> {
    Scalar(f64),
    PerNeuron(&'a [f64]),
}

impl From<f64> for Rates<'_> {
    fn from(rate: f64) -> Self {
        Rates::Scalar(rate)
    }
}

impl<'a> From<&'a [f64]> for Rates<'a> {
    fn from(rates: &'a [f64]) -> Self {
        Rates::PerNeuron(rates)
    }
}

impl<'a> From<&'a Vec<f64>> for Rates<'a> {
    fn from(rates: &'a Vec<f64>) -> Self {
        Rates::PerNeuron(rates)
    }
}

impl<'a, const N: usize> From<&'a [f64; N]> for Rates<'a> {
    fn from(rates: &'a [f64; N]) -> Self {
        Rates::PerNeuron(rates)
    }
}

/// A shared handle on a rate profile.
///
/// The caller keeps its own clone to update rates while the profile is bound; the binding table
/// uses the handle identity to make sure a profile drives at most one population.
#[derive(Debug, Clone)]
pub struct RateHandle(Arc<RwLock<RateProfile>>);

impl RateHandle {
    pub fn new(profile: RateProfile) -> Self {
        RateHandle(Arc::new(RwLock::new(profile)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, RateProfile> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, RateProfile> {
        self.0.write()
    }

    /// Whether both handles refer to the same profile.
    pub fn same_as(&self, other: &RateHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile() {
        let profile = RateProfile::new(5, Residency::Host);
        assert_eq!(profile.num_neurons(), 5);
        assert_eq!(profile.rates(), vec![0.0; 5]);
        assert_eq!(profile.residency(), Residency::Host);
    }

    #[test]
    fn test_set_rates_scalar() {
        for num_neurons in [0, 1, 7, 128] {
            for rate in [0.0, 0.5, 10.0, 999.0] {
                let mut profile = RateProfile::new(num_neurons, Residency::Mirrored);
                profile.set_rates(rate).unwrap();
                let rates = profile.rates();
                assert_eq!(rates.len(), num_neurons);
                assert!(rates.iter().all(|&r| r == rate));
            }
        }
    }

    #[test]
    fn test_set_rates_vector() {
        let mut profile = RateProfile::new(3, Residency::Host);
        profile.set_rates(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(profile.rates(), vec![1.0, 2.0, 3.0]);

        assert_eq!(
            profile.set_rates(&[1.0, 2.0]),
            Err(StimError::DimensionMismatch {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(profile.rates(), vec![1.0, 2.0, 3.0]);

        assert!(matches!(
            profile.set_rates(&[1.0, -2.0, 3.0]),
            Err(StimError::InvalidParameter(_))
        ));
        assert_eq!(profile.rates(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_set_rate() {
        let mut profile = RateProfile::new(4, Residency::Host);
        profile.set_rates(1.0).unwrap();
        profile.set_rate(2, 42.0).unwrap();
        assert_eq!(profile.rate(2), Ok(42.0));
        assert_eq!(profile.rates(), vec![1.0, 1.0, 42.0, 1.0]);

        assert_eq!(
            profile.set_rate(4, 1.0),
            Err(StimError::IndexOutOfRange { index: 4, len: 4 })
        );
        assert_eq!(
            profile.rate(10),
            Err(StimError::IndexOutOfRange { index: 10, len: 4 })
        );
        assert!(profile.set_rate(0, f64::NAN).is_err());
    }

    #[test]
    fn test_device_mirror() {
        let mut profile = RateProfile::new(3, Residency::Mirrored);
        profile.set_rates(5.0).unwrap();
        assert_eq!(profile.consume(Side::Device).unwrap(), &[5.0, 5.0, 5.0]);

        profile.device_rates_mut().unwrap()[1] = 7.0;
        assert_eq!(profile.rate(1), Ok(7.0));

        let mut host_only = RateProfile::new(3, Residency::Host);
        assert!(host_only.device_rates_mut().is_err());
    }

    #[test]
    fn test_host_then_device_write() {
        let mut profile = RateProfile::new(3, Residency::Mirrored);
        profile.set_rate(0, 5.0).unwrap();
        profile.device_rates_mut().unwrap()[1] = 7.0;
        assert_eq!(profile.rates(), vec![5.0, 7.0, 0.0]);

        profile.set_rate(2, 1.0).unwrap();
        assert_eq!(profile.consume(Side::Device).unwrap(), &[5.0, 7.0, 1.0]);
    }

    #[test]
    fn test_handle_identity() {
        let handle = RateHandle::new(RateProfile::new(2, Residency::Host));
        let clone = handle.clone();
        let other = RateHandle::new(RateProfile::new(2, Residency::Host));
        assert!(handle.same_as(&clone));
        assert!(!handle.same_as(&other));

        clone.write().set_rate(0, 3.0).unwrap();
        assert_eq!(handle.read().rate(0), Ok(3.0));
    }
}
