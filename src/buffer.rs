//! Host buffers with an optional device mirror.
//!
//! A mirrored buffer keeps two copies of the same per-neuron values. Writes go to one side and
//! mark the other side stale; copies only happen at explicit synchronization points
//! ([`MirroredBuffer::sync_to_device`], [`MirroredBuffer::sync_to_host`]) or when a side is
//! consumed with [`MirroredBuffer::consume`].
use log;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StimError};

/// Where the values of a buffer live.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum Residency {
    /// Host memory only.
    Host,
    /// Host memory mirrored to device memory.
    Mirrored,
}

/// The side of a buffer a consumer reads from.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Side {
    Host,
    Device,
}

#[derive(Debug, PartialEq, Clone)]
enum Stale {
    Nothing,
    Host,
    Device,
}

/// A fixed-length vector of values with explicit host/device residency.
#[derive(Debug, PartialEq, Clone)]
pub struct MirroredBuffer {
    host: Vec<f64>,
    device: Option<Box<[f64]>>,
    stale: Stale,
}

impl MirroredBuffer {
    /// Create a buffer of `len` copies of `value`.
    pub fn new(len: usize, value: f64, residency: Residency) -> Self {
        let device = match residency {
            Residency::Host => None,
            Residency::Mirrored => Some(vec![value; len].into_boxed_slice()),
        };
        MirroredBuffer {
            host: vec![value; len],
            device,
            stale: Stale::Nothing,
        }
    }

    /// Create a buffer holding the provided values.
    pub fn from_vec(values: Vec<f64>, residency: Residency) -> Self {
        let device = match residency {
            Residency::Host => None,
            Residency::Mirrored => Some(values.clone().into_boxed_slice()),
        };
        MirroredBuffer {
            host: values,
            device,
            stale: Stale::Nothing,
        }
    }

    /// Returns the number of entries of the buffer.
    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    /// Returns the residency of the buffer.
    pub fn residency(&self) -> Residency {
        match self.device {
            Some(_) => Residency::Mirrored,
            None => Residency::Host,
        }
    }

    /// Whether one side holds values the other side has not seen yet.
    pub fn needs_sync(&self) -> bool {
        self.stale != Stale::Nothing
    }

    /// Read-only view of the host values.
    /// The view may be stale if the device side was written since the last synchronization.
    pub fn host(&self) -> &[f64] {
        &self.host
    }

    /// Read-only view of whichever side was written last, without copying.
    pub fn latest(&self) -> &[f64] {
        match (&self.stale, self.device.as_deref()) {
            (Stale::Host, Some(device)) => device,
            _ => &self.host,
        }
    }

    /// Mutable view of the host values; the device copy becomes stale.
    /// Pending device writes are downloaded first.
    pub fn host_mut(&mut self) -> &mut [f64] {
        self.sync_to_host();
        if self.device.is_some() {
            self.stale = Stale::Device;
        }
        &mut self.host
    }

    /// Mutable view of the device values; the host copy becomes stale.
    /// Pending host writes are uploaded first.
    pub fn device_mut(&mut self) -> Result<&mut [f64]> {
        self.sync_to_device()?;
        self.stale = Stale::Host;
        self.device.as_deref_mut().ok_or_else(|| {
            StimError::InvalidParameter("The buffer has no device mirror.".to_string())
        })
    }

    /// Copy host values to the device if the device copy is stale.
    pub fn sync_to_device(&mut self) -> Result<()> {
        let device = self.device.as_deref_mut().ok_or_else(|| {
            StimError::InvalidParameter("The buffer has no device mirror.".to_string())
        })?;
        if self.stale == Stale::Device {
            log::debug!("Uploading {} values to device", self.host.len());
            device.copy_from_slice(&self.host);
            self.stale = Stale::Nothing;
        }
        Ok(())
    }

    /// Copy device values to the host if the host copy is stale.
    pub fn sync_to_host(&mut self) {
        if let (Stale::Host, Some(device)) = (&self.stale, self.device.as_deref()) {
            log::debug!("Downloading {} values from device", device.len());
            self.host.copy_from_slice(device);
            self.stale = Stale::Nothing;
        }
    }

    /// Synchronize the requested side and return a view of it.
    /// This is the consumption boundary used by the scheduler backends.
    pub fn consume(&mut self, side: Side) -> Result<&[f64]> {
        match side {
            Side::Host => {
                self.sync_to_host();
                Ok(&self.host)
            }
            Side::Device => {
                self.sync_to_device()?;
                self.device.as_deref().ok_or_else(|| {
                    StimError::InvalidParameter("The buffer has no device mirror.".to_string())
                })
            }
        }
    }
}
