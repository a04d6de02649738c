//! Storage device boundary and the scoped lease the streaming engine holds.

use super::record::DeviceRecord;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    /// Physical end of the mounted medium.
    #[error("end of medium")]
    EndOfMedium,
    /// Logical file mark; reading again continues past it.
    #[error("end of file")]
    EndOfFile,
    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("volume `{0}` is not available on this device")]
    VolumeUnavailable(String),
    #[error("no volume is acquired")]
    NotAcquired,
    #[error("{0}")]
    Other(String),
}

/// A sequential record device (tape drive or disk file).
pub trait Device: Send {
    fn name(&self) -> &str;

    /// Mounts and positions `volume_name` for reading from its start.
    fn acquire_for_read(&mut self, volume_name: &str) -> Result<(), DeviceError>;

    /// Reads into `record`. When `record.remainder` is non-zero on entry the
    /// next chunk of that record is appended; otherwise `record` is replaced
    /// by the next record. A record is complete once `remainder` is 0.
    fn read_record(&mut self, record: &mut DeviceRecord) -> Result<(), DeviceError>;

    /// Closes the current volume so another can be acquired.
    fn close(&mut self) -> Result<(), DeviceError>;

    /// Gives the device back to the pool.
    fn release(&mut self) -> Result<(), DeviceError>;
}

/// Exclusive use of a device for one streaming session.
///
/// The device is released exactly once: explicitly through
/// [`DeviceLease::release`], or on drop if the holder unwinds early.
pub struct DeviceLease<'a> {
    device: &'a mut dyn Device,
    released: bool,
}

impl<'a> DeviceLease<'a> {
    pub fn new(device: &'a mut dyn Device) -> Self {
        debug!("event=device_leased device={}", device.name());
        Self {
            device,
            released: false,
        }
    }

    pub fn release(mut self) -> Result<(), DeviceError> {
        self.released = true;
        self.device.release()
    }
}

impl<'a> Deref for DeviceLease<'a> {
    type Target = dyn Device + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.device
    }
}

impl<'a> DerefMut for DeviceLease<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.device
    }
}

impl Drop for DeviceLease<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.device.release() {
            warn!(
                "event=device_release_failed device={} error=\"{}\"",
                self.device.name(),
                err
            );
        }
    }
}

/// One item on a simulated medium.
#[derive(Debug, Clone)]
pub enum MediumItem {
    /// A record header with its first chunk; `remainder` bytes follow in
    /// [`MediumItem::Continuation`] items.
    Record(DeviceRecord),
    Continuation { data: Vec<u8>, remainder: u32 },
    FileMark,
    Fault(String),
}

/// What happened to a [`MemoryDevice`], shared with the test that built it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceActivity {
    pub acquired: Vec<String>,
    pub closes: usize,
    pub releases: usize,
}

/// Device backed by in-memory volumes.
pub struct MemoryDevice {
    name: String,
    volumes: HashMap<String, Vec<MediumItem>>,
    mounted: Option<VecDeque<MediumItem>>,
    failing_acquires: HashSet<String>,
    fail_release: bool,
    activity: Arc<Mutex<DeviceActivity>>,
}

impl MemoryDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            volumes: HashMap::new(),
            mounted: None,
            failing_acquires: HashSet::new(),
            fail_release: false,
            activity: Arc::new(Mutex::new(DeviceActivity::default())),
        }
    }

    pub fn with_volume(mut self, name: impl Into<String>, items: Vec<MediumItem>) -> Self {
        self.volumes.insert(name.into(), items);
        self
    }

    pub fn failing_acquire(mut self, volume_name: impl Into<String>) -> Self {
        self.failing_acquires.insert(volume_name.into());
        self
    }

    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn activity(&self) -> Arc<Mutex<DeviceActivity>> {
        self.activity.clone()
    }
}

impl Device for MemoryDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire_for_read(&mut self, volume_name: &str) -> Result<(), DeviceError> {
        self.activity.lock().acquired.push(volume_name.to_string());
        if self.failing_acquires.contains(volume_name) {
            return Err(DeviceError::Other(format!(
                "cannot mount `{volume_name}` on {}",
                self.name
            )));
        }
        let items = self
            .volumes
            .get(volume_name)
            .ok_or_else(|| DeviceError::VolumeUnavailable(volume_name.to_string()))?;
        self.mounted = Some(items.iter().cloned().collect());
        Ok(())
    }

    fn read_record(&mut self, record: &mut DeviceRecord) -> Result<(), DeviceError> {
        let mounted = self.mounted.as_mut().ok_or(DeviceError::NotAcquired)?;
        let item = mounted.pop_front().ok_or(DeviceError::EndOfMedium)?;
        match item {
            MediumItem::FileMark => Err(DeviceError::EndOfFile),
            MediumItem::Fault(reason) => Err(DeviceError::Io(io::Error::other(reason))),
            MediumItem::Record(next) if record.remainder == 0 => {
                *record = next;
                Ok(())
            }
            MediumItem::Continuation { data, remainder } if record.remainder > 0 => {
                record.data.extend_from_slice(&data);
                record.remainder = remainder;
                Ok(())
            }
            MediumItem::Record(_) => Err(DeviceError::Other(
                "record header found where a continuation was expected".into(),
            )),
            MediumItem::Continuation { .. } => Err(DeviceError::Other(
                "continuation found without a pending record".into(),
            )),
        }
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.mounted = None;
        self.activity.lock().closes += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        self.mounted = None;
        self.activity.lock().releases += 1;
        if self.fail_release {
            return Err(DeviceError::Other(format!("{} refused release", self.name)));
        }
        Ok(())
    }
}
