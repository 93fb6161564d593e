//! Platform seam between the core and the operating system's input subsystem.
//!
//! A [`RawEventSource`] opens the candidate devices and hands back one
//! [`DeviceHandle`] per accepted device, then builds a [`Multiplexer`] that
//! waits for readiness across all of them.

#[cfg(target_os = "linux")]
pub mod evdev;
pub mod virtual_source;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::device::{Capabilities, DeviceIndex};
use crate::error::{DiscoveryError, ReadError};
use crate::event::{KeyBitmap, RawEvent};

#[cfg(target_os = "linux")]
pub use self::evdev::EvdevSource;
pub use virtual_source::{VirtualDevice, VirtualInputSource};

/// Callback that interrupts a blocked [`Multiplexer::wait`].
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Platform abstraction for device enumeration.
/// Implementations: EvdevSource (Linux), VirtualInputSource (testing).
pub trait RawEventSource: Send + Sync {
    /// Enumerate and open every accessible candidate device.
    ///
    /// Devices come back in a stable order; their position becomes the device index.
    fn open(&self) -> Result<OpenedDevices, DiscoveryError>;

    /// Build the readiness multiplexer over `opened`, one entry per device in index order.
    fn multiplexer(&self, opened: &OpenedDevices) -> io::Result<Box<dyn Multiplexer>>;
}

/// Descriptor of one accepted device, as reported by the backend.
pub struct OpenedDevice {
    pub name: String,
    pub physical_path: String,
    pub capabilities: Capabilities,
    pub handle: Arc<dyn DeviceHandle>,
    /// OS descriptor the multiplexer polls, for backends that have one.
    pub readiness_fd: Option<i32>,
}

/// Result of a successful [`RawEventSource::open`].
pub struct OpenedDevices {
    pub devices: Vec<OpenedDevice>,
}

impl OpenedDevices {
    /// Release every handle, for when the session cannot start after all.
    pub fn close_all(&self) {
        for device in &self.devices {
            device.handle.close();
        }
    }
}

/// An open device. Shared between the ingestion and reconciliation workers.
pub trait DeviceHandle: Send + Sync {
    /// Read exactly one raw record. `Ok(None)` when nothing is pending.
    fn read_event(&self) -> Result<Option<RawEvent>, ReadError>;

    /// Ground-truth key state, bypassing the event stream.
    fn key_state(&self) -> io::Result<KeyBitmap>;

    /// Release the underlying handle. Later reads and queries fail.
    fn close(&self);
}

/// Readiness reported for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Readable(DeviceIndex),
    /// Error or hangup condition; the device will not produce more events.
    Hangup(DeviceIndex),
}

/// Blocking-with-timeout readiness wait across all open devices.
pub trait Multiplexer: Send {
    /// Wait up to `timeout` for any enabled device. An empty result means the
    /// wait timed out or was woken.
    fn wait(&mut self, timeout: Duration) -> io::Result<Vec<Readiness>>;

    /// Stop watching a device. Its entry stays in place.
    fn disable(&mut self, device: DeviceIndex);

    /// Callback that makes a concurrent or subsequent `wait` return promptly.
    fn waker(&self) -> Waker;
}
