//! Linux backend reading `/dev/input/event*` nodes.
//!
//! Device metadata and ground-truth key state come from the `evdev` crate;
//! single `input_event` records are read with `read(2)` and readiness is
//! multiplexed with `poll(2)` plus an `eventfd` used as the wake signal.

use std::fs;
use std::io;
use std::mem::{MaybeUninit, size_of};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use evdev::Device;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{
    DeviceHandle, Multiplexer, OpenedDevice, OpenedDevices, RawEventSource, Readiness, Waker,
};
use crate::device::{AbsAxisInfo, Capabilities, DeviceIndex};
use crate::error::{DiscoveryError, ReadError};
use crate::event::{EventClass, KeyBitmap, RawEvent};

/// evdev-backed [`RawEventSource`].
pub struct EvdevSource {
    dir: PathBuf,
}

impl EvdevSource {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// `event*` nodes in numeric order, so indices are stable across restarts.
    fn candidates(&self) -> Result<Vec<PathBuf>, DiscoveryError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| DiscoveryError::Namespace {
            path: self.dir.clone(),
            source,
        })?;

        let mut candidates: Vec<(u32, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name();
                let number = name.to_str()?.strip_prefix("event")?.parse().ok()?;
                Some((number, entry.path()))
            })
            .collect();
        candidates.sort();

        Ok(candidates.into_iter().map(|(_, path)| path).collect())
    }

    fn open_device(path: &Path) -> io::Result<OpenedDevice> {
        let device = Device::open(path)?;
        set_nonblocking(device.as_raw_fd())?;

        let name = device.name().unwrap_or_default().to_string();
        let physical_path = device
            .physical_path()
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());
        let capabilities = read_capabilities(&device);
        let fd = device.as_raw_fd();

        let handle = Arc::new(EvdevHandle {
            device: Mutex::new(Some(device)),
        });
        Ok(OpenedDevice {
            name,
            physical_path,
            capabilities,
            handle,
            readiness_fd: Some(fd),
        })
    }
}

impl RawEventSource for EvdevSource {
    fn open(&self) -> Result<OpenedDevices, DiscoveryError> {
        let mut devices = Vec::new();

        for path in self.candidates()? {
            match Self::open_device(&path) {
                Ok(device) => {
                    debug!(path = %path.display(), name = %device.name, "Opened input device");
                    devices.push(device);
                }
                Err(e) => {
                    debug!(path = %path.display(), "Skipping input device: {e}");
                }
            }
        }

        if devices.is_empty() {
            return Err(DiscoveryError::NoDevices {
                path: self.dir.clone(),
            });
        }
        info!(count = devices.len(), dir = %self.dir.display(), "Opened input devices");

        Ok(OpenedDevices { devices })
    }

    fn multiplexer(&self, opened: &OpenedDevices) -> io::Result<Box<dyn Multiplexer>> {
        let fds: Vec<RawFd> = opened
            .devices
            .iter()
            .map(|device| device.readiness_fd.unwrap_or(-1))
            .collect();
        Ok(Box::new(PollMultiplexer::new(&fds)?))
    }
}

fn read_capabilities(device: &Device) -> Capabilities {
    let keys = device
        .supported_keys()
        .map(|keys| keys.iter().map(|k| k.code()).collect())
        .unwrap_or_default();
    let rel_axes = device
        .supported_relative_axes()
        .map(|axes| axes.iter().map(|a| a.0).collect())
        .unwrap_or_default();

    let abs_state = device.get_abs_state().ok();
    let abs_axes = device
        .supported_absolute_axes()
        .map(|axes| {
            axes.iter()
                .map(|axis| {
                    let info = abs_state
                        .as_ref()
                        .and_then(|state| state.get(usize::from(axis.0)));
                    AbsAxisInfo {
                        axis_id: axis.0,
                        value: info.map(|i| i.value).unwrap_or(0),
                        min: info.map(|i| i.minimum).unwrap_or(0),
                        max: info.map(|i| i.maximum).unwrap_or(0),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Capabilities {
        keys,
        abs_axes,
        rel_axes,
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fd is an open descriptor owned by the evdev device.
    let current = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if current < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above; only O_NONBLOCK is added to the existing flags.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, current | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// One open `/dev/input/event*` node. `None` once closed.
struct EvdevHandle {
    device: Mutex<Option<Device>>,
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "device closed")
}

impl DeviceHandle for EvdevHandle {
    fn read_event(&self) -> Result<Option<RawEvent>, ReadError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or_else(closed_error)?;

        let expected = size_of::<libc::input_event>();
        let mut raw = MaybeUninit::<libc::input_event>::uninit();
        // SAFETY: the buffer is exactly one input_event and the fd stays open while the lock is held.
        let n = unsafe { libc::read(device.as_raw_fd(), raw.as_mut_ptr().cast(), expected) };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(ReadError::Io(err)),
            };
        }
        let got = n as usize;
        if got != expected {
            return Err(ReadError::Short { got, expected });
        }

        // SAFETY: read(2) filled all `expected` bytes.
        let raw = unsafe { raw.assume_init() };
        let secs = u64::try_from(raw.time.tv_sec).unwrap_or(0);
        let micros = u32::try_from(raw.time.tv_usec).unwrap_or(0);
        Ok(Some(RawEvent {
            time: Duration::new(secs, micros.saturating_mul(1000)),
            class: EventClass::from_raw(raw.type_),
            code: raw.code,
            value: raw.value,
        }))
    }

    fn key_state(&self) -> io::Result<KeyBitmap> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or_else(closed_error)?;
        let keys = device.get_key_state()?;
        Ok(KeyBitmap::from_codes(keys.iter().map(|k| k.code())))
    }

    fn close(&self) {
        if self.device.lock().take().is_some() {
            debug!("Closed input device");
        }
    }
}

/// `poll(2)` over all device descriptors plus a trailing wake `eventfd`.
struct PollMultiplexer {
    fds: Vec<libc::pollfd>,
    wake: Arc<OwnedFd>,
}

impl PollMultiplexer {
    fn new(device_fds: &[RawFd]) -> io::Result<Self> {
        // SAFETY: plain syscall; the result is checked before use.
        let raw = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: raw is a freshly created descriptor nobody else owns.
        let wake = Arc::new(unsafe { OwnedFd::from_raw_fd(raw) });

        let mut fds: Vec<libc::pollfd> = device_fds
            .iter()
            .map(|&fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        fds.push(libc::pollfd {
            fd: wake.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });

        Ok(Self { fds, wake })
    }

    fn drain_wake(&self) {
        let mut counter = 0u64;
        // SAFETY: reads at most 8 bytes into a u64 from our own non-blocking eventfd.
        let _ = unsafe {
            libc::read(
                self.wake.as_raw_fd(),
                (&mut counter as *mut u64).cast(),
                size_of::<u64>(),
            )
        };
    }
}

impl Multiplexer for PollMultiplexer {
    fn wait(&mut self, timeout: Duration) -> io::Result<Vec<Readiness>> {
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        for pfd in &mut self.fds {
            pfd.revents = 0;
        }

        // SAFETY: fds is a valid, exclusively borrowed pollfd array of the given length.
        let rc = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        let (devices, wake) = self.fds.split_at(self.fds.len() - 1);
        let ready = devices
            .iter()
            .enumerate()
            .filter_map(|(i, pfd)| {
                if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                    Some(Readiness::Hangup(DeviceIndex(i)))
                } else if pfd.revents & libc::POLLIN != 0 {
                    Some(Readiness::Readable(DeviceIndex(i)))
                } else {
                    None
                }
            })
            .collect();

        if wake[0].revents & libc::POLLIN != 0 {
            self.drain_wake();
        }
        Ok(ready)
    }

    fn disable(&mut self, device: DeviceIndex) {
        // poll(2) ignores negative descriptors, so the entry stays in place.
        match self.fds.len().checked_sub(1) {
            Some(count) if device.0 < count => self.fds[device.0].fd = -1,
            _ => warn!(device = %device, "Cannot disable unknown poll entry"),
        }
    }

    fn waker(&self) -> Waker {
        let wake = self.wake.clone();
        Arc::new(move || {
            let one = 1u64;
            // SAFETY: writes 8 bytes from a u64 to our own eventfd.
            let _ = unsafe {
                libc::write(
                    wake.as_raw_fd(),
                    (&one as *const u64).cast(),
                    size_of::<u64>(),
                )
            };
        })
    }
}
