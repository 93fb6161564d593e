//! Scripted input backend for tests and headless demos.
//!
//! Events are queued per device by the test thread and delivered through the
//! same handle/multiplexer contract the evdev backend implements.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{
    DeviceHandle, Multiplexer, OpenedDevice, OpenedDevices, RawEventSource, Readiness, Waker,
};
use crate::device::{AbsAxisInfo, Capabilities, DeviceIndex};
use crate::error::{DiscoveryError, ReadError};
use crate::event::{BTN_MOUSE, BTN_MOUSE_END, KeyBitmap, RawEvent};

/// Size of a Linux `input_event` record on 64-bit targets.
const RECORD_SIZE: usize = 24;

/// Description of a scripted device.
#[derive(Debug, Clone, Default)]
pub struct VirtualDevice {
    name: String,
    capabilities: Capabilities,
}

impl VirtualDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capabilities: Capabilities::default(),
        }
    }

    /// A device reporting the standard keyboard key range.
    pub fn keyboard(name: &str) -> Self {
        Self::new(name).with_keys(1..=248)
    }

    /// A device reporting mouse buttons and X/Y/wheel motion.
    pub fn mouse(name: &str) -> Self {
        Self::new(name)
            .with_keys(BTN_MOUSE..BTN_MOUSE_END)
            .with_rel_axis(0x00)
            .with_rel_axis(0x01)
            .with_rel_axis(0x08)
    }

    pub fn with_keys<I: IntoIterator<Item = u16>>(mut self, codes: I) -> Self {
        self.capabilities.keys.extend(codes);
        self
    }

    pub fn with_abs_axis(mut self, axis_id: u16, value: i32, min: i32, max: i32) -> Self {
        self.capabilities.abs_axes.push(AbsAxisInfo {
            axis_id,
            value,
            min,
            max,
        });
        self
    }

    pub fn with_rel_axis(mut self, axis_id: u16) -> Self {
        self.capabilities.rel_axes.push(axis_id);
        self
    }
}

enum Pending {
    Event(RawEvent),
    Garbage(usize),
    Hangup,
}

#[derive(Default)]
struct VirtualState {
    /// Incremented on every open; handles from older sessions stop working.
    session: u64,
    pending: VecDeque<(DeviceIndex, Pending)>,
    woken: bool,
    closed: HashSet<DeviceIndex>,
    truth: HashMap<DeviceIndex, KeyBitmap>,
    truth_unreadable: HashSet<DeviceIndex>,
    fail_next_wait: bool,
    unavailable: bool,
    multiplexer_unavailable: bool,
    open_count: usize,
}

struct Shared {
    state: Mutex<VirtualState>,
    ready: Condvar,
}

/// Scripted [`RawEventSource`].
pub struct VirtualInputSource {
    devices: Vec<VirtualDevice>,
    shared: Arc<Shared>,
}

impl VirtualInputSource {
    pub fn new(devices: Vec<VirtualDevice>) -> Self {
        Self {
            devices,
            shared: Arc::new(Shared {
                state: Mutex::new(VirtualState::default()),
                ready: Condvar::new(),
            }),
        }
    }

    /// Queue an event for `device`.
    pub fn emit(&self, device: usize, event: RawEvent) {
        self.push(DeviceIndex(device), Pending::Event(event));
    }

    pub fn emit_all<I: IntoIterator<Item = RawEvent>>(&self, device: usize, events: I) {
        for event in events {
            self.emit(device, event);
        }
    }

    /// Queue a truncated record of `got` bytes for `device`.
    pub fn emit_short_read(&self, device: usize, got: usize) {
        self.push(DeviceIndex(device), Pending::Garbage(got));
    }

    /// Simulate unplugging `device`: the multiplexer reports a hangup.
    pub fn hang_up(&self, device: usize) {
        self.push(DeviceIndex(device), Pending::Hangup);
    }

    /// Set the ground-truth key state of `device`.
    pub fn set_key_state<I: IntoIterator<Item = u16>>(&self, device: usize, codes: I) {
        self.shared
            .state
            .lock()
            .truth
            .insert(DeviceIndex(device), KeyBitmap::from_codes(codes));
    }

    /// Make ground-truth queries for `device` fail.
    pub fn set_key_state_unreadable(&self, device: usize, unreadable: bool) {
        let mut state = self.shared.state.lock();
        if unreadable {
            state.truth_unreadable.insert(DeviceIndex(device));
        } else {
            state.truth_unreadable.remove(&DeviceIndex(device));
        }
    }

    /// Make the next multiplexer wait fail.
    pub fn fail_next_wait(&self) {
        self.shared.state.lock().fail_next_wait = true;
        self.shared.ready.notify_all();
    }

    /// Make subsequent opens fail as if the device namespace were inaccessible.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.state.lock().unavailable = unavailable;
    }

    /// Make subsequent multiplexer construction fail.
    pub fn set_multiplexer_unavailable(&self, unavailable: bool) {
        self.shared.state.lock().multiplexer_unavailable = unavailable;
    }

    pub fn open_count(&self) -> usize {
        self.shared.state.lock().open_count
    }

    /// Queued items not yet consumed by the multiplexer or a handle.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_closed(&self, device: usize) -> bool {
        self.shared.state.lock().closed.contains(&DeviceIndex(device))
    }

    fn push(&self, device: DeviceIndex, item: Pending) {
        self.shared.state.lock().pending.push_back((device, item));
        self.shared.ready.notify_all();
    }
}

impl RawEventSource for VirtualInputSource {
    fn open(&self) -> Result<OpenedDevices, DiscoveryError> {
        let mut state = self.shared.state.lock();
        if state.unavailable {
            return Err(DiscoveryError::Backend(
                "virtual device namespace unavailable".to_string(),
            ));
        }
        if self.devices.is_empty() {
            return Err(DiscoveryError::NoDevices {
                path: "virtual".into(),
            });
        }

        state.session += 1;
        state.open_count += 1;
        state.pending.clear();
        state.closed.clear();
        state.woken = false;
        let session = state.session;
        drop(state);

        let devices = self
            .devices
            .iter()
            .enumerate()
            .map(|(i, dev)| OpenedDevice {
                name: dev.name.clone(),
                physical_path: format!("virtual/input{i}"),
                capabilities: dev.capabilities.clone(),
                handle: Arc::new(VirtualHandle {
                    index: DeviceIndex(i),
                    session,
                    shared: self.shared.clone(),
                }),
                readiness_fd: None,
            })
            .collect();

        Ok(OpenedDevices { devices })
    }

    fn multiplexer(&self, opened: &OpenedDevices) -> io::Result<Box<dyn Multiplexer>> {
        if self.shared.state.lock().multiplexer_unavailable {
            return Err(io::Error::other("virtual readiness primitive unavailable"));
        }
        Ok(Box::new(VirtualMultiplexer {
            disabled: vec![false; opened.devices.len()],
            shared: self.shared.clone(),
        }))
    }
}

struct VirtualHandle {
    index: DeviceIndex,
    session: u64,
    shared: Arc<Shared>,
}

impl VirtualHandle {
    fn gone(&self, state: &VirtualState) -> bool {
        state.session != self.session || state.closed.contains(&self.index)
    }
}

impl DeviceHandle for VirtualHandle {
    fn read_event(&self) -> Result<Option<RawEvent>, ReadError> {
        let mut state = self.shared.state.lock();
        if self.gone(&state) {
            return Err(ReadError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "device closed",
            )));
        }

        let Some(pos) = state.pending.iter().position(|(d, _)| *d == self.index) else {
            return Ok(None);
        };
        match state.pending[pos].1 {
            Pending::Hangup => Ok(None),
            Pending::Event(event) => {
                state.pending.remove(pos);
                Ok(Some(event))
            }
            Pending::Garbage(got) => {
                state.pending.remove(pos);
                Err(ReadError::Short {
                    got,
                    expected: RECORD_SIZE,
                })
            }
        }
    }

    fn key_state(&self) -> io::Result<KeyBitmap> {
        let state = self.shared.state.lock();
        if self.gone(&state) || state.truth_unreadable.contains(&self.index) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "key state unavailable",
            ));
        }
        Ok(state.truth.get(&self.index).cloned().unwrap_or_default())
    }

    fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.session == self.session {
            state.closed.insert(self.index);
        }
    }
}

struct VirtualMultiplexer {
    disabled: Vec<bool>,
    shared: Arc<Shared>,
}

impl VirtualMultiplexer {
    fn is_enabled(&self, device: DeviceIndex) -> bool {
        !self.disabled.get(device.0).copied().unwrap_or(true)
    }
}

impl Multiplexer for VirtualMultiplexer {
    fn wait(&mut self, timeout: Duration) -> io::Result<Vec<Readiness>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();

        loop {
            if state.fail_next_wait {
                state.fail_next_wait = false;
                return Err(io::Error::other("virtual multiplexer failure"));
            }
            let disabled = &self.disabled;
            state
                .pending
                .retain(|(d, _)| !disabled.get(d.0).copied().unwrap_or(true));
            if !state.pending.is_empty() || state.woken {
                break;
            }
            if self.shared.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.woken = false;

        let mut seen = HashSet::new();
        let mut ready = Vec::new();
        let mut hangups = Vec::new();
        for (pos, (device, item)) in state.pending.iter().enumerate() {
            if !self.is_enabled(*device) || !seen.insert(*device) {
                continue;
            }
            match item {
                Pending::Hangup => {
                    ready.push(Readiness::Hangup(*device));
                    hangups.push(pos);
                }
                _ => ready.push(Readiness::Readable(*device)),
            }
        }
        for pos in hangups.into_iter().rev() {
            state.pending.remove(pos);
        }

        Ok(ready)
    }

    fn disable(&mut self, device: DeviceIndex) {
        if let Some(slot) = self.disabled.get_mut(device.0) {
            *slot = true;
        }
    }

    fn waker(&self) -> Waker {
        let shared = self.shared.clone();
        Arc::new(move || {
            shared.state.lock().woken = true;
            shared.ready.notify_all();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_devices() -> VirtualInputSource {
        VirtualInputSource::new(vec![
            VirtualDevice::keyboard("Virtual Keyboard"),
            VirtualDevice::mouse("Virtual Mouse"),
        ])
    }

    fn open_with_mux(source: &VirtualInputSource) -> (OpenedDevices, Box<dyn Multiplexer>) {
        let opened = source.open().unwrap();
        let mux = source.multiplexer(&opened).unwrap();
        (opened, mux)
    }

    #[test]
    fn open_reports_devices_in_order() {
        let source = two_devices();
        let opened = source.open().unwrap();
        assert_eq!(opened.devices.len(), 2);
        assert_eq!(opened.devices[0].name, "Virtual Keyboard");
        assert_eq!(opened.devices[1].physical_path, "virtual/input1");
        assert!(opened.devices[1].capabilities.has_rel_axes());
        assert_eq!(source.open_count(), 1);
    }

    #[test]
    fn open_fails_without_devices_or_when_unavailable() {
        let empty = VirtualInputSource::new(Vec::new());
        assert!(matches!(
            empty.open(),
            Err(DiscoveryError::NoDevices { .. })
        ));

        let source = two_devices();
        source.set_unavailable(true);
        assert!(matches!(source.open(), Err(DiscoveryError::Backend(_))));
    }

    #[test]
    fn multiplexer_can_be_made_unavailable() {
        let source = two_devices();
        let opened = source.open().unwrap();
        source.set_multiplexer_unavailable(true);
        assert!(source.multiplexer(&opened).is_err());

        source.set_multiplexer_unavailable(false);
        assert!(source.multiplexer(&opened).is_ok());
    }

    #[test]
    fn wait_reports_each_ready_device_once() {
        let source = two_devices();
        let (opened, mut mux) = open_with_mux(&source);
        source.emit(0, RawEvent::key(30, true));
        source.emit(0, RawEvent::key(31, true));
        source.emit(1, RawEvent::rel(0, 5));

        let ready = mux.wait(Duration::from_millis(10)).unwrap();
        assert_eq!(
            ready,
            vec![
                Readiness::Readable(DeviceIndex(0)),
                Readiness::Readable(DeviceIndex(1))
            ]
        );

        let first = opened.devices[0].handle.read_event().unwrap();
        assert_eq!(first, Some(RawEvent::key(30, true)));
        let second = opened.devices[0].handle.read_event().unwrap();
        assert_eq!(second, Some(RawEvent::key(31, true)));
        assert_eq!(opened.devices[0].handle.read_event().unwrap(), None);
    }

    #[test]
    fn wait_times_out_empty() {
        let source = two_devices();
        let (_opened, mut mux) = open_with_mux(&source);
        let ready = mux.wait(Duration::from_millis(5)).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn waker_interrupts_wait() {
        let source = two_devices();
        let (_opened, mut mux) = open_with_mux(&source);
        let waker = mux.waker();
        let started = Instant::now();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            waker();
        });
        let ready = mux.wait(Duration::from_secs(10)).unwrap();
        handle.join().unwrap();
        assert!(ready.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn hangup_is_reported_and_disabled_devices_are_skipped() {
        let source = two_devices();
        let (_opened, mut mux) = open_with_mux(&source);
        source.hang_up(1);
        let ready = mux.wait(Duration::from_millis(10)).unwrap();
        assert_eq!(ready, vec![Readiness::Hangup(DeviceIndex(1))]);

        mux.disable(DeviceIndex(1));
        source.emit(1, RawEvent::rel(0, 1));
        let ready = mux.wait(Duration::from_millis(5)).unwrap();
        assert!(ready.is_empty());
        assert_eq!(source.pending_len(), 0);
    }

    #[test]
    fn short_read_is_reported_as_error() {
        let source = two_devices();
        let opened = source.open().unwrap();
        source.emit_short_read(0, 8);
        match opened.devices[0].handle.read_event() {
            Err(ReadError::Short { got, expected }) => {
                assert_eq!(got, 8);
                assert_eq!(expected, RECORD_SIZE);
            }
            other => panic!("expected short read, got {other:?}"),
        }
    }

    #[test]
    fn key_state_follows_ground_truth() {
        let source = two_devices();
        let opened = source.open().unwrap();
        let handle = &opened.devices[0].handle;
        assert!(handle.key_state().unwrap().is_empty());

        source.set_key_state(0, [30, 31]);
        let truth = handle.key_state().unwrap();
        assert!(truth.contains(30) && truth.contains(31));

        source.set_key_state_unreadable(0, true);
        assert!(handle.key_state().is_err());
    }

    #[test]
    fn closed_handle_stops_working() {
        let source = two_devices();
        let opened = source.open().unwrap();
        opened.devices[0].handle.close();
        assert!(source.is_closed(0));
        assert!(opened.devices[0].handle.key_state().is_err());
        assert!(opened.devices[0].handle.read_event().is_err());
    }

    #[test]
    fn reopen_invalidates_old_handles() {
        let source = two_devices();
        let first = source.open().unwrap();
        let _second = source.open().unwrap();
        assert!(first.devices[0].handle.key_state().is_err());
        assert_eq!(source.open_count(), 2);
    }
}
