//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use keyglass_input::source::{VirtualDevice, VirtualInputSource};
use keyglass_input::{Arena, Clock, HooksConfig, InputHooks, Snapshot};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds or `TIMEOUT` passes.
pub fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Poll until a snapshot satisfies `check`.
pub fn wait_for_snapshot<F: FnMut(&Snapshot<'_>) -> bool>(hooks: &InputHooks, mut check: F) -> bool {
    let mut arena = Arena::new();
    wait_until(|| {
        arena.save();
        let ok = check(&hooks.snapshot(&mut arena));
        arena.rewind();
        ok
    })
}

/// Fast ticks, no spontaneous decay and no resync unless a test asks for it.
pub fn quiet_config() -> HooksConfig {
    HooksConfig {
        poll_timeout_ms: 20,
        decay_interval_ms: 10,
        decay_after_ms: 60_000,
        resync_interval_ms: 60_000,
        ..HooksConfig::default()
    }
}

/// Keyboard with one absolute axis, then a mouse.
pub fn standard_devices() -> Vec<VirtualDevice> {
    vec![
        VirtualDevice::keyboard("AT Translated Set 2 keyboard").with_abs_axis(1, 100, 0, 255),
        VirtualDevice::mouse("Logitech USB Optical Mouse"),
    ]
}

pub fn start(
    devices: Vec<VirtualDevice>,
    clock: Arc<dyn Clock>,
    config: HooksConfig,
) -> (Arc<VirtualInputSource>, InputHooks) {
    let source = Arc::new(VirtualInputSource::new(devices));
    let hooks = InputHooks::initialize(source.clone(), clock, config).unwrap();
    (source, hooks)
}

pub fn sorted(codes: &[u16]) -> Vec<u16> {
    let mut codes = codes.to_vec();
    codes.sort_unstable();
    codes
}
