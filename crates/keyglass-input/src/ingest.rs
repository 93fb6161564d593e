//! Event ingestion worker.
//!
//! One thread waits on the multiplexer across all devices and, for each ready
//! device, reads a single record and applies it to the store.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::device::DeviceIndex;
use crate::error::ReadError;
use crate::event::{EventClass, RawEvent, is_keyboard_key, is_mouse_button};
use crate::registry::DeviceRegistry;
use crate::source::{Multiplexer, Readiness};
use crate::store::InputStore;
use crate::time::Clock;

pub struct Ingestor {
    registry: Arc<DeviceRegistry>,
    store: Arc<InputStore>,
    clock: Arc<dyn Clock>,
}

impl Ingestor {
    pub fn new(registry: Arc<DeviceRegistry>, store: Arc<InputStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            store,
            clock,
        }
    }

    /// Apply one decoded event from `device`.
    pub fn process(&self, device: DeviceIndex, event: RawEvent) {
        match event.class {
            EventClass::Key => {
                // 2 is autorepeat; only transitions matter.
                let down = match event.value {
                    1 => true,
                    0 => false,
                    _ => return,
                };
                if is_mouse_button(event.code) {
                    self.registry.mark_default_mouse(device);
                } else if is_keyboard_key(event.code) {
                    self.registry.mark_default_keyboard(device);
                }
                self.store.set_key(device, event.code, down);
            }
            EventClass::Absolute => {
                self.store
                    .push_abs_value(device, event.code, self.clock.now(), event.value);
            }
            EventClass::Relative => {
                self.registry.mark_default_mouse(device);
                self.store
                    .push_rel_value(device, event.code, self.clock.now(), event.value);
            }
            EventClass::Synchronize | EventClass::Other(_) => {}
        }
    }

    /// One readiness wait followed by one read per ready device.
    ///
    /// Returns how many devices were serviced. An error means the multiplexer
    /// itself failed.
    pub fn poll_once(&self, mux: &mut dyn Multiplexer, timeout: Duration) -> io::Result<usize> {
        let ready = mux.wait(timeout)?;
        for readiness in &ready {
            match *readiness {
                Readiness::Readable(device) => self.read_one(mux, device),
                Readiness::Hangup(device) => {
                    warn!(device = %device, "Device hung up; disabling");
                    self.degrade(mux, device);
                }
            }
        }
        Ok(ready.len())
    }

    /// Loop until `running` is cleared or the multiplexer fails.
    pub fn run(&self, mut mux: Box<dyn Multiplexer>, running: &AtomicBool, poll_timeout: Duration) {
        info!(devices = self.registry.len(), "Ingestion worker started");
        while running.load(Ordering::Acquire) {
            if let Err(e) = self.poll_once(mux.as_mut(), poll_timeout) {
                error!("Readiness wait failed, stopping ingestion: {e}");
                break;
            }
        }
        info!("Ingestion worker stopped");
    }

    fn read_one(&self, mux: &mut dyn Multiplexer, device: DeviceIndex) {
        let Some(handle) = self.registry.handle(device) else {
            warn!(device = %device, "Readiness for unknown device");
            mux.disable(device);
            return;
        };

        match handle.read_event() {
            Ok(Some(event)) => self.process(device, event),
            Ok(None) => {}
            Err(e @ ReadError::Short { .. }) => {
                warn!(device = %device, "Skipping malformed record: {e}");
            }
            Err(ReadError::Io(e)) => {
                warn!(device = %device, "Device read failed, disabling: {e}");
                self.degrade(mux, device);
            }
        }
    }

    /// Stop polling `device` for the rest of the session and release its handle.
    fn degrade(&self, mux: &mut dyn Multiplexer, device: DeviceIndex) {
        mux.disable(device);
        self.registry.close(device);
        debug!(device = %device, "Device closed");
    }
}
