//! Reconciliation worker: idle decay of axis histories and periodic
//! resynchronization of pressed keys against device ground truth.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use tracing::{debug, info};

use crate::registry::DeviceRegistry;
use crate::store::InputStore;
use crate::time::Clock;

pub struct Reconciler {
    registry: Arc<DeviceRegistry>,
    store: Arc<InputStore>,
    clock: Arc<dyn Clock>,
    decay_after: Duration,
}

impl Reconciler {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        store: Arc<InputStore>,
        clock: Arc<dyn Clock>,
        decay_after: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            decay_after,
        }
    }

    /// Push a zero into every axis idle for longer than the threshold.
    /// Returns how many axes were decayed.
    pub fn decay_pass(&self) -> usize {
        let now = self.clock.now();
        self.store
            .axis_handles()
            .filter(|&handle| self.store.decay_axis(handle, now, self.decay_after))
            .count()
    }

    /// Drop pressed keys the device no longer reports as down.
    /// Returns how many codes were removed.
    pub fn resync_pass(&self) -> usize {
        let mut removed = 0;
        for handle in self.store.key_list_handles() {
            let Some((device, codes)) = self.store.pressed_keys(handle) else {
                continue;
            };
            if codes.is_empty() {
                continue;
            }

            let truth = match self.registry.key_state(device) {
                Ok(truth) => truth,
                Err(e) => {
                    debug!(device = %device, "Skipping resync: {e}");
                    continue;
                }
            };

            let stale: Vec<u16> = codes.into_iter().filter(|&c| !truth.contains(c)).collect();
            if stale.is_empty() {
                continue;
            }
            let pruned = self.store.prune_keys(handle, &stale);
            if pruned > 0 {
                info!(device = %device, codes = ?stale, "Released stale keys");
            }
            removed += pruned;
        }
        removed
    }

    /// Tick every `decay_interval` until `shutdown` receives or disconnects.
    pub fn run(&self, shutdown: Receiver<()>, decay_interval: Duration, resync_interval: Duration) {
        info!("Reconciliation worker started");
        let mut last_resync = self.clock.now();
        loop {
            match shutdown.recv_timeout(decay_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            self.decay_pass();
            let now = self.clock.now();
            if now.since(last_resync) >= resync_interval {
                self.resync_pass();
                last_resync = now;
            }
        }
        info!("Reconciliation worker stopped");
    }
}
