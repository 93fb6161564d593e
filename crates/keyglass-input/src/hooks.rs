//! Lifecycle owner of the registry, the store and the two workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::arena::Arena;
use crate::config::HooksConfig;
use crate::device::{Device, DeviceIndex};
use crate::error::InitError;
use crate::ingest::Ingestor;
use crate::reconcile::Reconciler;
use crate::registry::DeviceRegistry;
use crate::snapshot::Snapshot;
use crate::source::{RawEventSource, Waker};
use crate::store::InputStore;
use crate::time::Clock;

/// Everything that lives between one initialize and the next shutdown.
struct Session {
    registry: Arc<DeviceRegistry>,
    store: Arc<InputStore>,
    running: Arc<AtomicBool>,
    waker: Waker,
    shutdown_tx: Option<Sender<()>>,
    ingest: Option<JoinHandle<()>>,
    reconcile: Option<JoinHandle<()>>,
}

impl Session {
    fn start(
        source: &dyn RawEventSource,
        clock: &Arc<dyn Clock>,
        config: &HooksConfig,
    ) -> Result<Self, InitError> {
        let (registry, mux) = DeviceRegistry::discover(source)?;
        let registry = Arc::new(registry);

        let store = Arc::new(InputStore::new(config.history_capacity));
        store.define_devices(registry.devices(), clock.now());

        let running = Arc::new(AtomicBool::new(true));
        let waker = mux.waker();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();

        let mut session = Session {
            registry: registry.clone(),
            store: store.clone(),
            running: running.clone(),
            waker,
            shutdown_tx: Some(shutdown_tx),
            ingest: None,
            reconcile: None,
        };

        let ingestor = Ingestor::new(registry.clone(), store.clone(), clock.clone());
        let poll_timeout = config.poll_timeout();
        let flag = running.clone();
        let spawned = thread::Builder::new()
            .name("keyglass-ingest".to_string())
            .spawn(move || ingestor.run(mux, &flag, poll_timeout));
        match spawned {
            Ok(handle) => session.ingest = Some(handle),
            Err(source) => {
                session.stop();
                return Err(InitError::Spawn {
                    worker: "ingestion",
                    source,
                });
            }
        }

        let reconciler = Reconciler::new(registry, store, clock.clone(), config.decay_after());
        let (decay_interval, resync_interval) = (config.decay_interval(), config.resync_interval());
        let spawned = thread::Builder::new()
            .name("keyglass-reconcile".to_string())
            .spawn(move || reconciler.run(shutdown_rx, decay_interval, resync_interval));
        match spawned {
            Ok(handle) => session.reconcile = Some(handle),
            Err(source) => {
                session.stop();
                return Err(InitError::Spawn {
                    worker: "reconciliation",
                    source,
                });
            }
        }

        Ok(session)
    }

    /// Signal both workers, join them, then close every device handle.
    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        (self.waker)();
        // Dropping the sender disconnects the reconciliation worker's timed wait.
        self.shutdown_tx.take();

        for (name, handle) in [("ingestion", self.ingest.take()), ("reconciliation", self.reconcile.take())] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    warn!("{name} worker panicked");
                }
            }
        }
        self.registry.close_all();
    }
}

/// Owns discovery, the live store and the worker threads.
///
/// Constructed by [`InputHooks::initialize`]; workers run until
/// [`InputHooks::shutdown`] or drop.
pub struct InputHooks {
    source: Arc<dyn RawEventSource>,
    clock: Arc<dyn Clock>,
    config: HooksConfig,
    session: Option<Session>,
}

impl InputHooks {
    /// Discover devices, build the store and start both workers.
    ///
    /// On error nothing is left running.
    pub fn initialize(
        source: Arc<dyn RawEventSource>,
        clock: Arc<dyn Clock>,
        config: HooksConfig,
    ) -> Result<Self, InitError> {
        let config = config.validate();
        info!("Initializing input hooks");
        let session = Session::start(source.as_ref(), &clock, &config)?;
        info!(devices = session.registry.len(), "Input hooks running");
        Ok(Self {
            source,
            clock,
            config,
            session: Some(session),
        })
    }

    /// Full teardown followed by discovery from scratch.
    ///
    /// On error the hooks stay shut down; a later call may succeed.
    pub fn reinitialize(&mut self) -> Result<(), InitError> {
        info!("Reinitializing input hooks");
        self.shutdown();
        let session = Session::start(self.source.as_ref(), &self.clock, &self.config)?;
        info!(devices = session.registry.len(), "Input hooks running");
        self.session = Some(session);
        Ok(())
    }

    /// Stop and join both workers and close all devices. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
            info!("Input hooks shut down");
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Copy the current state into `arena`. Empty when shut down.
    pub fn snapshot<'a>(&self, arena: &'a mut Arena) -> Snapshot<'a> {
        match &self.session {
            Some(session) => session.store.snapshot(arena),
            None => Snapshot::empty(),
        }
    }

    /// Devices of the current session.
    pub fn devices(&self) -> &[Device] {
        match &self.session {
            Some(session) => session.registry.devices(),
            None => &[],
        }
    }

    pub fn default_keyboard(&self) -> Option<DeviceIndex> {
        self.session.as_ref()?.registry.default_keyboard()
    }

    pub fn default_mouse(&self) -> Option<DeviceIndex> {
        self.session.as_ref()?.registry.default_mouse()
    }

    pub fn config(&self) -> &HooksConfig {
        &self.config
    }

    /// The live store, for callers that need more than snapshots.
    pub fn store(&self) -> Option<&Arc<InputStore>> {
        self.session.as_ref().map(|session| &session.store)
    }
}

impl Drop for InputHooks {
    fn drop(&mut self) {
        self.shutdown();
    }
}
