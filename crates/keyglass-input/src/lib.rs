//! Input-state aggregation for the keyglass overlay.
//!
//! This crate provides:
//! - [`InputHooks`]: lifecycle owner (initialize, reinitialize, shutdown, snapshot)
//! - [`InputStore`]: the single locked aggregate of pressed keys and axis histories
//! - [`Arena`] and [`Snapshot`]: per-frame, checkpointable copies handed to a renderer
//! - [`DeviceRegistry`]: devices discovered through a [`RawEventSource`]
//! - Ingestion and reconciliation workers that keep the store current

pub mod arena;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod hooks;
pub mod ingest;
pub mod reconcile;
pub mod registry;
pub mod ring;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod time;

pub use arena::Arena;
pub use config::HooksConfig;
pub use device::{AbsAxisInfo, Capabilities, Device, DeviceIndex, DeviceType};
pub use error::{DiscoveryError, InitError, ReadError};
pub use event::{EventClass, KeyBitmap, RawEvent};
pub use hooks::InputHooks;
pub use registry::DeviceRegistry;
pub use ring::HistoryRing;
pub use snapshot::{AxisSnapshot, PressedKeys, Snapshot};
pub use source::{
    DeviceHandle, Multiplexer, OpenedDevice, OpenedDevices, RawEventSource, Readiness, Waker,
};
pub use store::{AxisHandle, InputStore, KeyListHandle};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
