//! Devices discovered at initialization time.
//!
//! Append-only: the device list and handles never change after `discover`.
//! Hot-plug is handled by a full reinitialize.

use std::io;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::device::{Device, DeviceIndex, DeviceType};
use crate::error::InitError;
use crate::event::KeyBitmap;
use crate::source::{DeviceHandle, Multiplexer, RawEventSource};

pub struct DeviceRegistry {
    devices: Vec<Device>,
    handles: Vec<Arc<dyn DeviceHandle>>,
    default_keyboard: OnceLock<DeviceIndex>,
    default_mouse: OnceLock<DeviceIndex>,
}

impl DeviceRegistry {
    /// Open every device `source` offers and assign indices in the order given.
    ///
    /// The multiplexer over the opened devices is handed back separately since
    /// it belongs to the ingestion worker. If it cannot be built, the opened
    /// handles are closed again.
    pub fn discover(
        source: &dyn RawEventSource,
    ) -> Result<(Self, Box<dyn Multiplexer>), InitError> {
        let opened = source.open()?;
        let multiplexer = match source.multiplexer(&opened) {
            Ok(multiplexer) => multiplexer,
            Err(e) => {
                opened.close_all();
                return Err(InitError::Multiplexer(e));
            }
        };

        let mut devices = Vec::with_capacity(opened.devices.len());
        let mut handles = Vec::with_capacity(opened.devices.len());
        for (i, opened_device) in opened.devices.into_iter().enumerate() {
            let device = Device {
                index: DeviceIndex(i),
                device_type: DeviceType::classify(&opened_device.name),
                name: opened_device.name,
                physical_path: opened_device.physical_path,
                capabilities: opened_device.capabilities,
            };
            debug!(
                device = %device.index,
                name = %device.name,
                kind = ?device.device_type,
                keys = device.capabilities.keys.len(),
                abs_axes = device.capabilities.abs_axes.len(),
                rel_axes = device.capabilities.rel_axes.len(),
                "Discovered device"
            );
            devices.push(device);
            handles.push(opened_device.handle);
        }
        info!(count = devices.len(), "Device discovery complete");

        let registry = Self {
            devices,
            handles,
            default_keyboard: OnceLock::new(),
            default_mouse: OnceLock::new(),
        };
        Ok((registry, multiplexer))
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, index: DeviceIndex) -> Option<&Device> {
        self.devices.get(index.0)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub(crate) fn handle(&self, index: DeviceIndex) -> Option<&Arc<dyn DeviceHandle>> {
        self.handles.get(index.0)
    }

    /// Ground-truth key state of one device.
    pub fn key_state(&self, index: DeviceIndex) -> io::Result<KeyBitmap> {
        match self.handle(index) {
            Some(handle) => handle.key_state(),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no device {index}"),
            )),
        }
    }

    pub fn close(&self, index: DeviceIndex) {
        if let Some(handle) = self.handle(index) {
            handle.close();
        }
    }

    pub fn close_all(&self) {
        for handle in &self.handles {
            handle.close();
        }
    }

    pub fn default_keyboard(&self) -> Option<DeviceIndex> {
        self.default_keyboard.get().copied()
    }

    pub fn default_mouse(&self) -> Option<DeviceIndex> {
        self.default_mouse.get().copied()
    }

    /// Mark `index` as the default keyboard unless one is already set.
    pub fn mark_default_keyboard(&self, index: DeviceIndex) {
        if self.default_keyboard.set(index).is_ok() {
            info!(device = %index, name = %self.name_of(index), "Default keyboard detected");
        }
    }

    /// Mark `index` as the default mouse unless one is already set.
    pub fn mark_default_mouse(&self, index: DeviceIndex) {
        if self.default_mouse.set(index).is_ok() {
            info!(device = %index, name = %self.name_of(index), "Default mouse detected");
        }
    }

    fn name_of(&self, index: DeviceIndex) -> &str {
        self.device(index).map(|d| d.name.as_str()).unwrap_or("?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoveryError;
    use crate::source::{VirtualDevice, VirtualInputSource};

    fn source() -> VirtualInputSource {
        VirtualInputSource::new(vec![
            VirtualDevice::keyboard("AT Translated Set 2 keyboard"),
            VirtualDevice::mouse("Logitech USB Optical Mouse"),
            VirtualDevice::new("Power Button").with_keys([116]),
        ])
    }

    #[test]
    fn discover_assigns_indices_in_order_and_classifies() {
        let source = source();
        let (registry, _mux) = DeviceRegistry::discover(&source).unwrap();

        assert_eq!(registry.len(), 3);
        let types: Vec<_> = registry.devices().iter().map(|d| d.device_type).collect();
        assert_eq!(
            types,
            vec![DeviceType::Keyboard, DeviceType::Mouse, DeviceType::Unknown]
        );
        for (i, device) in registry.devices().iter().enumerate() {
            assert_eq!(device.index, DeviceIndex(i));
        }
    }

    #[test]
    fn discover_propagates_backend_failure() {
        let source = VirtualInputSource::new(vec![]);
        assert!(matches!(
            DeviceRegistry::discover(&source),
            Err(InitError::Discovery(DiscoveryError::NoDevices { .. }))
        ));
    }

    #[test]
    fn discover_reports_multiplexer_failure_and_closes_handles() {
        let source = source();
        source.set_multiplexer_unavailable(true);
        assert!(matches!(
            DeviceRegistry::discover(&source),
            Err(InitError::Multiplexer(_))
        ));
        assert!((0..3).all(|i| source.is_closed(i)));
    }

    #[test]
    fn defaults_are_write_once() {
        let source = source();
        let (registry, _mux) = DeviceRegistry::discover(&source).unwrap();
        assert_eq!(registry.default_keyboard(), None);

        registry.mark_default_keyboard(DeviceIndex(2));
        registry.mark_default_keyboard(DeviceIndex(0));
        registry.mark_default_mouse(DeviceIndex(1));
        registry.mark_default_mouse(DeviceIndex(0));

        assert_eq!(registry.default_keyboard(), Some(DeviceIndex(2)));
        assert_eq!(registry.default_mouse(), Some(DeviceIndex(1)));
    }

    #[test]
    fn key_state_reads_ground_truth_until_closed() {
        let source = source();
        let (registry, _mux) = DeviceRegistry::discover(&source).unwrap();
        source.set_key_state(0, [30, 31]);

        let state = registry.key_state(DeviceIndex(0)).unwrap();
        assert!(state.contains(30) && state.contains(31));
        assert!(registry.key_state(DeviceIndex(7)).is_err());

        registry.close(DeviceIndex(0));
        assert!(registry.key_state(DeviceIndex(0)).is_err());
        assert!(registry.key_state(DeviceIndex(1)).is_ok());
    }
}
