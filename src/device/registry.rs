use parking_lot::RwLock;

use super::DeviceInstance;

/// Known devices. Discovery may add devices while dispatch reads them.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<Vec<DeviceInstance>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `device`, replacing any device with the same id.
    pub fn add_device(&self, device: DeviceInstance) {
        let mut devices = self.devices.write();
        match devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => *existing = device,
            None => {
                tracing::info!(device = %device.id, gl = %device.gl_version, "device added");
                devices.push(device);
            }
        }
    }

    pub fn remove_device(&self, id: &str) -> Option<DeviceInstance> {
        let mut devices = self.devices.write();
        let index = devices.iter().position(|d| d.id == id)?;
        Some(devices.remove(index))
    }

    /// Snapshot of all devices in the order they were first added.
    pub fn devices(&self) -> Vec<DeviceInstance> {
        self.devices.read().clone()
    }

    pub fn find(&self, id: &str) -> Option<DeviceInstance> {
        self.devices.read().iter().find(|d| d.id == id).cloned()
    }
}
