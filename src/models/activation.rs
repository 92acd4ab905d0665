use serde::{Deserialize, Serialize};

/// A binding of a license to one device/machine pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activation {
    pub id: String,
    pub license_id: String,
    pub device_id: String,
    pub machine_id: String,
    pub activated_at: i64,
    pub deactivated_at: Option<i64>,
    pub active: bool,
}

impl Activation {
    pub fn is_for(&self, device: &DeviceIdentity) -> bool {
        self.device_id == device.device_id && self.machine_id == device.machine_id
    }
}

/// The (device id, machine id) pair a client reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub machine_id: String,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<String>, machine_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            machine_id: machine_id.into(),
        }
    }
}
