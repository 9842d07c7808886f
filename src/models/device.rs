use crate::models::Capability;

/// Last-known state of one managed device, as reported by the backend.
///
/// Every field carries `#[serde(default)]` so a response that omits a field
/// fails closed to empty/false/zero instead of keeping whatever the previous
/// snapshot held. A fetch always replaces the whole snapshot, never single
/// fields.
#[derive(serde::Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub camera_enabled: bool,
    #[serde(default)]
    pub microphone_enabled: bool,
    #[serde(default)]
    pub bluetooth_enabled: bool,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub battery_level: i64,
    #[serde(default)]
    pub last_heartbeat: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl DeviceSnapshot {
    /// Current reported state of one capability toggle.
    pub fn capability_enabled(&self, capability: Capability) -> bool {
        match capability {
            Capability::Camera => self.camera_enabled,
            Capability::Microphone => self.microphone_enabled,
            Capability::Bluetooth => self.bluetooth_enabled,
        }
    }
}

/// Response of the heartbeat endpoint. The endpoint is a write that doubles
/// as a read: the server bumps the device's heartbeat time and echoes it.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct HeartbeatResponse {
    #[serde(default)]
    pub last_heartbeat: String,
}
