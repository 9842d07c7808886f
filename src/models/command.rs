use std::fmt;
use std::str::FromStr;

/// Remotely controllable capability of a managed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Camera,
    Microphone,
    Bluetooth,
}

impl Capability {
    /// Path segment of the capability's command endpoint,
    /// `POST /devices/{device_id}/<segment>`.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Capability::Camera => "camera",
            Capability::Microphone => "microphone",
            Capability::Bluetooth => "bluetooth",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "camera" | "cam" => Ok(Capability::Camera),
            "microphone" | "mic" => Ok(Capability::Microphone),
            "bluetooth" | "bt" => Ok(Capability::Bluetooth),
            other => Err(format!("unknown capability: {}", other)),
        }
    }
}

/// Body of a capability command, `{ "enabled": bool }`.
#[derive(Debug, serde::Serialize)]
pub struct CapabilityPayload {
    pub enabled: bool,
}

/// Body of the login request.
#[derive(Debug, serde::Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response of the login endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct LoginResponse {
    pub token: String,
}
