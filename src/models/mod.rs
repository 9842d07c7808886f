pub mod claims;
pub mod command;
pub mod device;

// Re-export common types for easier access
pub use claims::{decode_claims, DecodeError, Role, TokenClaims};
pub use command::{Capability, CapabilityPayload, LoginRequest, LoginResponse};
pub use device::{DeviceSnapshot, HeartbeatResponse};
