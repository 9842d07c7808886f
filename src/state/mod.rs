pub mod cache;
pub mod heartbeat;

pub use cache::{refresh_device, refresh_fleet, DeviceCache, FetchError, FleetCache, SnapshotCell};
pub use heartbeat::HeartbeatLog;
