use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::api::{ApiClient, ApiError};
use crate::models::Capability;
use crate::state::{refresh_device, refresh_fleet, DeviceCache, FleetCache};

/// Operator-facing notification sink. The console prints colored lines;
/// tests record what was said.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// No snapshot is cached yet, so the flip target is undefined. Nothing
    /// was sent to the server.
    #[error("no snapshot for device {0}; cannot toggle")]
    SnapshotMissing(String),

    #[error("command failed: {0}")]
    Command(#[from] ApiError),
}

/// Sends capability commands and reconciles the cache against server truth.
///
/// The cache is never updated optimistically: displayed state changes only
/// once the reconciling fetch lands, so a command the server rejected after
/// acknowledgment can never show as applied. The desired state is always the
/// binary flip of the last-known cached value.
pub struct Dispatcher {
    api: ApiClient,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(api: ApiClient, notifier: Arc<dyn Notifier>) -> Self {
        Self { api, notifier }
    }

    /// Toggle a capability from the single-device view. Reconciles by
    /// re-fetching that device; a failed reconcile is silent, the next poll
    /// tick will catch up.
    #[instrument(skip(self, cache))]
    pub async fn toggle_device(
        &self,
        cache: &DeviceCache,
        device_id: &str,
        capability: Capability,
    ) -> Result<(), DispatchError> {
        let Some(snapshot) = cache.get() else {
            return self.refuse_without_snapshot(device_id, capability);
        };
        let desired = !snapshot.capability_enabled(capability);

        self.send(device_id, capability, desired).await?;

        if let Err(e) = refresh_device(&self.api, cache, device_id).await {
            debug!("post-command refresh failed: {}", e);
        }
        Ok(())
    }

    /// Toggle a capability from the fleet view. Reconciles by re-fetching
    /// the whole fleet; a failed fleet fetch is operator-visible.
    #[instrument(skip(self, cache))]
    pub async fn toggle_in_fleet(
        &self,
        cache: &FleetCache,
        device_id: &str,
        capability: Capability,
    ) -> Result<(), DispatchError> {
        let row = cache
            .get()
            .and_then(|fleet| fleet.into_iter().find(|d| d.device_id == device_id));
        let Some(snapshot) = row else {
            return self.refuse_without_snapshot(device_id, capability);
        };
        let desired = !snapshot.capability_enabled(capability);

        self.send(device_id, capability, desired).await?;

        if let Err(e) = refresh_fleet(&self.api, cache).await {
            self.notifier
                .error(&format!("Failed to refresh device list: {}", e));
        }
        Ok(())
    }

    /// The write itself. Must complete, success or failure, before any
    /// reconciling fetch is issued.
    async fn send(
        &self,
        device_id: &str,
        capability: Capability,
        desired: bool,
    ) -> Result<(), DispatchError> {
        match self.api.set_capability(device_id, capability, desired).await {
            Ok(()) => {
                self.notifier.success(&format!(
                    "Command sent: {} {} on {}",
                    if desired { "enable" } else { "disable" },
                    capability,
                    device_id
                ));
                Ok(())
            }
            Err(e) => {
                self.notifier
                    .error(&format!("Failed to send {} command: {}", capability, e));
                Err(DispatchError::Command(e))
            }
        }
    }

    fn refuse_without_snapshot(
        &self,
        device_id: &str,
        capability: Capability,
    ) -> Result<(), DispatchError> {
        self.notifier.error(&format!(
            "No known state for {} yet; not toggling {}",
            device_id, capability
        ));
        Err(DispatchError::SnapshotMissing(device_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceSnapshot;
    use crate::session::SessionContext;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        successes: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn success(&self, message: &str) {
            self.successes.lock().unwrap().push(message.to_string());
        }
        fn error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    fn dispatcher_for(server: &Server) -> (Dispatcher, Arc<RecordingNotifier>) {
        let api = ApiClient::new(server.url(), SessionContext::new()).unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        (Dispatcher::new(api, notifier.clone()), notifier)
    }

    fn cached(camera: bool) -> DeviceCache {
        let cache = DeviceCache::new();
        let t = cache.begin_fetch();
        cache.apply(
            t,
            DeviceSnapshot {
                device_id: "android-test".into(),
                camera_enabled: camera,
                ..DeviceSnapshot::default()
            },
        );
        cache
    }

    #[tokio::test]
    async fn success_notifies_then_reconciles_with_server_truth() {
        let mut server = Server::new_async().await;
        let command = server
            .mock("POST", "/devices/android-test/camera")
            .match_body(Matcher::Json(json!({ "enabled": true })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let reconcile = server
            .mock("GET", "/devices/android-test/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "device_id": "android-test", "camera_enabled": true }).to_string(),
            )
            .create_async()
            .await;

        let (dispatcher, notifier) = dispatcher_for(&server);
        let cache = cached(false);

        dispatcher
            .toggle_device(&cache, "android-test", Capability::Camera)
            .await
            .unwrap();

        command.assert_async().await;
        reconcile.assert_async().await;
        // Displayed state flipped only because the re-fetch said so.
        assert!(cache.get().unwrap().camera_enabled);
        assert_eq!(notifier.successes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failure_leaves_cache_untouched_and_skips_reconcile() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/devices/android-test/camera")
            .with_status(500)
            .with_body("device offline")
            .create_async()
            .await;
        let reconcile = server
            .mock("GET", "/devices/android-test/status")
            .expect(0)
            .create_async()
            .await;

        let (dispatcher, notifier) = dispatcher_for(&server);
        let cache = cached(false);
        let before = cache.get();

        let result = dispatcher
            .toggle_device(&cache, "android-test", Capability::Camera)
            .await;

        assert!(matches!(result, Err(DispatchError::Command(_))));
        assert_eq!(cache.get(), before);
        reconcile.assert_async().await;
        assert_eq!(notifier.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_snapshot_is_a_guarded_noop() {
        let mut server = Server::new_async().await;
        let command = server
            .mock("POST", "/devices/android-test/camera")
            .expect(0)
            .create_async()
            .await;

        let (dispatcher, notifier) = dispatcher_for(&server);
        let cache = DeviceCache::new();

        let result = dispatcher
            .toggle_device(&cache, "android-test", Capability::Camera)
            .await;

        assert!(matches!(result, Err(DispatchError::SnapshotMissing(_))));
        command.assert_async().await;
        assert_eq!(notifier.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fleet_toggle_flips_row_state_and_refetches_fleet() {
        let mut server = Server::new_async().await;
        // Row says microphone is on, so the dispatched command turns it off.
        let command = server
            .mock("POST", "/devices/android-test/microphone")
            .match_body(Matcher::Json(json!({ "enabled": false })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let reconcile = server
            .mock("GET", "/devices")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([{ "device_id": "android-test", "microphone_enabled": false }]).to_string(),
            )
            .create_async()
            .await;

        let (dispatcher, _) = dispatcher_for(&server);
        let cache = FleetCache::new();
        let t = cache.begin_fetch();
        cache.apply(
            t,
            vec![DeviceSnapshot {
                device_id: "android-test".into(),
                microphone_enabled: true,
                ..DeviceSnapshot::default()
            }],
        );

        dispatcher
            .toggle_in_fleet(&cache, "android-test", Capability::Microphone)
            .await
            .unwrap();

        command.assert_async().await;
        reconcile.assert_async().await;
        assert!(!cache.get().unwrap()[0].microphone_enabled);
    }

    #[tokio::test]
    async fn fleet_reconcile_failure_is_operator_visible() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/devices/android-test/bluetooth")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("GET", "/devices")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let (dispatcher, notifier) = dispatcher_for(&server);
        let cache = FleetCache::new();
        let t = cache.begin_fetch();
        cache.apply(
            t,
            vec![DeviceSnapshot {
                device_id: "android-test".into(),
                ..DeviceSnapshot::default()
            }],
        );

        dispatcher
            .toggle_in_fleet(&cache, "android-test", Capability::Bluetooth)
            .await
            .unwrap();

        assert_eq!(notifier.successes.lock().unwrap().len(), 1);
        assert!(notifier.errors.lock().unwrap()[0].contains("refresh"));
        // The stale rows are still displayed, not wiped.
        assert_eq!(cache.get().unwrap().len(), 1);
    }
}
