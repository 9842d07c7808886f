use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::ApiClient;
use crate::state::{refresh_device, DeviceCache, HeartbeatLog};

/// Single-device status poll period.
pub const DEVICE_POLL_PERIOD: Duration = Duration::from_secs(5);
/// Heartbeat poll period.
pub const HEARTBEAT_POLL_PERIOD: Duration = Duration::from_secs(10);

/// Handle to one running poll loop. Stopping (or dropping) it cancels that
/// loop and nothing else; loops never coordinate with each other.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start the single-device status loop: one fetch immediately, then one per
/// period, ticked wall-clock from the start rather than chained onto each
/// fetch's completion. Each tick's fetch runs as its own task, so a slow
/// response never delays the next tick; if two responses for the device
/// race, the cache's ticket guard keeps the fresher one.
///
/// Poll failures are silent: the previous snapshot stays displayed and the
/// next tick retries naturally.
pub fn spawn_device_poll(
    handle: &Handle,
    api: ApiClient,
    cache: DeviceCache,
    device_id: String,
    period: Duration,
) -> PollHandle {
    let task = handle.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let api = api.clone();
            let cache = cache.clone();
            let device_id = device_id.clone();
            tokio::spawn(async move {
                if let Err(e) = refresh_device(&api, &cache, &device_id).await {
                    debug!("status poll for {} failed: {}", device_id, e);
                }
            });
        }
    });
    PollHandle { task }
}

/// Start the heartbeat loop: a write-style ping per period whose response is
/// read back into the log. A failed tick contributes no entry at all.
pub fn spawn_heartbeat_poll(
    handle: &Handle,
    api: ApiClient,
    log: HeartbeatLog,
    device_id: String,
    period: Duration,
) -> PollHandle {
    let task = handle.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let api = api.clone();
            let log = log.clone();
            let device_id = device_id.clone();
            tokio::spawn(async move {
                match api.heartbeat(&device_id).await {
                    Ok(response) => log.record(&response.last_heartbeat),
                    Err(e) => debug!("heartbeat poll for {} failed: {}", device_id, e),
                }
            });
        }
    });
    PollHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionContext;
    use mockito::Server;
    use serde_json::json;

    const TICK: Duration = Duration::from_millis(40);

    fn api_for(server: &Server) -> ApiClient {
        ApiClient::new(server.url(), SessionContext::new()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn device_poll_fetches_immediately_and_periodically() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/devices/android-test/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "device_id": "android-test" }).to_string())
            .expect_at_least(2)
            .create_async()
            .await;

        let cache = DeviceCache::new();
        let poll = spawn_device_poll(
            &Handle::current(),
            api_for(&server),
            cache.clone(),
            "android-test".to_string(),
            TICK,
        );

        tokio::time::sleep(TICK * 3).await;
        poll.stop();

        mock.assert_async().await;
        assert_eq!(cache.get().unwrap().device_id, "android-test");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stopped_poll_fires_no_further_fetches() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/devices/android-test/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "device_id": "android-test" }).to_string())
            .create_async()
            .await;

        let cache = DeviceCache::new();
        let poll = spawn_device_poll(
            &Handle::current(),
            api_for(&server),
            cache,
            "android-test".to_string(),
            TICK,
        );

        tokio::time::sleep(TICK * 2).await;
        poll.stop();
        tokio::time::sleep(TICK).await;

        // After the loop is gone, a fresh mock shadowing the route must see
        // zero hits.
        let after_stop = server
            .mock("GET", "/devices/android-test/status")
            .expect(0)
            .create_async()
            .await;
        tokio::time::sleep(TICK * 4).await;
        after_stop.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn heartbeat_poll_appends_one_entry_per_successful_tick() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/devices/android-test/heartbeat")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "last_heartbeat": "2025-03-04T00:00:00Z" }).to_string())
            .expect_at_least(2)
            .create_async()
            .await;

        let log = HeartbeatLog::new();
        let poll = spawn_heartbeat_poll(
            &Handle::current(),
            api_for(&server),
            log.clone(),
            "android-test".to_string(),
            TICK,
        );

        tokio::time::sleep(TICK * 3).await;
        poll.stop();

        assert!(log.len() >= 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_heartbeat_ticks_add_no_entries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/devices/android-test/heartbeat")
            .with_status(500)
            .with_body("boom")
            .expect_at_least(3)
            .create_async()
            .await;

        let log = HeartbeatLog::new();
        let poll = spawn_heartbeat_poll(
            &Handle::current(),
            api_for(&server),
            log.clone(),
            "android-test".to_string(),
            TICK,
        );

        tokio::time::sleep(TICK * 4).await;
        poll.stop();

        mock.assert_async().await;
        assert!(log.is_empty());
    }
}
