use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

use crate::api::{ApiClient, ApiError};
use crate::models::DeviceSnapshot;

#[derive(Debug, Error)]
#[error("fetch failed: {0}")]
pub struct FetchError(#[from] pub ApiError);

/// Last-known value of one polled entity.
///
/// Writes are destructive wholesale replacement — a fetch response never
/// merges into the previous value. Concurrent fetches for the same cell are
/// not locked against each other; instead each fetch takes a ticket before
/// its request goes out, and a response whose ticket is older than the
/// latest applied one is dropped, so a slow stale response cannot overwrite
/// a fresher one.
#[derive(Clone)]
pub struct SnapshotCell<T> {
    inner: Arc<Mutex<CellState<T>>>,
}

struct CellState<T> {
    value: Option<T>,
    issued: u64,
    applied: u64,
}

/// Ordering token for one in-flight fetch. Taken before the request is
/// issued, redeemed when its response arrives.
#[derive(Debug, Clone, Copy)]
pub struct FetchTicket(u64);

impl<T: Clone> SnapshotCell<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CellState {
                value: None,
                issued: 0,
                applied: 0,
            })),
        }
    }

    /// Register an outgoing fetch and get its ordering ticket.
    pub fn begin_fetch(&self) -> FetchTicket {
        let mut state = self.inner.lock().expect("cache lock poisoned");
        state.issued += 1;
        FetchTicket(state.issued)
    }

    /// Install a fetch response, replacing the previous value wholesale.
    /// Returns false if a later-issued fetch already landed, in which case
    /// the stale response is discarded.
    pub fn apply(&self, ticket: FetchTicket, value: T) -> bool {
        let mut state = self.inner.lock().expect("cache lock poisoned");
        if ticket.0 <= state.applied {
            debug!("dropping stale fetch response (ticket {})", ticket.0);
            return false;
        }
        state.applied = ticket.0;
        state.value = Some(value);
        true
    }

    /// Last applied value, if any fetch has succeeded yet.
    pub fn get(&self) -> Option<T> {
        self.inner.lock().expect("cache lock poisoned").value.clone()
    }

    /// Drop the cached value, e.g. when the owning view unmounts.
    pub fn clear(&self) {
        self.inner.lock().expect("cache lock poisoned").value = None;
    }
}

impl<T: Clone> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache of one bound device's snapshot.
pub type DeviceCache = SnapshotCell<DeviceSnapshot>;

/// Cache of the whole fleet, kept in server response order.
pub type FleetCache = SnapshotCell<Vec<DeviceSnapshot>>;

/// Fetch one device's snapshot into the cache. On failure the previous
/// snapshot stays in place; the caller decides whether the failure is
/// operator-visible.
pub async fn refresh_device(
    api: &ApiClient,
    cache: &DeviceCache,
    device_id: &str,
) -> Result<(), FetchError> {
    let ticket = cache.begin_fetch();
    let snapshot = api.fetch_status(device_id).await?;
    cache.apply(ticket, snapshot);
    Ok(())
}

/// Fetch the whole fleet into the cache, same replace-wholesale contract.
pub async fn refresh_fleet(api: &ApiClient, cache: &FleetCache) -> Result<(), FetchError> {
    let ticket = cache.begin_fetch();
    let fleet = api.fetch_fleet().await?;
    cache.apply(ticket, fleet);
    Ok(())
}
