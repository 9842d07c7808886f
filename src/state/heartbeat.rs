use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};

/// Default bound on retained heartbeat entries. The source of each entry is
/// a 10-second poll, so this covers well over half an hour of history.
pub const DEFAULT_CAPACITY: usize = 256;

/// Session-scoped, newest-first log of observed heartbeats.
///
/// Entries are only ever prepended; a failed heartbeat tick contributes
/// nothing, not even a placeholder. The log is a ring: once full, the
/// oldest entry falls off. It is never persisted.
#[derive(Clone)]
pub struct HeartbeatLog {
    entries: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl HeartbeatLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    /// Record one observed heartbeat time, newest first.
    pub fn record(&self, last_heartbeat: &str) {
        let rendered = match DateTime::parse_from_rfc3339(last_heartbeat) {
            Ok(ts) => format!(
                "Heartbeat: {}",
                ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
            // An unparseable timestamp is still worth showing raw.
            Err(_) => format!("Heartbeat: {}", last_heartbeat),
        };

        let mut entries = self.entries.lock().expect("log lock poisoned");
        entries.push_front(rendered);
        while entries.len() > self.capacity {
            entries.pop_back();
        }
    }

    /// Entries, newest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("log lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries, e.g. on logout.
    pub fn clear(&self) {
        self.entries.lock().expect("log lock poisoned").clear();
    }
}

impl Default for HeartbeatLog {
    fn default() -> Self {
        Self::new()
    }
}
