use crate::supervisor::ConnectionState;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Snapshot exposed by the health endpoint.
#[derive(Debug, Serialize)]
pub struct EngineHealth {
    pub uptime_seconds: u64,
    pub connection_state: String,
    pub reconnects: u32,
    pub groups_pending: usize,
    pub records_forwarded: u64,
    pub forward_failures: u64,
}

/// Cheap shared counters bridging the pipeline and the health endpoint.
/// Advisory only: the pipeline never reads these back for control flow.
#[derive(Clone)]
pub struct StatusTracker {
    start_time: Instant,
    connection_state: Arc<parking_lot::Mutex<ConnectionState>>,
    reconnects: Arc<AtomicU32>,
    groups_pending: Arc<AtomicUsize>,
    records_forwarded: Arc<AtomicU64>,
    forward_failures: Arc<AtomicU64>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            connection_state: Arc::new(parking_lot::Mutex::new(ConnectionState::Disconnected)),
            reconnects: Arc::new(AtomicU32::new(0)),
            groups_pending: Arc::new(AtomicUsize::new(0)),
            records_forwarded: Arc::new(AtomicU64::new(0)),
            forward_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        *self.connection_state.lock() = state;
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_groups_pending(&self, count: usize) {
        self.groups_pending.store(count, Ordering::Relaxed);
    }

    pub fn record_forward(&self, success: bool) {
        self.records_forwarded.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.forward_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> EngineHealth {
        EngineHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            connection_state: self.connection_state.lock().as_str().to_string(),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            groups_pending: self.groups_pending.load(Ordering::Relaxed),
            records_forwarded: self.records_forwarded.load(Ordering::Relaxed),
            forward_failures: self.forward_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_updates() {
        let status = StatusTracker::new();
        status.set_connection_state(ConnectionState::Listening);
        status.record_reconnect();
        status.set_groups_pending(3);
        status.record_forward(true);
        status.record_forward(false);

        let health = status.snapshot();
        assert_eq!(health.connection_state, "listening");
        assert_eq!(health.reconnects, 1);
        assert_eq!(health.groups_pending, 3);
        assert_eq!(health.records_forwarded, 2);
        assert_eq!(health.forward_failures, 1);
    }
}
