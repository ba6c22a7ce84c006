//! Monotonic server-wide counters, safe to read and update concurrently.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Additive-only counters, except `active_connections` which tracks the
/// accept/close balance. Every field updates independently; there is no
/// cross-counter consistency guarantee (matching §5's concurrency model).
pub struct ServerStats {
    total_requests: AtomicU64,
    total_responses: AtomicU64,
    active_connections: AtomicI64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    start_timestamp: u64,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_responses: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_received(&self, bytes: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn response_sent(&self, bytes: u64) {
        self.total_responses.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_responses(&self) -> u64 {
        self.total_responses.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    /// Renders the counters as a JSON object, for an endpoint like the
    /// demo app's `/api/status`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\"total_requests\":{},\"total_responses\":{},\"active_connections\":{},\"bytes_sent\":{},\"bytes_received\":{},\"start_timestamp\":{}}}",
            self.total_requests(),
            self.total_responses(),
            self.active_connections(),
            self.bytes_sent(),
            self.bytes_received(),
            self.start_timestamp(),
        )
    }
}
