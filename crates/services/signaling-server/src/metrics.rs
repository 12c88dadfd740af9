//! Metrics collection for the signaling service
//!
//! Counters since startup, exposed read-only over `GET /metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Signaling metrics collector
#[derive(Default)]
pub struct Metrics {
    /// Endpoints connected since startup
    endpoints_connected: AtomicU64,

    /// Endpoints disconnected or evicted since startup
    endpoints_disconnected: AtomicU64,

    /// Inbound messages accepted from live endpoints
    messages_received: AtomicU64,

    /// Inbound messages rejected as malformed
    messages_malformed: AtomicU64,

    /// Negotiation messages forwarded to their target
    negotiations_relayed: AtomicU64,

    /// Negotiation messages dropped (stale sender or absent target)
    relays_dropped: AtomicU64,

    /// Fallback frames fanned out to viewers
    frames_relayed: AtomicU64,

    /// Stream requests brokered
    stream_requests: AtomicU64,

    /// Endpoints evicted for inactivity
    endpoints_evicted: AtomicU64,

    /// Dangling pairings removed by the sweeper
    pairings_pruned: AtomicU64,

    /// Startup timestamp (unix seconds)
    startup_time: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            startup_time: AtomicU64::new(now),
            ..Default::default()
        }
    }

    pub fn endpoint_connected(&self) {
        self.endpoints_connected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn endpoint_disconnected(&self) {
        self.endpoints_disconnected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_malformed(&self) {
        self.messages_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn negotiation_relayed(&self) {
        self.negotiations_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relay_dropped(&self) {
        self.relays_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_relayed(&self, recipients: u64) {
        self.frames_relayed.fetch_add(recipients, Ordering::Relaxed);
    }

    pub fn stream_requested(&self) {
        self.stream_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn endpoints_evicted(&self, count: u64) {
        self.endpoints_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn pairings_pruned(&self, count: u64) {
        self.pairings_pruned.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let uptime_secs = now.saturating_sub(self.startup_time.load(Ordering::Relaxed));

        MetricsSnapshot {
            endpoints_connected: self.endpoints_connected.load(Ordering::Relaxed),
            endpoints_disconnected: self.endpoints_disconnected.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_malformed: self.messages_malformed.load(Ordering::Relaxed),
            negotiations_relayed: self.negotiations_relayed.load(Ordering::Relaxed),
            relays_dropped: self.relays_dropped.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            stream_requests: self.stream_requests.load(Ordering::Relaxed),
            endpoints_evicted: self.endpoints_evicted.load(Ordering::Relaxed),
            pairings_pruned: self.pairings_pruned.load(Ordering::Relaxed),
            uptime_secs,
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub endpoints_connected: u64,
    pub endpoints_disconnected: u64,
    pub messages_received: u64,
    pub messages_malformed: u64,
    pub negotiations_relayed: u64,
    pub relays_dropped: u64,
    pub frames_relayed: u64,
    pub stream_requests: u64,
    pub endpoints_evicted: u64,
    pub pairings_pruned: u64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}
