//! Observability and Metrics
//!
//! Metrics collection for monitoring bus health: connections, message
//! traffic, invocation outcomes, and proxy lifecycle.
//!
//! Uses atomic counters for thread-safe collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Global metrics collector for bus operations.
#[derive(Debug)]
pub struct Metrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Total messages sent
    pub messages_sent: AtomicU64,
    /// Total messages received
    pub messages_received: AtomicU64,
    /// Total bytes sent
    pub bytes_sent: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Invocations started locally
    pub invokes_total: AtomicU64,
    /// Invocations that returned an error or throw
    pub invoke_faults: AtomicU64,
    /// Yield tuples streamed to callers
    pub yields_total: AtomicU64,
    /// Release messages sent
    pub releases_sent: AtomicU64,
    /// Release messages received
    pub releases_received: AtomicU64,
    /// Fatal protocol errors observed
    pub protocol_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            invokes_total: AtomicU64::new(0),
            invoke_faults: AtomicU64::new(0),
            yields_total: AtomicU64::new(0),
            releases_sent: AtomicU64::new(0),
            releases_received: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection.
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a message sent.
    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a message received.
    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a locally started invocation.
    pub fn invoke_started(&self) {
        self.invokes_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an invocation that surfaced an error or throw.
    pub fn invoke_faulted(&self) {
        self.invoke_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a yielded tuple.
    pub fn value_yielded(&self) {
        self.yields_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a Release sent to the peer.
    pub fn release_sent(&self) {
        self.releases_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a Release received from the peer.
    pub fn release_received(&self) {
        self.releases_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fatal protocol error.
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            invokes_total: self.invokes_total.load(Ordering::Relaxed),
            invoke_faults: self.invoke_faults.load(Ordering::Relaxed),
            yields_total: self.yields_total.load(Ordering::Relaxed),
            releases_sent: self.releases_sent.load(Ordering::Relaxed),
            releases_received: self.releases_received.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics.
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            messages_sent = snapshot.messages_sent,
            messages_received = snapshot.messages_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            invokes_total = snapshot.invokes_total,
            invoke_faults = snapshot.invoke_faults,
            yields_total = snapshot.yields_total,
            releases_sent = snapshot.releases_sent,
            releases_received = snapshot.releases_received,
            protocol_errors = snapshot.protocol_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Bus metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub invokes_total: u64,
    pub invoke_faults: u64,
    pub yields_total: u64,
    pub releases_sent: u64,
    pub releases_received: u64,
    pub protocol_errors: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance.
static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance.
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.connection_established();
        metrics.message_sent(10);
        metrics.message_sent(5);
        metrics.invoke_started();
        metrics.invoke_faulted();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_total, 1);
        assert_eq!(snapshot.connections_active, 1);
        assert_eq!(snapshot.messages_sent, 2);
        assert_eq!(snapshot.bytes_sent, 15);
        assert_eq!(snapshot.invokes_total, 1);
        assert_eq!(snapshot.invoke_faults, 1);
    }
}
