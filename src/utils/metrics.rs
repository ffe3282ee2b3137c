//! Observability and Metrics
//!
//! This module provides metrics collection for monitoring the server's
//! connection and operation traffic.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Total LDAPMessages sent
    pub messages_sent: AtomicU64,
    /// Total LDAPMessages received
    pub messages_received: AtomicU64,
    /// Total bytes sent
    pub bytes_sent: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Bind requests processed
    pub binds_total: AtomicU64,
    /// Bind requests that did not succeed
    pub binds_failed: AtomicU64,
    /// Operations dispatched to handlers
    pub operations_total: AtomicU64,
    /// Operations that ended with a non-success result
    pub operations_failed: AtomicU64,
    /// Operations cancelled by Abandon, Bind or disconnect
    pub operations_abandoned: AtomicU64,
    /// Search entries delivered
    pub entries_sent: AtomicU64,
    /// Completed TLS handshakes
    pub tls_handshakes: AtomicU64,
    /// Failed TLS handshakes
    pub tls_failures: AtomicU64,
    /// Connection errors
    pub connection_errors: AtomicU64,
    /// Protocol errors
    pub protocol_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            binds_total: AtomicU64::new(0),
            binds_failed: AtomicU64::new(0),
            operations_total: AtomicU64::new(0),
            operations_failed: AtomicU64::new(0),
            operations_abandoned: AtomicU64::new(0),
            entries_sent: AtomicU64::new(0),
            tls_handshakes: AtomicU64::new(0),
            tls_failures: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a message sent
    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a message received
    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a bind and whether it succeeded
    pub fn bind(&self, success: bool) {
        self.binds_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.binds_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a dispatched operation
    pub fn operation_started(&self) {
        self.operations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an operation that ended in a non-success result
    pub fn operation_failed(&self) {
        self.operations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cancelled operation
    pub fn operation_abandoned(&self) {
        self.operations_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered search entry
    pub fn entry_sent(&self) {
        self.entries_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a TLS handshake outcome
    pub fn tls_handshake(&self, success: bool) {
        if success {
            self.tls_handshakes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tls_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a connection error
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a protocol error
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            binds_total: self.binds_total.load(Ordering::Relaxed),
            binds_failed: self.binds_failed.load(Ordering::Relaxed),
            operations_total: self.operations_total.load(Ordering::Relaxed),
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
            operations_abandoned: self.operations_abandoned.load(Ordering::Relaxed),
            entries_sent: self.entries_sent.load(Ordering::Relaxed),
            tls_handshakes: self.tls_handshakes.load(Ordering::Relaxed),
            tls_failures: self.tls_failures.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            messages_sent = snapshot.messages_sent,
            messages_received = snapshot.messages_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            binds_total = snapshot.binds_total,
            binds_failed = snapshot.binds_failed,
            operations_total = snapshot.operations_total,
            operations_failed = snapshot.operations_failed,
            operations_abandoned = snapshot.operations_abandoned,
            entries_sent = snapshot.entries_sent,
            tls_handshakes = snapshot.tls_handshakes,
            tls_failures = snapshot.tls_failures,
            connection_errors = snapshot.connection_errors,
            protocol_errors = snapshot.protocol_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "LDAP metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub binds_total: u64,
    pub binds_failed: u64,
    pub operations_total: u64,
    pub operations_failed: u64,
    pub operations_abandoned: u64,
    pub entries_sent: u64,
    pub tls_handshakes: u64,
    pub tls_failures: u64,
    pub connection_errors: u64,
    pub protocol_errors: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Initialize metrics collection (call once at startup)
pub fn init_metrics() {
    let _ = global_metrics();
    info!("Metrics collection initialized");
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
