//! # Transport Layer
//!
//! Listeners that accept byte streams and hand them to the connection engine.
//!
//! ## Transports
//! - **TCP**: plain LDAP, optionally TLS-on-connect or StartTLS
//! - **TLS**: certificate loading and the shared acceptor
//! - **Local**: Unix domain sockets (ldapi)
//!
//! Every listener shuts down gracefully: it stops accepting, asks open
//! connections to close, then waits up to the configured shutdown timeout.

#[cfg(unix)]
pub mod local;
pub mod tcp;
pub mod tls;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

/// Count of connections a listener is currently serving
#[derive(Clone, Default)]
pub(crate) struct ActiveConnections(Arc<AtomicUsize>);

impl ActiveConnections {
    /// Reserve a slot unless `max` connections are already open
    pub(crate) fn try_acquire(&self, max: usize) -> Option<ConnectionGuard> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| ConnectionGuard(Arc::clone(&self.0)))
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// One reserved connection slot; released on drop, including when the
/// connection task panics
pub(crate) struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Wait until `active` reaches zero or `timeout` elapses
pub(crate) async fn drain_connections(active: &ActiveConnections, timeout: Duration) {
    info!("Shutting down server. Waiting for connections to close...");

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        let connections = active.count();
        if connections == 0 {
            info!("All connections closed, shutting down");
            return;
        }
        tokio::select! {
            _ = &mut deadline => {
                warn!(connections, "Shutdown timeout reached, forcing exit");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                info!(connections, "Waiting for connections to close");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_returns_immediately_when_idle() {
        let active = ActiveConnections::default();
        tokio::time::timeout(Duration::from_millis(100), drain_connections(&active, Duration::from_secs(5)))
            .await
            .expect("drain should not wait");
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_timeout() {
        let active = ActiveConnections::default();
        let _first = active.try_acquire(4).unwrap();
        let _second = active.try_acquire(4).unwrap();
        drain_connections(&active, Duration::from_millis(50)).await;
        assert_eq!(active.count(), 2);
    }

    #[test]
    fn test_acquire_respects_limit() {
        let active = ActiveConnections::default();
        let first = active.try_acquire(1).unwrap();
        assert!(active.try_acquire(1).is_none());
        drop(first);
        assert_eq!(active.count(), 0);
        assert!(active.try_acquire(1).is_some());
    }

    #[tokio::test]
    async fn test_panicking_connection_releases_slot() {
        let active = ActiveConnections::default();
        let guard = active.try_acquire(8).unwrap();
        let task = tokio::spawn(async move {
            let _guard = guard;
            panic!("connection task failed");
        });
        assert!(task.await.unwrap_err().is_panic());
        assert_eq!(active.count(), 0);
        drain_connections(&active, Duration::from_secs(5)).await;
    }
}
