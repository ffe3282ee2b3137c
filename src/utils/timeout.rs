//! Async timeout helpers.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Server-side search deadline when nothing else is configured
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(10);

/// How long graceful shutdown waits for open connections
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a TLS handshake (on connect or after StartTLS)
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `fut` with a deadline, mapping expiry to [`ProtocolError::Timeout`]
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let result = with_timeout_error(async { Ok(7) }, Duration::from_millis(100)).await;
        assert_eq!(result.ok(), Some(7));
    }

    #[tokio::test]
    async fn test_expiry_maps_to_timeout() {
        let result: Result<()> = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_millis(20),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }
}
