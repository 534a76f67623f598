//! Async timeout wrappers and shared timing constants.

use std::future::Future;
use std::time::Duration;

use crate::error::{BusError, Result};

/// Default timeout for connect attempts and similar one-shot operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for graceful shutdown drains.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `future` under `duration`, mapping expiry to [`BusError::Timeout`].
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(BusError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_fast_futures() {
        let value = with_timeout(Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn maps_expiry_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        };
        let err = with_timeout(Duration::from_millis(20), slow).await.unwrap_err();
        assert!(matches!(err, BusError::Timeout));
    }
}
