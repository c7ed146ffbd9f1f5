//! Generation Call Timeouts
//!
//! Every external generation call must run under `with_timeout`; a call
//! that exceeds its deadline becomes a retryable failure instead of
//! pending indefinitely.

use std::future::Future;
use std::time::Duration;

use crate::types::{Result, ScribeError};

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the
/// specified duration.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(ScribeError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, ScribeError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ScribeError>(42)
            },
            "slow operation",
        )
        .await;
        assert!(matches!(result.unwrap_err(), ScribeError::Timeout { .. }));
    }
}
