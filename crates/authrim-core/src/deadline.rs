//! Deadline enforcement for outbound storage calls

use crate::error::CoreError;
use std::future::Future;
use std::time::Duration;

/// Bound a storage call: exceeding the deadline surfaces `storage_timeout`,
/// mapped to 503 at the HTTP boundary.
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::StorageTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_expiry_maps_to_storage_timeout() {
        let result: Result<(), CoreError> = with_deadline(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(CoreError::StorageTimeout)));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let result = with_deadline(Duration::from_millis(50), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
