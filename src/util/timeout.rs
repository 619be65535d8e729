//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::RealtimeError;

/// Bound a fallible future by `duration`.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, RealtimeError>>,
) -> Result<T, RealtimeError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(RealtimeError::Timeout(duration.as_millis() as u64)),
    }
}
