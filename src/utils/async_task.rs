use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::BackoffPolicy;
use crate::StoreError;
use crate::StoreResult;

/// Sleeps for `delay` unless `cancel` fires first.
///
/// Returns `false` when the sleep was cut short by cancellation.
pub(crate) async fn sleep_unless_cancelled(
    delay: Duration,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(delay) => true,
    }
}

/// Runs an idempotent store call, retrying throttled attempts with exponential backoff.
///
/// - `Ok(Some(value))`: an attempt succeeded
/// - `Ok(None)`: cancellation was observed before a retry was issued
/// - `Err(e)`: a non-retryable error, or the last throttling error once `max_retries`
///   resubmissions have been spent
pub(crate) async fn task_with_exponential_backoff<F, Fut, T>(
    task: F,
    policy: BackoffPolicy,
    cancel: &CancellationToken,
) -> StoreResult<Option<T>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut retries = 0;
    loop {
        let error = match task().await {
            Ok(value) => return Ok(Some(value)),
            Err(e @ StoreError::Throttled(_)) => e,
            Err(e @ (StoreError::NonRetryable(_) | StoreError::SchemaUnavailable { .. })) => return Err(e),
        };

        if retries >= policy.max_retries {
            warn!("task failed after {} retries: {}", retries, error);
            return Err(error);
        }

        let delay = policy.delay_for(retries);
        warn!(retry = retries + 1, ?delay, "throttled, backing off: {}", error);
        if !sleep_unless_cancelled(delay, cancel).await {
            return Ok(None);
        }
        retries += 1;
    }
}
