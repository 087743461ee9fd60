//! Batched key deletion with unprocessed-key resubmission.
//!
//! A batch is retried only for the keys the store did not apply. Throttling errors count
//! as "nothing applied" and share the same retry ledger. Every other store error ends the
//! batch and is handed to the worker, which aborts its segment.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::metrics;
use crate::utils::async_task::sleep_unless_cancelled;
use crate::BackoffPolicy;
use crate::ItemKey;
use crate::ItemKeyBatch;
use crate::PurgeStats;
use crate::StoreError;
use crate::TableStore;
use crate::UnresolvedKeys;
use crate::UnresolvedReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every key confirmed deleted
    Deleted,
    /// Keys remained unprocessed after `max_retries` resubmissions
    RetryBudgetExhausted,
    /// Cancellation was observed before the next resubmission
    Cancelled,
}

/// Terminal result of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub status: BatchStatus,
    pub deleted: u64,
    /// Keys still present when the batch ended
    pub unresolved: ItemKeyBatch,
    /// Delay slept before each resubmission, in order
    pub retry_delays: Vec<Duration>,
}

/// A non-retryable store error ended the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub error: StoreError,
    /// Keys confirmed deleted by earlier attempts of the same batch
    pub deleted: u64,
    /// Keys of the failed attempt
    pub pending: ItemKeyBatch,
    pub retries: u64,
}

/// Aggregate of all batches cut from one scan page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOutcome {
    pub deleted: u64,
    pub retries: u64,
    pub unresolved: UnresolvedKeys,
    pub cancelled: bool,
}

/// A page stopped at a non-retryable error; keys not deleted are filed as
/// `SegmentAborted` in `unresolved`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub error: StoreError,
    pub deleted: u64,
    pub retries: u64,
    pub unresolved: UnresolvedKeys,
}

pub struct BatchDeleter<S>
where S: TableStore + ?Sized
{
    store: Arc<S>,
    table: String,
    batch_size: usize,
    policy: BackoffPolicy,
    stats: Arc<PurgeStats>,
}

impl<S> BatchDeleter<S>
where S: TableStore + ?Sized
{
    pub fn new(
        store: Arc<S>,
        table: impl Into<String>,
        batch_size: usize,
        policy: BackoffPolicy,
        stats: Arc<PurgeStats>,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            batch_size: batch_size.max(1),
            policy,
            stats,
        }
    }

    /// Deletes a scanned page in store-sized batches, in page order.
    ///
    /// Stops at the first cancelled batch; keys of later batches are never sent and are
    /// reported as `Cancelled`.
    pub async fn delete_page(
        &self,
        keys: Vec<ItemKey>,
        cancel: &CancellationToken,
    ) -> Result<PageOutcome, PageFailure> {
        let mut outcome = PageOutcome::default();
        let mut batches = split_into_batches(keys, self.batch_size).into_iter();

        while let Some(batch) = batches.next() {
            match self.delete_batch(batch, cancel).await {
                Ok(batch_outcome) => {
                    outcome.deleted += batch_outcome.deleted;
                    outcome.retries += batch_outcome.retry_delays.len() as u64;
                    match batch_outcome.status {
                        BatchStatus::Deleted => {}
                        BatchStatus::RetryBudgetExhausted => {
                            outcome
                                .unresolved
                                .record(UnresolvedReason::RetryBudgetExhausted, batch_outcome.unresolved);
                        }
                        BatchStatus::Cancelled => {
                            outcome.unresolved.record(UnresolvedReason::Cancelled, batch_outcome.unresolved);
                            outcome.unresolved.record(UnresolvedReason::Cancelled, batches.flatten());
                            outcome.cancelled = true;
                            return Ok(outcome);
                        }
                    }
                }
                Err(failure) => {
                    let mut unresolved = outcome.unresolved;
                    unresolved.record(UnresolvedReason::SegmentAborted, failure.pending);
                    unresolved.record(UnresolvedReason::SegmentAborted, batches.flatten());
                    return Err(PageFailure {
                        error: failure.error,
                        deleted: outcome.deleted + failure.deleted,
                        retries: outcome.retries + failure.retries,
                        unresolved,
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Deletes one batch, resubmitting unprocessed keys until they are gone, the retry
    /// budget is spent, or the run is cancelled.
    ///
    /// `deleted` is only ever increased by keys the store confirmed.
    pub async fn delete_batch(
        &self,
        batch: ItemKeyBatch,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, BatchFailure> {
        let mut pending = batch;
        let mut deleted = 0u64;
        let mut retry_delays = Vec::new();

        loop {
            if cancel.is_cancelled() {
                return Ok(Self::finish(BatchStatus::Cancelled, deleted, pending, retry_delays));
            }

            let attempted = pending.len();
            let started = Instant::now();
            let response = self.store.batch_delete(&self.table, pending.clone()).await;
            metrics::BATCH_DELETE_LATENCY_MS.observe(started.elapsed().as_secs_f64() * 1000.0);

            match response {
                Ok(unprocessed) => {
                    let confirmed = attempted.saturating_sub(unprocessed.len()) as u64;
                    deleted += confirmed;
                    self.stats.record_deleted(confirmed);
                    metrics::DELETED_KEYS.inc_by(confirmed);
                    trace!(attempted, confirmed, unprocessed = unprocessed.len(), "batch_delete response");
                    pending = unprocessed;
                }
                Err(StoreError::Throttled(reason)) => {
                    debug!(attempted, "batch_delete throttled: {}", reason);
                }
                Err(error @ (StoreError::NonRetryable(_) | StoreError::SchemaUnavailable { .. })) => {
                    return Err(BatchFailure {
                        error,
                        deleted,
                        pending,
                        retries: retry_delays.len() as u64,
                    });
                }
            }

            if pending.is_empty() {
                return Ok(Self::finish(BatchStatus::Deleted, deleted, pending, retry_delays));
            }

            let retry_count = retry_delays.len() as u32;
            if retry_count >= self.policy.max_retries {
                warn!(
                    table = %self.table,
                    unresolved = pending.len(),
                    "batch still unprocessed after {} retries",
                    retry_count
                );
                return Ok(Self::finish(BatchStatus::RetryBudgetExhausted, deleted, pending, retry_delays));
            }

            let delay = self.policy.delay_for(retry_count);
            retry_delays.push(delay);
            metrics::DELETE_RETRIES.inc();
            debug!(retry = retry_count + 1, pending = pending.len(), ?delay, "resubmitting unprocessed keys");
            if !sleep_unless_cancelled(delay, cancel).await {
                return Ok(Self::finish(BatchStatus::Cancelled, deleted, pending, retry_delays));
            }
        }
    }

    fn finish(
        status: BatchStatus,
        deleted: u64,
        unresolved: ItemKeyBatch,
        retry_delays: Vec<Duration>,
    ) -> BatchOutcome {
        BatchOutcome {
            status,
            deleted,
            unresolved,
            retry_delays,
        }
    }
}

/// Cuts `keys` into consecutive batches of at most `batch_size`, preserving order
pub fn split_into_batches(
    keys: Vec<ItemKey>,
    batch_size: usize,
) -> Vec<ItemKeyBatch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(keys.len().div_ceil(batch_size));
    let mut keys = keys.into_iter().peekable();
    while keys.peek().is_some() {
        batches.push(keys.by_ref().take(batch_size).collect());
    }
    batches
}
