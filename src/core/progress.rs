//! Shared purge counters and the periodic progress reporter.

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

/// Counters shared by every worker of one purge run.
///
/// Invariant: a key is added to `scanned` before any attempt to delete it, so
/// `deleted <= scanned` holds whenever `deleted` is read before `scanned`.
#[derive(Debug)]
pub struct PurgeStats {
    scanned: AtomicU64,
    deleted: AtomicU64,
    unresolved: AtomicU64,
    started_at: Instant,
}

impl Default for PurgeStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PurgeStats {
    pub fn new() -> Self {
        Self {
            scanned: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            unresolved: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_scanned(
        &self,
        count: u64,
    ) {
        self.scanned.fetch_add(count, Ordering::SeqCst);
    }

    pub fn record_deleted(
        &self,
        count: u64,
    ) {
        self.deleted.fetch_add(count, Ordering::SeqCst);
    }

    pub fn record_unresolved(
        &self,
        count: u64,
    ) {
        self.unresolved.fetch_add(count, Ordering::SeqCst);
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Point-in-time view; fields may lag each other but never break `deleted <= scanned`
    pub fn snapshot(&self) -> ProgressSnapshot {
        let deleted = self.deleted.load(Ordering::SeqCst);
        let unresolved = self.unresolved.load(Ordering::SeqCst);
        let scanned = self.scanned.load(Ordering::SeqCst);
        ProgressSnapshot {
            scanned,
            deleted,
            unresolved,
            elapsed: self.started_at.elapsed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub scanned: u64,
    pub deleted: u64,
    pub unresolved: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Deleted items per millisecond since the run started
    pub fn rate_per_ms(&self) -> f64 {
        let elapsed_ms = self.elapsed.as_millis();
        if elapsed_ms == 0 {
            return 0.0;
        }
        self.deleted as f64 / elapsed_ms as f64
    }

    pub fn rate_per_sec(&self) -> f64 {
        self.rate_per_ms() * 1000.0
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "scanned={} deleted={} rate={:.1}/s elapsed={:.1}s",
            self.scanned,
            self.deleted,
            self.rate_per_sec(),
            self.elapsed.as_secs_f64()
        )?;
        if self.unresolved > 0 {
            write!(f, " unresolved={}", self.unresolved)?;
        }
        Ok(())
    }
}

/// Background task logging a [`ProgressSnapshot`] every interval.
///
/// The task ends when `stop()` is awaited, when the parent cancellation token fires, or
/// when the reporter is dropped, whichever comes first.
pub struct ProgressReporter {
    stop: CancellationToken,
    handle: Option<JoinHandle<u64>>,
}

impl ProgressReporter {
    pub fn spawn(
        stats: Arc<PurgeStats>,
        interval: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let stop = parent.child_token();
        let task_stop = stop.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut reports = 0u64;
            loop {
                tokio::select! {
                    _ = task_stop.cancelled() => {
                        debug!(reports, "progress reporter stopped");
                        return reports;
                    }
                    _ = ticker.tick() => {
                        reports += 1;
                        info!("progress: {}", stats.snapshot());
                    }
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the task and returns how many progress lines it emitted
    pub async fn stop(mut self) -> u64 {
        self.stop.cancel();
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
