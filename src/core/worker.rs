use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::metrics;
use crate::BatchDeleter;
use crate::PageFailure;
use crate::PageOutcome;
use crate::PurgeStats;
use crate::ScanStep;
use crate::SegmentReport;
use crate::SegmentStatus;
use crate::SegmentedScanner;
use crate::TableStore;
use crate::UnresolvedKeys;

/// Drives Scanner → Deleter for one segment until it is exhausted, cancelled or aborted.
///
/// Owns its cursor, batches and retry ledgers; the only shared state it touches is
/// [`PurgeStats`].
pub struct SegmentWorker<S>
where S: TableStore + ?Sized
{
    scanner: SegmentedScanner<S>,
    deleter: BatchDeleter<S>,
    stats: Arc<PurgeStats>,
    cancel: CancellationToken,
}

impl<S> SegmentWorker<S>
where S: TableStore + ?Sized
{
    pub fn new(
        scanner: SegmentedScanner<S>,
        deleter: BatchDeleter<S>,
        stats: Arc<PurgeStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            scanner,
            deleter,
            stats,
            cancel,
        }
    }

    pub async fn run(mut self) -> SegmentReport {
        let segment = self.scanner.segment();
        let mut report = SegmentReport::new(segment);
        debug!(%segment, "segment worker started");

        loop {
            if self.cancel.is_cancelled() {
                report.status = SegmentStatus::Cancelled;
                break;
            }

            let keys = match self.scanner.next_page(&self.cancel).await {
                Ok(ScanStep::Page(keys)) => keys,
                Ok(ScanStep::Exhausted) => break,
                Ok(ScanStep::Cancelled) => {
                    report.status = SegmentStatus::Cancelled;
                    break;
                }
                Err(e) => {
                    error!(%segment, "scan failed, aborting segment: {}", e);
                    report.status = SegmentStatus::Aborted { error: e.to_string() };
                    break;
                }
            };

            let count = keys.len() as u64;
            report.pages += 1;
            report.scanned += count;
            self.stats.record_scanned(count);
            metrics::SCANNED_KEYS.inc_by(count);

            if keys.is_empty() {
                continue;
            }

            match self.deleter.delete_page(keys, &self.cancel).await {
                Ok(PageOutcome {
                    deleted,
                    retries,
                    unresolved,
                    cancelled,
                }) => {
                    report.deleted += deleted;
                    report.retries += retries;
                    self.absorb_unresolved(&mut report, unresolved);
                    if cancelled {
                        report.status = SegmentStatus::Cancelled;
                        break;
                    }
                }
                Err(PageFailure {
                    error,
                    deleted,
                    retries,
                    unresolved,
                }) => {
                    error!(%segment, "delete failed, aborting segment: {}", error);
                    report.deleted += deleted;
                    report.retries += retries;
                    self.absorb_unresolved(&mut report, unresolved);
                    report.status = SegmentStatus::Aborted {
                        error: error.to_string(),
                    };
                    break;
                }
            }
        }

        if matches!(report.status, SegmentStatus::Aborted { .. }) {
            metrics::ABORTED_SEGMENTS.inc();
        }
        info!(
            %segment,
            status = ?report.status,
            pages = report.pages,
            scanned = report.scanned,
            deleted = report.deleted,
            unresolved = report.unresolved.total(),
            "segment worker finished"
        );
        report
    }

    fn absorb_unresolved(
        &self,
        report: &mut SegmentReport,
        unresolved: UnresolvedKeys,
    ) {
        for (reason, keys) in unresolved.iter() {
            self.stats.record_unresolved(keys.len() as u64);
            metrics::UNRESOLVED_KEYS
                .with_label_values(&[reason.as_str()])
                .inc_by(keys.len() as u64);
        }
        report.unresolved.merge(unresolved);
    }
}
