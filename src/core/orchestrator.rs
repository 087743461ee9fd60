use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::resolve_key_schema;
use crate::BatchDeleter;
use crate::Error;
use crate::KeySchema;
use crate::ProgressReporter;
use crate::PurgeConfig;
use crate::PurgeOutcome;
use crate::PurgeStats;
use crate::PurgeSummary;
use crate::Result;
use crate::Segment;
use crate::SegmentReport;
use crate::SegmentWorker;
use crate::SegmentedScanner;
use crate::TableStore;

/// Lifecycle of one purge run
///
/// ```text
/// Idle ─► SchemaResolved ─┬─► DryRunReported
///   │                     └─► Running ─┬─► Completed
///   └──────────────► Aborted ◄─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeState {
    Idle,
    SchemaResolved,
    DryRunReported,
    Running,
    Completed,
    Aborted,
}

impl PurgeState {
    pub fn can_transition_to(
        &self,
        next: PurgeState,
    ) -> bool {
        use PurgeState::*;
        matches!(
            (self, next),
            (Idle, SchemaResolved)
                | (Idle, Aborted)
                | (SchemaResolved, DryRunReported)
                | (SchemaResolved, Running)
                | (Running, Completed)
                | (Running, Aborted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PurgeState::DryRunReported | PurgeState::Completed | PurgeState::Aborted)
    }
}

/// Runs one purge: resolves the key schema, then either reports a dry run or drives one
/// [`SegmentWorker`] per segment against shared [`PurgeStats`].
///
/// Cancelling the token passed to [`PurgeOrchestrator::new`] stops every worker at its
/// next scan/delete boundary; the run still returns a summary of the work done.
pub struct PurgeOrchestrator<S>
where S: TableStore + ?Sized
{
    store: Arc<S>,
    config: PurgeConfig,
    cancel: CancellationToken,
    state: PurgeState,
}

impl<S> PurgeOrchestrator<S>
where S: TableStore + ?Sized
{
    pub fn new(
        store: Arc<S>,
        config: PurgeConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            config,
            cancel,
            state: PurgeState::Idle,
        }
    }

    pub fn state(&self) -> PurgeState {
        self.state
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn transition(
        &mut self,
        next: PurgeState,
    ) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.state,
                to: next,
            });
        }
        info!("purge state: {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Executes the run. Only `Idle` orchestrators can run.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` when the config fails validation (state `Aborted`, store untouched)
    /// - `Error::SchemaUnavailable` when the key schema cannot be resolved (state `Aborted`)
    /// - `Error::InvalidStateTransition` when called twice
    pub async fn run(&mut self) -> Result<PurgeSummary> {
        if self.state != PurgeState::Idle {
            return Err(Error::InvalidStateTransition {
                from: self.state,
                to: PurgeState::SchemaResolved,
            });
        }

        if let Err(e) = self.config.clone().validate() {
            warn!("refusing to run: {}", e);
            self.transition(PurgeState::Aborted)?;
            return Err(e);
        }

        let started = Instant::now();
        let table = self.config.table.name.clone();

        let schema = match resolve_key_schema(self.store.as_ref(), &table).await {
            Ok(schema) => schema,
            Err(e) => {
                self.transition(PurgeState::Aborted)?;
                return Err(e);
            }
        };
        self.transition(PurgeState::SchemaResolved)?;
        info!(table = %table, %schema, "key schema resolved");

        if self.config.table.dry_run {
            return self.report_dry_run(&table, schema, started).await;
        }

        self.transition(PurgeState::Running)?;
        let reports = self.run_workers(&table, &schema).await;

        // a cancel that lands after every worker finished does not abort the run
        let outcome = PurgeOutcome::of_run(&reports);
        match outcome {
            PurgeOutcome::Aborted => self.transition(PurgeState::Aborted)?,
            _ => self.transition(PurgeState::Completed)?,
        }

        let summary = PurgeSummary::from_reports(&table, outcome, reports, started.elapsed());
        if summary.unresolved_count() > 0 {
            warn!(table = %table, unresolved = summary.unresolved_count(), "keys left undeleted");
        }
        info!(
            table = %table,
            deleted = summary.deleted,
            scanned = summary.scanned,
            elapsed = ?summary.elapsed,
            "purge finished"
        );
        Ok(summary)
    }

    async fn report_dry_run(
        &mut self,
        table: &str,
        schema: KeySchema,
        started: Instant,
    ) -> Result<PurgeSummary> {
        let estimated_items = match self.store.estimate_item_count(table).await {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!(table, "item count estimate unavailable: {}", e);
                None
            }
        };
        self.transition(PurgeState::DryRunReported)?;
        info!(table, ?estimated_items, "dry run: no items deleted");

        Ok(PurgeSummary::dry_run(table, schema, estimated_items, started.elapsed()))
    }

    /// Spawns one worker per segment plus the reporter, and waits for all workers
    async fn run_workers(
        &self,
        table: &str,
        schema: &KeySchema,
    ) -> Vec<SegmentReport> {
        let table_config = &self.config.table;
        let stats = Arc::new(PurgeStats::new());
        let reporter = ProgressReporter::spawn(
            stats.clone(),
            Duration::from_millis(self.config.monitoring.progress_interval_ms),
            &self.cancel,
        );

        let projection = schema.attribute_names();
        let segments: Vec<Segment> = Segment::all(table_config.total_segments).collect();
        let handles: Vec<_> = segments
            .iter()
            .map(|segment| {
                let scanner = SegmentedScanner::new(
                    self.store.clone(),
                    table,
                    *segment,
                    projection.clone(),
                    table_config.page_size,
                    self.config.retry.scan,
                );
                let deleter = BatchDeleter::new(
                    self.store.clone(),
                    table,
                    table_config.batch_size,
                    self.config.retry.batch_delete,
                    stats.clone(),
                );
                let worker = SegmentWorker::new(scanner, deleter, stats.clone(), self.cancel.clone());
                tokio::spawn(worker.run())
            })
            .collect();
        info!(table, segments = segments.len(), "segment workers spawned");

        let reports = join_all(handles)
            .await
            .into_iter()
            .zip(segments)
            .map(|(result, segment)| match result {
                Ok(report) => report,
                Err(e) => SegmentReport::lost(segment, Error::TaskFailed(e).to_string()),
            })
            .collect();

        let reports_emitted = reporter.stop().await;
        info!("final progress: {} ({} reports)", stats.snapshot(), reports_emitted);
        reports
    }
}
