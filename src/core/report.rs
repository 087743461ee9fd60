use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::ItemKey;
use crate::KeySchema;
use crate::Segment;

/// Why a scanned key was left in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnresolvedReason {
    /// Still unprocessed after the last allowed resubmission
    RetryBudgetExhausted,
    /// Pending or not yet attempted when a non-retryable error aborted the segment
    SegmentAborted,
    /// Pending or not yet attempted when the run was cancelled
    Cancelled,
}

impl UnresolvedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnresolvedReason::RetryBudgetExhausted => "retry_budget_exhausted",
            UnresolvedReason::SegmentAborted => "segment_aborted",
            UnresolvedReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for UnresolvedReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys left undeleted, grouped by reason
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnresolvedKeys {
    by_reason: BTreeMap<UnresolvedReason, Vec<ItemKey>>,
}

impl UnresolvedKeys {
    pub fn record(
        &mut self,
        reason: UnresolvedReason,
        keys: impl IntoIterator<Item = ItemKey>,
    ) {
        let mut keys = keys.into_iter().peekable();
        if keys.peek().is_none() {
            return;
        }
        self.by_reason.entry(reason).or_default().extend(keys);
    }

    pub fn merge(
        &mut self,
        other: UnresolvedKeys,
    ) {
        for (reason, keys) in other.by_reason {
            self.record(reason, keys);
        }
    }

    pub fn count(
        &self,
        reason: UnresolvedReason,
    ) -> u64 {
        self.by_reason.get(&reason).map(|keys| keys.len() as u64).unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.by_reason.values().map(|keys| keys.len() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_reason.is_empty()
    }

    pub fn keys(
        &self,
        reason: UnresolvedReason,
    ) -> &[ItemKey] {
        self.by_reason.get(&reason).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnresolvedReason, &[ItemKey])> {
        self.by_reason.iter().map(|(reason, keys)| (*reason, keys.as_slice()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentStatus {
    /// Partition scanned to the end
    Completed,
    /// Stopped by a non-retryable store error; siblings were unaffected
    Aborted { error: String },
    /// Stopped at a scan/delete boundary after cancellation
    Cancelled,
}

/// What one worker did with its segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    pub segment: Segment,
    pub pages: u64,
    pub scanned: u64,
    pub deleted: u64,
    pub retries: u64,
    pub unresolved: UnresolvedKeys,
    pub status: SegmentStatus,
}

impl SegmentReport {
    pub fn new(segment: Segment) -> Self {
        Self {
            segment,
            pages: 0,
            scanned: 0,
            deleted: 0,
            retries: 0,
            unresolved: UnresolvedKeys::default(),
            status: SegmentStatus::Completed,
        }
    }

    /// Report for a worker that never returned (panicked task)
    pub fn lost(
        segment: Segment,
        error: String,
    ) -> Self {
        Self {
            status: SegmentStatus::Aborted { error },
            ..Self::new(segment)
        }
    }
}

/// Terminal shape of a purge run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// Schema and estimate reported, nothing deleted
    DryRun {
        schema: KeySchema,
        estimated_items: Option<u64>,
    },
    /// Every worker finished; some segments may have aborted
    Completed,
    /// Cancelled externally; statistics cover the work done before that
    Aborted,
}

impl PurgeOutcome {
    /// A run is aborted only if some worker actually stopped on cancellation.
    pub(crate) fn of_run(reports: &[SegmentReport]) -> Self {
        if reports.iter().any(|r| r.status == SegmentStatus::Cancelled) {
            PurgeOutcome::Aborted
        } else {
            PurgeOutcome::Completed
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurgeSummary {
    pub table: String,
    pub outcome: PurgeOutcome,
    pub scanned: u64,
    pub deleted: u64,
    pub elapsed: Duration,
    pub unresolved: UnresolvedKeys,
    pub segments: Vec<SegmentReport>,
}

impl PurgeSummary {
    pub(crate) fn dry_run(
        table: &str,
        schema: KeySchema,
        estimated_items: Option<u64>,
        elapsed: Duration,
    ) -> Self {
        Self {
            table: table.to_string(),
            outcome: PurgeOutcome::DryRun {
                schema,
                estimated_items,
            },
            scanned: 0,
            deleted: 0,
            elapsed,
            unresolved: UnresolvedKeys::default(),
            segments: Vec::new(),
        }
    }

    pub(crate) fn from_reports(
        table: &str,
        outcome: PurgeOutcome,
        mut segments: Vec<SegmentReport>,
        elapsed: Duration,
    ) -> Self {
        segments.sort_by_key(|r| r.segment.segment_id);
        let mut unresolved = UnresolvedKeys::default();
        for report in &segments {
            unresolved.merge(report.unresolved.clone());
        }
        Self {
            table: table.to_string(),
            outcome,
            scanned: segments.iter().map(|r| r.scanned).sum(),
            deleted: segments.iter().map(|r| r.deleted).sum(),
            elapsed,
            unresolved,
            segments,
        }
    }

    /// Average deleted items per second over the whole run
    pub fn average_rate(&self) -> f64 {
        let elapsed_ms = self.elapsed.as_millis();
        if elapsed_ms == 0 {
            return 0.0;
        }
        self.deleted as f64 * 1000.0 / elapsed_ms as f64
    }

    pub fn unresolved_count(&self) -> u64 {
        self.unresolved.total()
    }

    pub fn aborted_segments(&self) -> impl Iterator<Item = &SegmentReport> {
        self.segments
            .iter()
            .filter(|r| matches!(r.status, SegmentStatus::Aborted { .. }))
    }

    /// True when the table was fully purged and nothing needs attention
    pub fn is_clean(&self) -> bool {
        match self.outcome {
            PurgeOutcome::DryRun { .. } => true,
            PurgeOutcome::Completed => self.unresolved.is_empty() && self.aborted_segments().next().is_none(),
            PurgeOutcome::Aborted => false,
        }
    }
}

impl fmt::Display for PurgeSummary {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if let PurgeOutcome::DryRun {
            schema,
            estimated_items,
        } = &self.outcome
        {
            writeln!(f, "Dry run for table {}", self.table)?;
            writeln!(f, "  key schema: {schema}")?;
            return match estimated_items {
                Some(count) => write!(f, "  estimated items: ~{count}"),
                None => write!(f, "  estimated items: unknown"),
            };
        }

        let verb = match self.outcome {
            PurgeOutcome::Aborted => "aborted",
            _ => "completed",
        };
        writeln!(
            f,
            "Purge of table {} {verb}: deleted {} of {} scanned keys in {:.1}s (avg {:.1}/s)",
            self.table,
            self.deleted,
            self.scanned,
            self.elapsed.as_secs_f64(),
            self.average_rate()
        )?;
        write!(f, "  unresolved keys: {}", self.unresolved_count())?;
        for (reason, keys) in self.unresolved.iter() {
            write!(f, "\n    {reason}: {}", keys.len())?;
        }
        for report in &self.segments {
            let status = match &report.status {
                SegmentStatus::Completed => "completed".to_string(),
                SegmentStatus::Cancelled => "cancelled".to_string(),
                SegmentStatus::Aborted { error } => format!("aborted ({error})"),
            };
            write!(
                f,
                "\n  segment {}: {status}, pages={} scanned={} deleted={} retries={}",
                report.segment, report.pages, report.scanned, report.deleted, report.retries
            )?;
        }
        Ok(())
    }
}
