use std::time::Duration;

use super::*;
use crate::test_utils::composite_schema;
use crate::test_utils::keys;
use crate::Segment;

fn report(
    segment_id: u32,
    scanned: u64,
    deleted: u64,
) -> SegmentReport {
    SegmentReport {
        pages: 1,
        scanned,
        deleted,
        ..SegmentReport::new(Segment::new(segment_id, 3))
    }
}

#[test]
fn unresolved_keys_group_by_reason() {
    let mut unresolved = UnresolvedKeys::default();
    unresolved.record(UnresolvedReason::Cancelled, keys(2));
    unresolved.record(UnresolvedReason::RetryBudgetExhausted, Vec::new());
    unresolved.record(UnresolvedReason::Cancelled, keys(3).split_off(2));

    assert_eq!(unresolved.count(UnresolvedReason::Cancelled), 3);
    assert_eq!(unresolved.keys(UnresolvedReason::Cancelled), keys(3).as_slice());
    assert_eq!(unresolved.count(UnresolvedReason::RetryBudgetExhausted), 0);
    assert_eq!(unresolved.iter().count(), 1);
    assert_eq!(unresolved.total(), 3);
}

#[test]
fn empty_records_keep_the_set_empty() {
    let mut unresolved = UnresolvedKeys::default();
    unresolved.record(UnresolvedReason::SegmentAborted, Vec::new());

    assert!(unresolved.is_empty());
    assert_eq!(unresolved.total(), 0);
}

#[test]
fn merge_appends_per_reason() {
    let mut left = UnresolvedKeys::default();
    left.record(UnresolvedReason::SegmentAborted, keys(1));
    let mut right = UnresolvedKeys::default();
    right.record(UnresolvedReason::SegmentAborted, keys(2).split_off(1));
    right.record(UnresolvedReason::Cancelled, keys(4));

    left.merge(right);

    assert_eq!(left.keys(UnresolvedReason::SegmentAborted), keys(2).as_slice());
    assert_eq!(left.count(UnresolvedReason::Cancelled), 4);
    assert_eq!(left.total(), 6);
}

#[test]
fn reason_labels() {
    assert_eq!(UnresolvedReason::RetryBudgetExhausted.to_string(), "retry_budget_exhausted");
    assert_eq!(UnresolvedReason::SegmentAborted.as_str(), "segment_aborted");
    assert_eq!(UnresolvedReason::Cancelled.as_str(), "cancelled");
}

#[test]
fn summary_totals_and_sorts_segment_reports() {
    let mut aborted = report(0, 10, 4);
    aborted.unresolved.record(UnresolvedReason::SegmentAborted, keys(6));
    aborted.status = SegmentStatus::Aborted {
        error: "access denied".into(),
    };

    let summary = PurgeSummary::from_reports(
        "orders",
        PurgeOutcome::Completed,
        vec![report(2, 5, 5), aborted, report(1, 20, 20)],
        Duration::from_secs(2),
    );

    let ids: Vec<u32> = summary.segments.iter().map(|r| r.segment.segment_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(summary.scanned, 35);
    assert_eq!(summary.deleted, 29);
    assert_eq!(summary.unresolved_count(), 6);
    assert_eq!(summary.average_rate(), 14.5);
    assert_eq!(summary.aborted_segments().count(), 1);
    assert!(!summary.is_clean());
}

#[test]
fn completed_summary_without_leftovers_is_clean() {
    let summary = PurgeSummary::from_reports(
        "orders",
        PurgeOutcome::Completed,
        vec![report(0, 3, 3)],
        Duration::ZERO,
    );

    assert!(summary.is_clean());
    assert_eq!(summary.average_rate(), 0.0);
}

#[test]
fn aborted_run_is_never_clean() {
    let summary = PurgeSummary::from_reports("orders", PurgeOutcome::Aborted, vec![], Duration::from_secs(1));

    assert!(!summary.is_clean());
    assert!(summary.to_string().starts_with("Purge of table orders aborted: deleted 0 of 0 scanned keys"));
}

#[test]
fn completed_summary_display() {
    let mut segment = report(1, 20, 18);
    segment.retries = 4;
    segment.unresolved.record(UnresolvedReason::RetryBudgetExhausted, keys(2));
    let summary = PurgeSummary::from_reports(
        "orders",
        PurgeOutcome::Completed,
        vec![segment],
        Duration::from_secs(3),
    );

    let rendered = summary.to_string();

    assert_eq!(
        rendered,
        "Purge of table orders completed: deleted 18 of 20 scanned keys in 3.0s (avg 6.0/s)\n  \
         unresolved keys: 2\n    \
         retry_budget_exhausted: 2\n  \
         segment 1/3: completed, pages=1 scanned=20 deleted=18 retries=4"
    );
}

#[test]
fn dry_run_summary_display() {
    let schema = KeySchema::try_new("orders", composite_schema()).unwrap();

    let known = PurgeSummary::dry_run("orders", schema.clone(), Some(1200), Duration::ZERO);
    let unknown = PurgeSummary::dry_run("orders", schema, None, Duration::ZERO);

    assert!(known.is_clean());
    assert_eq!(known.deleted, 0);
    assert_eq!(
        known.to_string(),
        "Dry run for table orders\n  key schema: pk (partition), sk (sort)\n  estimated items: ~1200"
    );
    assert!(unknown.to_string().ends_with("estimated items: unknown"));
}

#[test]
fn lost_segment_is_reported_as_aborted() {
    let lost = SegmentReport::lost(Segment::new(2, 3), "task panicked".into());

    assert_eq!(
        lost.status,
        SegmentStatus::Aborted {
            error: "task panicked".into()
        }
    );
    assert_eq!(lost.scanned, 0);
}

#[test]
fn outcome_follows_segment_statuses() {
    let mut aborted = report(0, 4, 1);
    aborted.status = SegmentStatus::Aborted {
        error: "access denied".into(),
    };
    let mut cancelled = report(1, 4, 2);
    cancelled.status = SegmentStatus::Cancelled;

    assert_eq!(PurgeOutcome::of_run(&[]), PurgeOutcome::Completed);
    assert_eq!(PurgeOutcome::of_run(&[report(2, 3, 3), aborted.clone()]), PurgeOutcome::Completed);
    assert_eq!(PurgeOutcome::of_run(&[aborted, cancelled]), PurgeOutcome::Aborted);
}
