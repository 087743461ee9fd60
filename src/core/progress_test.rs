use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use super::*;

#[test]
fn snapshot_reflects_recorded_counts() {
    let stats = PurgeStats::new();
    stats.record_scanned(10);
    stats.record_deleted(7);
    stats.record_unresolved(3);

    let snapshot = stats.snapshot();

    assert_eq!(snapshot.scanned, 10);
    assert_eq!(snapshot.deleted, 7);
    assert_eq!(snapshot.unresolved, 3);
}

#[test]
fn rate_is_zero_before_any_time_passes() {
    let snapshot = ProgressSnapshot {
        scanned: 5,
        deleted: 5,
        unresolved: 0,
        elapsed: Duration::ZERO,
    };

    assert_eq!(snapshot.rate_per_ms(), 0.0);
    assert_eq!(snapshot.rate_per_sec(), 0.0);
}

#[test]
fn rate_is_deleted_over_elapsed() {
    let snapshot = ProgressSnapshot {
        scanned: 3000,
        deleted: 2000,
        unresolved: 0,
        elapsed: Duration::from_secs(4),
    };

    assert_eq!(snapshot.rate_per_ms(), 0.5);
    assert_eq!(snapshot.rate_per_sec(), 500.0);
    assert_eq!(snapshot.to_string(), "scanned=3000 deleted=2000 rate=500.0/s elapsed=4.0s");
}

#[test]
fn display_mentions_unresolved_only_when_present() {
    let snapshot = ProgressSnapshot {
        scanned: 10,
        deleted: 8,
        unresolved: 2,
        elapsed: Duration::from_millis(500),
    };

    assert!(snapshot.to_string().ends_with(" unresolved=2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deleted_never_exceeds_scanned_under_concurrency() {
    let stats = Arc::new(PurgeStats::new());

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let stats = stats.clone();
            tokio::spawn(async move {
                for _ in 0..2_000 {
                    stats.record_scanned(3);
                    tokio::task::yield_now().await;
                    stats.record_deleted(2);
                    stats.record_deleted(1);
                }
            })
        })
        .collect();

    let reader = {
        let stats = stats.clone();
        tokio::spawn(async move {
            for _ in 0..5_000 {
                let snapshot = stats.snapshot();
                assert!(
                    snapshot.deleted <= snapshot.scanned,
                    "deleted {} > scanned {}",
                    snapshot.deleted,
                    snapshot.scanned
                );
                tokio::task::yield_now().await;
            }
        })
    };

    for writer in writers {
        writer.await.unwrap();
    }
    reader.await.unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.scanned, 24_000);
    assert_eq!(snapshot.deleted, 24_000);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn reporter_emits_once_per_interval() {
    let stats = Arc::new(PurgeStats::new());
    stats.record_scanned(4);
    stats.record_deleted(4);
    let reporter = ProgressReporter::spawn(stats, Duration::from_millis(100), &CancellationToken::new());

    tokio::time::sleep(Duration::from_millis(350)).await;
    let reports = reporter.stop().await;

    assert_eq!(reports, 3);
    assert!(logs_contain("progress: scanned=4 deleted=4"));
}

#[tokio::test(start_paused = true)]
async fn reporter_does_not_report_before_first_interval() {
    let reporter = ProgressReporter::spawn(
        Arc::new(PurgeStats::new()),
        Duration::from_millis(100),
        &CancellationToken::new(),
    );

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(reporter.stop().await, 0);
}

#[tokio::test(start_paused = true)]
async fn reporter_stops_with_parent_token() {
    let parent = CancellationToken::new();
    let reporter = ProgressReporter::spawn(Arc::new(PurgeStats::new()), Duration::from_millis(100), &parent);

    tokio::time::sleep(Duration::from_millis(150)).await;
    parent.cancel();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // no further ticks were counted after the parent fired
    assert_eq!(reporter.stop().await, 1);
}
