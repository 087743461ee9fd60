//! End-to-end purge runs through the public API against the in-memory store.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use table_purger::AttributeValue;
use table_purger::InMemoryStore;
use table_purger::ItemKey;
use table_purger::KeySpec;
use table_purger::PurgeConfig;
use table_purger::PurgeOrchestrator;
use table_purger::PurgeOutcome;
use table_purger::PurgeState;
use table_purger::UnresolvedReason;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

const TABLE: &str = "sessions";

fn session(i: usize) -> ItemKey {
    ItemKey::from([
        ("tenant".to_string(), AttributeValue::S(format!("tenant-{}", i % 13))),
        ("session_id".to_string(), AttributeValue::N(i.to_string())),
        ("blob".to_string(), AttributeValue::B(vec![7; 32])),
    ])
}

fn sessions_store(count: usize) -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    store.create_table(TABLE, vec![KeySpec::partition("tenant"), KeySpec::sort("session_id")]);
    for i in 0..count {
        store.put_item(TABLE, session(i)).unwrap();
    }
    Arc::new(store)
}

fn config(total_segments: u32) -> PurgeConfig {
    let mut config = PurgeConfig::default();
    config.table.name = TABLE.to_string();
    config.table.total_segments = total_segments;
    config.table.page_size = 100;
    config.retry.batch_delete.base_delay_ms = 5;
    config.retry.batch_delete.max_delay_ms = 40;
    config.monitoring.progress_interval_ms = 100;
    config.validate().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn purge_with_many_segments_removes_every_item() {
    let store = sessions_store(2_500);
    let mut orchestrator = PurgeOrchestrator::new(store.clone(), config(8), CancellationToken::new());

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(orchestrator.state(), PurgeState::Completed);
    assert_eq!(summary.outcome, PurgeOutcome::Completed);
    assert_eq!(summary.deleted, 2_500);
    assert_eq!(summary.scanned, 2_500);
    assert!(summary.is_clean());
    assert_eq!(store.item_count(TABLE), 0);
    let report = summary.to_string();
    assert!(report.starts_with("Purge of table sessions completed: deleted 2500 of 2500 scanned keys"));
    assert!(report.contains("segment 7/8: completed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partial_write_capacity_is_absorbed_by_resubmission() {
    let store = sessions_store(600);
    store.set_write_capacity(Some(7));

    let summary = PurgeOrchestrator::new(store.clone(), config(3), CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert!(summary.is_clean());
    assert_eq!(summary.deleted, 600);
    assert!(summary.segments.iter().all(|r| r.retries > 0 || r.scanned == 0));
    assert_eq!(store.item_count(TABLE), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exhausted_retry_budget_leaves_keys_reported() {
    let store = sessions_store(50);
    store.set_write_capacity(Some(0));
    let mut config = config(1);
    config.retry.batch_delete.max_retries = 2;

    let summary = PurgeOrchestrator::new(store.clone(), config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, PurgeOutcome::Completed);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.unresolved.count(UnresolvedReason::RetryBudgetExhausted), 50);
    assert!(!summary.is_clean());
    assert_eq!(store.item_count(TABLE), 50);
}

#[tokio::test]
async fn dry_run_is_side_effect_free() {
    let store = sessions_store(75);
    let mut config = config(4);
    config.table.dry_run = true;

    let summary = PurgeOrchestrator::new(store.clone(), config, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert!(matches!(
        summary.outcome,
        PurgeOutcome::DryRun {
            estimated_items: Some(75),
            ..
        }
    ));
    assert_eq!(store.scan_calls(), 0);
    assert_eq!(store.delete_calls(), 0);
    assert_eq!(
        summary.to_string(),
        "Dry run for table sessions\n  key schema: tenant (partition), session_id (sort)\n  estimated items: ~75"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_run_keeps_remaining_items() {
    let store = sessions_store(400);
    store.set_write_capacity(Some(0));
    let mut config = config(2);
    config.retry.batch_delete.max_retries = 10_000;
    let cancel = CancellationToken::new();

    let mut orchestrator = PurgeOrchestrator::new(store.clone(), config, cancel.clone());
    let run = tokio::spawn(async move {
        let summary = orchestrator.run().await;
        (summary, orchestrator.state())
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    let calls_at_cancel = store.scan_calls() + store.delete_calls();
    let (summary, state) = run.await.unwrap();
    let summary = summary.unwrap();

    assert_eq!(state, PurgeState::Aborted);
    assert_eq!(summary.outcome, PurgeOutcome::Aborted);
    assert!(summary.unresolved.count(UnresolvedReason::Cancelled) > 0);
    assert_eq!(store.item_count(TABLE), 400);
    // each of the two workers may finish at most one call already in flight
    assert!(store.scan_calls() + store.delete_calls() <= calls_at_cancel + 2);
}

#[test]
#[serial]
fn config_file_and_environment_layer_over_defaults() {
    let mut file = NamedTempFile::with_suffix(".toml").unwrap();
    writeln!(
        file,
        "[table]\nname = \"from_file\"\ntotal_segments = 6\n\n[retry.batch_delete]\nmax_retries = 3"
    )
    .unwrap();
    let path = file.path().to_str().unwrap().to_string();

    temp_env::with_vars(
        vec![
            ("CONFIG_PATH", Some(path.as_str())),
            ("PURGE__TABLE__NAME", Some("from_env")),
        ],
        || {
            let config = PurgeConfig::new().unwrap().validate().unwrap();

            assert_eq!(config.table.name, "from_env");
            assert_eq!(config.table.total_segments, 6);
            assert_eq!(config.retry.batch_delete.max_retries, 3);
            assert_eq!(config.table.batch_size, 25);
        },
    );
}

#[test]
#[serial]
fn invalid_segment_count_is_rejected() {
    temp_env::with_vars(
        vec![
            ("PURGE__TABLE__NAME", Some("orders")),
            ("PURGE__TABLE__TOTAL_SEGMENTS", Some("11")),
        ],
        || {
            let result = PurgeConfig::new().unwrap().validate();

            assert!(matches!(result, Err(table_purger::Error::InvalidConfig(_))));
        },
    );
}
