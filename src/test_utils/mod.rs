//! Shared fixtures for unit tests: key builders, seeded in-memory tables and a
//! ready-to-run config.

use crate::AttributeValue;
use crate::BackoffPolicy;
use crate::InMemoryStore;
use crate::ItemKey;
use crate::KeySpec;
use crate::PurgeConfig;

pub(crate) const TEST_TABLE: &str = "purge_test_table";

/// Key of a `pk`/`sk` table
pub(crate) fn key(
    pk: &str,
    sk: u64,
) -> ItemKey {
    ItemKey::from([
        ("pk".to_string(), AttributeValue::S(pk.to_string())),
        ("sk".to_string(), AttributeValue::N(sk.to_string())),
    ])
}

/// `count` distinct keys spread over many partition values
pub(crate) fn keys(count: usize) -> Vec<ItemKey> {
    (0..count).map(|i| key(&format!("user#{}", i % 97), i as u64)).collect()
}

/// Full item: key attributes plus a payload that scans must never return
pub(crate) fn item(
    pk: &str,
    sk: u64,
) -> ItemKey {
    let mut item = key(pk, sk);
    item.insert("payload".to_string(), AttributeValue::S("x".repeat(64)));
    item
}

pub(crate) fn composite_schema() -> Vec<KeySpec> {
    vec![KeySpec::partition("pk"), KeySpec::sort("sk")]
}

/// In-memory store holding `TEST_TABLE` with `count` items
pub(crate) fn seeded_store(count: usize) -> InMemoryStore {
    let store = InMemoryStore::new();
    store.create_table(TEST_TABLE, composite_schema());
    for i in 0..count {
        store
            .put_item(TEST_TABLE, item(&format!("user#{}", i % 97), i as u64))
            .expect("seed item");
    }
    store
}

pub(crate) fn fast_policy(max_retries: u32) -> BackoffPolicy {
    BackoffPolicy {
        max_retries,
        base_delay_ms: 10,
        max_delay_ms: 80,
    }
}

pub(crate) fn test_config(total_segments: u32) -> PurgeConfig {
    let mut config = PurgeConfig::default();
    config.table.name = TEST_TABLE.to_string();
    config.table.total_segments = total_segments;
    config.table.page_size = 50;
    config.table.batch_size = 25;
    config.retry.batch_delete = fast_policy(4);
    config.retry.scan = fast_policy(3);
    config.monitoring.progress_interval_ms = 100;
    config
}
