use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::Bound;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::trace;

use super::project_key;
use super::AttributeValue;
use super::ItemKey;
use super::ItemKeyBatch;
use super::KeyRole;
use super::KeySpec;
use super::ScanCursor;
use super::ScanPage;
use super::ScanRequest;
use super::Segment;
use super::TableStore;
use crate::StoreError;
use crate::StoreResult;

struct MemTable {
    key_schema: Vec<KeySpec>,
    /// Full items indexed by their primary key
    items: BTreeMap<ItemKey, ItemKey>,
}

impl MemTable {
    fn partition_attribute(&self) -> Option<&str> {
        self.key_schema
            .iter()
            .find(|k| k.role == KeyRole::Partition)
            .map(|k| k.attribute_name.as_str())
    }

    fn key_of(
        &self,
        item: &ItemKey,
    ) -> StoreResult<ItemKey> {
        let mut key = ItemKey::new();
        for spec in &self.key_schema {
            let value = item.get(&spec.attribute_name).ok_or_else(|| {
                StoreError::NonRetryable(format!(
                    "item is missing key attribute {}",
                    spec.attribute_name
                ))
            })?;
            key.insert(spec.attribute_name.clone(), value.clone());
        }
        Ok(key)
    }

    fn segment_of(
        &self,
        key: &ItemKey,
        total_segments: u32,
    ) -> u32 {
        let hash = self
            .partition_attribute()
            .and_then(|name| key.get(name))
            .map(partition_hash)
            .unwrap_or(0);
        (hash % total_segments as u64) as u32
    }
}

/// FNV-1a over the partition value, stable across processes
fn partition_hash(value: &AttributeValue) -> u64 {
    let (tag, bytes): (u8, &[u8]) = match value {
        AttributeValue::S(s) => (b'S', s.as_bytes()),
        AttributeValue::N(n) => (b'N', n.as_bytes()),
        AttributeValue::B(b) => (b'B', b.as_slice()),
    };
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in std::iter::once(&tag).chain(bytes) {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[derive(Default)]
struct Faults {
    /// Keys applied per delete call before the rest come back unprocessed
    write_capacity: Option<usize>,
    /// Upcoming delete calls answered with `Throttled`
    throttled_deletes: u32,
    /// Upcoming scan calls answered with `Throttled`
    throttled_scans: u32,
    /// Batches containing any of these keys fail with `NonRetryable`
    rejected_keys: HashSet<ItemKey>,
}

/// In-process table store with native segment partitioning.
///
/// Items are assigned to segments by hashing the partition key attribute, so for a fixed
/// `total_segments` the segments are disjoint and exhaustive. Scans page in key order and
/// behave like DynamoDB: a full page always carries a cursor, even when nothing follows.
///
/// Fault injection hooks let callers rehearse throttling, partial batch failures and
/// hard failures without a live store.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, MemTable>>,
    faults: Mutex<Faults>,
    scan_calls: AtomicU64,
    delete_calls: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) an empty table
    pub fn create_table(
        &self,
        table: &str,
        key_schema: Vec<KeySpec>,
    ) {
        self.tables.write().insert(
            table.to_string(),
            MemTable {
                key_schema,
                items: BTreeMap::new(),
            },
        );
    }

    /// Inserts or overwrites an item; it must carry every key attribute
    pub fn put_item(
        &self,
        table: &str,
        item: ItemKey,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let mem_table = tables.get_mut(table).ok_or_else(|| missing_table(table))?;
        let key = mem_table.key_of(&item)?;
        mem_table.items.insert(key, item);
        Ok(())
    }

    pub fn item_count(
        &self,
        table: &str,
    ) -> usize {
        self.tables.read().get(table).map(|t| t.items.len()).unwrap_or(0)
    }

    /// Primary keys currently stored, in key order
    pub fn keys(
        &self,
        table: &str,
    ) -> Vec<ItemKey> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.items.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn scan_calls(&self) -> u64 {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Caps how many keys one delete call applies; `None` removes the cap
    pub fn set_write_capacity(
        &self,
        keys_per_call: Option<usize>,
    ) {
        self.faults.lock().write_capacity = keys_per_call;
    }

    pub fn throttle_next_deletes(
        &self,
        calls: u32,
    ) {
        self.faults.lock().throttled_deletes = calls;
    }

    pub fn throttle_next_scans(
        &self,
        calls: u32,
    ) {
        self.faults.lock().throttled_scans = calls;
    }

    /// Any delete batch containing `key` fails with a non-retryable error
    pub fn reject_key(
        &self,
        key: ItemKey,
    ) {
        self.faults.lock().rejected_keys.insert(key);
    }
}

fn missing_table(table: &str) -> StoreError {
    StoreError::SchemaUnavailable {
        table: table.to_string(),
        reason: "table not found".to_string(),
    }
}

#[async_trait]
impl TableStore for InMemoryStore {
    async fn describe_key_schema(
        &self,
        table: &str,
    ) -> StoreResult<Vec<KeySpec>> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.key_schema.clone())
            .ok_or_else(|| missing_table(table))
    }

    async fn scan_partition(
        &self,
        request: ScanRequest,
    ) -> StoreResult<ScanPage> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = self.faults.lock();
            if faults.throttled_scans > 0 {
                faults.throttled_scans -= 1;
                return Err(StoreError::Throttled("scan capacity exceeded".into()));
            }
        }

        let ScanRequest {
            table,
            segment,
            projection,
            cursor,
            limit,
        } = request;
        if limit == 0 || segment.total_segments == 0 || segment.segment_id >= segment.total_segments {
            return Err(StoreError::NonRetryable(format!(
                "invalid scan request: segment {segment}, limit {limit}"
            )));
        }

        let tables = self.tables.read();
        let mem_table = tables.get(&table).ok_or_else(|| {
            StoreError::NonRetryable(format!("requested resource not found: {table}"))
        })?;

        let Segment {
            segment_id,
            total_segments,
        } = segment;
        let after = cursor.map(ScanCursor::into_inner);
        // resume strictly after the cursor key, even if that key has since been deleted
        let start = match after.as_ref() {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        };
        let mut items = Vec::new();
        let mut last_key = None;
        for (key, item) in mem_table.items.range::<ItemKey, _>((start, Bound::Unbounded)) {
            if mem_table.segment_of(key, total_segments) != segment_id {
                continue;
            }
            items.push(project_key(item, &projection));
            last_key = Some(key.clone());
            if items.len() == limit as usize {
                break;
            }
        }

        let next_cursor = if items.len() == limit as usize {
            last_key.map(ScanCursor::new)
        } else {
            None
        };
        trace!(table = %table, %segment, returned = items.len(), "scan_partition");

        Ok(ScanPage { items, next_cursor })
    }

    async fn batch_delete(
        &self,
        table: &str,
        keys: ItemKeyBatch,
    ) -> StoreResult<ItemKeyBatch> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        let capacity = {
            let mut faults = self.faults.lock();
            if faults.throttled_deletes > 0 {
                faults.throttled_deletes -= 1;
                return Err(StoreError::Throttled("write capacity exceeded".into()));
            }
            if keys.iter().any(|k| faults.rejected_keys.contains(k)) {
                return Err(StoreError::NonRetryable(
                    "validation error: batch contains a rejected key".into(),
                ));
            }
            faults.write_capacity.unwrap_or(usize::MAX)
        };

        let mut tables = self.tables.write();
        let mem_table = tables.get_mut(table).ok_or_else(|| {
            StoreError::NonRetryable(format!("requested resource not found: {table}"))
        })?;

        let mut keys = keys;
        let unprocessed = if keys.len() > capacity {
            keys.split_off(capacity)
        } else {
            Vec::new()
        };
        for key in &keys {
            // deleting an absent key is a no-op, as in DynamoDB
            mem_table.items.remove(key);
        }
        trace!(table, applied = keys.len(), unprocessed = unprocessed.len(), "batch_delete");

        Ok(unprocessed)
    }

    async fn estimate_item_count(
        &self,
        table: &str,
    ) -> StoreResult<Option<u64>> {
        self.tables
            .read()
            .get(table)
            .map(|t| Some(t.items.len() as u64))
            .ok_or_else(|| missing_table(table))
    }
}
