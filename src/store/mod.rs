//! Store adapter boundary.
//!
//! The purge engine only needs three operations from the underlying key-value store:
//! key schema description, partitioned scans and batched deletes. Vendor specifics stay
//! behind [`TableStore`]; adapters translate their failures into the closed
//! [`StoreError`] set before anything reaches a worker.

mod dynamodb;
mod memory;
pub use dynamodb::*;
pub use memory::*;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::StoreResult;

/// Role of a primary key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Partition,
    Sort,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeySpec {
    pub attribute_name: String,
    pub role: KeyRole,
}

impl KeySpec {
    pub fn partition(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            role: KeyRole::Partition,
        }
    }

    pub fn sort(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            role: KeyRole::Sort,
        }
    }
}

/// Scalar value a key attribute can hold
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeValue {
    S(String),
    /// Numbers travel as their decimal string form
    N(String),
    B(Vec<u8>),
}

impl fmt::Display for AttributeValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            AttributeValue::S(s) => write!(f, "{s:?}"),
            AttributeValue::N(n) => write!(f, "{n}"),
            AttributeValue::B(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Attribute map of one item. For keys it holds exactly the primary key attributes.
pub type ItemKey = BTreeMap<String, AttributeValue>;

/// Ordered keys handed to a single delete request
pub type ItemKeyBatch = Vec<ItemKey>;

/// One disjoint partition of a table's key space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    pub segment_id: u32,
    pub total_segments: u32,
}

impl Segment {
    pub fn new(
        segment_id: u32,
        total_segments: u32,
    ) -> Self {
        debug_assert!(segment_id < total_segments);
        Self {
            segment_id,
            total_segments,
        }
    }

    /// Every segment of a `total_segments` split, in id order
    pub fn all(total_segments: u32) -> impl Iterator<Item = Segment> {
        (0..total_segments).map(move |segment_id| Segment::new(segment_id, total_segments))
    }
}

impl fmt::Display for Segment {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.segment_id, self.total_segments)
    }
}

/// Opaque continuation token of a partition scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor(ItemKey);

impl ScanCursor {
    pub fn new(last_evaluated_key: ItemKey) -> Self {
        Self(last_evaluated_key)
    }

    pub fn last_evaluated_key(&self) -> &ItemKey {
        &self.0
    }

    pub fn into_inner(self) -> ItemKey {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub table: String,
    pub segment: Segment,
    /// Attributes to return; key attributes only
    pub projection: Vec<String>,
    pub cursor: Option<ScanCursor>,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub items: Vec<ItemKey>,
    /// `None` once the segment is exhausted
    pub next_cursor: Option<ScanCursor>,
}

/// Operations the purge engine consumes from the underlying key-value store.
///
/// # Contract
/// - `scan_partition` with the same request is an idempotent read.
/// - For a fixed `total_segments`, every item belongs to exactly one segment.
/// - `batch_delete` returns the keys it did not apply; an empty vector means all keys
///   were removed. Capacity rejections surface as `StoreError::Throttled`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TableStore: Send + Sync + 'static {
    /// Ordered primary key attributes of `table`
    async fn describe_key_schema(
        &self,
        table: &str,
    ) -> StoreResult<Vec<KeySpec>>;

    /// One page of `request.segment`, starting after `request.cursor`
    async fn scan_partition(
        &self,
        request: ScanRequest,
    ) -> StoreResult<ScanPage>;

    /// Deletes `keys`, returning the unprocessed subset
    async fn batch_delete(
        &self,
        table: &str,
        keys: ItemKeyBatch,
    ) -> StoreResult<ItemKeyBatch>;

    /// Approximate item count when the store can report it cheaply
    async fn estimate_item_count(
        &self,
        table: &str,
    ) -> StoreResult<Option<u64>> {
        let _ = table;
        Ok(None)
    }
}

/// Narrows `item` to the attributes named in `projection`
pub fn project_key(
    item: &ItemKey,
    projection: &[String],
) -> ItemKey {
    projection
        .iter()
        .filter_map(|name| item.get(name).map(|value| (name.clone(), value.clone())))
        .collect()
}
