use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::project_key;
use crate::utils::async_task::task_with_exponential_backoff;
use crate::BackoffPolicy;
use crate::ItemKey;
use crate::ScanCursor;
use crate::ScanRequest;
use crate::Segment;
use crate::StoreResult;
use crate::TableStore;

/// Result of one `next_page` call
#[derive(Debug, PartialEq, Eq)]
pub enum ScanStep {
    /// Keys of the next page, possibly empty when the store filtered everything out
    Page(Vec<ItemKey>),
    /// The partition has no more pages
    Exhausted,
    /// Cancellation was observed while backing off
    Cancelled,
}

/// Walks one segment of a table page by page, in cursor order.
///
/// The cursor only advances after a page has been returned, so a failed or cancelled
/// call can be repeated with the same cursor.
pub struct SegmentedScanner<S>
where S: TableStore + ?Sized
{
    store: Arc<S>,
    table: String,
    segment: Segment,
    projection: Vec<String>,
    page_size: u32,
    read_policy: BackoffPolicy,
    cursor: Option<ScanCursor>,
    exhausted: bool,
}

impl<S> SegmentedScanner<S>
where S: TableStore + ?Sized
{
    pub fn new(
        store: Arc<S>,
        table: impl Into<String>,
        segment: Segment,
        projection: Vec<String>,
        page_size: u32,
        read_policy: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            segment,
            projection,
            page_size,
            read_policy,
            cursor: None,
            exhausted: false,
        }
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetches the page after the current cursor.
    ///
    /// Throttled reads are retried under the read policy; other errors are returned and
    /// leave the cursor untouched.
    pub async fn next_page(
        &mut self,
        cancel: &CancellationToken,
    ) -> StoreResult<ScanStep> {
        if self.exhausted {
            return Ok(ScanStep::Exhausted);
        }

        let request = ScanRequest {
            table: self.table.clone(),
            segment: self.segment,
            projection: self.projection.clone(),
            cursor: self.cursor.clone(),
            limit: self.page_size,
        };
        let store = &self.store;
        let request = &request;
        let page = task_with_exponential_backoff(
            move || store.scan_partition(request.clone()),
            self.read_policy,
            cancel,
        )
        .await?;

        let Some(page) = page else {
            return Ok(ScanStep::Cancelled);
        };

        let keys: Vec<ItemKey> = page.items.iter().map(|item| project_key(item, &self.projection)).collect();
        debug!(segment = %self.segment, keys = keys.len(), has_more = page.next_cursor.is_some(), "scanned page");

        match page.next_cursor {
            Some(cursor) => self.cursor = Some(cursor),
            None => {
                self.cursor = None;
                self.exhausted = true;
            }
        }

        Ok(ScanStep::Page(keys))
    }
}
