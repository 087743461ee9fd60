use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_config::Region;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue as DynamoValue;
use aws_sdk_dynamodb::types::DeleteRequest;
use aws_sdk_dynamodb::types::KeyType;
use aws_sdk_dynamodb::types::WriteRequest;
use aws_sdk_dynamodb::Client;
use tracing::debug;
use tracing::trace;

use super::AttributeValue;
use super::ItemKey;
use super::ItemKeyBatch;
use super::KeySpec;
use super::ScanCursor;
use super::ScanPage;
use super::ScanRequest;
use super::TableStore;
use crate::StoreConfig;
use crate::StoreError;
use crate::StoreResult;

/// AWS error codes that mean "slow down", as opposed to a broken request
const THROTTLING_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
];

type DynamoItem = HashMap<String, DynamoValue>;

/// [`TableStore`] backed by Amazon DynamoDB.
///
/// - key schema: `DescribeTable`
/// - partitions: parallel `Scan` with `Segment`/`TotalSegments` and a projection on the key
///   attributes
/// - deletes: `BatchWriteItem` with `DeleteRequest`s, `UnprocessedItems` returned as-is
pub struct DynamoDbStore {
    client: Client,
}

impl DynamoDbStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the default AWS provider chain plus the configured overrides
    pub async fn connect(config: &StoreConfig) -> Self {
        let sdk_config = load_sdk_config(config).await;
        debug!(region = ?sdk_config.region(), "dynamodb client configured");

        Self::new(Client::new(&sdk_config))
    }
}

/// SDK retries are disabled: throttled calls surface as [`StoreError::Throttled`] and the
/// scanner/deleter backoff owns every retry.
pub(crate) async fn load_sdk_config(config: &StoreConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::disabled());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint_url) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }
    loader.load().await
}

/// Maps an SDK failure onto the closed store error set
fn classify<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug,
{
    let throttled = err.code().is_some_and(|code| THROTTLING_CODES.contains(&code));
    let message = DisplayErrorContext(&err).to_string();
    if throttled {
        StoreError::Throttled(message)
    } else {
        StoreError::NonRetryable(message)
    }
}

fn to_dynamo_value(value: AttributeValue) -> DynamoValue {
    match value {
        AttributeValue::S(s) => DynamoValue::S(s),
        AttributeValue::N(n) => DynamoValue::N(n),
        AttributeValue::B(b) => DynamoValue::B(Blob::new(b)),
    }
}

fn from_dynamo_value(
    name: &str,
    value: &DynamoValue,
) -> StoreResult<AttributeValue> {
    match value {
        DynamoValue::S(s) => Ok(AttributeValue::S(s.clone())),
        DynamoValue::N(n) => Ok(AttributeValue::N(n.clone())),
        DynamoValue::B(b) => Ok(AttributeValue::B(b.as_ref().to_vec())),
        other => Err(StoreError::NonRetryable(format!(
            "key attribute {name} has unsupported type {other:?}"
        ))),
    }
}

fn to_dynamo_item(key: ItemKey) -> DynamoItem {
    key.into_iter().map(|(name, value)| (name, to_dynamo_value(value))).collect()
}

fn from_dynamo_item(item: &DynamoItem) -> StoreResult<ItemKey> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), from_dynamo_value(name, value)?)))
        .collect()
}

#[async_trait]
impl TableStore for DynamoDbStore {
    async fn describe_key_schema(
        &self,
        table: &str,
    ) -> StoreResult<Vec<KeySpec>> {
        let output = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|err| StoreError::SchemaUnavailable {
                table: table.to_string(),
                reason: DisplayErrorContext(&err).to_string(),
            })?;

        let description = output.table().ok_or_else(|| StoreError::SchemaUnavailable {
            table: table.to_string(),
            reason: "DescribeTable returned no table description".to_string(),
        })?;

        description
            .key_schema()
            .iter()
            .map(|element| match element.key_type() {
                KeyType::Hash => Ok(KeySpec::partition(element.attribute_name())),
                KeyType::Range => Ok(KeySpec::sort(element.attribute_name())),
                other => Err(StoreError::SchemaUnavailable {
                    table: table.to_string(),
                    reason: format!("unknown key type {other:?}"),
                }),
            })
            .collect()
    }

    async fn scan_partition(
        &self,
        request: ScanRequest,
    ) -> StoreResult<ScanPage> {
        // placeholders keep reserved words such as `name` or `key` valid in projections
        let names: HashMap<String, String> = request
            .projection
            .iter()
            .enumerate()
            .map(|(i, attribute)| (format!("#k{i}"), attribute.clone()))
            .collect();
        let projection_expression = (0..request.projection.len())
            .map(|i| format!("#k{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        let output = self
            .client
            .scan()
            .table_name(&request.table)
            .segment(request.segment.segment_id as i32)
            .total_segments(request.segment.total_segments as i32)
            .limit(request.limit.min(i32::MAX as u32) as i32)
            .projection_expression(projection_expression)
            .set_expression_attribute_names(Some(names))
            .set_exclusive_start_key(request.cursor.map(|c| to_dynamo_item(c.into_inner())))
            .send()
            .await
            .map_err(classify)?;

        let items = output
            .items()
            .iter()
            .map(from_dynamo_item)
            .collect::<StoreResult<Vec<_>>>()?;
        let next_cursor = output
            .last_evaluated_key()
            .map(from_dynamo_item)
            .transpose()?
            .map(ScanCursor::new);
        trace!(table = %request.table, segment = %request.segment, returned = items.len(), "scan page");

        Ok(ScanPage { items, next_cursor })
    }

    async fn batch_delete(
        &self,
        table: &str,
        keys: ItemKeyBatch,
    ) -> StoreResult<ItemKeyBatch> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let requests = keys
            .into_iter()
            .map(|key| {
                let delete = DeleteRequest::builder()
                    .set_key(Some(to_dynamo_item(key)))
                    .build()
                    .map_err(|e| StoreError::NonRetryable(format!("invalid delete request: {e}")))?;
                Ok(WriteRequest::builder().delete_request(delete).build())
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(classify)?;

        let mut unprocessed = Vec::new();
        if let Some(pending) = output.unprocessed_items().and_then(|items| items.get(table)) {
            for request in pending {
                if let Some(delete) = request.delete_request() {
                    unprocessed.push(from_dynamo_item(delete.key())?);
                }
            }
        }

        Ok(unprocessed)
    }

    async fn estimate_item_count(
        &self,
        table: &str,
    ) -> StoreResult<Option<u64>> {
        let output = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(classify)?;

        // DynamoDB refreshes this figure roughly every six hours
        Ok(output
            .table()
            .and_then(|t| t.item_count())
            .and_then(|count| u64::try_from(count).ok()))
    }
}
