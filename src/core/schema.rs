use std::fmt;

use tracing::debug;

use crate::Error;
use crate::KeyRole;
use crate::KeySpec;
use crate::Result;
use crate::StoreError;
use crate::TableStore;

/// Ordered primary key of a table: partition key first, then an optional sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    keys: Vec<KeySpec>,
}

impl KeySchema {
    /// Validates and orders a raw key list.
    ///
    /// Exactly one partition key and at most one sort key are accepted; anything else
    /// cannot address single items for deletion.
    pub fn try_new(
        table: &str,
        keys: Vec<KeySpec>,
    ) -> Result<Self> {
        let unavailable = |reason: String| Error::SchemaUnavailable {
            table: table.to_string(),
            reason,
        };

        let mut partition = keys.iter().filter(|k| k.role == KeyRole::Partition);
        let mut sort = keys.iter().filter(|k| k.role == KeyRole::Sort);
        let partition_key = match (partition.next(), partition.next()) {
            (Some(key), None) => key.clone(),
            (None, _) => return Err(unavailable("no partition key reported".into())),
            (Some(_), Some(_)) => return Err(unavailable("more than one partition key reported".into())),
        };
        let sort_key = match (sort.next(), sort.next()) {
            (key, None) => key.cloned(),
            (_, Some(_)) => return Err(unavailable("more than one sort key reported".into())),
        };

        if partition_key.attribute_name.is_empty() || sort_key.as_ref().is_some_and(|k| k.attribute_name.is_empty()) {
            return Err(unavailable("key attribute with empty name".into()));
        }

        let keys = std::iter::once(partition_key).chain(sort_key).collect();
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[KeySpec] {
        &self.keys
    }

    pub fn partition_key(&self) -> &KeySpec {
        // non-empty by construction
        &self.keys[0]
    }

    pub fn sort_key(&self) -> Option<&KeySpec> {
        self.keys.get(1)
    }

    /// Attribute names to project in scans
    pub fn attribute_names(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.attribute_name.clone()).collect()
    }
}

impl fmt::Display for KeySchema {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{} (partition)", self.partition_key().attribute_name)?;
        if let Some(sort) = self.sort_key() {
            write!(f, ", {} (sort)", sort.attribute_name)?;
        }
        Ok(())
    }
}

/// Fetches the primary key once per purge run.
///
/// Every failure is reported as `Error::SchemaUnavailable`: without exact key attributes
/// no delete request can be built, so the run must stop before touching any data.
pub async fn resolve_key_schema<S>(
    store: &S,
    table: &str,
) -> Result<KeySchema>
where
    S: TableStore + ?Sized,
{
    let keys = store.describe_key_schema(table).await.map_err(|e| match e {
        StoreError::SchemaUnavailable { table, reason } => Error::SchemaUnavailable { table, reason },
        other @ (StoreError::Throttled(_) | StoreError::NonRetryable(_)) => Error::SchemaUnavailable {
            table: table.to_string(),
            reason: other.to_string(),
        },
    })?;

    let schema = KeySchema::try_new(table, keys)?;
    debug!(table, %schema, "key schema resolved");
    Ok(schema)
}
