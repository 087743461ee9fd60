use super::*;
use crate::test_utils::composite_schema;
use crate::test_utils::seeded_store;
use crate::test_utils::TEST_TABLE;
use crate::Error;
use crate::KeySpec;
use crate::MockTableStore;
use crate::StoreError;

#[test]
fn try_new_orders_partition_key_first() {
    let schema = KeySchema::try_new("t", vec![KeySpec::sort("sk"), KeySpec::partition("pk")]).unwrap();

    assert_eq!(schema.attribute_names(), vec!["pk".to_string(), "sk".to_string()]);
    assert_eq!(schema.partition_key().attribute_name, "pk");
    assert_eq!(schema.sort_key().map(|k| k.attribute_name.as_str()), Some("sk"));
    assert_eq!(schema.to_string(), "pk (partition), sk (sort)");
}

#[test]
fn try_new_accepts_partition_only_schema() {
    let schema = KeySchema::try_new("t", vec![KeySpec::partition("id")]).unwrap();

    assert_eq!(schema.keys().len(), 1);
    assert!(schema.sort_key().is_none());
    assert_eq!(schema.to_string(), "id (partition)");
}

#[test]
fn try_new_rejects_malformed_schemas() {
    let cases = vec![
        vec![],
        vec![KeySpec::sort("sk")],
        vec![KeySpec::partition("a"), KeySpec::partition("b")],
        vec![KeySpec::partition("a"), KeySpec::sort("b"), KeySpec::sort("c")],
        vec![KeySpec::partition("")],
        vec![KeySpec::partition("a"), KeySpec::sort("")],
    ];

    for keys in cases {
        let result = KeySchema::try_new("t", keys.clone());
        assert!(
            matches!(result, Err(Error::SchemaUnavailable { ref table, .. }) if table == "t"),
            "accepted {keys:?}"
        );
    }
}

#[tokio::test]
async fn resolve_key_schema_reads_store_schema() {
    let store = seeded_store(0);

    let schema = resolve_key_schema(&store, TEST_TABLE).await.unwrap();

    assert_eq!(schema.keys(), composite_schema().as_slice());
}

#[tokio::test]
async fn resolve_key_schema_maps_missing_table() {
    let store = seeded_store(0);

    let result = resolve_key_schema(&store, "absent").await;

    assert!(matches!(result, Err(Error::SchemaUnavailable { ref table, .. }) if table == "absent"));
}

#[tokio::test]
async fn resolve_key_schema_maps_every_store_error() {
    for error in [
        StoreError::Throttled("slow down".into()),
        StoreError::NonRetryable("access denied".into()),
    ] {
        let mut store = MockTableStore::new();
        let returned = error.clone();
        store
            .expect_describe_key_schema()
            .times(1)
            .returning(move |_| Err(returned.clone()));

        let result = resolve_key_schema(&store, TEST_TABLE).await;

        match result {
            Err(Error::SchemaUnavailable { table, reason }) => {
                assert_eq!(table, TEST_TABLE);
                assert_eq!(reason, error.to_string());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
