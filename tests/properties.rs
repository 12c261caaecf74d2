//! Property-based tests for the core MVCC/query invariants.

use std::sync::Arc;

use object_store::memory::InMemory;
use proptest::prelude::*;
use serde_json::json;
use tableforge::catalog::memory::InMemoryCatalogAdapter;
use tableforge::config::EngineConfig;
use tableforge::engine::Engine;
use tableforge::format::AvroTableFormat;
use tableforge::protocol::OperationKind;
use tableforge::query::{latest_versions, QueryRequest};
use tableforge::record::{envelope_for_insert, record_id_for};
use tableforge::row::Row;

fn versioned_row(record_id: &str, version: i64, deleted: bool) -> Row {
    let mut row = Row::new();
    row.insert("_tenant_id".to_string(), json!("acme"));
    row.insert("_record_id".to_string(), json!(record_id));
    row.insert("_version".to_string(), json!(version));
    row.insert("_deleted".to_string(), json!(deleted));
    row
}

proptest! {
    /// Property 1: regardless of how many historical versions a record
    /// accumulates, or in what order they're scanned, `latest_versions`
    /// keeps exactly one row per `_record_id`: the one at the maximum
    /// `_version` seen.
    #[test]
    fn single_latest_version_per_record(versions in prop::collection::vec(1i64..100, 1..30)) {
        let rows: Vec<Row> = versions.iter().map(|v| versioned_row("r1", *v, false)).collect();
        let resolved = latest_versions(rows);
        let max_version = *versions.iter().max().unwrap();
        prop_assert_eq!(resolved.len(), 1);
        prop_assert_eq!(resolved[0]["_version"].as_i64().unwrap(), max_version);
    }

    /// Property 4: every `_record_id`'s highest surviving version strictly
    /// increases by exactly one, however many distinct ids are interleaved
    /// in the input.
    #[test]
    fn version_monotonicity_holds_independently_per_record(
        record_count in 1usize..6,
        updates_per_record in 1usize..6,
    ) {
        let mut rows = Vec::new();
        for r in 0..record_count {
            let record_id = format!("r{r}");
            for v in 1..=updates_per_record {
                rows.push(versioned_row(&record_id, v as i64, false));
            }
        }
        let resolved = latest_versions(rows);
        prop_assert_eq!(resolved.len(), record_count);
        for row in &resolved {
            prop_assert_eq!(row["_version"].as_i64().unwrap(), updates_per_record as i64);
        }
    }

    /// Property 8: `_record_id` is a pure function of the user columns —
    /// identical field values always hash to the same id, and the id
    /// never depends on which system columns happen to be present.
    #[test]
    fn record_id_is_deterministic_and_order_independent(id in 0i64..1000, name in "[a-z]{1,10}") {
        let columns = vec!["id".to_string(), "name".to_string()];

        let mut a = Row::new();
        a.insert("id".to_string(), json!(id));
        a.insert("name".to_string(), json!(name.clone()));

        let mut b = Row::new();
        b.insert("name".to_string(), json!(name));
        b.insert("id".to_string(), json!(id));
        b.insert("_version".to_string(), json!(99));

        prop_assert_eq!(record_id_for(&a, &columns), record_id_for(&b, &columns));
    }

    /// Property 3: the tenant predicate in `query::execute` excludes every
    /// row from another tenant, no matter how the two tenants' rows are
    /// interleaved in the scan.
    #[test]
    fn tenant_isolation_excludes_foreign_rows(
        own_count in 0usize..10,
        foreign_count in 0usize..10,
    ) {
        let schema = tableforge::model::physical_schema::PhysicalSchema::from_user_schema(
            &tableforge::model::field::UserSchema::from_schema_value(&json!({
                "fields": {"id": {"type": "long", "required": true}}
            })).unwrap()
        ).unwrap();

        let mut rows = Vec::new();
        for i in 0..own_count {
            let mut row = versioned_row(&format!("own{i}"), 1, false);
            row.insert("id".to_string(), json!(i as i64));
            rows.push(row);
        }
        for i in 0..foreign_count {
            let mut row = versioned_row(&format!("foreign{i}"), 1, false);
            row.insert("_tenant_id".to_string(), json!("globex"));
            row.insert("id".to_string(), json!(i as i64));
            rows.push(row);
        }

        let request = QueryRequest::default();
        let result = tableforge::query::execute(&schema, rows, "acme", &request, 0, false).unwrap();
        prop_assert_eq!(result.rows.len(), own_count);
    }
}

fn new_engine() -> Engine {
    let catalog = Arc::new(InMemoryCatalogAdapter::new());
    let store = Arc::new(InMemory::new());
    let format = Arc::new(AvroTableFormat::new(store));
    Engine::new(catalog, format, EngineConfig::default())
}

#[tokio::test]
async fn append_only_snapshots_never_shrink_the_live_file_set_on_write() {
    let engine = new_engine();
    engine
        .handle(
            "r1".to_string(),
            OperationKind::CreateTable,
            json!({
                "tenant_id": "acme", "namespace": "ns", "table": "t",
                "schema": {"fields": {"id": {"type": "long", "required": true}}}
            }),
        )
        .await;

    let mut previous_file_count = 0;
    for i in 0..5 {
        let response = engine
            .handle(
                format!("w{i}"),
                OperationKind::Write,
                json!({"tenant_id": "acme", "namespace": "ns", "table": "t", "rows": [{"id": i}]}),
            )
            .await;
        assert!(response.success, "{:?}", response.error);

        let describe = engine
            .handle(
                format!("d{i}"),
                OperationKind::DescribeTable,
                json!({"tenant_id": "acme", "namespace": "ns", "table": "t"}),
            )
            .await;
        let snapshot_count = describe.data["snapshot_count"].as_u64().unwrap();
        assert_eq!(snapshot_count, (i + 1) as u64);
        assert!(snapshot_count as usize >= previous_file_count);
        previous_file_count = snapshot_count as usize;
    }
}

#[tokio::test]
async fn update_fidelity_leaves_untouched_fields_unchanged() {
    let engine = new_engine();
    engine
        .handle(
            "r1".to_string(),
            OperationKind::CreateTable,
            json!({
                "tenant_id": "acme", "namespace": "ns", "table": "t",
                "schema": {"fields": {
                    "id": {"type": "long", "required": true},
                    "name": {"type": "string", "required": true},
                    "status": {"type": "string", "required": true}
                }}
            }),
        )
        .await;
    engine
        .handle(
            "r2".to_string(),
            OperationKind::Write,
            json!({
                "tenant_id": "acme", "namespace": "ns", "table": "t",
                "rows": [{"id": 1, "name": "widget", "status": "pending"}]
            }),
        )
        .await;
    engine
        .handle(
            "r3".to_string(),
            OperationKind::Update,
            json!({
                "tenant_id": "acme", "namespace": "ns", "table": "t",
                "filters": [{"field": "id", "operator": "eq", "value": 1}],
                "updates": {"status": "shipped"}
            }),
        )
        .await;

    let response = engine
        .handle(
            "r4".to_string(),
            OperationKind::Query,
            json!({"tenant_id": "acme", "namespace": "ns", "table": "t"}),
        )
        .await;
    let rows = response.data["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("widget"));
    assert_eq!(rows[0]["status"], json!("shipped"));
}

#[tokio::test]
async fn soft_deleted_rows_are_hidden_unless_requested() {
    let engine = new_engine();
    engine
        .handle(
            "r1".to_string(),
            OperationKind::CreateTable,
            json!({
                "tenant_id": "acme", "namespace": "ns", "table": "t",
                "schema": {"fields": {"id": {"type": "long", "required": true}}}
            }),
        )
        .await;
    engine
        .handle(
            "r2".to_string(),
            OperationKind::Write,
            json!({"tenant_id": "acme", "namespace": "ns", "table": "t", "rows": [{"id": 1}]}),
        )
        .await;
    engine
        .handle(
            "r3".to_string(),
            OperationKind::Delete,
            json!({
                "tenant_id": "acme", "namespace": "ns", "table": "t",
                "filters": [{"field": "id", "operator": "eq", "value": 1}]
            }),
        )
        .await;

    let response = engine
        .handle(
            "r4".to_string(),
            OperationKind::Query,
            json!({"tenant_id": "acme", "namespace": "ns", "table": "t"}),
        )
        .await;
    assert_eq!(response.data["rows"].as_array().unwrap().len(), 0);

    let response = engine
        .handle(
            "r5".to_string(),
            OperationKind::Query,
            json!({"tenant_id": "acme", "namespace": "ns", "table": "t", "include_deleted": true}),
        )
        .await;
    let rows = response.data["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["_deleted"], json!(true));
}

#[tokio::test]
async fn compaction_round_trips_the_full_live_row_set() {
    let engine = new_engine();
    engine
        .handle(
            "r1".to_string(),
            OperationKind::CreateTable,
            json!({
                "tenant_id": "acme", "namespace": "ns", "table": "t",
                "schema": {"fields": {"id": {"type": "long", "required": true}}}
            }),
        )
        .await;
    for i in 0..6 {
        engine
            .handle(
                format!("w{i}"),
                OperationKind::Write,
                json!({"tenant_id": "acme", "namespace": "ns", "table": "t", "rows": [{"id": i}]}),
            )
            .await;
    }

    let before = engine
        .handle(
            "q1".to_string(),
            OperationKind::Query,
            json!({"tenant_id": "acme", "namespace": "ns", "table": "t"}),
        )
        .await;
    let mut ids_before: Vec<i64> = before.data["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    ids_before.sort();

    let compact = engine
        .handle(
            "c1".to_string(),
            OperationKind::Compact,
            json!({"tenant_id": "acme", "namespace": "ns", "table": "t", "force": true}),
        )
        .await;
    assert!(compact.success, "{:?}", compact.error);

    let after = engine
        .handle(
            "q2".to_string(),
            OperationKind::Query,
            json!({"tenant_id": "acme", "namespace": "ns", "table": "t"}),
        )
        .await;
    let mut ids_after: Vec<i64> = after.data["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    ids_after.sort();

    assert_eq!(ids_before, ids_after);
}

#[test]
fn envelope_for_insert_stamps_version_one_and_not_deleted() {
    let mut row = Row::new();
    row.insert("id".to_string(), json!(1));
    let columns = vec!["id".to_string()];
    let enveloped = envelope_for_insert(row, "acme", &columns);
    assert_eq!(enveloped["_version"], json!(1));
    assert_eq!(enveloped["_deleted"], json!(false));
    assert_eq!(enveloped["_tenant_id"], json!("acme"));
}
