//! The six literal end-to-end scenarios.

use std::sync::Arc;

use object_store::memory::InMemory;
use serde_json::json;
use tableforge::catalog::memory::InMemoryCatalogAdapter;
use tableforge::config::EngineConfig;
use tableforge::engine::Engine;
use tableforge::format::AvroTableFormat;
use tableforge::protocol::OperationKind;

fn new_engine() -> Engine {
    let catalog = Arc::new(InMemoryCatalogAdapter::new());
    let store = Arc::new(InMemory::new());
    let format = Arc::new(AvroTableFormat::new(store));
    Engine::new(catalog, format, EngineConfig::default())
}

async fn create_table(engine: &Engine, tenant: &str, table: &str, schema: serde_json::Value) {
    let response = engine
        .handle(
            "create".to_string(),
            OperationKind::CreateTable,
            json!({"tenant_id": tenant, "namespace": "ns", "table": table, "schema": schema}),
        )
        .await;
    assert!(response.success, "create_table failed: {:?}", response.error);
}

async fn write(engine: &Engine, tenant: &str, table: &str, rows: serde_json::Value) -> tableforge::protocol::ResponseEnvelope {
    let response = engine
        .handle(
            "write".to_string(),
            OperationKind::Write,
            json!({"tenant_id": tenant, "namespace": "ns", "table": table, "rows": rows}),
        )
        .await;
    assert!(response.success, "write failed: {:?}", response.error);
    response
}

async fn query(engine: &Engine, tenant: &str, table: &str, body: serde_json::Value) -> tableforge::protocol::ResponseEnvelope {
    let mut full_body = json!({"tenant_id": tenant, "namespace": "ns", "table": table});
    for (key, value) in body.as_object().unwrap() {
        full_body[key] = value.clone();
    }
    let response = engine.handle("query".to_string(), OperationKind::Query, full_body).await;
    assert!(response.success, "query failed: {:?}", response.error);
    response
}

#[tokio::test]
async fn scenario_1_create_write_query() {
    let engine = new_engine();
    create_table(
        &engine,
        "acme",
        "t",
        json!({"fields": {
            "id": {"type": "long", "required": true},
            "name": {"type": "string", "required": true},
            "price": {"type": "double", "required": true}
        }}),
    )
    .await;
    write(
        &engine,
        "acme",
        "t",
        json!([{"id": 1, "name": "A", "price": 10.0}, {"id": 2, "name": "B", "price": 20.0}]),
    )
    .await;

    let response = query(&engine, "acme", "t", json!({"projection": ["id", "name", "price", "_version", "_deleted"]})).await;
    let rows = response.data["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row["_version"], json!(1));
        assert_eq!(row["_deleted"], json!(false));
    }
}

#[tokio::test]
async fn scenario_2_update_latest_only() {
    let engine = new_engine();
    create_table(
        &engine,
        "acme",
        "t",
        json!({"fields": {
            "id": {"type": "long", "required": true},
            "name": {"type": "string", "required": true},
            "price": {"type": "double", "required": true}
        }}),
    )
    .await;
    write(
        &engine,
        "acme",
        "t",
        json!([{"id": 1, "name": "A", "price": 10.0}, {"id": 2, "name": "B", "price": 20.0}]),
    )
    .await;

    for price in [11.0, 12.0, 13.0] {
        let response = engine
            .handle(
                "update".to_string(),
                OperationKind::Update,
                json!({
                    "tenant_id": "acme", "namespace": "ns", "table": "t",
                    "filters": [{"field": "id", "operator": "eq", "value": 1}],
                    "updates": {"price": price}
                }),
            )
            .await;
        assert!(response.success, "{:?}", response.error);
        assert_eq!(response.data["records_affected"], json!(1));
    }

    let response = query(&engine, "acme", "t", json!({})).await;
    let rows = response.data["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let row1 = rows.iter().find(|r| r["id"] == json!(1)).unwrap();
    assert_eq!(row1["price"], json!(13.0));

    let response = query(
        &engine,
        "acme",
        "t",
        json!({
            "projection": ["_version", "price"],
            "filters": [{"field": "id", "operator": "eq", "value": 1}],
            "sort": [{"field": "_version"}],
            "skip_versioning": true
        }),
    )
    .await;
    let rows = response.data["rows"].as_array().unwrap();
    let observed: Vec<(i64, f64)> = rows
        .iter()
        .map(|r| (r["_version"].as_i64().unwrap(), r["price"].as_f64().unwrap()))
        .collect();
    assert_eq!(observed, vec![(1, 10.0), (2, 11.0), (3, 12.0), (4, 13.0)]);
}

#[tokio::test]
async fn scenario_3_bulk_update() {
    let engine = new_engine();
    create_table(
        &engine,
        "acme",
        "t",
        json!({"fields": {
            "id": {"type": "long", "required": true},
            "category": {"type": "string", "required": true},
            "stock": {"type": "long"}
        }}),
    )
    .await;
    write(
        &engine,
        "acme",
        "t",
        json!([
            {"id": 1, "category": "X"}, {"id": 2, "category": "X"},
            {"id": 3, "category": "X"}, {"id": 4, "category": "X"},
            {"id": 5, "category": "Y"}, {"id": 6, "category": "Y"}
        ]),
    )
    .await;

    let response = engine
        .handle(
            "update".to_string(),
            OperationKind::Update,
            json!({
                "tenant_id": "acme", "namespace": "ns", "table": "t",
                "filters": [{"field": "category", "operator": "eq", "value": "X"}],
                "updates": {"stock": 100}
            }),
        )
        .await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.data["records_affected"], json!(4));

    let response = query(
        &engine,
        "acme",
        "t",
        json!({"filters": [{"field": "category", "operator": "eq", "value": "X"}]}),
    )
    .await;
    let rows = response.data["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 4);
    for row in rows {
        assert_eq!(row["stock"], json!(100));
        assert_eq!(row["_version"], json!(2));
    }
}

#[tokio::test]
async fn scenario_4_soft_delete_then_time_travel() {
    let engine = new_engine();
    create_table(&engine, "acme", "t", json!({"fields": {"id": {"type": "long", "required": true}}})).await;

    let response = write(&engine, "acme", "t", json!([{"id": 1}])).await;
    let t1 = response.metadata["row_count"].clone();
    let _ = t1;
    // sleep a tick so T2 > T1 in wall-clock milliseconds
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let t1_ms = now_ms();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let response = engine
        .handle(
            "delete".to_string(),
            OperationKind::Delete,
            json!({
                "tenant_id": "acme", "namespace": "ns", "table": "t",
                "filters": [{"field": "id", "operator": "eq", "value": 1}]
            }),
        )
        .await;
    assert!(response.success, "{:?}", response.error);

    let response = query(&engine, "acme", "t", json!({})).await;
    assert_eq!(response.data["rows"].as_array().unwrap().len(), 0);

    let response = query(&engine, "acme", "t", json!({"as_of": t1_ms})).await;
    let rows = response.data["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);

    let response = query(&engine, "acme", "t", json!({"include_deleted": true})).await;
    let rows = response.data["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

#[tokio::test]
async fn scenario_5_compaction_preserves_data() {
    let engine = new_engine();
    create_table(&engine, "acme", "t", json!({"fields": {"id": {"type": "long", "required": true}}})).await;

    let mut next_id = 0;
    for _ in 0..10 {
        let rows = json!([{"id": next_id}, {"id": next_id + 1}]);
        next_id += 2;
        write(&engine, "acme", "t", rows).await;
    }

    let response = query(&engine, "acme", "t", json!({})).await;
    let before = response.data["rows"].as_array().unwrap().len();
    assert_eq!(before, 20);

    let response = engine
        .handle(
            "compact".to_string(),
            OperationKind::Compact,
            json!({"tenant_id": "acme", "namespace": "ns", "table": "t", "force": true}),
        )
        .await;
    assert!(response.success, "{:?}", response.error);
    let files_before = response.data["files_before"].as_u64().unwrap();
    let files_after = response.data["files_after"].as_u64().unwrap();
    assert!(files_after < files_before, "expected compaction to reduce file count");

    let response = query(&engine, "acme", "t", json!({})).await;
    assert_eq!(response.data["rows"].as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn scenario_6_nested_struct_query() {
    let engine = new_engine();
    create_table(
        &engine,
        "acme",
        "t",
        json!({"fields": {
            "user_id": {"type": "long", "required": true},
            "address": {"type": "struct", "fields": {"city": {"type": "string"}, "state": {"type": "string"}}}
        }}),
    )
    .await;
    write(
        &engine,
        "acme",
        "t",
        json!([
            {"user_id": 1, "address": {"city": "SF", "state": "CA"}},
            {"user_id": 2, "address": {"city": "NY", "state": "NY"}}
        ]),
    )
    .await;

    let response = query(
        &engine,
        "acme",
        "t",
        json!({
            "projection": ["user_id", "address.city"],
            "filters": [{"field": "address.state", "operator": "eq", "value": "CA"}]
        }),
    )
    .await;
    let rows = response.data["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["user_id"], json!(1));
    assert_eq!(rows[0]["address.city"], json!("SF"));
}
