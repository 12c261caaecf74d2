/*!
The Engine: the single entry point that dispatches the nine operations
against a table's catalog, data files, hot metadata cache, writer, and
compactor, under a deadline appropriate to the operation's class.

Transport (receiving the JSON envelope, returning it over whatever
wire a caller uses) lives outside this crate; [Engine::handle] is the
narrowest useful boundary: it takes an already-parsed [OperationKind]
plus a body `Value` and returns a [ResponseEnvelope].
*/

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::cache::MetadataCache;
use crate::catalog::identifier::TableIdentifier;
use crate::catalog::CatalogAdapter;
use crate::compaction::Compactor;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::format::TableFormat;
use crate::model::physical_schema::PhysicalSchema;
use crate::model::snapshot::Operation;
use crate::model::table_metadata::TableMetadata;
use crate::mvcc;
use crate::protocol::{
    CompactEnvelope, CreateTableRequest, MutationRequest, OperationKind, QueryEnvelope,
    ResponseEnvelope, TableRefRequest, WriteRequest,
};
use crate::query;
use crate::record::envelope_for_insert;
use crate::row::Row;
use crate::writer::Writer;

/// Ties together the catalog, data file format, hot metadata cache,
/// writer, and compactor, dispatching each of the nine operations
/// under the configured deadline.
pub struct Engine {
    catalog: Arc<dyn CatalogAdapter>,
    format: Arc<dyn TableFormat>,
    cache: Arc<MetadataCache>,
    writer: Writer,
    compactor: Compactor,
    config: EngineConfig,
}

impl Engine {
    /// Build an engine over the given catalog and data file format.
    pub fn new(catalog: Arc<dyn CatalogAdapter>, format: Arc<dyn TableFormat>, config: EngineConfig) -> Self {
        let cache = Arc::new(MetadataCache::new(config.cache_ttl()));
        let writer = Writer::new(
            catalog.clone(),
            format.clone(),
            cache.clone(),
            config.performance.clone(),
            config.compaction.clone(),
        );
        let compactor = Compactor::new(
            catalog.clone(),
            format.clone(),
            cache.clone(),
            config.compaction.clone(),
        );
        Engine {
            catalog,
            format,
            cache,
            writer,
            compactor,
            config,
        }
    }

    /// Dispatch one operation, enforcing the deadline its class carries
    /// and always returning a [ResponseEnvelope] rather than an `Err` —
    /// failures are folded into the envelope's `error` field so a
    /// transport layer never needs to special-case a panic-free failure
    /// path.
    #[instrument(skip(self, body))]
    pub async fn handle(&self, request_id: String, operation: OperationKind, body: Value) -> ResponseEnvelope {
        let start = Instant::now();
        let timeout = match operation {
            OperationKind::Query | OperationKind::DescribeTable | OperationKind::ListTables => {
                self.config.read_timeout()
            }
            OperationKind::Compact => self.config.compaction_timeout(),
            _ => self.config.write_timeout(),
        };

        let outcome = tokio::time::timeout(timeout, self.dispatch(operation, body)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok((data, metadata))) => {
                let mut envelope = ResponseEnvelope::success(request_id, elapsed_ms, data, metadata);
                attach_compaction_hint(&mut envelope);
                envelope
            }
            Ok(Err(error)) => ResponseEnvelope::failure(request_id, elapsed_ms, &error),
            Err(_) => {
                let error = EngineError::Timeout(format!("operation exceeded {timeout:?} deadline"));
                ResponseEnvelope::failure(request_id, elapsed_ms, &error)
            }
        }
    }

    async fn dispatch(&self, operation: OperationKind, body: Value) -> Result<(Value, Value)> {
        match operation {
            OperationKind::CreateTable => self.create_table(body).await,
            OperationKind::Write => self.write(body).await,
            OperationKind::Query => self.query(body).await,
            OperationKind::Update => self.update(body).await,
            OperationKind::Delete => self.delete(body).await,
            OperationKind::HardDelete => self.hard_delete(body).await,
            OperationKind::ListTables => self.list_tables(body).await,
            OperationKind::DescribeTable => self.describe_table(body).await,
            OperationKind::Compact => self.compact(body).await,
        }
    }

    async fn create_table(&self, body: Value) -> Result<(Value, Value)> {
        let request: CreateTableRequest = serde_json::from_value(body)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid CREATE_TABLE body: {e}")))?;
        let identifier = TableIdentifier::try_new(&request.tenant_id, &request.namespace, &request.table)?;

        if request.if_not_exists && self.catalog.table_exists(&identifier).await? {
            let existing = self.catalog.load_table(&identifier).await?;
            return Ok((describe_payload(&existing), json!({})));
        }

        let user_schema = request.parse_schema()?;
        let physical_schema = PhysicalSchema::from_user_schema(&user_schema)?;
        let now_ms = now_millis();
        let location = format!("{}/{}/data/", identifier.physical_namespace(), request.table);
        let metadata = TableMetadata {
            table_uuid: Uuid::new_v4(),
            tenant_id: request.tenant_id,
            namespace: request.namespace,
            table_name: request.table,
            location,
            user_schema,
            physical_schema,
            last_sequence_number: 0,
            current_snapshot_id: None,
            snapshots: Vec::new(),
            properties: request.properties,
            writes_since_compaction: 0,
            created_at_ms: now_ms,
            last_updated_ms: now_ms,
        };
        self.catalog.create_table(metadata.clone()).await?;
        Ok((describe_payload(&metadata), json!({})))
    }

    async fn write(&self, body: Value) -> Result<(Value, Value)> {
        let request: WriteRequest = serde_json::from_value(body)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid WRITE body: {e}")))?;
        let identifier = TableIdentifier::try_new(&request.tenant_id, &request.namespace, &request.table)?;
        let metadata = self.load_metadata(&identifier).await?.1;

        let user_columns: Vec<String> = metadata.physical_schema.user_fields.iter().map(|f| f.name.clone()).collect();
        let rows: Vec<Row> = request
            .rows
            .into_iter()
            .map(|row| envelope_for_insert(row, &request.tenant_id, &user_columns))
            .collect();

        let outcome = self.writer.append(&identifier, rows, Operation::Append).await?;
        let data = json!({ "snapshot_id": outcome.snapshot_id, "records_written": outcome.records_written });
        let metadata = json!({
            "compaction_recommended": outcome.compaction_recommended,
            "small_files_count": outcome.small_files_count,
        });
        Ok((data, metadata))
    }

    async fn query(&self, body: Value) -> Result<(Value, Value)> {
        let envelope: QueryEnvelope = serde_json::from_value(body)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid QUERY body: {e}")))?;
        let identifier = TableIdentifier::try_new(&envelope.tenant_id, &envelope.namespace, &envelope.table)?;
        let (cache_hit, table_metadata) = self.load_metadata(&identifier).await?;

        let snapshot = match envelope.as_of {
            Some(as_of_ms) => table_metadata.snapshot_as_of(as_of_ms),
            None => table_metadata.current_snapshot(),
        };

        let mut scanned = Vec::new();
        let mut scanned_bytes = 0u64;
        if let Some(snapshot) = snapshot {
            for file in &snapshot.data_files {
                scanned_bytes += file.size_bytes;
                scanned.extend(self.format.read_rows(&table_metadata.physical_schema, file).await?);
            }
        }

        let request = envelope.to_query_request()?;
        let result = query::execute(
            &table_metadata.physical_schema,
            scanned,
            &envelope.tenant_id,
            &request,
            scanned_bytes,
            cache_hit,
        )?;
        let data = json!({ "rows": result.rows });
        let metadata = serde_json::to_value(&result.metadata)?;
        Ok((data, metadata))
    }

    async fn update(&self, body: Value) -> Result<(Value, Value)> {
        let request: MutationRequest = serde_json::from_value(body)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid UPDATE body: {e}")))?;
        let identifier = TableIdentifier::try_new(&request.tenant_id, &request.namespace, &request.table)?;
        let filters = request.parse_filters()?;
        let outcome = mvcc::update(
            &self.catalog,
            &self.format,
            &self.writer,
            &identifier,
            &request.tenant_id,
            filters,
            request.updates,
        )
        .await?;
        Ok(mutation_payload(outcome))
    }

    async fn delete(&self, body: Value) -> Result<(Value, Value)> {
        let request: MutationRequest = serde_json::from_value(body)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid DELETE body: {e}")))?;
        let identifier = TableIdentifier::try_new(&request.tenant_id, &request.namespace, &request.table)?;
        let filters = request.parse_filters()?;
        let outcome = mvcc::soft_delete(
            &self.catalog,
            &self.format,
            &self.writer,
            &identifier,
            &request.tenant_id,
            filters,
        )
        .await?;
        Ok(mutation_payload(outcome))
    }

    async fn hard_delete(&self, body: Value) -> Result<(Value, Value)> {
        let request: MutationRequest = serde_json::from_value(body)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid HARD_DELETE body: {e}")))?;
        let identifier = TableIdentifier::try_new(&request.tenant_id, &request.namespace, &request.table)?;
        let filters = request.parse_filters()?;
        let outcome = mvcc::hard_delete(
            &self.catalog,
            &self.format,
            &self.writer,
            &identifier,
            &request.tenant_id,
            filters,
            request.confirm,
        )
        .await?;
        self.cache.invalidate(&identifier);
        Ok(mutation_payload(outcome))
    }

    async fn list_tables(&self, body: Value) -> Result<(Value, Value)> {
        let request: TableRefRequest = serde_json::from_value(body)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid LIST_TABLES body: {e}")))?;
        let tables = self.catalog.list_tables(&request.tenant_id, &request.namespace).await?;
        Ok((json!({ "tables": tables }), json!({})))
    }

    async fn describe_table(&self, body: Value) -> Result<(Value, Value)> {
        let request: TableRefRequest = serde_json::from_value(body)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid DESCRIBE_TABLE body: {e}")))?;
        let table = request
            .table
            .as_deref()
            .ok_or_else(|| EngineError::InvalidRequest("DESCRIBE_TABLE requires \"table\"".to_string()))?;
        let identifier = TableIdentifier::try_new(&request.tenant_id, &request.namespace, table)?;
        let metadata = self.catalog.load_table(&identifier).await?;
        Ok((describe_payload(&metadata), json!({})))
    }

    async fn compact(&self, body: Value) -> Result<(Value, Value)> {
        let envelope: CompactEnvelope = serde_json::from_value(body)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid COMPACT body: {e}")))?;
        let identifier = TableIdentifier::try_new(&envelope.tenant_id, &envelope.namespace, &envelope.table)?;
        let request = envelope.to_compact_request();
        let result = self.compactor.compact(&identifier, &request).await?;
        let data = json!({
            "compacted": result.compacted,
            "files_before": result.files_before,
            "files_after": result.files_after,
            "files_compacted": result.files_compacted,
            "files_removed": result.files_removed,
            "bytes_before": result.bytes_before,
            "bytes_after": result.bytes_after,
            "bytes_saved": result.bytes_saved,
            "snapshots_expired": result.snapshots_expired,
            "small_files_remaining": result.small_files_remaining,
        });
        let metadata = json!({ "compaction_time_ms": result.compaction_time_ms });
        Ok((data, metadata))
    }

    /// Resolve a table's metadata, consulting the hot cache first and
    /// populating it on a miss. Returns whether the result was a cache hit.
    async fn load_metadata(&self, identifier: &TableIdentifier) -> Result<(bool, TableMetadata)> {
        if let Some(metadata) = self.cache.get(identifier) {
            return Ok((true, metadata));
        }
        let metadata = self.catalog.load_table(identifier).await?;
        self.cache.put(identifier, metadata.clone());
        Ok((false, metadata))
    }
}

fn mutation_payload(outcome: mvcc::MutationOutcome) -> (Value, Value) {
    let data = json!({ "records_affected": outcome.records_affected });
    let metadata = match &outcome.write {
        Some(write) => json!({
            "snapshot_id": write.snapshot_id,
            "compaction_recommended": write.compaction_recommended,
            "small_files_count": write.small_files_count,
        }),
        None => json!({}),
    };
    (data, metadata)
}

fn describe_payload(metadata: &TableMetadata) -> Value {
    let snapshot = metadata.current_snapshot();
    let file_count = snapshot.map(|s| s.data_files.len()).unwrap_or(0);
    let total_bytes = snapshot.map(|s| s.total_size_bytes()).unwrap_or(0);
    let record_count_estimate = snapshot.map(|s| s.total_record_count()).unwrap_or(0);
    json!({
        "table_uuid": metadata.table_uuid,
        "tenant_id": metadata.tenant_id,
        "namespace": metadata.namespace,
        "table": metadata.table_name,
        "location": metadata.location,
        "schema": metadata.user_schema,
        "physical_schema": physical_schema_payload(&metadata.physical_schema),
        "current_snapshot_id": metadata.current_snapshot_id,
        "snapshot_count": metadata.snapshots.len(),
        "file_count": file_count,
        "total_bytes": total_bytes,
        "record_count_estimate": record_count_estimate,
        "properties": metadata.properties,
        "created_at_ms": metadata.created_at_ms,
        "last_updated_ms": metadata.last_updated_ms,
    })
}

/// Render a physical schema's column names and ids for `DESCRIBE_TABLE`.
/// Nested structure (array/map/struct internals) isn't flattened here —
/// callers that need it can walk `TableMetadata::physical_schema`
/// directly; this is the summary a transport layer would show a human.
fn physical_schema_payload(schema: &PhysicalSchema) -> Value {
    let columns: Vec<Value> = schema
        .all_fields()
        .map(|f| json!({ "id": f.id, "name": f.name, "required": f.definition.required }))
        .collect();
    json!({ "columns": columns })
}

fn attach_compaction_hint(envelope: &mut ResponseEnvelope) {
    let Some(metadata) = envelope.metadata.as_object() else {
        return;
    };
    if let Some(recommended) = metadata.get("compaction_recommended").and_then(Value::as_bool) {
        envelope.compaction_recommended = Some(recommended);
    }
    if let Some(count) = metadata.get("small_files_count").and_then(Value::as_u64) {
        envelope.small_files_count = Some(count);
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
