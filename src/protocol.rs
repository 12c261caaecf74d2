/*!
The outer JSON envelope: one request type per `operation`, and a single
response envelope shared by all of them. Marshaling these to and from
the wire (HTTP framing, content negotiation) is a transport concern
outside this crate; this module only defines the shapes.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compaction::CompactRequest;
use crate::error::EngineError;
use crate::model::field::UserSchema;
use crate::query::aggregate::Aggregation;
use crate::query::filter::{Filter, Operator};
use crate::query::{QueryRequest, SortSpec};
use crate::row::Row;

/// The `operation` discriminant of a request envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Create a new table.
    CreateTable,
    /// Append a row batch.
    Write,
    /// Read rows.
    Query,
    /// Overlay fields on matching latest versions.
    Update,
    /// Soft-delete matching latest versions.
    Delete,
    /// Irreversibly erase matching records and all their versions.
    HardDelete,
    /// List table names in a namespace.
    ListTables,
    /// Describe a table's schema and snapshot history.
    DescribeTable,
    /// Rewrite small files and optionally expire snapshots.
    Compact,
}

/// A `CREATE_TABLE` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTableRequest {
    /// Tenant owning the new table.
    pub tenant_id: String,
    /// Namespace the table is created in.
    pub namespace: String,
    /// Table name.
    pub table: String,
    /// The schema input form (`{"fields": {...}}`).
    pub schema: Value,
    /// Don't fail if the table already exists.
    #[serde(default)]
    pub if_not_exists: bool,
    /// Free-form table properties.
    #[serde(default)]
    pub properties: std::collections::HashMap<String, String>,
}

impl CreateTableRequest {
    /// Parse the `schema` field into a [UserSchema].
    pub fn parse_schema(&self) -> crate::error::Result<UserSchema> {
        UserSchema::from_schema_value(&self.schema)
    }
}

/// A `WRITE` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteRequest {
    /// Tenant the rows belong to.
    pub tenant_id: String,
    /// Namespace of the target table.
    pub namespace: String,
    /// Target table.
    pub table: String,
    /// User-column row batch (system columns are injected by the engine).
    pub rows: Vec<Row>,
}

/// The legacy map-form filters accepted alongside the list form:
/// `{"field": {"op": value}}`.
pub fn desugar_filter_map(map: &serde_json::Map<String, Value>) -> crate::error::Result<Vec<Filter>> {
    let mut filters = Vec::new();
    for (field, spec) in map {
        let spec_obj = spec.as_object().ok_or_else(|| {
            EngineError::InvalidRequest(format!(
                "legacy filter for \"{field}\" must be an object of {{operator: value}}"
            ))
        })?;
        for (op_name, value) in spec_obj {
            let operator = parse_operator(op_name)?;
            filters.push(Filter {
                field: field.clone(),
                operator,
                value: value.clone(),
            });
        }
    }
    Ok(filters)
}

fn parse_operator(name: &str) -> crate::error::Result<Operator> {
    match name {
        "eq" => Ok(Operator::Eq),
        "ne" => Ok(Operator::Ne),
        "gt" => Ok(Operator::Gt),
        "gte" => Ok(Operator::Gte),
        "lt" => Ok(Operator::Lt),
        "lte" => Ok(Operator::Lte),
        "in" => Ok(Operator::In),
        "like" => Ok(Operator::Like),
        "between" => Ok(Operator::Between),
        other => Err(EngineError::InvalidRequest(format!(
            "unknown filter operator \"{other}\""
        ))),
    }
}

/// Parse a request's `filters` field, accepting either the list form or
/// the legacy map form.
pub fn parse_filters(value: &Value) -> crate::error::Result<Vec<Filter>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => serde_json::from_value(value.clone())
            .map_err(|e| EngineError::InvalidRequest(format!("invalid filters: {e}"))),
        Value::Object(map) => desugar_filter_map(map),
        _ => Err(EngineError::InvalidRequest(
            "filters must be a list or a map".to_string(),
        )),
    }
}

/// A `QUERY` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryEnvelope {
    /// Tenant issuing the query.
    pub tenant_id: String,
    /// Namespace of the target table.
    pub namespace: String,
    /// Target table.
    pub table: String,
    /// Columns to return; omitted means all user columns.
    #[serde(default)]
    pub projection: Option<Vec<String>>,
    /// Filters, in either list or legacy map form.
    #[serde(default)]
    pub filters: Value,
    /// Sort order.
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    /// Group-by fields.
    #[serde(default)]
    pub group_by: Option<Vec<String>>,
    /// Aggregations.
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    /// Post-aggregation filters, in either list or legacy map form.
    #[serde(default)]
    pub having: Value,
    /// Row cap.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Rows to skip.
    #[serde(default)]
    pub offset: Option<usize>,
    /// Wall-clock timestamp (milliseconds since epoch) for time travel.
    #[serde(default)]
    pub as_of: Option<i64>,
    /// Include soft-deleted latest versions.
    #[serde(default)]
    pub include_deleted: bool,
    /// Skip MVCC latest-version resolution.
    #[serde(default)]
    pub skip_versioning: bool,
}

impl QueryEnvelope {
    /// Build the engine-internal [QueryRequest], desugaring legacy
    /// map-form filters.
    pub fn to_query_request(&self) -> crate::error::Result<QueryRequest> {
        Ok(QueryRequest {
            projection: self.projection.clone(),
            filters: parse_filters(&self.filters)?,
            sort: self.sort.clone(),
            group_by: self.group_by.clone(),
            aggregations: self.aggregations.clone(),
            having: parse_filters(&self.having)?,
            limit: self.limit,
            offset: self.offset,
            include_deleted: self.include_deleted,
            skip_versioning: self.skip_versioning,
        })
    }
}

/// An `UPDATE` or `DELETE` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct MutationRequest {
    /// Tenant issuing the mutation.
    pub tenant_id: String,
    /// Namespace of the target table.
    pub namespace: String,
    /// Target table.
    pub table: String,
    /// Filters selecting the rows to mutate, in either form.
    #[serde(default)]
    pub filters: Value,
    /// For `UPDATE`: field overlay applied to each matching row.
    #[serde(default)]
    pub updates: Row,
    /// For `HARD_DELETE`: explicit confirmation that the records (and
    /// every prior version) will be destroyed.
    #[serde(default)]
    pub confirm: bool,
}

impl MutationRequest {
    /// Parse `filters`, accepting either form.
    pub fn parse_filters(&self) -> crate::error::Result<Vec<Filter>> {
        parse_filters(&self.filters)
    }
}

/// A `DESCRIBE_TABLE` or `LIST_TABLES` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct TableRefRequest {
    /// Tenant issuing the request.
    pub tenant_id: String,
    /// Namespace of the target table.
    pub namespace: String,
    /// Target table, absent for `LIST_TABLES`.
    #[serde(default)]
    pub table: Option<String>,
}

/// A `COMPACT` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CompactEnvelope {
    /// Tenant issuing the request.
    pub tenant_id: String,
    /// Namespace of the target table.
    pub namespace: String,
    /// Target table.
    pub table: String,
    /// Run even below the small-file threshold.
    #[serde(default)]
    pub force: bool,
    /// Override the configured target file size, in MiB.
    #[serde(default)]
    pub target_file_size_mb: Option<u64>,
    /// Cap on files rewritten.
    #[serde(default)]
    pub max_files: Option<usize>,
    /// Also expire old snapshots.
    #[serde(default)]
    pub expire_snapshots: bool,
    /// Override the configured retention window, in hours.
    #[serde(default)]
    pub snapshot_retention_hours: Option<u64>,
}

impl CompactEnvelope {
    /// Build the engine-internal [CompactRequest].
    pub fn to_compact_request(&self) -> CompactRequest {
        CompactRequest {
            force: self.force,
            target_file_size_mb: self.target_file_size_mb,
            max_files: self.max_files,
            expire_snapshots: self.expire_snapshots,
            snapshot_retention_hours: self.snapshot_retention_hours,
        }
    }
}

/// The `error` field of a [ResponseEnvelope].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    /// One of the stable codes in [`EngineError::code`].
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&EngineError> for ErrorPayload {
    fn from(error: &EngineError) -> Self {
        ErrorPayload {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// The single response envelope shared by every operation.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Operation-specific payload on success.
    pub data: Value,
    /// Free-form metadata (e.g. `QueryMetadata`, write/compaction stats).
    pub metadata: Value,
    /// Id correlating this response to its request, for tracing.
    pub request_id: String,
    /// Wall-clock time spent executing, in milliseconds.
    pub execution_time_ms: u64,
    /// Present when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    /// Set on `WRITE` when the small-file count has crossed the
    /// configured threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction_recommended: Option<bool>,
    /// Present alongside `compaction_recommended`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_files_count: Option<u64>,
}

impl ResponseEnvelope {
    /// Build a success envelope.
    pub fn success(request_id: String, execution_time_ms: u64, data: Value, metadata: Value) -> Self {
        ResponseEnvelope {
            success: true,
            data,
            metadata,
            request_id,
            execution_time_ms,
            error: None,
            compaction_recommended: None,
            small_files_count: None,
        }
    }

    /// Build a failure envelope from an [EngineError].
    pub fn failure(request_id: String, execution_time_ms: u64, error: &EngineError) -> Self {
        ResponseEnvelope {
            success: false,
            data: Value::Null,
            metadata: Value::Null,
            request_id,
            execution_time_ms,
            error: Some(error.into()),
            compaction_recommended: None,
            small_files_count: None,
        }
    }
}
