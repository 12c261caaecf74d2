/*!
The Query Planner/Executor: turns a [QueryRequest] plus an already-
scanned row set into a materialized result.

Snapshot selection (resolving `as_of` to a snapshot, reading its data
files) is the engine's job, since it needs the catalog and
[TableFormat](crate::format::TableFormat). This module owns everything
downstream of the scan: the tenant predicate, latest-version (MVCC)
resolution, user filters, grouping/aggregation, `having`, sort, and
pagination — the parts of planning rules 3 through 8 that are pure
functions of a row set.
*/

pub mod aggregate;
pub mod filter;

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use uuid::Uuid;

use crate::error::Result;
use crate::model::physical_schema::{PhysicalFieldType, PhysicalSchema};
use crate::row::Row;

use aggregate::{apply as apply_aggregate, Aggregation};
use filter::{matches as filter_matches, Filter};

/// A single `sort` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to sort by.
    pub field: String,
    /// Sort descending instead of the default ascending.
    #[serde(default)]
    pub descending: bool,
}

/// The fully-parsed `QUERY` request, independent of transport framing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Columns to return; `None` means all user columns.
    #[serde(default)]
    pub projection: Option<Vec<String>>,
    /// Conjuncts applied after MVCC resolution.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Sort order, applied after aggregation.
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    /// Fields to group by before aggregating.
    #[serde(default)]
    pub group_by: Option<Vec<String>>,
    /// Aggregations computed per group (or over the whole result if
    /// `group_by` is absent).
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    /// Filters applied to aggregated rows, by alias.
    #[serde(default)]
    pub having: Vec<Filter>,
    /// Maximum rows to return. `Some(0)` is legal and returns no rows.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Rows to skip before `limit` is applied.
    #[serde(default)]
    pub offset: Option<usize>,
    /// Include soft-deleted latest versions.
    #[serde(default)]
    pub include_deleted: bool,
    /// Skip MVCC latest-version resolution (append-only fast path; used
    /// internally by the compactor, which must see every version).
    #[serde(default)]
    pub skip_versioning: bool,
}

/// Per-query execution statistics returned alongside the row set.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMetadata {
    /// Rows in the final result.
    pub row_count: usize,
    /// Wall-clock time spent executing, in milliseconds.
    pub execution_time_ms: u64,
    /// Rows read off the snapshot before any filtering.
    pub scanned_rows: usize,
    /// Total size, in bytes, of the data files scanned.
    pub scanned_bytes: u64,
    /// Whether the metadata used to locate the snapshot came from the cache.
    pub cache_hit: bool,
    /// Unique id of this query execution, for correlating logs/traces.
    pub query_id: Uuid,
}

/// The materialized result of a [QueryRequest].
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// The result rows (or aggregated groups, if `group_by`/`aggregations` were set).
    pub rows: Vec<Row>,
    /// Execution statistics.
    pub metadata: QueryMetadata,
}

/// Resolve latest-version rows via two-pass in-memory deduplication:
/// rank rows by `_version` descending within each `_record_id` and keep
/// rank 1. An embedded engine without window-function support can't
/// express `ROW_NUMBER() OVER (PARTITION BY ... ORDER BY ...)`
/// directly, so this walks the scan twice instead: once to find each
/// record's max version, once to keep only the rows at that version.
pub fn latest_versions(rows: Vec<Row>) -> Vec<Row> {
    let mut max_version: HashMap<String, i64> = HashMap::new();
    for row in &rows {
        let record_id = row.get("_record_id").and_then(Value::as_str).unwrap_or("");
        let version = row.get("_version").and_then(Value::as_i64).unwrap_or(0);
        max_version
            .entry(record_id.to_string())
            .and_modify(|v| *v = (*v).max(version))
            .or_insert(version);
    }
    rows.into_iter()
        .filter(|row| {
            let record_id = row.get("_record_id").and_then(Value::as_str).unwrap_or("");
            let version = row.get("_version").and_then(Value::as_i64).unwrap_or(0);
            max_version.get(record_id) == Some(&version)
        })
        .collect()
}

fn field_is_array(schema: &PhysicalSchema, path: &str) -> bool {
    schema
        .resolve_path(path)
        .map(|def| matches!(def.field_type, PhysicalFieldType::Array { .. }))
        .unwrap_or(false)
}

/// Validate every dotted field path a request references — filters,
/// sort, group-by, and projection — against the table's schema before
/// scanning rows, so a typo'd or nonexistent path fails fast with
/// `InvalidRequest` instead of silently matching nothing.
fn validate_field_paths(schema: &PhysicalSchema, request: &QueryRequest) -> Result<()> {
    for filter in &request.filters {
        schema.resolve_path(&filter.field)?;
    }
    for spec in &request.sort {
        schema.resolve_path(&spec.field)?;
    }
    if let Some(group_by) = &request.group_by {
        for field in group_by {
            schema.resolve_path(field)?;
        }
    }
    if let Some(projection) = &request.projection {
        for field in projection {
            schema.resolve_path(field)?;
        }
    }
    Ok(())
}

fn sort_value(row: &Row, field: &str) -> Value {
    filter::resolve_path_value(row, field).cloned().unwrap_or(Value::Null)
}

fn apply_sort(rows: &mut [Row], sort: &[SortSpec]) -> Result<()> {
    let mut error = None;
    rows.sort_by(|a, b| {
        for spec in sort {
            let (av, bv) = (sort_value(a, &spec.field), sort_value(b, &spec.field));
            let ordering = match filter::compare(&av, &bv) {
                Ok(o) => o,
                Err(e) => {
                    error = Some(e);
                    std::cmp::Ordering::Equal
                }
            };
            let ordering = if spec.descending { ordering.reverse() } else { ordering };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
    if let Some(e) = error {
        return Err(e);
    }
    Ok(())
}

fn group_key(row: &Row, group_by: &[String]) -> Vec<String> {
    group_by
        .iter()
        .map(|field| sort_value(row, field).to_string())
        .collect()
}

fn project(row: &Row, projection: &Option<Vec<String>>) -> Row {
    match projection {
        None => {
            let mut out = Row::new();
            for (key, value) in row.iter() {
                if !key.starts_with('_') {
                    out.insert(key.clone(), value.clone());
                }
            }
            out
        }
        Some(columns) => {
            let mut out = Row::new();
            for column in columns {
                if let Some(value) = filter::resolve_path_value(row, column) {
                    out.insert(column.clone(), value.clone());
                }
            }
            out
        }
    }
}

/// Execute planning rules 3 through 8 against an already-scanned row
/// set (the rows physically present in the selected snapshot's data
/// files). `tenant_id` enforces the mandatory tenant predicate.
pub fn execute(
    schema: &PhysicalSchema,
    scanned: Vec<Row>,
    tenant_id: &str,
    request: &QueryRequest,
    scanned_bytes: u64,
    cache_hit: bool,
) -> Result<QueryResult> {
    let start = Instant::now();
    let scanned_rows = scanned.len();

    validate_field_paths(schema, request)?;

    let tenant_filtered: Vec<Row> = scanned
        .into_iter()
        .filter(|row| row.get("_tenant_id").and_then(Value::as_str) == Some(tenant_id))
        .collect();

    let resolved = if request.skip_versioning {
        tenant_filtered
    } else {
        latest_versions(tenant_filtered)
    };

    let visible: Vec<Row> = resolved
        .into_iter()
        .filter(|row| {
            request.include_deleted
                || row.get("_deleted").and_then(Value::as_bool) == Some(false)
        })
        .collect();

    let mut filtered = Vec::with_capacity(visible.len());
    for row in visible {
        let mut keep = true;
        for filter in &request.filters {
            let is_array = field_is_array(schema, &filter.field);
            if !filter_matches(filter, &row, is_array)? {
                keep = false;
                break;
            }
        }
        if keep {
            filtered.push(row);
        }
    }

    let mut rows = if let Some(group_by) = &request.group_by {
        let mut groups: HashMap<Vec<String>, Vec<Row>> = HashMap::new();
        for row in filtered {
            groups.entry(group_key(&row, group_by)).or_default().push(row);
        }
        let mut grouped_rows = Vec::with_capacity(groups.len());
        for members in groups.into_values() {
            let mut out = Row::new();
            if let Some(first) = members.first() {
                for field in group_by {
                    out.insert(field.clone(), sort_value(first, field));
                }
            }
            let refs: Vec<&Row> = members.iter().collect();
            for aggregation in &request.aggregations {
                let value = apply_aggregate(aggregation, &refs)?;
                out.insert(aggregation.alias.clone(), value);
            }
            grouped_rows.push(out);
        }
        grouped_rows
    } else if !request.aggregations.is_empty() {
        let refs: Vec<&Row> = filtered.iter().collect();
        let mut out = Row::new();
        for aggregation in &request.aggregations {
            let value = apply_aggregate(aggregation, &refs)?;
            out.insert(aggregation.alias.clone(), value);
        }
        vec![out]
    } else {
        filtered
    };

    if !request.having.is_empty() {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            let mut keep = true;
            for filter in &request.having {
                if !filter_matches(filter, &row, false)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                kept.push(row);
            }
        }
        rows = kept;
    }

    apply_sort(&mut rows, &request.sort)?;

    let offset = request.offset.unwrap_or(0);
    let rows: Vec<Row> = rows.into_iter().skip(offset).collect();
    let rows: Vec<Row> = match request.limit {
        Some(limit) => rows.into_iter().take(limit).collect(),
        None => rows,
    };

    let projected: Vec<Row> = if request.group_by.is_some() || !request.aggregations.is_empty() {
        rows
    } else {
        rows.iter().map(|r| project(r, &request.projection)).collect()
    };

    let row_count = projected.len();
    Ok(QueryResult {
        rows: projected,
        metadata: QueryMetadata {
            row_count,
            execution_time_ms: start.elapsed().as_millis() as u64,
            scanned_rows,
            scanned_bytes,
            cache_hit,
            query_id: Uuid::new_v4(),
        },
    })
}
