/*!
MVCC `UPDATE`/`DELETE`/`HARD_DELETE`: reads the latest version of every
row matching a filter, emits exactly one new version per matching
logical record, and commits the batch through the [Writer].

The single-new-version-per-record guarantee is the defining correctness
property here: it's what the Query Planner's latest-version resolution
(`latest_versions` in [crate::query]) depends on to see one current
value per logical row no matter how many historical versions exist.
*/

use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::catalog::identifier::TableIdentifier;
use crate::catalog::CatalogAdapter;
use crate::error::{EngineError, Result};
use crate::format::TableFormat;
use crate::model::snapshot::{Operation, Snapshot, Summary};
use crate::query::{self, QueryRequest};
use crate::record::envelope_for_new_version;
use crate::row::Row;
use crate::writer::{WriteOutcome, Writer};

/// Outcome of an `UPDATE`, soft `DELETE`, or `HARD_DELETE`.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// Number of logical records that received a new version (or, for
    /// `HARD_DELETE`, were erased).
    pub records_affected: u64,
    /// The write outcome for the committed batch, if any rows matched.
    pub write: Option<WriteOutcome>,
}

/// Scan rows matching `filters` via the Query Planner (enforcing latest
/// version resolution, full row projection), overlay `updates` on each,
/// and commit exactly one new version per matching record.
#[instrument(skip(catalog, format, writer, updates))]
pub async fn update(
    catalog: &Arc<dyn CatalogAdapter>,
    format: &Arc<dyn TableFormat>,
    writer: &Writer,
    identifier: &TableIdentifier,
    tenant_id: &str,
    filters: Vec<query::filter::Filter>,
    updates: Row,
) -> Result<MutationOutcome> {
    for key in updates.keys() {
        if key.contains('.') {
            return Err(EngineError::InvalidRequest(format!(
                "cannot update nested field \"{key}\" directly; supply the full struct or array value"
            )));
        }
    }

    let matched = scan_latest(catalog, format, identifier, tenant_id, filters, false).await?;
    if matched.is_empty() {
        return Ok(MutationOutcome {
            records_affected: 0,
            write: None,
        });
    }

    let new_versions: Vec<Row> = matched
        .iter()
        .map(|row| envelope_for_new_version(row, &updates))
        .collect();
    let records_affected = new_versions.len() as u64;
    let write = writer
        .append(identifier, new_versions, Operation::Overwrite)
        .await?;
    Ok(MutationOutcome {
        records_affected,
        write: Some(write),
    })
}

/// Soft delete: identical to [update] with `updates = {_deleted: true,
/// _deleted_at: now}`.
#[instrument(skip(catalog, format, writer))]
pub async fn soft_delete(
    catalog: &Arc<dyn CatalogAdapter>,
    format: &Arc<dyn TableFormat>,
    writer: &Writer,
    identifier: &TableIdentifier,
    tenant_id: &str,
    filters: Vec<query::filter::Filter>,
) -> Result<MutationOutcome> {
    let mut updates = Row::new();
    updates.insert("_deleted".to_string(), Value::Bool(true));
    updates.insert(
        "_deleted_at".to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    update(catalog, format, writer, identifier, tenant_id, filters, updates).await
}

/// Hard delete: requires `confirm: true`; rewrites every physical data
/// file the table currently references, dropping every version (not
/// just the latest) of any record whose latest version matches
/// `filters`. Unlike [update]/[soft_delete], this does not go through
/// [Writer::append]: that call carries the prior snapshot's files
/// forward, which would leave the erased rows reachable through the
/// very files hard delete exists to purge. Instead this commits a
/// single replacement snapshot holding only the survivors, and drops
/// the rest of the snapshot history — in this engine's snapshot model
/// (no separate manifest-list layer) every earlier snapshot's file set
/// is a subset of what this rewrite just consumed, so none of them
/// have any live rows left to reference.
#[instrument(skip(catalog, format, writer))]
pub async fn hard_delete(
    catalog: &Arc<dyn CatalogAdapter>,
    format: &Arc<dyn TableFormat>,
    writer: &Writer,
    identifier: &TableIdentifier,
    tenant_id: &str,
    filters: Vec<query::filter::Filter>,
    confirm: bool,
) -> Result<MutationOutcome> {
    let _ = writer;
    if !confirm {
        return Err(EngineError::ConfirmationRequired(
            "HARD_DELETE requires confirm: true".to_string(),
        ));
    }

    let matched_latest = scan_latest(catalog, format, identifier, tenant_id, filters, false).await?;
    if matched_latest.is_empty() {
        return Ok(MutationOutcome {
            records_affected: 0,
            write: None,
        });
    }
    let erased_record_ids: std::collections::HashSet<String> = matched_latest
        .iter()
        .filter_map(|row| row.get("_record_id").and_then(Value::as_str).map(str::to_string))
        .collect();

    let mut metadata = catalog.load_table(identifier).await?;
    let current_files = metadata
        .current_snapshot()
        .map(|s| s.data_files.clone())
        .unwrap_or_default();

    let mut surviving_rows = Vec::new();
    for file in &current_files {
        for row in format.read_rows(&metadata.physical_schema, file).await? {
            let record_id = row.get("_record_id").and_then(Value::as_str).unwrap_or("");
            if !erased_record_ids.contains(record_id) {
                surviving_rows.push(row);
            }
        }
    }

    let records_affected = erased_record_ids.len() as u64;
    let now_ms = now_millis();
    let new_files = if surviving_rows.is_empty() {
        Vec::new()
    } else {
        let file_name = format!("hard-delete-{now_ms}.avro");
        vec![
            format
                .write_rows(&metadata.physical_schema, &metadata.location, &file_name, &surviving_rows)
                .await?,
        ]
    };

    let snapshot_id = metadata.next_snapshot_id();
    let snapshot = Snapshot {
        snapshot_id,
        parent_snapshot_id: metadata.current_snapshot_id,
        timestamp_ms: now_ms,
        operation: Operation::Delete,
        data_files: new_files,
        summary: Summary {
            added_data_files: if surviving_rows.is_empty() { 0 } else { 1 },
            removed_data_files: current_files.len() as u64,
            added_records: surviving_rows.len() as u64,
            other: Default::default(),
        },
    };

    let expected_sequence_number = metadata.last_sequence_number;
    metadata.last_sequence_number += 1;
    metadata.current_snapshot_id = Some(snapshot_id);
    // every prior snapshot's files are a subset of `current_files`, which
    // this rewrite just fully consumed — none of them have surviving rows
    // left to be time-traveled to.
    metadata.snapshots = vec![snapshot];
    metadata.last_updated_ms = now_ms;

    catalog
        .commit_table(identifier, expected_sequence_number, metadata)
        .await?;

    let write = Some(WriteOutcome {
        snapshot_id,
        records_written: surviving_rows.len() as u64,
        compaction_recommended: false,
        small_files_count: None,
    });
    Ok(MutationOutcome {
        records_affected,
        write,
    })
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Scan every data file in the table's current snapshot and resolve to
/// latest, non-deleted versions matching `filters`, with full row
/// projection (the procedure `UPDATE`/`DELETE` need before overlaying
/// changes).
async fn scan_latest(
    catalog: &Arc<dyn CatalogAdapter>,
    format: &Arc<dyn TableFormat>,
    identifier: &TableIdentifier,
    tenant_id: &str,
    filters: Vec<query::filter::Filter>,
    include_deleted: bool,
) -> Result<Vec<Row>> {
    let metadata = catalog.load_table(identifier).await?;
    let mut scanned = Vec::new();
    for file in metadata
        .current_snapshot()
        .map(|s| s.data_files.clone())
        .unwrap_or_default()
    {
        scanned.extend(format.read_rows(&metadata.physical_schema, &file).await?);
    }
    // UPDATE/DELETE need the full row, including system columns, to
    // clone-and-overlay a new version — request every physical column
    // explicitly rather than relying on the default user-columns-only
    // projection.
    let all_columns: Vec<String> = metadata
        .physical_schema
        .all_fields()
        .map(|f| f.name.clone())
        .collect();
    let request = QueryRequest {
        filters,
        include_deleted,
        projection: Some(all_columns),
        ..Default::default()
    };
    let result = query::execute(&metadata.physical_schema, scanned, tenant_id, &request, 0, false)?;
    Ok(result.rows)
}
