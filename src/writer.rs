/*!
The Writer: appends rows as a new data file and commits a new
[Snapshot](crate::model::snapshot::Snapshot), retrying the catalog
commit under optimistic concurrency. Used directly by `WRITE` and, via
the MVCC module, by `UPDATE`/`DELETE`.
*/

use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use crate::cache::MetadataCache;
use crate::catalog::identifier::TableIdentifier;
use crate::catalog::CatalogAdapter;
use crate::config::{CompactionConfig, PerformanceConfig};
use crate::error::{EngineError, Result};
use crate::format::TableFormat;
use crate::model::snapshot::{Operation, Snapshot, Summary};
use crate::row::Row;

/// Outcome of a successful [Writer::append], including the
/// opportunistic compaction hint the caller folds into its response
/// envelope.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Id of the snapshot committed by this write.
    pub snapshot_id: i64,
    /// Number of rows appended.
    pub records_written: u64,
    /// Set when the table's small-file count has crossed the
    /// configured threshold. Never blocks or reorders the write it
    /// piggybacks on.
    pub compaction_recommended: bool,
    /// Number of small files observed, present alongside
    /// `compaction_recommended`.
    pub small_files_count: Option<u64>,
}

/// Appends rows and commits snapshots, retrying catalog conflicts with
/// backoff up to `performance.max_retries`.
pub struct Writer {
    catalog: Arc<dyn CatalogAdapter>,
    format: Arc<dyn TableFormat>,
    cache: Arc<MetadataCache>,
    performance: PerformanceConfig,
    compaction: CompactionConfig,
}

impl Writer {
    /// Build a writer over the given catalog, data file format, and
    /// metadata cache.
    pub fn new(
        catalog: Arc<dyn CatalogAdapter>,
        format: Arc<dyn TableFormat>,
        cache: Arc<MetadataCache>,
        performance: PerformanceConfig,
        compaction: CompactionConfig,
    ) -> Self {
        Self {
            catalog,
            format,
            cache,
            performance,
            compaction,
        }
    }

    /// Validate, encode, and append `rows` to the table as a single new
    /// data file, committing one new snapshot. Schema mismatches fail
    /// immediately; catalog write conflicts are retried with backoff.
    #[instrument(skip(self, rows))]
    pub async fn append(
        &self,
        identifier: &TableIdentifier,
        rows: Vec<Row>,
        operation: Operation,
    ) -> Result<WriteOutcome> {
        if rows.is_empty() {
            return Err(EngineError::InvalidRequest(
                "write batch must contain at least one row".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            let mut metadata = self.catalog.load_table(identifier).await?;
            for row in &rows {
                metadata.physical_schema.validate_row(row)?;
            }

            let file_name = format!("data-{}-{}.avro", metadata.next_snapshot_id(), rows.len());
            let data_file = self
                .format
                .write_rows(&metadata.physical_schema, &metadata.location, &file_name, &rows)
                .await?;

            let snapshot_id = metadata.next_snapshot_id();
            let now_ms = now_millis();
            // A snapshot's `data_files` is the complete, cumulative set of
            // live files as of that commit (this engine has no separate
            // manifest-list layer) — carry the prior snapshot's files
            // forward and add the one just written.
            let mut data_files = metadata
                .current_snapshot()
                .map(|s| s.data_files.clone())
                .unwrap_or_default();
            data_files.push(data_file);
            let snapshot = Snapshot {
                snapshot_id,
                parent_snapshot_id: metadata.current_snapshot_id,
                timestamp_ms: now_ms,
                operation,
                data_files,
                summary: Summary {
                    added_data_files: 1,
                    removed_data_files: 0,
                    added_records: rows.len() as u64,
                    other: Default::default(),
                },
            };

            let expected_sequence_number = metadata.last_sequence_number;
            let mut next_metadata = metadata.clone();
            next_metadata.last_sequence_number += 1;
            next_metadata.current_snapshot_id = Some(snapshot_id);
            next_metadata.snapshots.push(snapshot);
            next_metadata.writes_since_compaction += 1;
            next_metadata.last_updated_ms = now_ms;

            match self
                .catalog
                .commit_table(identifier, expected_sequence_number, next_metadata.clone())
                .await
            {
                Ok(()) => {
                    self.cache.invalidate(identifier);
                    let small_files = self.count_small_files(&next_metadata);
                    let check_due = next_metadata.writes_since_compaction
                        % self.compaction.opportunistic_check_interval
                        == 0;
                    let (compaction_recommended, small_files_count) = if check_due {
                        let count = small_files;
                        (count >= self.compaction.min_files_to_compact, Some(count))
                    } else {
                        (false, None)
                    };
                    return Ok(WriteOutcome {
                        snapshot_id,
                        records_written: rows.len() as u64,
                        compaction_recommended,
                        small_files_count,
                    });
                }
                Err(EngineError::WriteConflict(reason)) => {
                    attempt += 1;
                    if attempt >= self.performance.max_retries {
                        return Err(EngineError::WriteConflict(format!(
                            "exhausted {} retries: {reason}",
                            self.performance.max_retries
                        )));
                    }
                    warn!(attempt, %reason, "write conflict, retrying with backoff");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn count_small_files(&self, metadata: &crate::model::table_metadata::TableMetadata) -> u64 {
        let threshold_bytes = self.compaction.small_file_threshold_mb * 1024 * 1024;
        metadata
            .current_snapshot()
            .map(|s| {
                s.data_files
                    .iter()
                    .filter(|f| f.size_bytes < threshold_bytes)
                    .count() as u64
            })
            .unwrap_or(0)
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(50 * 2_u64.pow(attempt.min(6)))
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
