/*!
Snapshots: a table's commit history.

Every successful `WRITE`, `UPDATE`, `DELETE`, `HARD_DELETE`, or `COMPACT`
produces a new [Snapshot] that points at the data files live at that
point in time. Snapshots form a linear chain via `parent_snapshot_id`,
which is what `QUERY`'s `as_of` option walks to find the nearest commit
at or before a requested timestamp.
*/

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of change a [Snapshot] represents, mirroring why its data
/// files changed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A `WRITE` appended new rows; no files were removed.
    Append,
    /// An `UPDATE` or soft `DELETE` appended new row versions.
    Overwrite,
    /// A `HARD_DELETE` removed rows and expired the snapshots that
    /// could still produce them.
    Delete,
    /// A `COMPACT` rewrote a set of small files into fewer, larger ones
    /// without changing any row's visible content.
    Replace,
}

/// Human-readable summary of what changed in a [Snapshot], kept for
/// `DESCRIBE_TABLE` and for diagnosing compaction behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Summary {
    /// Number of data files added by this snapshot.
    pub added_data_files: u64,
    /// Number of data files removed by this snapshot (compaction, hard delete).
    pub removed_data_files: u64,
    /// Number of rows appended by this snapshot.
    pub added_records: u64,
    /// Free-form counters, e.g. `"deleted-records"`.
    #[serde(flatten)]
    pub other: HashMap<String, u64>,
}

/// A single Avro data file belonging to a table, tracked by the
/// snapshot that introduced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataFile {
    /// Object store path, relative to the table's data directory.
    pub path: String,
    /// File size in bytes, as reported by the object store at write time.
    pub size_bytes: u64,
    /// Number of rows (including all versions and soft-deleted rows) in the file.
    pub record_count: u64,
}

/// A point in a table's commit history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Unique, monotonically increasing id.
    pub snapshot_id: i64,
    /// The previous snapshot in the chain, or `None` for the table's first commit.
    pub parent_snapshot_id: Option<i64>,
    /// Milliseconds since the Unix epoch when the snapshot was committed.
    pub timestamp_ms: i64,
    /// What kind of change produced this snapshot.
    pub operation: Operation,
    /// The data files live as of this snapshot.
    pub data_files: Vec<DataFile>,
    /// Change counters for this snapshot.
    pub summary: Summary,
}

impl Snapshot {
    /// Total size in bytes of this snapshot's data files.
    pub fn total_size_bytes(&self) -> u64 {
        self.data_files.iter().map(|f| f.size_bytes).sum()
    }

    /// Total row count (including old versions and soft deletes) across
    /// this snapshot's data files.
    pub fn total_record_count(&self) -> u64 {
        self.data_files.iter().map(|f| f.record_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_round_trips_through_json() {
        let mut summary = Summary {
            added_data_files: 1,
            removed_data_files: 0,
            added_records: 42,
            other: HashMap::new(),
        };
        summary.other.insert("deleted-records".to_string(), 3);
        let json = serde_json::to_string(&summary).unwrap();
        let back: Summary = serde_json::from_str(&json).unwrap();
        assert_eq!(summary, back);
    }

    #[test]
    fn totals_sum_across_data_files() {
        let snapshot = Snapshot {
            snapshot_id: 1,
            parent_snapshot_id: None,
            timestamp_ms: 0,
            operation: Operation::Append,
            data_files: vec![
                DataFile {
                    path: "a.avro".to_string(),
                    size_bytes: 100,
                    record_count: 10,
                },
                DataFile {
                    path: "b.avro".to_string(),
                    size_bytes: 200,
                    record_count: 20,
                },
            ],
            summary: Summary::default(),
        };
        assert_eq!(snapshot.total_size_bytes(), 300);
        assert_eq!(snapshot.total_record_count(), 30);
    }
}
