/*!
[TableMetadata]: the full persisted state of a table, as stored by the
catalog. This is the payload a [CatalogAdapter](crate::catalog::CatalogAdapter)
reads and commits — the unit of optimistic concurrency.
*/

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::field::UserSchema;
use crate::model::physical_schema::PhysicalSchema;
use crate::model::snapshot::Snapshot;

/// A table's identity plus everything needed to plan a query or commit a
/// write against it: its schema, its snapshot chain, its properties, and
/// the bookkeeping the writer uses to decide when to compact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMetadata {
    /// A UUID assigned at `CREATE_TABLE` and never reused.
    pub table_uuid: Uuid,
    /// Tenant this table belongs to.
    pub tenant_id: String,
    /// Namespace the table was created in (as given by the caller, not
    /// the tenant-prefixed physical namespace).
    pub namespace: String,
    /// Table name, unique within `(tenant_id, namespace)`.
    pub table_name: String,
    /// Base object store location for this table's data files, e.g.
    /// `"{tenant_id}_{namespace}/{table_name}/"`.
    pub location: String,
    /// The schema as declared by the caller.
    pub user_schema: UserSchema,
    /// The schema actually written to storage, with field ids and
    /// system columns.
    pub physical_schema: PhysicalSchema,
    /// Monotonically increasing, the id to assign to the next snapshot.
    pub last_sequence_number: i64,
    /// Id of the snapshot new reads should resolve against, or `None`
    /// for a table with no committed data yet.
    pub current_snapshot_id: Option<i64>,
    /// Every snapshot ever committed, oldest first. `HARD_DELETE` may
    /// remove entries from this list; ordinary writes only append.
    pub snapshots: Vec<Snapshot>,
    /// Free-form table properties (`CREATE_TABLE`'s `properties` map).
    pub properties: HashMap<String, String>,
    /// Writes committed since the table was created or last compacted.
    /// The writer increments this on every successful commit and resets
    /// it to zero after a `COMPACT`; it drives opportunistic compaction
    /// checks.
    pub writes_since_compaction: u64,
    /// Milliseconds since the Unix epoch when the table was created.
    pub created_at_ms: i64,
    /// Milliseconds since the Unix epoch of the most recent commit.
    pub last_updated_ms: i64,
}

impl TableMetadata {
    /// The snapshot current reads should resolve against, if any.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        let id = self.current_snapshot_id?;
        self.snapshots.iter().find(|s| s.snapshot_id == id)
    }

    /// The nearest snapshot committed at or before `as_of_ms`, for
    /// `QUERY`'s time-travel option. Snapshots are stored oldest first,
    /// so this is the last one not newer than the requested time.
    pub fn snapshot_as_of(&self, as_of_ms: i64) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|s| s.timestamp_ms <= as_of_ms)
    }

    /// Allocate the next snapshot id and sequence number, without
    /// mutating `self` — the caller commits the new snapshot and the
    /// updated counters together.
    pub fn next_snapshot_id(&self) -> i64 {
        self.snapshots
            .iter()
            .map(|s| s.snapshot_id)
            .max()
            .unwrap_or(0)
            + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snapshot::{Operation, Summary};

    fn metadata_with_snapshots(snapshots: Vec<Snapshot>) -> TableMetadata {
        TableMetadata {
            table_uuid: Uuid::nil(),
            tenant_id: "acme".to_string(),
            namespace: "sales".to_string(),
            table_name: "orders".to_string(),
            location: "acme_sales/orders/".to_string(),
            user_schema: UserSchema::default(),
            physical_schema: PhysicalSchema {
                user_fields: Vec::new(),
                system_fields: Vec::new(),
            },
            last_sequence_number: snapshots.len() as i64,
            current_snapshot_id: snapshots.last().map(|s| s.snapshot_id),
            snapshots,
            properties: HashMap::new(),
            writes_since_compaction: 0,
            created_at_ms: 0,
            last_updated_ms: 0,
        }
    }

    fn snapshot(id: i64, timestamp_ms: i64) -> Snapshot {
        Snapshot {
            snapshot_id: id,
            parent_snapshot_id: if id > 1 { Some(id - 1) } else { None },
            timestamp_ms,
            operation: Operation::Append,
            data_files: Vec::new(),
            summary: Summary::default(),
        }
    }

    #[test]
    fn as_of_picks_nearest_commit_not_after_requested_time() {
        let metadata = metadata_with_snapshots(vec![
            snapshot(1, 100),
            snapshot(2, 200),
            snapshot(3, 300),
        ]);
        assert_eq!(metadata.snapshot_as_of(250).unwrap().snapshot_id, 2);
        assert_eq!(metadata.snapshot_as_of(300).unwrap().snapshot_id, 3);
        assert!(metadata.snapshot_as_of(50).is_none());
    }

    #[test]
    fn next_snapshot_id_continues_the_chain() {
        let metadata = metadata_with_snapshots(vec![snapshot(1, 100), snapshot(2, 200)]);
        assert_eq!(metadata.next_snapshot_id(), 3);
        let empty = metadata_with_snapshots(Vec::new());
        assert_eq!(empty.next_snapshot_id(), 1);
    }
}
