/*!
The Hot Metadata Cache: a process-local, best-effort cache of resolved
table metadata, keyed by table identity. It exists purely to shave
catalog round-trips off query-hot paths — nothing in the engine depends
on it for correctness, and every write re-resolves against the catalog
before acting.
*/

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::instrument;

use crate::catalog::identifier::TableIdentifier;
use crate::model::table_metadata::TableMetadata;

struct Entry {
    metadata: TableMetadata,
    resolved_at: Instant,
}

/// A single-writer/many-reader cache of [TableMetadata] with a fixed
/// TTL, invalidated eagerly on any successful commit.
pub struct MetadataCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MetadataCache {
    /// Create a cache with the given entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return a cached, not-yet-expired copy of a table's metadata, if any.
    #[instrument(skip(self))]
    pub fn get(&self, identifier: &TableIdentifier) -> Option<TableMetadata> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(&identifier.to_string())?;
        if entry.resolved_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.metadata.clone())
    }

    /// Populate (or replace) the cached entry for a table.
    #[instrument(skip(self, metadata))]
    pub fn put(&self, identifier: &TableIdentifier, metadata: TableMetadata) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                identifier.to_string(),
                Entry {
                    metadata,
                    resolved_at: Instant::now(),
                },
            );
        }
    }

    /// Drop a table's cached entry. Called after any successful write
    /// or compaction commit so the next read re-resolves against the
    /// catalog.
    #[instrument(skip(self))]
    pub fn invalidate(&self, identifier: &TableIdentifier) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&identifier.to_string());
        }
    }
}
