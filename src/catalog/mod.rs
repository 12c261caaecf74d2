/*!
The catalog boundary: where table metadata lives and how writers commit
changes to it under optimistic concurrency.

[CatalogAdapter] is the narrow trait the engine talks to; [memory] ships
an in-process implementation so the engine is testable and runnable
standalone. A REST or cloud-managed catalog would be a second
implementor of the same trait and is an external collaborator, not
something this crate builds.
*/

pub mod identifier;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::table_metadata::TableMetadata;
use identifier::TableIdentifier;

/// Storage for table metadata, committed under optimistic concurrency:
/// every write supplies the version it last read, and the adapter
/// rejects the commit if that version is no longer current.
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// Create a new table. Fails with `AlreadyExists` if the identifier
    /// is already in use.
    async fn create_table(&self, metadata: TableMetadata) -> Result<()>;

    /// Load a table's current metadata. Fails with `NotFound` if the
    /// table doesn't exist.
    async fn load_table(&self, identifier: &TableIdentifier) -> Result<TableMetadata>;

    /// Commit a new version of a table's metadata, guarded by the
    /// sequence number the caller last observed. Fails with
    /// `WriteConflict` if another writer has committed since.
    async fn commit_table(
        &self,
        identifier: &TableIdentifier,
        expected_sequence_number: i64,
        new_metadata: TableMetadata,
    ) -> Result<()>;

    /// List table names within a tenant's namespace.
    async fn list_tables(&self, tenant_id: &str, namespace: &str) -> Result<Vec<String>>;

    /// Whether a table exists.
    async fn table_exists(&self, identifier: &TableIdentifier) -> Result<bool>;
}
