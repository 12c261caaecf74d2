/*!
An in-process [CatalogAdapter] backed by a `tokio::sync::RwLock` over a
`HashMap`. This is what lets the engine run and be tested standalone; a
production deployment would back [CatalogAdapter] with a networked
catalog service instead.
*/

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::instrument;

use crate::error::{EngineError, Result};
use crate::model::table_metadata::TableMetadata;

use super::identifier::TableIdentifier;
use super::CatalogAdapter;

/// Single-process catalog, keyed by the table's fully-qualified identity.
#[derive(Default)]
pub struct InMemoryCatalogAdapter {
    tables: RwLock<HashMap<String, TableMetadata>>,
}

impl InMemoryCatalogAdapter {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(identifier: &TableIdentifier) -> String {
        identifier.to_string()
    }
}

#[async_trait]
impl CatalogAdapter for InMemoryCatalogAdapter {
    #[instrument(skip(self, metadata))]
    async fn create_table(&self, metadata: TableMetadata) -> Result<()> {
        let identifier = TableIdentifier::try_new(
            &metadata.tenant_id,
            &metadata.namespace,
            &metadata.table_name,
        )?;
        let key = Self::key(&identifier);
        let mut tables = self
            .tables
            .write()
            .map_err(|_| EngineError::Internal("catalog lock poisoned".to_string()))?;
        if tables.contains_key(&key) {
            return Err(EngineError::AlreadyExists(format!(
                "table \"{identifier}\" already exists"
            )));
        }
        tables.insert(key, metadata);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_table(&self, identifier: &TableIdentifier) -> Result<TableMetadata> {
        let tables = self
            .tables
            .read()
            .map_err(|_| EngineError::Internal("catalog lock poisoned".to_string()))?;
        tables
            .get(&Self::key(identifier))
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("table \"{identifier}\" not found")))
    }

    #[instrument(skip(self, new_metadata))]
    async fn commit_table(
        &self,
        identifier: &TableIdentifier,
        expected_sequence_number: i64,
        new_metadata: TableMetadata,
    ) -> Result<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| EngineError::Internal("catalog lock poisoned".to_string()))?;
        let key = Self::key(identifier);
        let current = tables
            .get(&key)
            .ok_or_else(|| EngineError::NotFound(format!("table \"{identifier}\" not found")))?;
        if current.last_sequence_number != expected_sequence_number {
            return Err(EngineError::WriteConflict(format!(
                "table \"{identifier}\" was committed by another writer (expected sequence {}, found {})",
                expected_sequence_number, current.last_sequence_number
            )));
        }
        tables.insert(key, new_metadata);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_tables(&self, tenant_id: &str, namespace: &str) -> Result<Vec<String>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| EngineError::Internal("catalog lock poisoned".to_string()))?;
        let mut names: Vec<String> = tables
            .values()
            .filter(|m| m.tenant_id == tenant_id && m.namespace == namespace)
            .map(|m| m.table_name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    #[instrument(skip(self))]
    async fn table_exists(&self, identifier: &TableIdentifier) -> Result<bool> {
        let tables = self
            .tables
            .read()
            .map_err(|_| EngineError::Internal("catalog lock poisoned".to_string()))?;
        Ok(tables.contains_key(&Self::key(identifier)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field::UserSchema;
    use crate::model::physical_schema::PhysicalSchema;
    use std::collections::HashMap as StdHashMap;
    use uuid::Uuid;

    fn blank_metadata(tenant_id: &str, namespace: &str, table_name: &str) -> TableMetadata {
        TableMetadata {
            table_uuid: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            namespace: namespace.to_string(),
            table_name: table_name.to_string(),
            location: format!("{tenant_id}_{namespace}/{table_name}/"),
            user_schema: UserSchema::default(),
            physical_schema: PhysicalSchema {
                user_fields: Vec::new(),
                system_fields: Vec::new(),
            },
            last_sequence_number: 0,
            current_snapshot_id: None,
            snapshots: Vec::new(),
            properties: StdHashMap::new(),
            writes_since_compaction: 0,
            created_at_ms: 0,
            last_updated_ms: 0,
        }
    }

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let catalog = InMemoryCatalogAdapter::new();
        catalog
            .create_table(blank_metadata("acme", "sales", "orders"))
            .await
            .unwrap();
        let identifier = TableIdentifier::try_new("acme", "sales", "orders").unwrap();
        let loaded = catalog.load_table(&identifier).await.unwrap();
        assert_eq!(loaded.table_name, "orders");
    }

    #[tokio::test]
    async fn create_table_twice_fails() {
        let catalog = InMemoryCatalogAdapter::new();
        catalog
            .create_table(blank_metadata("acme", "sales", "orders"))
            .await
            .unwrap();
        let err = catalog
            .create_table(blank_metadata("acme", "sales", "orders"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn commit_rejects_stale_sequence_number() {
        let catalog = InMemoryCatalogAdapter::new();
        catalog
            .create_table(blank_metadata("acme", "sales", "orders"))
            .await
            .unwrap();
        let identifier = TableIdentifier::try_new("acme", "sales", "orders").unwrap();
        let mut next = blank_metadata("acme", "sales", "orders");
        next.last_sequence_number = 1;
        let err = catalog
            .commit_table(&identifier, 5, next)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::WriteConflict(_)));
    }

    #[tokio::test]
    async fn tenants_are_isolated_in_listings() {
        let catalog = InMemoryCatalogAdapter::new();
        catalog
            .create_table(blank_metadata("acme", "sales", "orders"))
            .await
            .unwrap();
        catalog
            .create_table(blank_metadata("globex", "sales", "orders"))
            .await
            .unwrap();
        let acme_tables = catalog.list_tables("acme", "sales").await.unwrap();
        assert_eq!(acme_tables, vec!["orders".to_string()]);
    }
}
