/*!
Defines [TableIdentifier], the `(tenant_id, namespace, name)` triple
that addresses a table.
*/

use core::fmt::{self, Display};

use crate::error::{EngineError, Result};

/// Identifies a table across tenants. The catalog's physical namespace
/// is `"{tenant_id}_{namespace}"` (see [TableIdentifier::physical_namespace]);
/// this is what enforces tenant isolation at the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    tenant_id: String,
    namespace: String,
    name: String,
}

impl TableIdentifier {
    /// Build an identifier, rejecting empty components.
    pub fn try_new(tenant_id: &str, namespace: &str, name: &str) -> Result<Self> {
        if tenant_id.is_empty() {
            return Err(EngineError::InvalidRequest(
                "tenant_id cannot be empty".to_string(),
            ));
        }
        if namespace.is_empty() {
            return Err(EngineError::InvalidRequest(
                "namespace cannot be empty".to_string(),
            ));
        }
        if name.is_empty() {
            return Err(EngineError::InvalidRequest(
                "table name cannot be empty".to_string(),
            ));
        }
        Ok(TableIdentifier {
            tenant_id: tenant_id.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// The owning tenant.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// The caller-supplied namespace (not tenant-prefixed).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tenant-prefixed namespace used as the catalog's physical
    /// grouping key, e.g. `"acme_sales"`.
    pub fn physical_namespace(&self) -> String {
        format!("{}_{}", self.tenant_id, self.namespace)
    }
}

impl Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.tenant_id, self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_namespace_prefixes_with_tenant() {
        let id = TableIdentifier::try_new("acme", "sales", "orders").unwrap();
        assert_eq!(id.physical_namespace(), "acme_sales");
        assert_eq!(format!("{id}"), "acme.sales.orders");
    }

    #[test]
    fn rejects_empty_components() {
        assert!(TableIdentifier::try_new("", "sales", "orders").is_err());
        assert!(TableIdentifier::try_new("acme", "", "orders").is_err());
        assert!(TableIdentifier::try_new("acme", "sales", "").is_err());
    }
}
