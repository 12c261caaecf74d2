#![deny(missing_docs)]
/*!
# Tableforge

Tableforge is the table engine behind a serverless, multi-tenant ACID table
service over object storage. Clients submit JSON operations
(`CREATE_TABLE`, `WRITE`, `QUERY`, `UPDATE`, `DELETE`, `HARD_DELETE`,
`LIST_TABLES`, `DESCRIBE_TABLE`, `COMPACT`) and the engine resolves them
against tables stored in an append-only columnar format on S3-compatible
storage, with table metadata kept in an external catalog.

This crate is the core table engine only: request transport, JSON
marshaling of the outer HTTP envelope, configuration loading, and the
catalog's network implementation are external collaborators. The engine
talks to them through narrow traits ([`catalog::CatalogAdapter`] and
[`format::TableFormat`]).

Currently supported:
* Nested user schemas (`array`/`map`/`struct`) mapped to a stable,
  field-id-addressed physical schema.
* MVCC-style versioned rows with soft delete, update, and hard delete.
* A query planner/executor with filters, sort, group-by, aggregation,
  pagination, time travel, and latest-version resolution.
* Opportunistic small-file detection and an explicit bin-packing
  compactor.
*/

pub mod cache;
pub mod catalog;
pub mod compaction;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod model;
pub mod mvcc;
pub mod protocol;
pub mod query;
pub mod record;
pub mod row;
pub mod writer;

pub use error::{EngineError, Result};
pub use object_store;
