/*!
Classes that model a table: its user-facing and physical schema, its
metadata chain, and its snapshots.
*/

pub mod field;
pub mod physical_schema;
pub mod snapshot;
pub mod table_metadata;

pub use field::{FieldDefinition, FieldType, PrimitiveType, UserSchema};
pub use physical_schema::{PhysicalField, PhysicalSchema};
pub use snapshot::{DataFile, Operation, Snapshot};
pub use table_metadata::TableMetadata;
