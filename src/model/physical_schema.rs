/*!
Translates a [UserSchema] into the physical schema the engine stores and
scans: every field (including nested struct members, array elements, and
map keys/values) gets a stable integer id assigned depth-first, and the
six system columns are appended after the user's declared columns.

Field ids must be stable for the lifetime of the table — they are how a
future schema evolution would know "this is the same column" even after
a rename. This crate doesn't implement evolution, but it preserves the
invariant so that a future version could.
*/

use crate::error::{EngineError, Result};
use crate::model::field::{FieldDefinition, FieldType, PrimitiveType, UserSchema};
use crate::row::Row;

/// The six system columns the Record Envelope maintains on every row,
/// in the order they are appended after user columns.
pub const SYSTEM_COLUMNS: &[(&str, PrimitiveType, bool)] = &[
    ("_tenant_id", PrimitiveType::String, true),
    ("_record_id", PrimitiveType::String, true),
    ("_timestamp", PrimitiveType::Timestamp, true),
    ("_version", PrimitiveType::Long, true),
    ("_deleted", PrimitiveType::Boolean, true),
    ("_deleted_at", PrimitiveType::Timestamp, false),
];

/// The physical form of a [FieldType], with ids assigned to every nested
/// position (list elements, map keys and values, struct members).
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalFieldType {
    /// A primitive column.
    Primitive(PrimitiveType),
    /// A homogeneous list.
    Array {
        /// Stable id of the element position.
        element_id: i32,
        /// The element's definition.
        element: Box<PhysicalFieldDefinition>,
    },
    /// A key/value collection.
    Map {
        /// Stable id of the key position.
        key_id: i32,
        /// The (primitive) key type.
        key_type: PrimitiveType,
        /// Stable id of the value position.
        value_id: i32,
        /// The value's definition.
        value: Box<PhysicalFieldDefinition>,
    },
    /// A nested tuple of named, id-bearing fields.
    Struct(Vec<PhysicalField>),
}

/// A field's physical type plus its nullability.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalFieldDefinition {
    /// The physical type.
    pub field_type: PhysicalFieldType,
    /// Whether the field is mandatory.
    pub required: bool,
}

/// A named, id-bearing field in the physical schema.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalField {
    /// Stable field id, unique within the table.
    pub id: i32,
    /// Field name.
    pub name: String,
    /// The field's physical type and nullability.
    pub definition: PhysicalFieldDefinition,
}

struct IdAllocator {
    next: i32,
}

impl IdAllocator {
    fn alloc(&mut self) -> i32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

fn build_definition(
    field_type: &FieldType,
    required: bool,
    alloc: &mut IdAllocator,
) -> PhysicalFieldDefinition {
    let physical_type = match field_type {
        FieldType::Primitive(p) => PhysicalFieldType::Primitive(*p),
        FieldType::Array(inner) => {
            let element_id = alloc.alloc();
            let element = Box::new(build_definition(&inner.field_type, inner.required, alloc));
            PhysicalFieldType::Array {
                element_id,
                element,
            }
        }
        FieldType::Map {
            key_type,
            value_type,
        } => {
            let key_id = alloc.alloc();
            let value_id = alloc.alloc();
            let value = Box::new(build_definition(
                &value_type.field_type,
                value_type.required,
                alloc,
            ));
            PhysicalFieldType::Map {
                key_id,
                key_type: *key_type,
                value_id,
                value,
            }
        }
        FieldType::Struct(fields) => {
            let physical_fields = fields
                .iter()
                .map(|(name, def)| build_field(name.clone(), def, alloc))
                .collect();
            PhysicalFieldType::Struct(physical_fields)
        }
    };
    PhysicalFieldDefinition {
        field_type: physical_type,
        required,
    }
}

fn build_field(name: String, def: &FieldDefinition, alloc: &mut IdAllocator) -> PhysicalField {
    let id = alloc.alloc();
    let definition = build_definition(&def.field_type, def.required, alloc);
    PhysicalField {
        id,
        name,
        definition,
    }
}

/// The full physical schema of a table: user-declared columns (with
/// field ids) followed by the system columns.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSchema {
    /// Columns declared at `CREATE_TABLE`, in declaration order.
    pub user_fields: Vec<PhysicalField>,
    /// The six system columns, always last.
    pub system_fields: Vec<PhysicalField>,
}

impl PhysicalSchema {
    /// Translate a [UserSchema] into a [PhysicalSchema], assigning field
    /// ids depth-first starting at 1 and appending the system columns.
    pub fn from_user_schema(schema: &UserSchema) -> Result<Self> {
        if schema.0.is_empty() {
            return Err(EngineError::InvalidSchema(
                "schema must declare at least one field".to_string(),
            ));
        }
        let mut alloc = IdAllocator { next: 1 };
        let user_fields: Vec<PhysicalField> = schema
            .iter()
            .map(|(name, def)| build_field(name.clone(), def, &mut alloc))
            .collect();
        let system_fields = SYSTEM_COLUMNS
            .iter()
            .map(|(name, primitive, required)| {
                let id = alloc.alloc();
                PhysicalField {
                    id,
                    name: (*name).to_string(),
                    definition: PhysicalFieldDefinition {
                        field_type: PhysicalFieldType::Primitive(*primitive),
                        required: *required,
                    },
                }
            })
            .collect();
        Ok(PhysicalSchema {
            user_fields,
            system_fields,
        })
    }

    /// All fields, user columns first, in physical column order.
    pub fn all_fields(&self) -> impl Iterator<Item = &PhysicalField> {
        self.user_fields.iter().chain(self.system_fields.iter())
    }

    /// Look up a top-level column (user or system) by name.
    pub fn field(&self, name: &str) -> Option<&PhysicalField> {
        self.all_fields().find(|f| f.name == name)
    }

    /// Resolve a possibly-dotted path (`"address.city"`) to the leaf
    /// field's definition, walking through `struct` members. Fails with
    /// `InvalidRequest` if any non-leading segment isn't a struct member.
    pub fn resolve_path(&self, path: &str) -> Result<&PhysicalFieldDefinition> {
        let mut parts = path.split('.');
        let first = parts.next().unwrap_or("");
        let top = self
            .field(first)
            .ok_or_else(|| EngineError::InvalidRequest(format!("unknown field \"{first}\"")))?;
        let mut current = &top.definition;
        for part in parts {
            match &current.field_type {
                PhysicalFieldType::Struct(fields) => {
                    let next = fields.iter().find(|f| f.name == part).ok_or_else(|| {
                        EngineError::InvalidRequest(format!(
                            "\"{part}\" is not a member of struct \"{first}\""
                        ))
                    })?;
                    current = &next.definition;
                }
                _ => {
                    return Err(EngineError::InvalidRequest(format!(
                        "cannot resolve \"{part}\": parent of \"{path}\" is not a struct"
                    )))
                }
            }
        }
        Ok(current)
    }

    /// Validate a row against the declared user columns: every required
    /// user column must be present, and every key must be a known
    /// column. System columns are not required here — the Record
    /// Envelope is responsible for ensuring they are present before a
    /// row reaches the writer.
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        for field in &self.user_fields {
            if field.definition.required && !row.contains_key(&field.name) {
                return Err(EngineError::SchemaMismatch(format!(
                    "missing required field \"{}\"",
                    field.name
                )));
            }
        }
        for key in row.keys() {
            if self.field(key).is_none() {
                return Err(EngineError::SchemaMismatch(format!(
                    "unknown column \"{key}\""
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(json: serde_json::Value) -> UserSchema {
        UserSchema::from_schema_value(&json).unwrap()
    }

    #[test]
    fn field_ids_are_depth_first_and_stable() {
        let user = schema(json!({
            "fields": {
                "id": {"type": "long", "required": true},
                "address": {
                    "type": "struct",
                    "fields": {
                        "city": {"type": "string"},
                        "state": {"type": "string"}
                    }
                },
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        }));
        let physical = PhysicalSchema::from_user_schema(&user).unwrap();
        assert_eq!(physical.user_fields[0].id, 1); // id
        assert_eq!(physical.user_fields[1].id, 2); // address
        match &physical.user_fields[1].definition.field_type {
            PhysicalFieldType::Struct(fields) => {
                assert_eq!(fields[0].id, 3); // city
                assert_eq!(fields[1].id, 4); // state
            }
            _ => panic!("expected struct"),
        }
        assert_eq!(physical.user_fields[2].id, 5); // tags
        match &physical.user_fields[2].definition.field_type {
            PhysicalFieldType::Array { element_id, .. } => assert_eq!(*element_id, 6),
            _ => panic!("expected array"),
        }
        // system columns continue from the next free id.
        assert_eq!(physical.system_fields[0].id, 7);
        assert_eq!(physical.system_fields.len(), 6);
    }

    #[test]
    fn resolves_dotted_struct_paths() {
        let user = schema(json!({
            "fields": {
                "address": {
                    "type": "struct",
                    "fields": { "city": {"type": "string"} }
                }
            }
        }));
        let physical = PhysicalSchema::from_user_schema(&user).unwrap();
        assert!(physical.resolve_path("address.city").is_ok());
        assert!(physical.resolve_path("address.missing").is_err());
        assert!(physical.resolve_path("nope").is_err());
    }

    #[test]
    fn validate_row_rejects_unknown_columns() {
        let user = schema(json!({"fields": {"id": {"type": "long", "required": true}}}));
        let physical = PhysicalSchema::from_user_schema(&user).unwrap();
        let mut row = Row::new();
        row.insert("id".to_string(), json!(1));
        row.insert("nope".to_string(), json!("x"));
        assert!(physical.validate_row(&row).is_err());
    }

    #[test]
    fn validate_row_requires_required_fields() {
        let user = schema(json!({"fields": {"id": {"type": "long", "required": true}}}));
        let physical = PhysicalSchema::from_user_schema(&user).unwrap();
        let row = Row::new();
        assert!(physical.validate_row(&row).is_err());
    }
}
