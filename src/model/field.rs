/*!
The user-facing schema: a mapping of field name to [FieldDefinition].

A [FieldDefinition] is either a [PrimitiveType] or one of the nested
kinds (`array`, `map`, `struct`), which may recurse arbitrarily deep.
Unlike the teacher crate's `PrimitiveType`, which models the Iceberg wire
format and is parsed with `serde`'s derive machinery, schemas here are
translated by hand from a JSON `Value` so that an invalid declaration
(unknown type name, `array` without `items`, ...) fails with the
engine's own [InvalidSchema](crate::error::EngineError::InvalidSchema)
rather than a generic deserialization error.
*/

use crate::error::{EngineError, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Primitive field types. Type names are canonicalized on input
/// (`int` and `integer` both parse to [PrimitiveType::Integer]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// UTF-8 text.
    String,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 32-bit IEEE 754 float.
    Float,
    /// 64-bit IEEE 754 float.
    Double,
    /// `true`/`false`.
    Boolean,
    /// Calendar date without a time component.
    Date,
    /// UTC timestamp.
    Timestamp,
    /// Arbitrary-precision decimal, represented on the wire as a string.
    Decimal,
    /// Arbitrary-length byte array.
    Binary,
}

impl PrimitiveType {
    /// Parse a (possibly non-canonical) type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" | "int" => Some(Self::Integer),
            "long" => Some(Self::Long),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "timestamp" => Some(Self::Timestamp),
            "decimal" => Some(Self::Decimal),
            "binary" => Some(Self::Binary),
            _ => None,
        }
    }

    /// The canonical type name, as it would round-trip through JSON.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Decimal => "decimal",
            Self::Binary => "binary",
        }
    }
}

/// The type of a field: a primitive, or one of the three nested kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// A primitive column.
    Primitive(PrimitiveType),
    /// A homogeneous list of `items`.
    Array(Box<FieldDefinition>),
    /// A key/value collection. Keys are always a primitive type.
    Map {
        /// The (primitive) key type.
        key_type: PrimitiveType,
        /// The value's field definition, which may itself be nested.
        value_type: Box<FieldDefinition>,
    },
    /// A nested tuple of named fields, in declaration order.
    Struct(UserSchema),
}

/// A single field declaration: its type and whether it is required.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// The field's type.
    pub field_type: FieldType,
    /// Whether a value is mandatory for this field. Defaults to `false`.
    pub required: bool,
}

/// An ordered mapping of field name to [FieldDefinition]. Order matters:
/// it is the declaration order used both for physical field-id
/// assignment and for the row's column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserSchema(pub Vec<(String, FieldDefinition)>);

impl UserSchema {
    /// Look up a top-level field by name.
    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Iterate fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, FieldDefinition)> {
        self.0.iter()
    }

    /// Parse a `{"fields": {...}}` schema document.
    pub fn from_schema_value(value: &Value) -> Result<Self> {
        let fields = value.get("fields").ok_or_else(|| {
            EngineError::InvalidSchema("schema is missing a \"fields\" object".to_string())
        })?;
        Self::from_fields_value(fields)
    }

    /// Parse a bare `{"<name>": {...}, ...}` fields object (used both at
    /// the top level and for nested `struct` fields).
    pub fn from_fields_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            EngineError::InvalidSchema("expected a JSON object of field definitions".to_string())
        })?;
        let mut fields = Vec::with_capacity(obj.len());
        for (name, def) in obj.iter() {
            if name.is_empty() {
                return Err(EngineError::InvalidSchema(
                    "field name cannot be empty".to_string(),
                ));
            }
            fields.push((name.clone(), FieldDefinition::from_value(def)?));
        }
        Ok(UserSchema(fields))
    }

    fn to_fields_value(&self) -> Value {
        let mut obj = Map::new();
        for (name, def) in &self.0 {
            obj.insert(name.clone(), def.to_value());
        }
        Value::Object(obj)
    }
}

impl FieldDefinition {
    /// Parse a single `{"type": "...", "required": bool, ...}` declaration.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            EngineError::InvalidSchema("field definition must be a JSON object".to_string())
        })?;
        let type_name = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::InvalidSchema("field is missing \"type\"".to_string()))?;
        let required = obj
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let field_type = match type_name {
            "array" => {
                let items = obj.get("items").ok_or_else(|| {
                    EngineError::InvalidSchema("array field is missing \"items\"".to_string())
                })?;
                FieldType::Array(Box::new(FieldDefinition::from_value(items)?))
            }
            "map" => {
                let key_type = obj
                    .get("key_type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        EngineError::InvalidSchema("map field is missing \"key_type\"".to_string())
                    })
                    .and_then(|name| {
                        PrimitiveType::parse(name).ok_or_else(|| {
                            EngineError::InvalidSchema(format!("unknown map key_type \"{name}\""))
                        })
                    })?;
                let value_type = obj.get("value_type").ok_or_else(|| {
                    EngineError::InvalidSchema("map field is missing \"value_type\"".to_string())
                })?;
                FieldType::Map {
                    key_type,
                    value_type: Box::new(FieldDefinition::from_value(value_type)?),
                }
            }
            "struct" => {
                let fields = obj.get("fields").ok_or_else(|| {
                    EngineError::InvalidSchema("struct field is missing \"fields\"".to_string())
                })?;
                FieldType::Struct(UserSchema::from_fields_value(fields)?)
            }
            other => {
                let primitive = PrimitiveType::parse(other).ok_or_else(|| {
                    EngineError::InvalidSchema(format!("unknown field type \"{other}\""))
                })?;
                FieldType::Primitive(primitive)
            }
        };

        Ok(FieldDefinition {
            field_type,
            required,
        })
    }

    fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("required".to_string(), Value::Bool(self.required));
        match &self.field_type {
            FieldType::Primitive(p) => {
                obj.insert("type".to_string(), Value::String(p.name().to_string()));
            }
            FieldType::Array(items) => {
                obj.insert("type".to_string(), Value::String("array".to_string()));
                obj.insert("items".to_string(), items.to_value());
            }
            FieldType::Map {
                key_type,
                value_type,
            } => {
                obj.insert("type".to_string(), Value::String("map".to_string()));
                obj.insert(
                    "key_type".to_string(),
                    Value::String(key_type.name().to_string()),
                );
                obj.insert("value_type".to_string(), value_type.to_value());
            }
            FieldType::Struct(fields) => {
                obj.insert("type".to_string(), Value::String("struct".to_string()));
                obj.insert("fields".to_string(), fields.to_fields_value());
            }
        }
        Value::Object(obj)
    }
}

impl Serialize for UserSchema {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut obj = Map::new();
        obj.insert("fields".to_string(), self.to_fields_value());
        Value::Object(obj).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UserSchema {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        UserSchema::from_schema_value(&value).map_err(de::Error::custom)
    }
}
