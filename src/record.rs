/*!
The Record Envelope: injects and maintains the six system columns
(`_tenant_id`, `_record_id`, `_timestamp`, `_version`, `_deleted`,
`_deleted_at`) on every row that passes through the writer.

`_record_id` is a content hash of the row's user-supplied fields, so
that rewriting the same logical record (an `UPDATE`) produces the same
id every version links against, while two structurally different rows
never collide. Grounded in `ConaryLabs-conary`'s use of `sha2` for
content-addressed hashing.
*/

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::row::Row;

/// Render a JSON value as canonical text: object keys sorted
/// recursively, numbers normalized (no trailing `.0` on whole floats,
/// no exponent notation), so that two structurally-identical payloads
/// always hash to the same `_record_id` regardless of the order their
/// keys were supplied in.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => canonical_number(n),
        Value::String(s) => serde_json::to_string(s).unwrap_or_default(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() < 1e15 {
            return format!("{}", f as i64);
        }
        return format!("{f}");
    }
    n.to_string()
}

/// `hash16`: SHA-256 of the input, truncated to its first 16 hex
/// characters (64 bits). Short enough to keep as a string column,
/// long enough that collisions across a table's lifetime are not a
/// practical concern.
pub fn hash16(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

/// Derive the `_record_id` for a row's user-supplied fields. Only the
/// fields present in `user_columns` participate in the hash — system
/// columns are excluded so that re-hashing an existing version's row
/// (after stripping system columns back out) reproduces the same id.
pub fn record_id_for(row: &Row, user_columns: &[String]) -> String {
    let mut projected = serde_json::Map::new();
    for key in user_columns {
        if let Some(value) = row.get(key) {
            projected.insert(key.clone(), value.clone());
        }
    }
    hash16(&canonical_json(&Value::Object(projected)))
}

/// Build the envelope for a brand-new logical record: `_version = 1`,
/// not deleted, timestamped now.
pub fn envelope_for_insert(mut row: Row, tenant_id: &str, user_columns: &[String]) -> Row {
    let record_id = record_id_for(&row, user_columns);
    let now = Utc::now().to_rfc3339();
    row.insert("_tenant_id".to_string(), Value::String(tenant_id.to_string()));
    row.insert("_record_id".to_string(), Value::String(record_id));
    row.insert("_timestamp".to_string(), Value::String(now));
    row.insert("_version".to_string(), Value::from(1_i64));
    row.insert("_deleted".to_string(), Value::Bool(false));
    row.insert("_deleted_at".to_string(), Value::Null);
    row
}

/// Build the envelope for a new version of an existing logical record
/// (an `UPDATE` or soft `DELETE`): clones the prior row, overlays
/// `updates`, and bumps `_version`. `_record_id` and `_tenant_id` are
/// preserved from the prior version; they never change across versions.
pub fn envelope_for_new_version(prior: &Row, updates: &Row) -> Row {
    let mut row = prior.clone();
    for (key, value) in updates.iter() {
        row.insert(key.clone(), value.clone());
    }
    let prior_version = prior.get("_version").and_then(Value::as_i64).unwrap_or(0);
    row.insert("_version".to_string(), Value::from(prior_version + 1));
    row.insert(
        "_timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    row
}
