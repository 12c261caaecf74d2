/*!
The in-memory row representation.

A [Row] is a JSON object. `serde_json`'s `preserve_order` feature keeps
insertion order, which the engine relies on when writing a row's user
columns back out in declaration order.
*/

/// A single row: a map from column name to JSON value. Both user columns
/// and the six system columns (`_tenant_id`, `_record_id`, ...) live in
/// the same map.
pub type Row = serde_json::Map<String, serde_json::Value>;
