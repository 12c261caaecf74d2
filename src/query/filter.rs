/*!
Filter predicates: `{field, operator, value}` tuples ANDed together by
the Query Planner, plus the comparison semantics they share with `sort`
and `having`.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::row::Row;

/// A comparison or membership operator applied to one field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Member of a list.
    In,
    /// `%`/`_` wildcard match against a string (or, for array fields,
    /// against the field's serialized JSON form).
    Like,
    /// Inclusive range.
    Between,
}

/// A single filter conjunct. `value` is the operator's right-hand side:
/// a scalar for `eq`/`ne`/`gt`/`gte`/`lt`/`lte`/`like`, an array of two
/// for `between`, or an array of any length for `in`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    /// Field name, possibly dotted (`"address.city"`) for a struct member.
    pub field: String,
    /// The operator to apply.
    pub operator: Operator,
    /// The right-hand side.
    pub value: Value,
}

/// Evaluate a single filter against a row. `resolve` looks up the
/// (possibly nested) field's value and whether its declared type is an
/// array — used to route array fields to serialized `like` matching
/// and reject any other operator against them.
pub fn matches(filter: &Filter, row: &Row, field_is_array: bool) -> Result<bool> {
    let actual = resolve_path_value(row, &filter.field);

    if field_is_array && !matches!(filter.operator, Operator::Like) {
        return Err(EngineError::InvalidRequest(format!(
            "array field \"{}\" only supports the \"like\" operator",
            filter.field
        )));
    }

    if field_is_array {
        let serialized = actual.map(|v| v.to_string()).unwrap_or_default();
        let pattern = filter
            .value
            .as_str()
            .ok_or_else(|| EngineError::InvalidRequest("like pattern must be a string".to_string()))?;
        return Ok(like_match(&serialized, pattern));
    }

    match filter.operator {
        Operator::Eq => Ok(actual == Some(&filter.value)),
        Operator::Ne => Ok(actual != Some(&filter.value)),
        Operator::In => {
            let candidates = filter.value.as_array().ok_or_else(|| {
                EngineError::InvalidRequest("\"in\" value must be an array".to_string())
            })?;
            Ok(actual.map(|a| candidates.iter().any(|c| c == a)).unwrap_or(false))
        }
        Operator::Like => {
            let pattern = filter.value.as_str().ok_or_else(|| {
                EngineError::InvalidRequest("\"like\" value must be a string".to_string())
            })?;
            let text = actual.and_then(Value::as_str).ok_or_else(|| {
                EngineError::TypeMismatch(format!(
                    "\"like\" requires a string field, got {:?}",
                    actual
                ))
            })?;
            Ok(like_match(text, pattern))
        }
        Operator::Between => {
            let bounds = filter.value.as_array().ok_or_else(|| {
                EngineError::InvalidRequest("\"between\" value must be a two-element array".to_string())
            })?;
            if bounds.len() != 2 {
                return Err(EngineError::InvalidRequest(
                    "\"between\" value must have exactly two elements".to_string(),
                ));
            }
            let actual = actual.ok_or_else(|| {
                EngineError::InvalidRequest(format!("field \"{}\" not present", filter.field))
            })?;
            Ok(compare(actual, &bounds[0])? != std::cmp::Ordering::Less
                && compare(actual, &bounds[1])? != std::cmp::Ordering::Greater)
        }
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            let actual = actual.ok_or_else(|| {
                EngineError::InvalidRequest(format!("field \"{}\" not present", filter.field))
            })?;
            let ordering = compare(actual, &filter.value)?;
            Ok(match filter.operator {
                Operator::Gt => ordering == std::cmp::Ordering::Greater,
                Operator::Gte => ordering != std::cmp::Ordering::Less,
                Operator::Lt => ordering == std::cmp::Ordering::Less,
                Operator::Lte => ordering != std::cmp::Ordering::Greater,
                _ => unreachable!(),
            })
        }
    }
}

/// Compare two JSON scalars. String comparisons are byte-ordinal;
/// numbers compare numerically. Comparing across incompatible types
/// (string vs. number, etc.) fails with `TypeMismatch`.
pub fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b)
                .ok_or_else(|| EngineError::TypeMismatch("NaN is not orderable".to_string()))
        }
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        _ => Err(EngineError::TypeMismatch(format!(
            "cannot compare {a:?} with {b:?}"
        ))),
    }
}

/// Resolve a possibly-dotted path into a row's value, walking through
/// nested JSON objects for struct members.
pub fn resolve_path_value<'a>(row: &'a Row, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = row.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// A minimal SQL-`LIKE` matcher: `%` matches any run of characters,
/// `_` matches exactly one.
pub fn like_match(text: &str, pattern: &str) -> bool {
    like_match_bytes(text.as_bytes(), pattern.as_bytes())
}

fn like_match_bytes(text: &[u8], pattern: &[u8]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(b'%') => {
            like_match_bytes(text, &pattern[1..])
                || (!text.is_empty() && like_match_bytes(&text[1..], pattern))
        }
        Some(b'_') => !text.is_empty() && like_match_bytes(&text[1..], &pattern[1..]),
        Some(&c) => {
            !text.is_empty() && text[0] == c && like_match_bytes(&text[1..], &pattern[1..])
        }
    }
}
