/*!
Aggregation functions applied after `group_by`: `count`, `sum`, `avg`,
`min`, `max`, `stddev`, `variance`, `median`, and the optional
`count_distinct`.
*/

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::row::Row;

/// A supported aggregation function.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// Number of rows in the group.
    Count,
    /// Number of distinct values of `field` in the group.
    CountDistinct,
    /// Sum of `field`.
    Sum,
    /// Arithmetic mean of `field`.
    Avg,
    /// Minimum value of `field`.
    Min,
    /// Maximum value of `field`.
    Max,
    /// Population standard deviation of `field`.
    Stddev,
    /// Population variance of `field`.
    Variance,
    /// Median of `field`.
    Median,
}

/// A single requested aggregation: which function, over which field,
/// under which output alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    /// The function to apply.
    pub function: AggregateFunction,
    /// Field to aggregate. `null` or absent is only legal for `count`,
    /// which counts rows rather than a field's values.
    #[serde(default)]
    pub field: Option<String>,
    /// Output column name.
    pub alias: String,
}

fn require_field<'a>(aggregation: &'a Aggregation) -> Result<&'a str> {
    aggregation.field.as_deref().ok_or_else(|| {
        EngineError::InvalidRequest(format!(
            "aggregation \"{}\" requires a field",
            aggregation.alias
        ))
    })
}

fn numeric_values(rows: &[&Row], field: &str) -> Result<Vec<f64>> {
    rows.iter()
        .filter_map(|row| row.get(field))
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                EngineError::TypeMismatch(format!("field \"{field}\" is not numeric"))
            })
        })
        .collect()
}

/// Apply one aggregation to a group of rows, producing the output
/// scalar.
pub fn apply(aggregation: &Aggregation, rows: &[&Row]) -> Result<Value> {
    match aggregation.function {
        AggregateFunction::Count => Ok(Value::from(rows.len() as u64)),
        AggregateFunction::CountDistinct => {
            let field = require_field(aggregation)?;
            let distinct: HashSet<String> = rows
                .iter()
                .filter_map(|row| row.get(field))
                .map(|v| v.to_string())
                .collect();
            Ok(Value::from(distinct.len() as u64))
        }
        AggregateFunction::Sum => {
            let values = numeric_values(rows, require_field(aggregation)?)?;
            Ok(Value::from(values.iter().sum::<f64>()))
        }
        AggregateFunction::Avg => {
            let values = numeric_values(rows, require_field(aggregation)?)?;
            if values.is_empty() {
                return Ok(Value::Null);
            }
            Ok(Value::from(values.iter().sum::<f64>() / values.len() as f64))
        }
        AggregateFunction::Min => {
            let values = numeric_values(rows, require_field(aggregation)?)?;
            values
                .into_iter()
                .fold(None, |acc: Option<f64>, v| {
                    Some(acc.map_or(v, |a| a.min(v)))
                })
                .map(Value::from)
                .ok_or_else(|| EngineError::InvalidRequest("min of empty group".to_string()))
        }
        AggregateFunction::Max => {
            let values = numeric_values(rows, require_field(aggregation)?)?;
            values
                .into_iter()
                .fold(None, |acc: Option<f64>, v| {
                    Some(acc.map_or(v, |a| a.max(v)))
                })
                .map(Value::from)
                .ok_or_else(|| EngineError::InvalidRequest("max of empty group".to_string()))
        }
        AggregateFunction::Variance => {
            let values = numeric_values(rows, require_field(aggregation)?)?;
            Ok(Value::from(population_variance(&values)))
        }
        AggregateFunction::Stddev => {
            let values = numeric_values(rows, require_field(aggregation)?)?;
            Ok(Value::from(population_variance(&values).sqrt()))
        }
        AggregateFunction::Median => {
            let mut values = numeric_values(rows, require_field(aggregation)?)?;
            values.sort_by(|a, b| a.partial_cmp(b).unwrap());
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let mid = values.len() / 2;
            let median = if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            };
            Ok(Value::from(median))
        }
    }
}

fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(field: &str, value: f64) -> Row {
        let mut row = Row::new();
        row.insert(field.to_string(), json!(value));
        row
    }

    #[test]
    fn sum_and_avg() {
        let rows = vec![row("x", 10.0), row("x", 20.0)];
        let refs: Vec<&Row> = rows.iter().collect();
        let agg = Aggregation {
            function: AggregateFunction::Sum,
            field: Some("x".to_string()),
            alias: "total".to_string(),
        };
        assert_eq!(apply(&agg, &refs).unwrap(), json!(30.0));
        let avg_agg = Aggregation {
            field: Some("x".to_string()),
            function: AggregateFunction::Avg,
            alias: "avg".to_string(),
        };
        assert_eq!(apply(&avg_agg, &refs).unwrap(), json!(15.0));
    }

    #[test]
    fn median_handles_even_and_odd_counts() {
        let rows = vec![row("x", 1.0), row("x", 2.0), row("x", 3.0), row("x", 4.0)];
        let refs: Vec<&Row> = rows.iter().collect();
        let agg = Aggregation {
            function: AggregateFunction::Median,
            field: Some("x".to_string()),
            alias: "median".to_string(),
        };
        assert_eq!(apply(&agg, &refs).unwrap(), json!(2.5));
    }

    #[test]
    fn count_distinct_deduplicates_values() {
        let rows = vec![row("x", 1.0), row("x", 1.0), row("x", 2.0)];
        let refs: Vec<&Row> = rows.iter().collect();
        let agg = Aggregation {
            function: AggregateFunction::CountDistinct,
            field: Some("x".to_string()),
            alias: "distinct_x".to_string(),
        };
        assert_eq!(apply(&agg, &refs).unwrap(), json!(2));
    }

    #[test]
    fn count_accepts_an_absent_field() {
        let rows = vec![row("x", 1.0), row("x", 2.0)];
        let refs: Vec<&Row> = rows.iter().collect();
        let agg = Aggregation {
            function: AggregateFunction::Count,
            field: None,
            alias: "n".to_string(),
        };
        assert_eq!(apply(&agg, &refs).unwrap(), json!(2));
    }

    #[test]
    fn sum_without_a_field_is_rejected() {
        let rows = vec![row("x", 1.0)];
        let refs: Vec<&Row> = rows.iter().collect();
        let agg = Aggregation {
            function: AggregateFunction::Sum,
            field: None,
            alias: "total".to_string(),
        };
        assert!(apply(&agg, &refs).is_err());
    }

    #[test]
    fn variance_of_constant_values_is_zero() {
        let rows = vec![row("x", 5.0), row("x", 5.0)];
        let refs: Vec<&Row> = rows.iter().collect();
        let agg = Aggregation {
            function: AggregateFunction::Variance,
            field: Some("x".to_string()),
            alias: "v".to_string(),
        };
        assert_eq!(apply(&agg, &refs).unwrap(), json!(0.0));
    }
}
