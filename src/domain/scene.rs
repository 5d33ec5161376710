//! Scenes and scene-coordinate value semantics.
//!
//! A scene is a named tuple of coordinates extracted from DAG-run trigger
//! payloads. Coordinates travel as JSON values end to end, so equality has
//! to be numeric-aware (an orchestrator may echo `1` back as `1.0`) and
//! coercion to a declared dtype happens exactly once, on the trigger path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{DomainResult, WatchError};

/// A scene: coordinate name to coordinate value.
pub type Scene = BTreeMap<String, Value>;

/// Coercion target for a scene coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Int,
    Float,
    String,
    Bool,
}

impl Dtype {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bool => "bool",
        }
    }
}

/// Coerce a JSON value to the declared dtype.
///
/// The result is always a JSON-serialisable primitive. Values that cannot
/// represent the target dtype are a tick-level error, not a panic.
pub fn coerce(value: &Value, dtype: Dtype) -> DomainResult<Value> {
    let fail = || WatchError::Coercion {
        value: value.to_string(),
        dtype: dtype.as_str(),
    };
    match dtype {
        Dtype::Int => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::from)
                .ok_or_else(fail),
            Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| fail()),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            _ => Err(fail()),
        },
        Dtype::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
                .ok_or_else(fail),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
                .ok_or_else(fail),
            _ => Err(fail()),
        },
        Dtype::String => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(fail()),
        },
        Dtype::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.trim() {
                "true" | "True" => Ok(Value::Bool(true)),
                "false" | "False" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(fail()),
            },
            _ => Err(fail()),
        },
    }
}

/// Value equality with numeric cross-type semantics: `1 == 1.0`.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                return xi == yi;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(xf), Some(yf)) => xf == yf,
                _ => false,
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| value_eq(x, y))
        }
        _ => a == b,
    }
}

/// Membership test for one cell of a grouped row-set against an expected
/// scalar.
///
/// Reduction aggregates non-scene columns to lists, so a cell may hold
/// either the scalar itself or the list of all member values: a list cell
/// matches iff it is non-empty and uniformly equal to the scalar.
pub fn cell_matches(cell: &Value, expected: &Value) -> bool {
    match cell {
        Value::Array(items) => {
            !items.is_empty() && items.iter().all(|item| value_eq(item, expected))
        }
        _ => value_eq(cell, expected),
    }
}
