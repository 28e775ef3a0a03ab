// Scalar cell values shared by every stage of the pipeline.
//
// A Value is what a spreadsheet cell, a JSON field, or a generated row
// entry collapses to once it enters the engine.

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

/// Textual timestamp format used wherever a date/time leaves the engine.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

/// Raised when two values cannot be meaningfully compared (NaN on either side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incomparable;

impl Value {
    /// Numbers with no fractional part collapse to `Int`, mirroring how
    /// spreadsheet readers surface whole numbers stored as floats.
    pub fn from_float(f: f64) -> Self {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
            Value::Int(f as i64)
        } else {
            Value::Float(f)
        }
    }

    /// Empty cells: null, NaN, and the empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    /// Convert a JSON value. Nested arrays and objects become their JSON text.
    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::DateTime(dt) => serde_json::Value::String(dt.format(DATETIME_FORMAT).to_string()),
        }
    }

    /// Equality used by the diff summarizer.
    ///
    /// Integers and floats compare numerically, a date/time equals its own
    /// rendered text. NaN on either side cannot be compared.
    pub fn try_eq(&self, other: &Value) -> Result<bool, Incomparable> {
        match (self, other) {
            (Value::Float(a), _) if a.is_nan() => Err(Incomparable),
            (_, Value::Float(b)) if b.is_nan() => Err(Incomparable),
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => Ok(*a as f64 == *b),
            (Value::DateTime(dt), Value::Text(s)) | (Value::Text(s), Value::DateTime(dt)) => {
                Ok(dt.format(DATETIME_FORMAT).to_string() == *s)
            }
            (a, b) => Ok(a == b),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_none(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::DateTime(dt) => serializer.collect_str(&dt.format(DATETIME_FORMAT)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_from_float_collapses_whole_numbers() {
        assert_eq!(Value::from_float(3.0), Value::Int(3));
        assert_eq!(Value::from_float(2.5), Value::Float(2.5));
        assert!(matches!(Value::from_float(f64::NAN), Value::Float(f) if f.is_nan()));
    }

    #[test]
    fn test_is_empty() {
        assert!(Value::Null.is_empty());
        assert!(Value::Text(String::new()).is_empty());
        assert!(Value::Float(f64::NAN).is_empty());
        assert!(!Value::Text(" ".into()).is_empty());
        assert!(!Value::Int(0).is_empty());
    }

    #[test]
    fn test_try_eq_numeric_and_nan() {
        assert_eq!(Value::Int(2).try_eq(&Value::Float(2.0)), Ok(true));
        assert_eq!(Value::Int(2).try_eq(&Value::Text("2".into())), Ok(false));
        assert_eq!(Value::Float(f64::NAN).try_eq(&Value::Null), Err(Incomparable));
        assert_eq!(Value::Null.try_eq(&Value::Null), Ok(true));
    }

    #[test]
    fn test_datetime_serializes_as_fixed_format() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(7, 8, 9).unwrap();
        let json = serde_json::to_string(&Value::DateTime(dt)).unwrap();
        assert_eq!(json, "\"2024-03-05 07:08:09\"");
        assert_eq!(Value::DateTime(dt).try_eq(&Value::Text("2024-03-05 07:08:09".into())), Ok(true));
    }

    #[test]
    fn test_from_json_nested_becomes_text() {
        let v = Value::from_json(&serde_json::json!({"a": 1}));
        assert_eq!(v, Value::Text("{\"a\":1}".into()));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from_json(&serde_json::json!(7)), Value::Int(7));
    }

    #[test]
    fn test_non_finite_float_serializes_as_null() {
        assert_eq!(serde_json::to_string(&Value::Float(f64::INFINITY)).unwrap(), "null");
    }
}
