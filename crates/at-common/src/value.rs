//! Scalar value model shared by every storage column.
//!
//! Object states and information fields are stored as one of a small closed
//! set of scalar kinds. Each kind has a storage default that is used when a
//! row predates the column that holds it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The Unix epoch as a calendar date, the default for date columns.
pub fn epoch_date() -> NaiveDate {
    NaiveDate::default()
}

/// Storage kind of a scalar column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InnerType {
    /// Signed 64-bit integer.
    Long,
    /// Unsigned 64-bit integer.
    ULong,
    /// Boolean flag.
    Boolean,
    /// UTF-8 string.
    String,
    /// Calendar date without time zone.
    Date,
}

impl InnerType {
    /// Stable lowercase name, used in schema files and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            InnerType::Long => "long",
            InnerType::ULong => "ulong",
            InnerType::Boolean => "boolean",
            InnerType::String => "string",
            InnerType::Date => "date",
        }
    }

    /// Value a column of this kind holds when nothing was written to it.
    pub fn default_value(&self) -> Value {
        match self {
            InnerType::Long => Value::Long(0),
            InnerType::ULong => Value::ULong(0),
            InnerType::Boolean => Value::Boolean(false),
            InnerType::String => Value::String(String::new()),
            InnerType::Date => Value::Date(epoch_date()),
        }
    }

    /// Parse a textual representation into a value of this kind.
    pub fn parse(&self, raw: &str) -> Option<Value> {
        match self {
            InnerType::Long => raw.trim().parse().ok().map(Value::Long),
            InnerType::ULong => raw.trim().parse().ok().map(Value::ULong),
            InnerType::Boolean => match raw.trim() {
                "true" | "1" => Some(Value::Boolean(true)),
                "false" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },
            InnerType::String => Some(Value::String(raw.to_string())),
            InnerType::Date => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .ok()
                .map(Value::Date),
        }
    }
}

impl fmt::Display for InnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tagged scalar value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Long(i64),
    ULong(u64),
    Boolean(bool),
    String(String),
    Date(NaiveDate),
}

impl Value {
    /// The storage kind of this value.
    pub fn inner_type(&self) -> InnerType {
        match self {
            Value::Long(_) => InnerType::Long,
            Value::ULong(_) => InnerType::ULong,
            Value::Boolean(_) => InnerType::Boolean,
            Value::String(_) => InnerType::String,
            Value::Date(_) => InnerType::Date,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            Value::ULong(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::ULong(v) => Some(*v),
            Value::Long(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare two values for filtering and ordering.
    ///
    /// Signed and unsigned integers compare numerically. Values of unrelated
    /// kinds are incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::ULong(a), Value::ULong(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::ULong(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Value::ULong(a), Value::Long(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Whether the value can be stored in a column of the given kind.
    pub fn fits(&self, inner: InnerType) -> bool {
        match (self, inner) {
            (Value::Long(_), InnerType::Long) => true,
            (Value::ULong(_), InnerType::ULong) => true,
            (Value::Boolean(_), InnerType::Boolean) => true,
            (Value::String(_), InnerType::String) => true,
            (Value::Date(_), InnerType::Date) => true,
            _ => false,
        }
    }

    /// Convert into the given kind when the conversion is lossless.
    pub fn coerce(self, inner: InnerType) -> Option<Value> {
        if self.fits(inner) {
            return Some(self);
        }
        match inner {
            InnerType::Long => self.as_i64().map(Value::Long),
            InnerType::ULong => self.as_u64().map(Value::ULong),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Long(v) => write!(f, "{}", v),
            Value::ULong(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Long(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::ULong(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_values_match_kind() {
        for inner in [
            InnerType::Long,
            InnerType::ULong,
            InnerType::Boolean,
            InnerType::String,
            InnerType::Date,
        ] {
            assert_eq!(inner.default_value().inner_type(), inner);
        }
        assert_eq!(InnerType::Date.default_value(), Value::Date(epoch_date()));
        assert_eq!(epoch_date().to_string(), "1970-01-01");
    }

    #[test]
    fn test_parse_boolean_accepts_digits() {
        assert_eq!(InnerType::Boolean.parse("1"), Some(Value::Boolean(true)));
        assert_eq!(InnerType::Boolean.parse("false"), Some(Value::Boolean(false)));
        assert_eq!(InnerType::Boolean.parse("yes"), None);
    }

    #[test]
    fn test_parse_date() {
        let parsed = InnerType::Date.parse("2000-01-01").unwrap();
        assert_eq!(parsed.to_string(), "2000-01-01");
        assert!(InnerType::Date.parse("01/01/2000").is_none());
    }

    #[test]
    fn test_compare_mixed_integers() {
        assert_eq!(
            Value::Long(-1).compare(&Value::ULong(0)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::ULong(3).compare(&Value::Long(3)), Some(Ordering::Equal));
        assert_eq!(Value::Long(1).compare(&Value::from("1")), None);
    }

    #[test]
    fn test_coerce_unsigned_to_signed() {
        assert_eq!(Value::ULong(7).coerce(InnerType::Long), Some(Value::Long(7)));
        assert_eq!(Value::Long(-7).coerce(InnerType::ULong), None);
        assert_eq!(Value::from(true).coerce(InnerType::String), None);
    }

    #[test]
    fn test_serde_tagged_shape() {
        let json = serde_json::to_string(&Value::Long(5)).unwrap();
        assert_eq!(json, r#"{"type":"long","value":5}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Long(5));
    }

    proptest! {
        #[test]
        fn prop_display_parses_back(v in any::<i64>()) {
            let value = Value::Long(v);
            prop_assert_eq!(InnerType::Long.parse(&value.to_string()), Some(value));
        }
    }
}
