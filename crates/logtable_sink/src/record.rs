//! Log records as handed to the sink.

use chrono::{DateTime, Utc};
use logtable_db::DbValue;
use std::collections::BTreeMap;

use crate::level::Level;

/// Scalar payload value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn to_db_value(&self) -> DbValue {
        match self {
            FieldValue::Null => DbValue::Null,
            FieldValue::Bool(v) => DbValue::from(*v),
            FieldValue::Integer(v) => DbValue::Integer(*v),
            FieldValue::Real(v) => DbValue::Real(*v),
            FieldValue::Text(v) => DbValue::Text(v.clone()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => FieldValue::Integer(v),
            Err(_) => FieldValue::Text(v.to_string()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Arrays and objects are not scalars; they are kept as their JSON text.
impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => FieldValue::Integer(i),
                (None, Some(f)) if n.is_f64() => FieldValue::Real(f),
                _ => FieldValue::Text(n.to_string()),
            },
            Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

/// Caller-controlled key/value payload.
pub type Fields = BTreeMap<String, FieldValue>;

/// One log event.
///
/// `context` is what the caller passed along with the message, `extra` is what
/// processors attached afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub channel: String,
    pub level: Level,
    pub message: String,
    pub datetime: DateTime<Utc>,
    pub context: Fields,
    pub extra: Fields,
}

impl Record {
    pub fn new(channel: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            level,
            message: message.into(),
            datetime: Utc::now(),
            context: Fields::new(),
            extra: Fields::new(),
        }
    }

    pub fn at(mut self, datetime: DateTime<Utc>) -> Self {
        self.datetime = datetime;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// `context` and `extra` as one map; `extra` wins on collisions.
    pub fn payload(&self) -> Fields {
        let mut merged = self.context.clone();
        merged.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_merges_extra_over_context() {
        let record = Record::new("app", Level::Info, "hello")
            .with_context("user", "from-context")
            .with_context("only_context", 1)
            .with_extra("user", "from-extra");

        let payload = record.payload();
        assert_eq!(payload.get("user"), Some(&FieldValue::from("from-extra")));
        assert_eq!(payload.get("only_context"), Some(&FieldValue::Integer(1)));
        assert_eq!(payload.len(), 2);
    }

    #[test]
    fn test_json_values_become_scalars() {
        let value: serde_json::Value = serde_json::json!({"a": 1});
        assert_eq!(FieldValue::from(value), FieldValue::Text("{\"a\":1}".to_string()));
        assert_eq!(FieldValue::from(serde_json::json!(1337)), FieldValue::Integer(1337));
        assert_eq!(FieldValue::from(serde_json::json!(1.5)), FieldValue::Real(1.5));
        assert_eq!(FieldValue::from(serde_json::json!(null)), FieldValue::Null);
    }

    #[test]
    fn test_huge_unsigned_falls_back_to_text() {
        assert_eq!(FieldValue::from(u64::MAX), FieldValue::Text(u64::MAX.to_string()));
        assert_eq!(FieldValue::from(7_u64), FieldValue::Integer(7));
    }

    #[test]
    fn test_bool_is_stored_as_integer() {
        assert_eq!(FieldValue::Bool(true).to_db_value(), DbValue::Integer(1));
    }
}
