//! Conversion between [`Value`] and SQLite storage classes.
//!
//! SQLite stores five classes only. Booleans become integers, JSON documents
//! and temporal values become text in the format `CURRENT_TIMESTAMP` produces,
//! and UUIDs become their hyphenated text form.

use quarry_query::Value;
use rusqlite::types::{Value as SqliteValue, ValueRef};

/// Convert a bound value to a SQLite value.
pub fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Json(j) => SqliteValue::Text(j.to_string()),
        Value::DateTime(dt) => SqliteValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        Value::Date(d) => SqliteValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => SqliteValue::Text(t.format("%H:%M:%S%.f").to_string()),
        Value::Uuid(u) => SqliteValue::Text(u.hyphenated().to_string()),
    }
}

/// Convert a result cell to a [`Value`].
///
/// Text is returned as-is; callers that stored JSON decode it through
/// [`quarry_query::Row::deserialize`].
pub fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bool_and_json_encoding() {
        assert_eq!(to_sqlite(&Value::Bool(true)), SqliteValue::Integer(1));
        assert_eq!(
            to_sqlite(&Value::Json(serde_json::json!({"a": 1}))),
            SqliteValue::Text(r#"{"a":1}"#.into())
        );
    }

    #[test]
    fn test_datetime_matches_current_timestamp_format() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap();
        assert_eq!(to_sqlite(&Value::DateTime(dt)), SqliteValue::Text("2024-03-09 07:05:00".into()));
        assert_eq!(
            to_sqlite(&Value::Date(dt.date())),
            SqliteValue::Text("2024-03-09".into())
        );
    }

    #[test]
    fn test_from_sqlite() {
        assert_eq!(from_sqlite(ValueRef::Integer(4)), Value::Int(4));
        assert_eq!(from_sqlite(ValueRef::Text(b"hi")), Value::String("hi".into()));
        assert_eq!(from_sqlite(ValueRef::Blob(&[0, 1])), Value::Bytes(vec![0, 1]));
        assert!(from_sqlite(ValueRef::Null).is_null());
    }
}
