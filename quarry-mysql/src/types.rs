//! Conversion between [`Value`] and `mysql_async` values.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::Value as MyValue;
use mysql_async::consts::ColumnType;
use quarry_query::{Row, Value};

/// Character set number MySQL reports for binary strings and blobs.
const BINARY_CHARSET: u16 = 63;

/// Convert a bound value to a MySQL value.
pub fn to_mysql(value: &Value) -> MyValue {
    match value {
        Value::Null => MyValue::NULL,
        Value::Bool(b) => MyValue::Int(i64::from(*b)),
        Value::Int(i) => MyValue::Int(*i),
        Value::Float(f) => MyValue::Double(*f),
        Value::String(s) => MyValue::Bytes(s.clone().into_bytes()),
        Value::Bytes(b) => MyValue::Bytes(b.clone()),
        Value::Json(j) => MyValue::Bytes(j.to_string().into_bytes()),
        Value::DateTime(dt) => datetime(dt),
        Value::Date(d) => MyValue::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        Value::Time(t) => MyValue::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
        Value::Uuid(u) => MyValue::Bytes(u.hyphenated().to_string().into_bytes()),
    }
}

fn datetime(dt: &NaiveDateTime) -> MyValue {
    MyValue::Date(
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        dt.nanosecond() / 1_000,
    )
}

/// Convert a result cell to a [`Value`], using the column type to tell dates
/// from datetimes and text from binary strings.
pub fn from_mysql(value: MyValue, column_type: ColumnType, charset: u16) -> Value {
    match value {
        MyValue::NULL => Value::Null,
        MyValue::Int(i) => Value::Int(i),
        MyValue::UInt(u) => match i64::try_from(u) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::String(u.to_string()),
        },
        MyValue::Float(f) => Value::Float(f64::from(f)),
        MyValue::Double(d) => Value::Float(d),
        MyValue::Bytes(bytes) => from_bytes(bytes, column_type, charset),
        MyValue::Date(y, m, d, h, mi, s, us) => {
            let Some(date) = NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d)) else {
                return Value::String(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, mi, s));
            };
            if column_type == ColumnType::MYSQL_TYPE_DATE {
                return Value::Date(date);
            }
            match date.and_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us) {
                Some(dt) => Value::DateTime(dt),
                None => Value::Date(date),
            }
        }
        MyValue::Time(negative, days, h, mi, s, us) => {
            let time = (!negative && days == 0)
                .then(|| NaiveTime::from_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us))
                .flatten();
            match time {
                Some(t) => Value::Time(t),
                None => Value::String(format!(
                    "{}{}:{:02}:{:02}",
                    if negative { "-" } else { "" },
                    days * 24 + u32::from(h),
                    mi,
                    s
                )),
            }
        }
    }
}

fn from_bytes(bytes: Vec<u8>, column_type: ColumnType, charset: u16) -> Value {
    if column_type == ColumnType::MYSQL_TYPE_JSON {
        if let Ok(json) = serde_json::from_slice(&bytes) {
            return Value::Json(json);
        }
    }
    if charset == BINARY_CHARSET && !is_numeric_text(column_type) {
        return Value::Bytes(bytes);
    }
    match String::from_utf8(bytes) {
        Ok(s) => Value::String(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

/// Decimal and integer columns read through the text protocol carry the binary charset.
fn is_numeric_text(column_type: ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
            | ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_LONGLONG
            | ColumnType::MYSQL_TYPE_FLOAT
            | ColumnType::MYSQL_TYPE_DOUBLE
            | ColumnType::MYSQL_TYPE_YEAR
            | ColumnType::MYSQL_TYPE_DATE
            | ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_TIME
    )
}

/// Convert a `mysql_async` row, keeping column order.
pub fn to_row(row: &mysql_async::Row) -> Row {
    let mut out = Row::new();
    for (index, column) in row.columns_ref().iter().enumerate() {
        let value = row.as_ref(index).cloned().unwrap_or(MyValue::NULL);
        out.push(
            column.name_str().into_owned(),
            from_mysql(value, column.column_type(), column.character_set()),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_to_mysql() {
        assert_eq!(to_mysql(&Value::Bool(true)), MyValue::Int(1));
        assert_eq!(to_mysql(&Value::from("a")), MyValue::Bytes(b"a".to_vec()));
        let dt = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(13, 4, 5, 250)
            .unwrap();
        assert_eq!(to_mysql(&Value::DateTime(dt)), MyValue::Date(2024, 2, 29, 13, 4, 5, 250));
    }

    #[test]
    fn test_dates_follow_column_type() {
        let value = MyValue::Date(2024, 2, 29, 0, 0, 0, 0);
        assert_eq!(
            from_mysql(value.clone(), ColumnType::MYSQL_TYPE_DATE, BINARY_CHARSET),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert!(matches!(
            from_mysql(value, ColumnType::MYSQL_TYPE_DATETIME, BINARY_CHARSET),
            Value::DateTime(_)
        ));
        assert!(matches!(
            from_mysql(MyValue::Date(0, 0, 0, 0, 0, 0, 0), ColumnType::MYSQL_TYPE_DATETIME, 63),
            Value::String(_)
        ));
    }

    #[test]
    fn test_bytes_follow_charset() {
        assert_eq!(
            from_mysql(MyValue::Bytes(b"hi".to_vec()), ColumnType::MYSQL_TYPE_VAR_STRING, 255),
            Value::String("hi".into())
        );
        assert_eq!(
            from_mysql(MyValue::Bytes(vec![0, 159]), ColumnType::MYSQL_TYPE_BLOB, BINARY_CHARSET),
            Value::Bytes(vec![0, 159])
        );
        assert_eq!(
            from_mysql(MyValue::Bytes(b"9.50".to_vec()), ColumnType::MYSQL_TYPE_NEWDECIMAL, BINARY_CHARSET),
            Value::String("9.50".into())
        );
        assert_eq!(
            from_mysql(MyValue::Bytes(br#"{"a":1}"#.to_vec()), ColumnType::MYSQL_TYPE_JSON, BINARY_CHARSET),
            Value::Json(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn test_large_unsigned_kept_exact() {
        assert_eq!(
            from_mysql(MyValue::UInt(u64::MAX), ColumnType::MYSQL_TYPE_LONGLONG, BINARY_CHARSET),
            Value::String(u64::MAX.to_string())
        );
    }
}
