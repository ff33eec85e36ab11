//! Conversion between [`Value`] and PostgreSQL wire types.
//!
//! Parameters are encoded against the type the server inferred for each
//! placeholder, so an `Int` bound to an `int4` column is narrowed and a
//! `String` bound to a `uuid` or `jsonb` column is parsed first.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use quarry_query::{QueryError, QueryResult, Row, Value};
use rust_decimal::Decimal;
use std::error::Error;
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// A bound [`Value`] ready to be sent as a PostgreSQL parameter.
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a Value);

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        encode(self.0, ty, out)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn is_text(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN)
}

fn encode(value: &Value, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match value {
        Value::Null => Ok(IsNull::Yes),
        Value::Bool(b) => match *ty {
            Type::INT2 => i16::from(*b).to_sql(ty, out),
            Type::INT4 => i32::from(*b).to_sql(ty, out),
            Type::INT8 => i64::from(*b).to_sql(ty, out),
            _ if is_text(ty) => b.to_string().to_sql(ty, out),
            _ => b.to_sql(ty, out),
        },
        Value::Int(i) => encode_int(*i, ty, out),
        Value::Float(f) => match *ty {
            Type::FLOAT4 => (*f as f32).to_sql(ty, out),
            Type::NUMERIC => Decimal::try_from(*f)?.to_sql(ty, out),
            _ if is_text(ty) => f.to_string().to_sql(ty, out),
            _ => f.to_sql(ty, out),
        },
        Value::String(s) => encode_text(s, ty, out),
        Value::Bytes(b) => b.as_slice().to_sql(ty, out),
        Value::Json(j) if is_text(ty) => j.to_string().to_sql(ty, out),
        Value::Json(j) => j.to_sql(ty, out),
        Value::DateTime(dt) => match *ty {
            Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
            Type::DATE => dt.date().to_sql(ty, out),
            _ if is_text(ty) => dt.to_string().to_sql(ty, out),
            _ => dt.to_sql(ty, out),
        },
        Value::Date(d) => match *ty {
            Type::TIMESTAMP => d.and_time(NaiveTime::default()).to_sql(ty, out),
            Type::TIMESTAMPTZ => d.and_time(NaiveTime::default()).and_utc().to_sql(ty, out),
            _ if is_text(ty) => d.to_string().to_sql(ty, out),
            _ => d.to_sql(ty, out),
        },
        Value::Time(t) if is_text(ty) => t.to_string().to_sql(ty, out),
        Value::Time(t) => t.to_sql(ty, out),
        Value::Uuid(u) if is_text(ty) => u.to_string().to_sql(ty, out),
        Value::Uuid(u) => u.to_sql(ty, out),
    }
}

fn encode_int(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        _ if is_text(ty) => i.to_string().to_sql(ty, out),
        _ => i.to_sql(ty, out),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
        Type::BOOL => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "1" | "yes" | "on" => true.to_sql(ty, out),
            "f" | "false" | "0" | "no" | "off" => false.to_sql(ty, out),
            other => Err(format!("invalid boolean text '{}'", other).into()),
        },
        Type::UUID => Uuid::parse_str(s)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::TIMESTAMP => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")?.to_sql(ty, out),
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc).to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")?.to_sql(ty, out),
        _ => s.to_sql(ty, out),
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, index: usize) -> QueryResult<Option<T>> {
    row.try_get::<_, Option<T>>(index).map_err(|e| {
        QueryError::invalid_data_type(format!("column '{}': {}", row.columns()[index].name(), e))
    })
}

/// Decode one column of a result row.
pub fn decode(row: &tokio_postgres::Row, index: usize) -> QueryResult<Value> {
    let ty = row.columns()[index].type_();
    let value = match *ty {
        Type::BOOL => get::<bool>(row, index)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, index)?.map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, index)?.map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, index)?.map(Value::Int),
        Type::OID => get::<u32>(row, index)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => get::<f32>(row, index)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, index)?.map(Value::Float),
        Type::NUMERIC => get::<Decimal>(row, index)?.map(|d| Value::String(d.to_string())),
        Type::BYTEA => get::<Vec<u8>>(row, index)?.map(Value::Bytes),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, index)?.map(Value::Json),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, index)?.map(Value::DateTime),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, index)?.map(|v| Value::DateTime(v.naive_utc())),
        Type::DATE => get::<NaiveDate>(row, index)?.map(Value::Date),
        Type::TIME => get::<NaiveTime>(row, index)?.map(Value::Time),
        Type::UUID => get::<Uuid>(row, index)?.map(Value::Uuid),
        _ => get::<String>(row, index)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Convert a `tokio-postgres` row, keeping column order.
pub fn to_row(row: &tokio_postgres::Row) -> QueryResult<Row> {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        out.push(column.name(), decode(row, index)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encoded(value: Value, ty: &Type) -> Result<Vec<u8>, BoxError> {
        let mut buf = BytesMut::new();
        PgParam(&value).to_sql_checked(ty, &mut buf)?;
        Ok(buf.to_vec())
    }

    #[test]
    fn test_int_narrowed_to_column_type() {
        assert_eq!(encoded(Value::Int(7), &Type::INT4).unwrap(), 7i32.to_be_bytes().to_vec());
        assert_eq!(encoded(Value::Int(7), &Type::INT2).unwrap(), 7i16.to_be_bytes().to_vec());
        assert_eq!(encoded(Value::Int(7), &Type::INT8).unwrap(), 7i64.to_be_bytes().to_vec());
        assert!(encoded(Value::Int(70_000), &Type::INT2).is_err());
    }

    #[test]
    fn test_text_parsed_for_typed_columns() {
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        assert_eq!(
            encoded(Value::from(id), &Type::UUID).unwrap(),
            Uuid::parse_str(id).unwrap().as_bytes().to_vec()
        );
        assert_eq!(encoded(Value::from("12"), &Type::INT4).unwrap(), 12i32.to_be_bytes().to_vec());
        assert!(encoded(Value::from("maybe"), &Type::BOOL).is_err());
    }

    #[test]
    fn test_text_columns_receive_rendered_values() {
        assert_eq!(encoded(Value::Int(42), &Type::TEXT).unwrap(), b"42".to_vec());
        assert_eq!(encoded(Value::Bool(true), &Type::VARCHAR).unwrap(), b"true".to_vec());
        assert_eq!(encoded(Value::from("plain"), &Type::TEXT).unwrap(), b"plain".to_vec());
    }

    #[test]
    fn test_null_is_sent_as_null() {
        let mut buf = BytesMut::new();
        let result = PgParam(&Value::Null).to_sql_checked(&Type::INT8, &mut buf).unwrap();
        assert!(matches!(result, IsNull::Yes));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_jsonb_carries_version_byte() {
        let bytes = encoded(Value::Json(serde_json::json!({"a": 1})), &Type::JSONB).unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..], br#"{"a":1}"#);
    }
}
