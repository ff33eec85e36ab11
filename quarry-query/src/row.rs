//! Result rows.
//!
//! Rows are ordered maps from column name to [`Value`]. Application code is expected
//! to decode them into explicit structs with [`Row::deserialize`] rather than poke at
//! columns dynamically:
//!
//! ```rust
//! use quarry_query::{Row, Value};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! let row = Row::from_iter([("id", Value::from(1)), ("name", Value::from("ada"))]);
//! let user: User = row.deserialize().unwrap();
//! assert_eq!(user.name, "ada");
//! ```

use crate::error::{QueryError, QueryResult};
use crate::value::Value;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;

/// A single result row, preserving the column order reported by the driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: IndexMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. A repeated column name replaces the earlier value.
    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.columns.insert(column.into(), value);
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Get a column value by position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get_index(index).map(|(_, v)| v)
    }

    /// Get a required integer column.
    pub fn get_i64(&self, column: &str) -> QueryResult<i64> {
        let value = self.require(column)?;
        value.as_i64().ok_or_else(|| {
            QueryError::invalid_data_type(format!(
                "column '{}' holds a {} value, expected an integer",
                column,
                value.kind()
            ))
        })
    }

    /// Get a required string column.
    pub fn get_str(&self, column: &str) -> QueryResult<&str> {
        let value = self.require(column)?;
        value.as_str().ok_or_else(|| {
            QueryError::invalid_data_type(format!(
                "column '{}' holds a {} value, expected a string",
                column,
                value.kind()
            ))
        })
    }

    /// Check whether a column is missing or `NULL`.
    pub fn is_null(&self, column: &str) -> bool {
        self.columns.get(column).is_none_or(Value::is_null)
    }

    /// Column names in driver order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Consume the row into its ordered column map.
    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.columns
    }

    /// Decode the row into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> QueryResult<T> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| QueryError::deserialization(e.to_string()).with_source(e))
    }

    fn require(&self, column: &str) -> QueryResult<&Value> {
        self.columns
            .get(column)
            .ok_or_else(|| QueryError::invalid_data_type(format!("column '{}' not found in row", column)))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
