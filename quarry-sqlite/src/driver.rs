//! The SQLite [`Driver`].

use crate::error::classify;
use crate::types::{from_sqlite, to_sqlite};
use quarry_query::{Driver, QueryResult, Row, Value};
use rusqlite::params_from_iter;
use tracing::{debug, trace};

/// A single SQLite database handle.
pub struct SqliteDriver {
    conn: rusqlite::Connection,
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteDriver {
    /// Wrap an open `rusqlite` connection.
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// The wrapped connection.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl Driver for SqliteDriver {
    fn query(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<Vec<Row>> {
        debug!(sql = %sql, bindings = bindings.len(), "Executing query");
        let mut stmt = self.conn.prepare_cached(sql).map_err(classify)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt
            .query(params_from_iter(bindings.iter().map(to_sqlite)))
            .map_err(classify)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().map_err(classify)? {
            let mut out = Row::new();
            for (i, name) in columns.iter().enumerate() {
                let value = row.get_ref(i).map_err(classify)?;
                out.push(name.as_str(), from_sqlite(value));
            }
            results.push(out);
        }
        trace!(rows = results.len(), "Query returned");
        Ok(results)
    }

    fn execute(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<u64> {
        debug!(sql = %sql, bindings = bindings.len(), "Executing statement");
        let mut stmt = self.conn.prepare_cached(sql).map_err(classify)?;
        let affected = stmt
            .execute(params_from_iter(bindings.iter().map(to_sqlite)))
            .map_err(classify)?;
        Ok(affected as u64)
    }

    fn execute_batch(&mut self, sql: &str) -> QueryResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.conn.execute_batch(sql).map_err(classify)
    }

    fn last_insert_id(&mut self) -> QueryResult<Option<i64>> {
        Ok(Some(self.conn.last_insert_rowid()))
    }

    fn ping(&mut self) -> bool {
        self.conn
            .query_row("select 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn driver() -> SqliteDriver {
        SqliteDriver::new(rusqlite::Connection::open_in_memory().unwrap())
    }

    #[test]
    fn test_query_maps_storage_classes() {
        let mut driver = driver();
        driver
            .execute_batch("create table t (i integer, r real, s text, b blob, n text)")
            .unwrap();
        let affected = driver
            .execute(
                "insert into t values (?, ?, ?, ?, ?)",
                &[
                    Value::Int(7),
                    Value::Float(1.5),
                    Value::from("x"),
                    Value::Bytes(vec![1, 2]),
                    Value::Null,
                ],
            )
            .unwrap();
        assert_eq!(affected, 1);

        let rows = driver.query("select * from t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get("i"), Some(&Value::Int(7)));
        assert_eq!(row.get("r"), Some(&Value::Float(1.5)));
        assert_eq!(row.get_str("s").unwrap(), "x");
        assert_eq!(row.get("b"), Some(&Value::Bytes(vec![1, 2])));
        assert!(row.is_null("n"));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["i", "r", "s", "b", "n"]);
    }

    #[test]
    fn test_last_insert_id_and_ping() {
        let mut driver = driver();
        driver
            .execute_batch("create table t (id integer primary key autoincrement, v text)")
            .unwrap();
        driver.execute("insert into t (v) values (?)", &[Value::from("a")]).unwrap();
        driver.execute("insert into t (v) values (?)", &[Value::from("b")]).unwrap();
        assert_eq!(driver.last_insert_id().unwrap(), Some(2));
        assert!(driver.ping());
    }

    #[test]
    fn test_syntax_error_is_database_error() {
        let mut driver = driver();
        let err = driver.query("selec 1", &[]).unwrap_err();
        assert_eq!(err.code, quarry_query::ErrorCode::DatabaseError);
    }
}
