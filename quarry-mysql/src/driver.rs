//! The MySQL [`Driver`].

use crate::error::classify;
use crate::types::{to_mysql, to_row};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Params};
use quarry_query::{Driver, QueryError, QueryResult, Row, Value};
use tokio::runtime::Runtime;
use tracing::{debug, trace};

/// A single MySQL session.
pub struct MySqlDriver {
    runtime: Runtime,
    conn: Option<Conn>,
    last_insert_id: Option<i64>,
}

impl std::fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("connection_id", &self.conn.as_ref().map(Conn::id))
            .field("last_insert_id", &self.last_insert_id)
            .finish_non_exhaustive()
    }
}

fn params(bindings: &[Value]) -> Params {
    if bindings.is_empty() {
        Params::Empty
    } else {
        Params::Positional(bindings.iter().map(to_mysql).collect())
    }
}

fn closed() -> QueryError {
    QueryError::connection_lost("connection is closed")
}

impl MySqlDriver {
    pub(crate) fn new(runtime: Runtime, conn: Conn) -> Self {
        Self {
            runtime,
            conn: Some(conn),
            last_insert_id: None,
        }
    }
}

impl Driver for MySqlDriver {
    fn query(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<Vec<Row>> {
        debug!(sql = %sql, bindings = bindings.len(), "Executing query");
        let conn = self.conn.as_mut().ok_or_else(closed)?;
        let rows: Vec<mysql_async::Row> = self
            .runtime
            .block_on(conn.exec(sql, params(bindings)))
            .map_err(classify)?;
        trace!(rows = rows.len(), "Query returned");
        Ok(rows.iter().map(to_row).collect())
    }

    fn execute(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<u64> {
        debug!(sql = %sql, bindings = bindings.len(), "Executing statement");
        let conn = self.conn.as_mut().ok_or_else(closed)?;
        self.runtime
            .block_on(conn.exec_drop(sql, params(bindings)))
            .map_err(classify)?;
        if let Some(id) = conn.last_insert_id().filter(|id| *id > 0) {
            self.last_insert_id = i64::try_from(id).ok();
        }
        Ok(conn.affected_rows())
    }

    fn execute_batch(&mut self, sql: &str) -> QueryResult<()> {
        debug!(sql = %sql, "Executing batch");
        let conn = self.conn.as_mut().ok_or_else(closed)?;
        self.runtime.block_on(conn.query_drop(sql)).map_err(classify)
    }

    fn last_insert_id(&mut self) -> QueryResult<Option<i64>> {
        Ok(self.last_insert_id)
    }

    fn ping(&mut self) -> bool {
        match self.conn.as_mut() {
            Some(conn) => self.runtime.block_on(conn.ping()).is_ok(),
            None => false,
        }
    }
}

impl Drop for MySqlDriver {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = self.runtime.block_on(conn.disconnect()) {
                debug!(error = %e, "MySQL disconnect failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_params() {
        assert!(matches!(params(&[]), Params::Empty));
        match params(&[Value::Int(1), Value::Null]) {
            Params::Positional(values) => {
                assert_eq!(values, vec![mysql_async::Value::Int(1), mysql_async::Value::NULL])
            }
            other => panic!("unexpected params: {:?}", other),
        }
    }
}
