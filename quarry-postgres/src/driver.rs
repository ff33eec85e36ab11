//! The PostgreSQL [`Driver`].

use crate::error::classify;
use crate::types::{PgParam, to_row};
use postgres_types::ToSql;
use quarry_query::{Driver, QueryResult, Row, Value};
use tokio::runtime::Runtime;
use tokio_postgres::Client;
use tokio_postgres::error::SqlState;
use tracing::{debug, trace};

/// A single PostgreSQL session.
///
/// Owns the runtime its connection task was spawned on; every call blocks on
/// that runtime until the server answers.
pub struct PgDriver {
    runtime: Runtime,
    client: Client,
}

impl std::fmt::Debug for PgDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDriver")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}

impl PgDriver {
    pub(crate) fn new(runtime: Runtime, client: Client) -> Self {
        Self { runtime, client }
    }

    /// The wrapped client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Driver for PgDriver {
    fn query(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<Vec<Row>> {
        debug!(sql = %sql, bindings = bindings.len(), "Executing query");
        let params: Vec<PgParam<'_>> = bindings.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = self
            .runtime
            .block_on(self.client.query(sql, &refs))
            .map_err(classify)?;
        trace!(rows = rows.len(), "Query returned");
        rows.iter().map(to_row).collect()
    }

    fn execute(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<u64> {
        debug!(sql = %sql, bindings = bindings.len(), "Executing statement");
        let params: Vec<PgParam<'_>> = bindings.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        self.runtime
            .block_on(self.client.execute(sql, &refs))
            .map_err(classify)
    }

    fn execute_batch(&mut self, sql: &str) -> QueryResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.runtime
            .block_on(self.client.batch_execute(sql))
            .map_err(classify)
    }

    /// Reads `lastval()`. Sessions that have not used a sequence yet report `None`.
    fn last_insert_id(&mut self) -> QueryResult<Option<i64>> {
        match self.runtime.block_on(self.client.query_one("select lastval()", &[])) {
            Ok(row) => Ok(row.try_get::<_, i64>(0).ok()),
            Err(e) if e.code() == Some(&SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE) => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }

    fn ping(&mut self) -> bool {
        !self.client.is_closed() && self.runtime.block_on(self.client.simple_query("select 1")).is_ok()
    }
}
