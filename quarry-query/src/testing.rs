//! Test doubles for code that talks to a [`Connection`].
//!
//! [`RecordingDriver`] accepts every statement, records it, and answers queries
//! from a queue of canned rows. Failures can be scripted per statement so
//! transaction, retry and reconnect behavior can be exercised without a server.
//! Clones share state, which is how a test keeps a handle on the driver after
//! moving it into a connection.

use crate::config::{ConnectionConfig, Dialect};
use crate::connection::Connection;
use crate::driver::{Connector, Driver};
use crate::error::{QueryError, QueryResult};
use crate::row::Row;
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A failure to inject into the next matching statement.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    /// Fail with a deadlock.
    Deadlock,
    /// Fail with a dropped connection.
    LostConnection,
    /// Fail with a generic database error.
    Database(String),
}

impl ScriptedFailure {
    fn to_error(&self) -> QueryError {
        match self {
            Self::Deadlock => QueryError::deadlock("deadlock detected"),
            Self::LostConnection => QueryError::connection_lost("server has gone away"),
            Self::Database(message) => QueryError::database(message.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    statements: Vec<String>,
    failures: Vec<(String, ScriptedFailure)>,
    results: VecDeque<Vec<Row>>,
    affected: VecDeque<u64>,
    last_insert_id: Option<i64>,
    opens: usize,
}

/// A driver that records statements instead of running them.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    state: Arc<Mutex<State>>,
}

impl RecordingDriver {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next statement containing `pattern`, once.
    pub fn fail_next(&self, pattern: impl Into<String>, failure: ScriptedFailure) {
        self.state.lock().failures.push((pattern.into(), failure));
    }

    /// Queue rows for the next query.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state.lock().results.push_back(rows);
    }

    /// Queue an affected-row count for the next execute.
    pub fn push_affected(&self, count: u64) {
        self.state.lock().affected.push_back(count);
    }

    /// Set the id reported by `last_insert_id`.
    pub fn set_last_insert_id(&self, id: i64) {
        self.state.lock().last_insert_id = Some(id);
    }

    /// Statements that ran successfully, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    /// Forget recorded statements.
    pub fn clear(&self) {
        self.state.lock().statements.clear();
    }

    /// Number of handles opened through [`RecordingDriver::connector`].
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    /// A connector handing out clones of this driver.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(RecordingConnector {
            driver: self.clone(),
        })
    }

    /// A connection named `test` backed by this driver.
    pub fn connection(&self, dialect: Dialect) -> Connection {
        let mut config = ConnectionConfig::new(dialect);
        config.database = Some("test".to_string());
        self.state.lock().opens += 1;
        Connection::from_driver("test", config, Box::new(self.clone())).with_connector(self.connector())
    }

    fn record(&self, sql: &str) -> QueryResult<()> {
        let mut state = self.state.lock();
        if let Some(pos) = state.failures.iter().position(|(pattern, _)| sql.contains(pattern.as_str())) {
            let (_, failure) = state.failures.remove(pos);
            return Err(failure.to_error());
        }
        state.statements.push(sql.to_string());
        Ok(())
    }
}

impl Driver for RecordingDriver {
    fn query(&mut self, sql: &str, _bindings: &[Value]) -> QueryResult<Vec<Row>> {
        self.record(sql)?;
        Ok(self.state.lock().results.pop_front().unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, _bindings: &[Value]) -> QueryResult<u64> {
        self.record(sql)?;
        Ok(self.state.lock().affected.pop_front().unwrap_or(1))
    }

    fn execute_batch(&mut self, sql: &str) -> QueryResult<()> {
        self.record(sql)
    }

    fn last_insert_id(&mut self) -> QueryResult<Option<i64>> {
        Ok(self.state.lock().last_insert_id)
    }

    fn ping(&mut self) -> bool {
        true
    }
}

struct RecordingConnector {
    driver: RecordingDriver,
}

impl Connector for RecordingConnector {
    fn open(&self, _config: &ConnectionConfig) -> QueryResult<Box<dyn Driver>> {
        self.driver.state.lock().opens += 1;
        Ok(Box::new(self.driver.clone()))
    }
}
