//! A database connection: one driver handle plus its grammar, query log,
//! observers and transaction depth.
//!
//! Every statement, whether built by [`Query`] or written by hand, goes through
//! the same path: it is timed, logged, announced to listeners and, on failure,
//! wrapped with its SQL, bindings and elapsed time.
//!
//! ```rust,ignore
//! use quarry_query::{Connection, Value};
//!
//! let mut conn = Connection::open("main", config, connector)?;
//! conn.listen(|event| println!("{:?}", event));
//!
//! let rows = conn.select("select * from users where id = ?", &[Value::Int(1)])?;
//! conn.transaction(|conn| {
//!     conn.table("users").r#where("id", 1).update(conn, [("active", true)])?;
//!     Ok(())
//! })?;
//! ```

mod transaction;

use crate::config::{ConnectionConfig, Dialect};
use crate::driver::{Connector, Driver};
use crate::error::{QueryError, QueryResult};
use crate::grammar::{QueryGrammar, grammar_for};
use crate::query::Query;
use crate::row::Row;
use crate::sql::CompiledQuery;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A statement recorded in the query log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    /// SQL text as sent.
    pub sql: String,
    /// Bound values.
    pub bindings: Vec<Value>,
    /// Execution time; zero when pretending.
    pub elapsed: Duration,
}

impl fmt::Display for LoggedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.bindings.is_empty() {
            let bindings: Vec<String> = self.bindings.iter().map(ToString::to_string).collect();
            write!(f, " [{}]", bindings.join(", "))?;
        }
        Ok(())
    }
}

/// Events announced to listeners registered with [`Connection::listen`].
#[derive(Debug, Clone, Copy)]
pub enum ConnectionEvent<'a> {
    /// A statement completed.
    QueryExecuted {
        /// Connection name.
        connection: &'a str,
        /// SQL text.
        sql: &'a str,
        /// Bound values.
        bindings: &'a [Value],
        /// Execution time.
        elapsed: Duration,
    },
    /// A transaction or savepoint was opened; `level` is the new depth.
    TransactionBeginning {
        /// Connection name.
        connection: &'a str,
        /// Depth after the begin.
        level: u32,
    },
    /// A transaction or savepoint was committed; `level` is the new depth.
    TransactionCommitted {
        /// Connection name.
        connection: &'a str,
        /// Depth after the commit.
        level: u32,
    },
    /// A transaction or savepoint was rolled back; `level` is the new depth.
    TransactionRolledBack {
        /// Connection name.
        connection: &'a str,
        /// Depth after the rollback.
        level: u32,
    },
}

type Listener = Box<dyn Fn(&ConnectionEvent<'_>) + Send>;

/// A named connection to one database.
///
/// Not shareable between threads: every operation takes `&mut self`. Give each
/// worker its own connection.
pub struct Connection {
    name: String,
    config: ConnectionConfig,
    driver: Box<dyn Driver>,
    connector: Option<Arc<dyn Connector>>,
    grammar: Arc<dyn QueryGrammar>,
    transactions: u32,
    logging: bool,
    query_log: Vec<LoggedQuery>,
    listeners: Vec<Listener>,
    pretending: bool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("transactions", &self.transactions)
            .field("logging", &self.logging)
            .field("pretending", &self.pretending)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a connection through a connector. The connector is kept for reconnects.
    pub fn open(
        name: impl Into<String>,
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
    ) -> QueryResult<Self> {
        let name = name.into();
        let driver = connector
            .connect(&config)
            .map_err(|e| e.with_connection(name.clone()))?;
        Ok(Self::from_driver(name, config, driver).with_connector(connector))
    }

    /// Wrap an already open driver. Such a connection cannot reconnect.
    pub fn from_driver(name: impl Into<String>, config: ConnectionConfig, driver: Box<dyn Driver>) -> Self {
        let grammar = grammar_for(config.dialect, config.prefix.clone());
        Self {
            name: name.into(),
            config,
            driver,
            connector: None,
            grammar,
            transactions: 0,
            logging: true,
            query_log: Vec::new(),
            listeners: Vec::new(),
            pretending: false,
        }
    }

    /// Attach a connector used to reconnect after a dropped connection.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the connection was opened with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// SQL dialect.
    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    /// Table prefix.
    pub fn table_prefix(&self) -> &str {
        &self.config.prefix
    }

    /// Query grammar for this connection's dialect and prefix.
    pub fn grammar(&self) -> &Arc<dyn QueryGrammar> {
        &self.grammar
    }

    /// Start a query against a table.
    pub fn table(&self, table: impl Into<String>) -> Query {
        Query::with_grammar(table, self.grammar.clone())
    }

    /// Run a select statement.
    pub fn select(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<Vec<Row>> {
        self.run(sql, bindings, |driver, sql, bindings| driver.query(sql, bindings))
    }

    /// Run a select statement and return its first row.
    pub fn select_one(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<Option<Row>> {
        Ok(self.select(sql, bindings)?.into_iter().next())
    }

    /// Run an insert and return the affected row count.
    pub fn insert(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<u64> {
        self.affecting_statement(sql, bindings)
    }

    /// Run an update and return the affected row count.
    pub fn update(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<u64> {
        self.affecting_statement(sql, bindings)
    }

    /// Run a delete and return the affected row count.
    pub fn delete(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<u64> {
        self.affecting_statement(sql, bindings)
    }

    /// Run a statement, discarding the affected row count.
    pub fn statement(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<()> {
        self.affecting_statement(sql, bindings).map(|_| ())
    }

    /// Run a statement and return the affected row count.
    pub fn affecting_statement(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<u64> {
        self.run(sql, bindings, |driver, sql, bindings| driver.execute(sql, bindings))
    }

    /// Run raw SQL without preparing it. Accepts several statements.
    pub fn unprepared(&mut self, sql: &str) -> QueryResult<()> {
        self.run(sql, &[], |driver, sql, _| driver.execute_batch(sql))
    }

    /// Run a compiled select.
    pub fn select_compiled(&mut self, query: &CompiledQuery) -> QueryResult<Vec<Row>> {
        self.select(&query.sql, &query.bindings)
    }

    /// Run a compiled statement and return the affected row count.
    pub fn execute_compiled(&mut self, query: &CompiledQuery) -> QueryResult<u64> {
        self.affecting_statement(&query.sql, &query.bindings)
    }

    /// Key generated by the last insert on this connection.
    pub fn last_insert_id(&mut self) -> QueryResult<Option<i64>> {
        if self.pretending {
            return Ok(None);
        }
        self.driver.last_insert_id()
    }

    /// Whether the driver handle still answers.
    pub fn ping(&mut self) -> bool {
        self.driver.ping()
    }

    /// Replace the driver with a fresh one from the connector. Open transactions
    /// are lost with the old handle.
    pub fn reconnect(&mut self) -> QueryResult<()> {
        let connector = self.connector.clone().ok_or_else(|| {
            QueryError::connection_lost("connection was not opened through a connector and cannot reconnect")
                .with_connection(self.name.clone())
        })?;
        self.driver = connector
            .connect(&self.config)
            .map_err(|e| e.with_connection(self.name.clone()))?;
        self.transactions = 0;
        info!(connection = %self.name, "Reconnected");
        Ok(())
    }

    /// Register an observer for executed statements and transaction boundaries.
    pub fn listen<F>(&mut self, listener: F)
    where
        F: Fn(&ConnectionEvent<'_>) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Start recording statements in the query log.
    pub fn enable_query_log(&mut self) {
        self.logging = true;
    }

    /// Stop recording statements in the query log.
    pub fn disable_query_log(&mut self) {
        self.logging = false;
    }

    /// Whether the query log is recording.
    pub fn logging(&self) -> bool {
        self.logging
    }

    /// Statements recorded so far.
    pub fn query_log(&self) -> &[LoggedQuery] {
        &self.query_log
    }

    /// Clear the query log.
    pub fn flush_query_log(&mut self) {
        self.query_log.clear();
    }

    /// Whether statements are currently captured instead of executed.
    pub fn pretending(&self) -> bool {
        self.pretending
    }

    /// Run `work` with statements logged but not sent to the database, and
    /// return what would have run.
    ///
    /// Selects return no rows and writes report zero affected rows while
    /// pretending. The regular query log is restored afterwards.
    pub fn pretend<F>(&mut self, work: F) -> QueryResult<Vec<LoggedQuery>>
    where
        F: FnOnce(&mut Connection) -> QueryResult<()>,
    {
        let logging = self.logging;
        let saved_log = std::mem::take(&mut self.query_log);
        let depth = self.transactions;
        self.logging = true;
        self.pretending = true;

        let result = work(self);

        self.pretending = false;
        self.logging = logging;
        self.transactions = depth;
        let captured = std::mem::replace(&mut self.query_log, saved_log);
        result.map(|()| captured)
    }

    fn run<T, F>(&mut self, sql: &str, bindings: &[Value], op: F) -> QueryResult<T>
    where
        T: Default,
        F: Fn(&mut dyn Driver, &str, &[Value]) -> QueryResult<T>,
    {
        if self.pretending {
            self.log_query(sql, bindings, Duration::ZERO);
            return Ok(T::default());
        }

        debug!(connection = %self.name, sql = %sql, bindings = bindings.len(), "Executing statement");
        let start = Instant::now();
        let result = match op(self.driver.as_mut(), sql, bindings) {
            Err(e) if e.is_lost_connection() && self.transactions == 0 && self.connector.is_some() => {
                warn!(connection = %self.name, error = %e, "Lost connection, reconnecting and retrying statement");
                self.reconnect()?;
                op(self.driver.as_mut(), sql, bindings)
            }
            other => other,
        };
        let elapsed = start.elapsed();

        match result {
            Ok(value) => {
                self.log_query(sql, bindings, elapsed);
                Ok(value)
            }
            Err(e) => {
                if e.is_lost_connection() && self.transactions > 0 {
                    warn!(connection = %self.name, depth = self.transactions, "Connection lost inside a transaction");
                    self.transactions = 0;
                }
                Err(self.decorate(e, sql, bindings, elapsed))
            }
        }
    }

    fn decorate(&self, error: QueryError, sql: &str, bindings: &[Value], elapsed: Duration) -> QueryError {
        let error = if error.context.sql.is_none() {
            error.with_sql(sql)
        } else {
            error
        };
        error
            .with_bindings(bindings, self.config.redact_bindings)
            .with_elapsed(elapsed)
            .with_connection(self.name.clone())
    }

    fn log_query(&mut self, sql: &str, bindings: &[Value], elapsed: Duration) {
        if self.logging {
            self.query_log.push(LoggedQuery {
                sql: sql.to_string(),
                bindings: bindings.to_vec(),
                elapsed,
            });
        }
        self.fire(ConnectionEvent::QueryExecuted {
            connection: &self.name,
            sql,
            bindings,
            elapsed,
        });
    }

    fn fire(&self, event: ConnectionEvent<'_>) {
        for listener in &self.listeners {
            listener(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingDriver, ScriptedFailure};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_statements_are_logged_in_order() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        conn.statement("insert into a values (?)", &[Value::Int(1)]).unwrap();
        conn.select("select * from a", &[]).unwrap();

        let sql: Vec<&str> = conn.query_log().iter().map(|q| q.sql.as_str()).collect();
        assert_eq!(sql, vec!["insert into a values (?)", "select * from a"]);
        assert_eq!(conn.query_log()[0].bindings, vec![Value::Int(1)]);

        conn.flush_query_log();
        conn.disable_query_log();
        conn.select("select 1", &[]).unwrap();
        assert!(conn.query_log().is_empty());
    }

    #[test]
    fn test_listeners_receive_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        conn.listen(move |event| {
            if let ConnectionEvent::QueryExecuted { sql, .. } = event {
                sink.lock().push(sql.to_string());
            }
        });
        conn.statement("delete from a", &[]).unwrap();
        assert_eq!(*seen.lock(), vec!["delete from a".to_string()]);
    }

    #[test]
    fn test_error_carries_redacted_context() {
        let driver = RecordingDriver::new();
        driver.fail_next("insert", ScriptedFailure::Database("constraint failed".into()));
        let mut conn = driver.connection(Dialect::Sqlite);

        let err = conn
            .statement("insert into users (password) values (?)", &[Value::from("hunter2")])
            .unwrap_err();
        assert_eq!(err.context.sql.as_deref(), Some("insert into users (password) values (?)"));
        assert_eq!(err.context.bindings, vec![crate::error::REDACTED.to_string()]);
        assert_eq!(err.context.connection.as_deref(), Some("test"));
        assert!(err.context.elapsed.is_some());
        assert!(conn.query_log().is_empty());
    }

    #[test]
    fn test_lost_connection_reconnects_once_outside_transaction() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        driver.fail_next("select", ScriptedFailure::LostConnection);

        conn.select("select 1", &[]).unwrap();
        assert_eq!(driver.opens(), 2);
        assert_eq!(driver.statements(), vec!["select 1".to_string()]);
    }

    #[test]
    fn test_lost_connection_inside_transaction_surfaces() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        conn.begin_transaction().unwrap();
        driver.fail_next("select", ScriptedFailure::LostConnection);

        let err = conn.select("select 1", &[]).unwrap_err();
        assert!(err.is_lost_connection());
        assert_eq!(conn.transaction_level(), 0);
        assert_eq!(driver.opens(), 1);
    }

    #[test]
    fn test_pretend_captures_without_executing() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        conn.select("select 1", &[]).unwrap();

        let captured = conn
            .pretend(|conn| {
                conn.statement("create table t (id integer)", &[])?;
                conn.statement("insert into t values (?)", &[Value::Int(1)])
            })
            .unwrap();

        assert_eq!(captured.len(), 2);
        assert_eq!(captured[1].to_string(), "insert into t values (?) [1]");
        assert_eq!(driver.statements(), vec!["select 1".to_string()]);
        assert_eq!(conn.query_log().len(), 1);
        assert!(!conn.pretending());
    }
}
