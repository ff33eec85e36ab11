//! Driver and connector traits implemented by the dialect crates.
//!
//! A [`Driver`] is one live database handle. A [`Connector`] knows how to open
//! one from a [`ConnectionConfig`]; its provided [`Connector::connect`] adds the
//! single silent reconnect applied when the server drops the first attempt.

use crate::config::ConnectionConfig;
use crate::error::QueryResult;
use crate::row::Row;
use crate::value::Value;
use tracing::{info, warn};

/// One live database handle.
///
/// Drivers run SQL exactly as given, with placeholders already in the dialect's
/// style. Errors must be classified: a dropped connection maps to
/// [`crate::ErrorCode::ConnectionLost`] and a lock conflict to
/// [`crate::ErrorCode::Deadlock`], so the connection can decide what to retry.
pub trait Driver: Send {
    /// Run a statement returning rows.
    fn query(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, bindings: &[Value]) -> QueryResult<u64>;

    /// Run one or more statements without bindings.
    fn execute_batch(&mut self, sql: &str) -> QueryResult<()>;

    /// Key generated by the last insert, when the dialect tracks one.
    fn last_insert_id(&mut self) -> QueryResult<Option<i64>>;

    /// Check that the handle is still usable.
    fn ping(&mut self) -> bool;
}

/// Opens drivers for one dialect.
pub trait Connector: Send + Sync {
    /// Open a handle. Errors are returned as-is.
    fn open(&self, config: &ConnectionConfig) -> QueryResult<Box<dyn Driver>>;

    /// Open a handle, retrying exactly once if the first attempt reports a lost
    /// connection. A second failure is always returned.
    fn connect(&self, config: &ConnectionConfig) -> QueryResult<Box<dyn Driver>> {
        let driver = match self.open(config) {
            Ok(driver) => driver,
            Err(e) if e.is_lost_connection() => {
                warn!(
                    dialect = %config.dialect,
                    error = %e,
                    "Connection lost while connecting, retrying once"
                );
                self.open(config)?
            }
            Err(e) => return Err(e),
        };
        info!(dialect = %config.dialect, dsn = %config.redacted_dsn(), "Connected");
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Null;

    impl Driver for Null {
        fn query(&mut self, _sql: &str, _bindings: &[Value]) -> QueryResult<Vec<Row>> {
            Ok(Vec::new())
        }
        fn execute(&mut self, _sql: &str, _bindings: &[Value]) -> QueryResult<u64> {
            Ok(0)
        }
        fn execute_batch(&mut self, _sql: &str) -> QueryResult<()> {
            Ok(())
        }
        fn last_insert_id(&mut self) -> QueryResult<Option<i64>> {
            Ok(None)
        }
        fn ping(&mut self) -> bool {
            true
        }
    }

    /// Fails the first `failures` opens with the given error kind.
    struct Flaky {
        attempts: AtomicUsize,
        failures: usize,
        lost: bool,
    }

    impl Connector for Flaky {
        fn open(&self, _config: &ConnectionConfig) -> QueryResult<Box<dyn Driver>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(if self.lost {
                    QueryError::connection_lost("server has gone away")
                } else {
                    QueryError::authentication_failed("bad password")
                });
            }
            Ok(Box::new(Null))
        }
    }

    fn flaky(failures: usize, lost: bool) -> Flaky {
        Flaky {
            attempts: AtomicUsize::new(0),
            failures,
            lost,
        }
    }

    #[test]
    fn test_connect_retries_lost_connection_once() {
        let connector = flaky(1, true);
        assert!(connector.connect(&ConnectionConfig::sqlite_memory()).is_ok());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_connect_surfaces_second_failure() {
        let connector = flaky(2, true);
        let err = connector.connect(&ConnectionConfig::sqlite_memory()).err().unwrap();
        assert!(err.is_lost_connection());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_connect_does_not_retry_other_errors() {
        let connector = flaky(1, false);
        assert!(connector.connect(&ConnectionConfig::sqlite_memory()).is_err());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }
}
