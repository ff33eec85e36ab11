//! Transaction depth tracking with savepoints.
//!
//! Depth 0 means no transaction. The first `begin` opens a real transaction;
//! each nested `begin` creates savepoint `point{depth}`, named after the depth it
//! opens. Commits and rollbacks unwind in strict LIFO order.

use super::{Connection, ConnectionEvent};
use crate::error::{QueryError, QueryResult};
use tracing::{debug, warn};

fn savepoint(level: u32) -> String {
    format!("point{}", level)
}

impl Connection {
    /// Current transaction depth.
    pub fn transaction_level(&self) -> u32 {
        self.transactions
    }

    /// Open a transaction, or a savepoint when one is already open.
    ///
    /// Opening the outermost transaction is retried once after a reconnect when
    /// the connection turns out to be dropped.
    pub fn begin_transaction(&mut self) -> QueryResult<()> {
        let depth = self.transactions;
        if depth == 0 {
            let sql = self.grammar.compile_begin();
            self.run(sql, &[], |driver, sql, _| driver.execute_batch(sql))?;
        } else if self.grammar.supports_savepoints() {
            let sql = self.grammar.compile_savepoint(&savepoint(depth + 1));
            self.run(&sql, &[], |driver, sql, _| driver.execute_batch(sql))?;
        }

        self.transactions += 1;
        debug!(connection = %self.name, level = self.transactions, "Transaction begin");
        self.fire(ConnectionEvent::TransactionBeginning {
            connection: &self.name,
            level: self.transactions,
        });
        Ok(())
    }

    /// Commit the innermost level.
    ///
    /// At depth 1 this commits the real transaction; deeper levels release their
    /// savepoint. The depth drops by one even when the statement fails. Without
    /// an open transaction this does nothing.
    pub fn commit(&mut self) -> QueryResult<()> {
        let depth = self.transactions;
        let result = match depth {
            0 => return Ok(()),
            1 => self.run("COMMIT", &[], |driver, sql, _| driver.execute_batch(sql)),
            _ if self.grammar.supports_savepoints() => {
                let sql = self.grammar.compile_savepoint_release(&savepoint(depth));
                self.run(&sql, &[], |driver, sql, _| driver.execute_batch(sql))
            }
            _ => Ok(()),
        };

        self.transactions = self.transactions.min(depth).saturating_sub(1);
        result?;
        debug!(connection = %self.name, level = self.transactions, "Transaction commit");
        self.fire(ConnectionEvent::TransactionCommitted {
            connection: &self.name,
            level: self.transactions,
        });
        Ok(())
    }

    /// Roll back to `to_level`, or one level when `None`.
    ///
    /// Level 0 rolls back the real transaction; level `n` rolls back to the
    /// savepoint that opened level `n + 1` and releases it. A target at or above
    /// the current depth is rejected without touching any state.
    pub fn rollback(&mut self, to_level: Option<u32>) -> QueryResult<()> {
        let depth = self.transactions;
        let target = match to_level {
            Some(level) => level,
            None if depth == 0 => return Ok(()),
            None => depth - 1,
        };
        if target >= depth {
            return Err(QueryError::invalid_transaction_level(target, depth).with_connection(self.name.clone()));
        }

        let result = if target == 0 {
            self.run("ROLLBACK", &[], |driver, sql, _| driver.execute_batch(sql))
        } else if self.grammar.supports_savepoints() {
            let name = savepoint(target + 1);
            let rollback = self.grammar.compile_savepoint_rollback(&name);
            let release = self.grammar.compile_savepoint_release(&name);
            self.run(&rollback, &[], |driver, sql, _| driver.execute_batch(sql))
                .and_then(|()| self.run(&release, &[], |driver, sql, _| driver.execute_batch(sql)))
        } else {
            Ok(())
        };

        if let Err(e) = result {
            if e.is_lost_connection() {
                self.transactions = 0;
            }
            return Err(e);
        }

        self.transactions = target;
        debug!(connection = %self.name, level = target, "Transaction rollback");
        self.fire(ConnectionEvent::TransactionRolledBack {
            connection: &self.name,
            level: target,
        });
        Ok(())
    }

    /// Run `work` inside a transaction level, committing on success and rolling
    /// back one level on failure.
    pub fn transaction<T, F>(&mut self, work: F) -> QueryResult<T>
    where
        F: FnMut(&mut Connection) -> QueryResult<T>,
    {
        self.transaction_with_attempts(1, work)
    }

    /// Like [`Connection::transaction`], retrying deadlocks of the outermost
    /// transaction up to `attempts` runs in total.
    ///
    /// A deadlock inside a nested level rolls that level back and is returned
    /// as-is so the enclosing transaction can decide. Once the attempts are used
    /// up the deadlock is returned as a database error. Other failures roll back
    /// one level and are returned unchanged.
    pub fn transaction_with_attempts<T, F>(&mut self, attempts: u32, mut work: F) -> QueryResult<T>
    where
        F: FnMut(&mut Connection) -> QueryResult<T>,
    {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            self.begin_transaction()?;
            let level = self.transactions;

            let error = match work(self) {
                Ok(value) => match self.commit() {
                    Ok(()) => return Ok(value),
                    Err(e) => {
                        if level == 1 && e.is_deadlock() && attempt < attempts {
                            warn!(connection = %self.name, attempt, attempts, "Deadlock on commit, retrying transaction");
                            attempt += 1;
                            continue;
                        }
                        return Err(e);
                    }
                },
                Err(e) => e,
            };

            if self.transactions >= level {
                self.rollback(Some(level - 1))?;
            }

            if !error.is_deadlock() || level > 1 {
                return Err(error);
            }
            if attempt >= attempts {
                return Err(QueryError::database(format!(
                    "transaction failed after {} attempt(s): {}",
                    attempts, error.message
                ))
                .with_connection(self.name.clone())
                .with_source(error));
            }

            warn!(connection = %self.name, attempt, attempts, "Deadlock detected, retrying transaction");
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ErrorCode;
    use crate::config::Dialect;
    use crate::error::QueryError;
    use crate::testing::{RecordingDriver, ScriptedFailure};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nested_levels_use_savepoints() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Postgres);

        conn.begin_transaction().unwrap();
        conn.begin_transaction().unwrap();
        conn.begin_transaction().unwrap();
        assert_eq!(conn.transaction_level(), 3);
        conn.commit().unwrap();
        conn.rollback(None).unwrap();
        conn.commit().unwrap();

        assert_eq!(
            driver.statements(),
            vec![
                "BEGIN",
                "SAVEPOINT point2",
                "SAVEPOINT point3",
                "RELEASE SAVEPOINT point3",
                "ROLLBACK TO SAVEPOINT point2",
                "RELEASE SAVEPOINT point2",
                "COMMIT",
            ]
        );
        assert_eq!(conn.transaction_level(), 0);
    }

    #[test]
    fn test_mysql_begin_statement() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::MySql);
        conn.transaction(|_| Ok(())).unwrap();
        assert_eq!(driver.statements(), vec!["START TRANSACTION", "COMMIT"]);
    }

    #[test]
    fn test_rollback_rejects_out_of_range_level() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        conn.begin_transaction().unwrap();

        let err = conn.rollback(Some(1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransactionLevel);
        assert_eq!(conn.transaction_level(), 1);
        assert_eq!(driver.statements(), vec!["BEGIN"]);

        conn.rollback(Some(0)).unwrap();
        assert_eq!(conn.transaction_level(), 0);
    }

    #[test]
    fn test_commit_and_rollback_without_transaction() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        conn.commit().unwrap();
        conn.rollback(None).unwrap();
        assert!(conn.rollback(Some(0)).is_err());
        assert!(driver.statements().is_empty());
    }

    #[test]
    fn test_transaction_retries_deadlocks() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        let mut calls = 0;

        let result = conn.transaction_with_attempts(3, |conn| {
            calls += 1;
            if calls < 3 {
                return Err(QueryError::deadlock("database is locked"));
            }
            conn.statement("insert into t values (1)", &[])?;
            Ok(calls)
        });

        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            driver.statements(),
            vec!["BEGIN", "ROLLBACK", "BEGIN", "ROLLBACK", "BEGIN", "insert into t values (1)", "COMMIT"]
        );
    }

    #[test]
    fn test_exhausted_deadlock_becomes_database_error() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        let err = conn
            .transaction_with_attempts(2, |_| -> Result<(), _> { Err(QueryError::deadlock("deadlock detected")) })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(conn.transaction_level(), 0);
    }

    #[test]
    fn test_nested_deadlock_rolls_back_one_level() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        conn.begin_transaction().unwrap();

        let err = conn
            .transaction_with_attempts(5, |_| -> Result<(), _> { Err(QueryError::deadlock("deadlock detected")) })
            .unwrap_err();
        assert!(err.is_deadlock());
        assert_eq!(conn.transaction_level(), 1);
        assert_eq!(
            driver.statements(),
            vec!["BEGIN", "SAVEPOINT point2", "ROLLBACK TO SAVEPOINT point2", "RELEASE SAVEPOINT point2"]
        );
    }

    #[test]
    fn test_other_errors_pass_through_unchanged() {
        let driver = RecordingDriver::new();
        driver.fail_next("insert", ScriptedFailure::Database("constraint failed".into()));
        let mut conn = driver.connection(Dialect::Sqlite);

        let err = conn
            .transaction_with_attempts(3, |conn| conn.statement("insert into t values (1)", &[]))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(driver.statements(), vec!["BEGIN", "ROLLBACK"]);
    }
}
