//! Opening SQLite databases from a [`ConnectionConfig`].

use crate::driver::SqliteDriver;
use crate::error::classify;
use quarry_query::{ConnectionConfig, Connector, Dialect, Driver, QueryError, QueryResult};
use tracing::{debug, info};

/// Opens [`SqliteDriver`] handles.
///
/// An empty database or `:memory:` opens a private in-memory database; anything
/// else is a file path, created when missing. After opening, the connector
/// applies `foreign_keys`, `busy_timeout` and `journal_mode` from
/// [`quarry_query::config::SqliteOptions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl SqliteConnector {
    fn configure(conn: &rusqlite::Connection, config: &ConnectionConfig) -> QueryResult<()> {
        let options = &config.sqlite;
        conn.pragma_update(None, "foreign_keys", options.foreign_keys)
            .map_err(classify)?;
        if let Some(timeout) = options.busy_timeout {
            conn.busy_timeout(timeout).map_err(classify)?;
        }
        if let Some(mode) = &options.journal_mode {
            let applied: String = conn
                .pragma_update_and_check(None, "journal_mode", mode.as_str(), |row| row.get(0))
                .map_err(classify)?;
            debug!(requested = %mode, applied = %applied, "Journal mode set");
        }
        Ok(())
    }
}

impl Connector for SqliteConnector {
    fn open(&self, config: &ConnectionConfig) -> QueryResult<Box<dyn Driver>> {
        if config.dialect != Dialect::Sqlite {
            return Err(QueryError::config(format!(
                "SqliteConnector cannot open a {} connection",
                config.dialect
            )));
        }

        let conn = if config.is_memory() {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(config.database.as_deref().unwrap_or_default())
        }
        .map_err(|e| QueryError::connection(e.to_string()).with_source(e))?;

        Self::configure(&conn, config)?;
        info!(database = %config.to_dsn(), "SQLite database opened");
        Ok(Box::new(SqliteDriver::new(conn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quarry_query::Value;

    #[test]
    fn test_memory_database_enforces_foreign_keys() {
        let mut driver = SqliteConnector.connect(&ConnectionConfig::sqlite_memory()).unwrap();
        let rows = driver.query("pragma foreign_keys", &[]).unwrap();
        assert_eq!(rows[0].get_index(0), Some(&Value::Int(1)));
    }

    #[test]
    fn test_foreign_keys_can_be_disabled() {
        let mut config = ConnectionConfig::sqlite_memory();
        config.sqlite.foreign_keys = false;
        let mut driver = SqliteConnector.connect(&config).unwrap();
        let rows = driver.query("pragma foreign_keys", &[]).unwrap();
        assert_eq!(rows[0].get_index(0), Some(&Value::Int(0)));
    }

    #[test]
    fn test_file_database_persists_with_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let mut config = ConnectionConfig::sqlite_file(path.to_string_lossy());
        config.sqlite.journal_mode = Some("wal".into());

        {
            let mut driver = SqliteConnector.connect(&config).unwrap();
            driver.execute_batch("create table t (v text); insert into t values ('kept');").unwrap();
            let mode = driver.query("pragma journal_mode", &[]).unwrap();
            assert_eq!(mode[0].get_index(0), Some(&Value::from("wal")));
        }

        let mut driver = SqliteConnector.connect(&config).unwrap();
        let rows = driver.query("select v from t", &[]).unwrap();
        assert_eq!(rows[0].get_str("v").unwrap(), "kept");
    }

    #[test]
    fn test_missing_directory_is_connection_error() {
        let config = ConnectionConfig::sqlite_file("/nonexistent/dir/app.db");
        let err = SqliteConnector.connect(&config).err().unwrap();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_rejects_other_dialects() {
        let config = ConnectionConfig::new(Dialect::Postgres);
        assert!(SqliteConnector.open(&config).is_err());
    }
}
