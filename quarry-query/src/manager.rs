//! Named connections built lazily from [`DatabaseSettings`].

use crate::config::{DatabaseSettings, Dialect};
use crate::connection::Connection;
use crate::driver::Connector;
use crate::error::{QueryError, QueryResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Something that hands out connections by name.
///
/// Components that may run on a non-default connection (migrations, schema
/// tooling) take a resolver instead of a single [`Connection`].
pub trait ConnectionResolver {
    /// Name of the default connection.
    fn default_connection(&self) -> &str;

    /// Resolve a connection; `None` means the default one.
    fn connection(&mut self, name: Option<&str>) -> QueryResult<&mut Connection>;
}

impl ConnectionResolver for Connection {
    fn default_connection(&self) -> &str {
        self.name()
    }

    fn connection(&mut self, name: Option<&str>) -> QueryResult<&mut Connection> {
        match name {
            Some(name) if name != self.name() => Err(QueryError::unknown_connection(name)),
            _ => Ok(self),
        }
    }
}

/// Connections by name, opened on first use.
pub struct DatabaseManager {
    settings: DatabaseSettings,
    connectors: HashMap<Dialect, Arc<dyn Connector>>,
    connections: HashMap<String, Connection>,
}

impl std::fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("settings", &self.settings)
            .field("connectors", &self.connectors.keys().collect::<Vec<_>>())
            .field("connections", &self.connections.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DatabaseManager {
    /// Create a manager without connectors.
    pub fn new(settings: DatabaseSettings) -> Self {
        Self {
            settings,
            connectors: HashMap::new(),
            connections: HashMap::new(),
        }
    }

    /// Register the connector used for a dialect.
    pub fn with_connector(mut self, dialect: Dialect, connector: Arc<dyn Connector>) -> Self {
        self.connectors.insert(dialect, connector);
        self
    }

    /// Register the connector used for a dialect.
    pub fn register_connector(&mut self, dialect: Dialect, connector: Arc<dyn Connector>) {
        self.connectors.insert(dialect, connector);
    }

    /// Settings the manager was built from.
    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Add an already open connection under its own name.
    pub fn add_connection(&mut self, connection: Connection) {
        self.connections.insert(connection.name().to_string(), connection);
    }

    /// Names of the open connections.
    pub fn open_connections(&self) -> Vec<&str> {
        self.connections.keys().map(String::as_str).collect()
    }

    /// Close a connection. The next lookup reopens it.
    pub fn disconnect(&mut self, name: Option<&str>) -> bool {
        let name = name.unwrap_or(&self.settings.default).to_string();
        let closed = self.connections.remove(&name).is_some();
        if closed {
            info!(connection = %name, "Disconnected");
        }
        closed
    }

    /// Reconnect a connection, opening it if needed.
    pub fn reconnect(&mut self, name: Option<&str>) -> QueryResult<&mut Connection> {
        self.disconnect(name);
        ConnectionResolver::connection(self, name)
    }

    fn open(&self, name: &str) -> QueryResult<Connection> {
        if !self.settings.connections.contains_key(name) {
            return Err(QueryError::unknown_connection(name));
        }
        let config = self.settings.connection(Some(name))?;
        let connector = self.connectors.get(&config.dialect).cloned().ok_or_else(|| {
            QueryError::config(format!("no connector registered for {}", config.dialect))
                .with_connection(name.to_string())
                .with_help("Enable the driver feature and register its connector with with_connector()")
        })?;
        Connection::open(name, config, connector)
    }
}

impl ConnectionResolver for DatabaseManager {
    fn default_connection(&self) -> &str {
        &self.settings.default
    }

    fn connection(&mut self, name: Option<&str>) -> QueryResult<&mut Connection> {
        let name = name.unwrap_or(&self.settings.default).to_string();
        if !self.connections.contains_key(&name) {
            let connection = self.open(&name)?;
            self.connections.insert(name.clone(), connection);
        }
        self.connections
            .get_mut(&name)
            .ok_or_else(|| QueryError::unknown_connection(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::testing::RecordingDriver;
    use crate::ErrorCode;

    fn manager(driver: &RecordingDriver) -> DatabaseManager {
        let settings = DatabaseSettings::single("main", &ConnectionConfig::sqlite_memory());
        DatabaseManager::new(settings).with_connector(Dialect::Sqlite, driver.connector())
    }

    #[test]
    fn test_connections_open_lazily_and_are_reused() {
        let driver = RecordingDriver::new();
        let mut manager = manager(&driver);
        assert_eq!(driver.opens(), 0);

        manager.connection(None).unwrap().statement("select 1", &[]).unwrap();
        manager.connection(Some("main")).unwrap();
        assert_eq!(driver.opens(), 1);

        assert!(manager.disconnect(None));
        manager.connection(None).unwrap();
        assert_eq!(driver.opens(), 2);
    }

    #[test]
    fn test_unknown_connection() {
        let driver = RecordingDriver::new();
        let mut manager = manager(&driver);
        let err = manager.connection(Some("reporting")).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownConnection);
    }

    #[test]
    fn test_missing_connector() {
        let settings = DatabaseSettings::single("main", &ConnectionConfig::sqlite_memory());
        let mut manager = DatabaseManager::new(settings);
        let err = manager.connection(None).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
    }

    #[test]
    fn test_single_connection_resolver() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        assert!(ConnectionResolver::connection(&mut conn, None).is_ok());
        assert!(ConnectionResolver::connection(&mut conn, Some("test")).is_ok());
        assert!(ConnectionResolver::connection(&mut conn, Some("other")).is_err());
    }
}
