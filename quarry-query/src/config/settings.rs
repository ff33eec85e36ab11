//! Multi-connection settings loaded from TOML.
//!
//! ```toml
//! default = "main"
//!
//! [migrations]
//! table = "migrations"
//! path = "database/migrations"
//!
//! [connections.main]
//! driver = "sqlite"
//! database = "app.db"
//!
//! [connections.reporting]
//! url = "${REPORTING_URL}"
//! prefix = "rpt_"
//! ```

use super::{ConfigError, ConfigResult, ConnectionConfig, Dialect, EnvExpander, EnvSource, SslMode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Named connections plus migration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Name of the default connection.
    #[serde(default = "default_connection_name")]
    pub default: String,
    /// Connection entries by name.
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionEntry>,
    /// Migration settings.
    #[serde(default)]
    pub migrations: MigrationSettings,
}

fn default_connection_name() -> String {
    "main".to_string()
}

/// Migration repository and discovery settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Repository table name.
    pub table: String,
    /// Directory holding migration units.
    pub path: PathBuf,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            table: "migrations".to_string(),
            path: PathBuf::from("migrations"),
        }
    }
}

/// One connection as written in a settings file.
///
/// Explicit fields override whatever the optional `url` provides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionEntry {
    /// Connection URL.
    pub url: Option<String>,
    /// Driver name.
    pub driver: Option<Dialect>,
    /// Host.
    pub host: Option<String>,
    /// Port.
    pub port: Option<u16>,
    /// Database name or SQLite path.
    pub database: Option<String>,
    /// Username.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Table prefix.
    pub prefix: Option<String>,
    /// Charset.
    pub charset: Option<String>,
    /// Collation.
    pub collation: Option<String>,
    /// SSL mode.
    pub sslmode: Option<String>,
    /// Postgres schema.
    pub schema: Option<String>,
    /// MySQL storage engine.
    pub engine: Option<String>,
    /// SQLite foreign key enforcement.
    pub foreign_keys: Option<bool>,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u64>,
    /// SQLite journal mode.
    pub journal_mode: Option<String>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Hide bindings in errors.
    pub redact_bindings: Option<bool>,
}

impl ConnectionEntry {
    /// Resolve the entry into a connection config.
    pub fn to_config(&self) -> ConfigResult<ConnectionConfig> {
        let mut config = match (&self.url, self.driver) {
            (Some(url), _) => ConnectionConfig::from_url(url)?,
            (None, Some(dialect)) => ConnectionConfig::new(dialect),
            (None, None) => return Err(ConfigError::MissingField("driver".to_string())),
        };
        if let Some(dialect) = self.driver {
            if dialect != config.dialect {
                return Err(ConfigError::InvalidOption {
                    key: "driver".to_string(),
                    message: format!("url is a {} url but driver is {}", config.dialect, dialect),
                });
            }
        }

        overlay(&mut config.host, &self.host);
        overlay(&mut config.database, &self.database);
        overlay(&mut config.username, &self.username);
        overlay(&mut config.password, &self.password);
        overlay(&mut config.charset, &self.charset);
        overlay(&mut config.collation, &self.collation);
        overlay(&mut config.postgres.schema, &self.schema);
        overlay(&mut config.mysql.engine, &self.engine);
        overlay(&mut config.sqlite.journal_mode, &self.journal_mode);
        if self.port.is_some() {
            config.port = self.port;
        }
        if let Some(ref prefix) = self.prefix {
            config.prefix = prefix.clone();
        }
        if let Some(ref mode) = self.sslmode {
            let mode = SslMode::parse(mode).ok_or_else(|| ConfigError::InvalidOption {
                key: "sslmode".to_string(),
                message: format!("unknown ssl mode '{}'", mode),
            })?;
            config.postgres.ssl_mode = Some(mode);
            config.mysql.ssl_mode = Some(mode);
        }
        if let Some(fk) = self.foreign_keys {
            config.sqlite.foreign_keys = fk;
        }
        if let Some(ms) = self.busy_timeout_ms {
            config.sqlite.busy_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(redact) = self.redact_bindings {
            config.redact_bindings = redact;
        }
        Ok(config)
    }
}

fn overlay(target: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

impl DatabaseSettings {
    /// Settings with a single default connection.
    pub fn single(name: impl Into<String>, config: &ConnectionConfig) -> Self {
        let name = name.into();
        let entry = ConnectionEntry {
            driver: Some(config.dialect),
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            prefix: Some(config.prefix.clone()),
            charset: config.charset.clone(),
            collation: config.collation.clone(),
            sslmode: config.postgres.ssl_mode.map(|m| m.as_str().to_string()),
            schema: config.postgres.schema.clone(),
            engine: config.mysql.engine.clone(),
            foreign_keys: Some(config.sqlite.foreign_keys),
            busy_timeout_ms: config.sqlite.busy_timeout.map(|d| d.as_millis() as u64),
            journal_mode: config.sqlite.journal_mode.clone(),
            connect_timeout_secs: config.connect_timeout.map(|d| d.as_secs()),
            redact_bindings: Some(config.redact_bindings),
            url: None,
        };
        Self {
            default: name.clone(),
            connections: BTreeMap::from([(name, entry)]),
            migrations: MigrationSettings::default(),
        }
    }

    /// Parse settings from TOML, expanding environment references in every string.
    pub fn from_toml(input: &str) -> ConfigResult<Self> {
        Self::from_toml_with(input, &EnvExpander::new())
    }

    /// Parse settings with a custom environment expander.
    pub fn from_toml_with<S: EnvSource>(input: &str, expander: &EnvExpander<S>) -> ConfigResult<Self> {
        let mut value: toml::Value = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        expand_strings(&mut value, expander)?;
        let settings: Self = value.try_into().map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        debug!(
            default = %settings.default,
            connections = settings.connections.len(),
            "Database settings loaded"
        );
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml(&input)
    }

    /// Resolve a named connection, or the default one.
    pub fn connection(&self, name: Option<&str>) -> ConfigResult<ConnectionConfig> {
        let name = name.unwrap_or(&self.default);
        self.connections
            .get(name)
            .ok_or_else(|| ConfigError::MissingField(format!("connections.{}", name)))?
            .to_config()
    }
}

fn expand_strings<S: EnvSource>(value: &mut toml::Value, expander: &EnvExpander<S>) -> ConfigResult<()> {
    match value {
        toml::Value::String(s) => *s = expander.expand(s)?,
        toml::Value::Array(items) => {
            for item in items {
                expand_strings(item, expander)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                expand_strings(item, expander)?;
            }
        }
        _ => {}
    }
    Ok(())
}
