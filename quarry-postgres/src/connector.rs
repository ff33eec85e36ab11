//! Opening PostgreSQL sessions from a [`ConnectionConfig`].

use crate::driver::PgDriver;
use crate::error::{classify, classify_connect};
use quarry_query::config::SslMode;
use quarry_query::{ConnectionConfig, Connector, Dialect, Driver, QueryError, QueryResult};
use tokio_postgres::NoTls;
use tokio_postgres::config::SslMode as PgSslMode;
use tracing::{debug, info, warn};

/// Opens [`PgDriver`] sessions.
///
/// After connecting, the session's `client_encoding` is set from the charset
/// and the configured schema (or comma-separated schemas) becomes the
/// `search_path`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl PgConnector {
    /// Translate connection settings to `tokio-postgres` settings.
    pub fn client_config(config: &ConnectionConfig) -> QueryResult<tokio_postgres::Config> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(config.host.as_deref().unwrap_or("localhost"));
        if let Some(port) = config.port {
            pg.port(port);
        }
        if let Some(database) = &config.database {
            pg.dbname(database);
        }
        if let Some(user) = &config.username {
            pg.user(user);
        }
        if let Some(password) = &config.password {
            pg.password(password);
        }
        if let Some(name) = &config.postgres.application_name {
            pg.application_name(name);
        }
        if let Some(timeout) = config.connect_timeout {
            pg.connect_timeout(timeout);
        }
        let ssl_mode = match config.postgres.ssl_mode {
            None | Some(SslMode::Allow | SslMode::Prefer) => PgSslMode::Prefer,
            Some(SslMode::Disable) => PgSslMode::Disable,
            Some(mode) => {
                return Err(QueryError::config(format!(
                    "sslmode={} needs TLS, which this driver does not provide",
                    mode.as_str()
                ))
                .with_suggestion("Use sslmode=disable or sslmode=prefer"));
            }
        };
        pg.ssl_mode(ssl_mode);
        Ok(pg)
    }

    /// Statements run once per session after connecting.
    pub fn session_statements(config: &ConnectionConfig) -> Vec<String> {
        let mut statements = Vec::new();
        if let Some(charset) = &config.charset {
            statements.push(format!("set client_encoding to {}", quote_literal(charset)));
        }
        if let Some(schema) = &config.postgres.schema {
            let path: Vec<String> = schema
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(quote_ident)
                .collect();
            if !path.is_empty() {
                statements.push(format!("set search_path to {}", path.join(", ")));
            }
        }
        statements
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quote_ident(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

impl Connector for PgConnector {
    fn open(&self, config: &ConnectionConfig) -> QueryResult<Box<dyn Driver>> {
        if config.dialect != Dialect::Postgres {
            return Err(QueryError::config(format!(
                "PgConnector cannot open a {} connection",
                config.dialect
            )));
        }
        let pg = Self::client_config(config)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| QueryError::internal(format!("failed to start runtime: {}", e)).with_source(e))?;

        let (client, connection) = runtime.block_on(pg.connect(NoTls)).map_err(classify_connect)?;
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "PostgreSQL connection closed with an error");
            }
        });

        for sql in Self::session_statements(config) {
            debug!(sql = %sql, "Configuring session");
            runtime.block_on(client.batch_execute(&sql)).map_err(classify)?;
        }

        info!(
            host = ?config.host,
            database = ?config.database,
            "PostgreSQL session opened"
        );
        Ok(Box::new(PgDriver::new(runtime, client)))
    }
}
