//! Opening MySQL sessions from a [`ConnectionConfig`].

use crate::driver::MySqlDriver;
use crate::error::classify_connect;
use mysql_async::{Conn, Opts, OptsBuilder, SslOpts};
use quarry_query::config::SslMode;
use quarry_query::{ConnectionConfig, Connector, Dialect, Driver, ErrorCode, QueryError, QueryResult};
use tracing::info;

const DEFAULT_PORT: u16 = 3306;

/// Opens [`MySqlDriver`] sessions.
///
/// The charset and collation are applied with `set names` as each session
/// starts. `sslmode=require` encrypts without verifying the certificate,
/// `verify-ca` skips only the hostname check and `verify-full` checks both.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    /// Translate connection settings to `mysql_async` options.
    pub fn opts(config: &ConnectionConfig) -> Opts {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.as_deref().unwrap_or("localhost"))
            .tcp_port(config.port.unwrap_or(DEFAULT_PORT))
            .db_name(config.database.as_deref())
            .user(config.username.as_deref())
            .pass(config.password.as_deref())
            .init(Self::init_statements(config));

        let ssl = match config.mysql.ssl_mode {
            None | Some(SslMode::Disable | SslMode::Allow | SslMode::Prefer) => None,
            Some(SslMode::Require) => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            Some(SslMode::VerifyCa) => Some(SslOpts::default().with_danger_skip_domain_validation(true)),
            Some(SslMode::VerifyFull) => Some(SslOpts::default()),
        };
        builder = builder.ssl_opts(ssl);
        Opts::from(builder)
    }

    /// Statements run as each session starts.
    pub fn init_statements(config: &ConnectionConfig) -> Vec<String> {
        match (&config.charset, &config.collation) {
            (Some(charset), Some(collation)) => {
                vec![format!("set names '{}' collate '{}'", charset, collation)]
            }
            (Some(charset), None) => vec![format!("set names '{}'", charset)],
            _ => Vec::new(),
        }
    }
}

impl Connector for MySqlConnector {
    fn open(&self, config: &ConnectionConfig) -> QueryResult<Box<dyn Driver>> {
        if config.dialect != Dialect::MySql {
            return Err(QueryError::config(format!(
                "MySqlConnector cannot open a {} connection",
                config.dialect
            )));
        }
        let opts = Self::opts(config);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| QueryError::internal(format!("failed to start runtime: {}", e)).with_source(e))?;

        let conn = runtime.block_on(async {
            match config.connect_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, Conn::new(opts)).await {
                    Ok(result) => result.map_err(classify_connect),
                    Err(_) => Err(QueryError::new(
                        ErrorCode::ConnectionTimeout,
                        format!("Connection timed out after {:?}", timeout),
                    )),
                },
                None => Conn::new(opts).await.map_err(classify_connect),
            }
        })?;

        info!(
            host = ?config.host,
            database = ?config.database,
            connection_id = conn.id(),
            "MySQL session opened"
        );
        Ok(Box::new(MySqlDriver::new(runtime, conn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> ConnectionConfig {
        let mut config = ConnectionConfig::new(Dialect::MySql);
        config.host = Some("db.internal".into());
        config.database = Some("app".into());
        config.username = Some("app".into());
        config.password = Some("s3cret".into());
        config
    }

    #[test]
    fn test_opts_map_settings() {
        let opts = MySqlConnector::opts(&config());
        assert_eq!(opts.ip_or_hostname(), "db.internal");
        assert_eq!(opts.tcp_port(), 3306);
        assert_eq!(opts.db_name(), Some("app"));
        assert_eq!(opts.user(), Some("app"));
        assert_eq!(opts.pass(), Some("s3cret"));
        assert!(opts.ssl_opts().is_none());
    }

    #[test]
    fn test_ssl_modes() {
        let mut settings = config();
        settings.mysql.ssl_mode = Some(SslMode::Require);
        let opts = MySqlConnector::opts(&settings);
        let ssl = opts.ssl_opts().unwrap();
        assert!(ssl.accept_invalid_certs());

        settings.mysql.ssl_mode = Some(SslMode::VerifyFull);
        let opts = MySqlConnector::opts(&settings);
        assert!(!opts.ssl_opts().unwrap().accept_invalid_certs());
    }

    #[test]
    fn test_init_statements() {
        let mut settings = config();
        assert!(MySqlConnector::init_statements(&settings).is_empty());

        settings.charset = Some("utf8mb4".into());
        settings.collation = Some("utf8mb4_unicode_ci".into());
        assert_eq!(
            MySqlConnector::init_statements(&settings),
            vec!["set names 'utf8mb4' collate 'utf8mb4_unicode_ci'"]
        );
        assert_eq!(MySqlConnector::opts(&settings).init(), &["set names 'utf8mb4' collate 'utf8mb4_unicode_ci'".to_string()]);
    }

    #[test]
    fn test_rejects_other_dialects() {
        assert!(MySqlConnector.open(&ConnectionConfig::sqlite_memory()).is_err());
    }
}
