//! Error types for the migrator.

use quarry_query::QueryError;
use std::fmt;
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Which half of a migration was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Applying.
    Up,
    /// Reverting.
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Repository or connection error outside a migration unit.
    #[error("Database error: {0}")]
    Query(#[from] QueryError),

    /// Invalid migration name, file or manifest.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// A unit's `up` or `down` failed. Units before it in the batch stay applied.
    #[error("Migration '{migration}' failed while running {direction}: {source}")]
    UnitFailed {
        /// Migration name.
        migration: String,
        /// Which half was running.
        direction: Direction,
        /// The underlying failure.
        #[source]
        source: QueryError,
    },

    /// A recorded migration has no matching unit.
    #[error("Migration '{0}' not found")]
    NotFound(String),

    /// Bad migrator or manifest configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MigrationError {
    /// Create an invalid migration error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Name of the unit that failed, for [`MigrationError::UnitFailed`].
    pub fn migration(&self) -> Option<&str> {
        match self {
            Self::UnitFailed { migration, .. } | Self::NotFound(migration) => Some(migration),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for MigrationError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_failed_display() {
        let err = MigrationError::UnitFailed {
            migration: "2024_01_01_create_users".into(),
            direction: Direction::Down,
            source: QueryError::database("no such table: users"),
        };
        let message = err.to_string();
        assert!(message.contains("2024_01_01_create_users"));
        assert!(message.contains("running down"));
        assert_eq!(err.migration(), Some("2024_01_01_create_users"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_query_error_converts() {
        let err: MigrationError = QueryError::connection("refused").into();
        assert!(matches!(err, MigrationError::Query(_)));
        assert_eq!(err.migration(), None);
    }
}
