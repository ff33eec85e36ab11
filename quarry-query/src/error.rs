//! Error types for query compilation and execution.
//!
//! Every failure surfaced by Quarry is a [`QueryError`] carrying an [`ErrorCode`],
//! a message and an [`ErrorContext`] with the compiled SQL, its bindings and the
//! elapsed time when the failure happened during execution.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: Q{category}{number}
//! - 1xxx: Query compile errors (invalid where expression, unsupported operator)
//! - 3xxx: Connection errors (unreachable, lost connection, auth)
//! - 4xxx: Transaction errors (deadlock, invalid savepoint level)
//! - 5xxx: Execution errors (driver reported failures)
//! - 6xxx: Data errors (row decoding)
//! - 7xxx: Configuration errors
//! - 8xxx: Schema errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use quarry_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::unsupported_operator("~~", "sqlite");
//! assert_eq!(err.code, ErrorCode::UnsupportedOperator);
//! assert!(err.is_compile_error());
//! assert!(err.to_string().starts_with("[Q1002]"));
//! ```
//!
//! # Bindings
//!
//! Bindings attached to an error are rendered to strings when the error is built.
//! Connections redact them by default (`redact_bindings = true` in the connection
//! config) so that passwords or tokens bound into a statement never end up in logs.

use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Placeholder shown instead of a redacted binding.
pub const REDACTED: &str = "<redacted>";

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Query compile errors (1xxx)
    /// Operator or where expression rejected by the builder (Q1001).
    InvalidWhereExpression = 1001,
    /// Operator combination the dialect grammar cannot express (Q1002).
    UnsupportedOperator = 1002,
    /// Placeholder count does not match the bindings supplied (Q1003).
    InvalidBinding = 1003,
    /// Query is missing a required clause, such as a table (Q1004).
    IncompleteQuery = 1004,

    // Connection errors (3xxx)
    /// Database connection failed (Q3001).
    ConnectionFailed = 3001,
    /// Connection dropped by the server (Q3002).
    ConnectionLost = 3002,
    /// Authentication failed (Q3003).
    AuthenticationFailed = 3003,
    /// Connection timeout (Q3004).
    ConnectionTimeout = 3004,

    // Transaction errors (4xxx)
    /// Transaction failed (Q4001).
    TransactionFailed = 4001,
    /// Deadlock or serialization conflict (Q4002).
    Deadlock = 4002,
    /// Rollback target outside the open transaction levels (Q4003).
    InvalidTransactionLevel = 4003,

    // Execution errors (5xxx)
    /// General database error reported by the driver (Q5001).
    DatabaseError = 5001,
    /// Query timeout (Q5002).
    QueryTimeout = 5002,

    // Data errors (6xxx)
    /// Row value could not be converted (Q6001).
    InvalidDataType = 6001,
    /// Row could not be decoded into the requested type (Q6002).
    DeserializationError = 6002,

    // Configuration errors (7xxx)
    /// Invalid configuration (Q7001).
    InvalidConfiguration = 7001,
    /// Missing configuration (Q7002).
    MissingConfiguration = 7002,
    /// Invalid connection string (Q7003).
    InvalidConnectionString = 7003,
    /// No connection registered under the requested name (Q7004).
    UnknownConnection = 7004,

    // Schema errors (8xxx)
    /// Schema change the dialect cannot perform (Q8001).
    UnsupportedSchemaOperation = 8001,
    /// Malformed table definition (Q8002).
    InvalidSchema = 8002,

    // Internal errors (9xxx)
    /// Internal error (Q9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "Q1001").
    pub fn code(&self) -> String {
        format!("Q{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidWhereExpression => "Invalid where expression",
            Self::UnsupportedOperator => "Unsupported operator",
            Self::InvalidBinding => "Invalid binding",
            Self::IncompleteQuery => "Incomplete query",
            Self::ConnectionFailed => "Database connection failed",
            Self::ConnectionLost => "Connection lost",
            Self::AuthenticationFailed => "Authentication failed",
            Self::ConnectionTimeout => "Connection timeout",
            Self::TransactionFailed => "Transaction failed",
            Self::Deadlock => "Deadlock detected",
            Self::InvalidTransactionLevel => "Invalid transaction level",
            Self::DatabaseError => "Database error",
            Self::QueryTimeout => "Query timeout",
            Self::InvalidDataType => "Invalid data type",
            Self::DeserializationError => "Deserialization error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::MissingConfiguration => "Missing configuration",
            Self::InvalidConnectionString => "Invalid connection string",
            Self::UnknownConnection => "Unknown connection",
            Self::UnsupportedSchemaOperation => "Unsupported schema operation",
            Self::InvalidSchema => "Invalid schema definition",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// Name of the connection the statement ran on.
    pub connection: Option<String>,
    /// The compiled SQL (if available).
    pub sql: Option<String>,
    /// Rendered bindings, possibly redacted.
    pub bindings: Vec<String>,
    /// Time spent before the statement failed.
    pub elapsed: Option<Duration>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
}

impl ErrorContext {
    /// Create new empty context.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Errors that can occur during query compilation and execution.
#[derive(Error, Debug, Clone)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the connection name.
    pub fn with_connection(mut self, name: impl Into<String>) -> Self {
        self.context.connection = Some(name.into());
        self
    }

    /// Set the SQL statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Attach the statement bindings, rendering each one or hiding them when `redact` is set.
    pub fn with_bindings(mut self, bindings: &[Value], redact: bool) -> Self {
        self.context.bindings = bindings
            .iter()
            .map(|b| {
                if redact {
                    REDACTED.to_string()
                } else {
                    b.to_string()
                }
            })
            .collect();
        self
    }

    /// Set the elapsed time.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.context.elapsed = Some(elapsed);
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create an invalid where expression error.
    pub fn invalid_where(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidWhereExpression, message)
            .with_help("Operators are matched against the dialect whitelist; use where_raw for free-form SQL")
    }

    /// Create an unsupported operator error.
    pub fn unsupported_operator(operator: impl Into<String>, dialect: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::UnsupportedOperator,
            format!("Operator '{}' is not supported by the {} grammar", operator.into(), dialect),
        )
    }

    /// Create an invalid binding error.
    pub fn invalid_binding(expected: usize, actual: usize) -> Self {
        Self::new(
            ErrorCode::InvalidBinding,
            format!("Expression has {} placeholder(s) but {} binding(s) were supplied", expected, actual),
        )
    }

    /// Create an incomplete query error.
    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IncompleteQuery, message)
    }

    /// Create an unsupported schema operation error.
    pub fn unsupported_schema(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedSchemaOperation, message)
    }

    /// Create an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSchema, message)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::ConnectionFailed, format!("Connection error: {}", message))
            .with_suggestion("Check that the database server is running")
            .with_suggestion("Verify the connection settings are correct")
    }

    /// Create a lost connection error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::ConnectionLost, format!("Connection lost: {}", message))
    }

    /// Create an authentication error.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::AuthenticationFailed, format!("Authentication failed: {}", message))
            .with_suggestion("Check username and password in the connection config")
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::TransactionFailed, format!("Transaction error: {}", message))
    }

    /// Create a deadlock error.
    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Deadlock, message)
            .with_suggestion("Retry the transaction with Connection::transaction_with_retries")
    }

    /// Create an invalid transaction level error.
    pub fn invalid_transaction_level(level: u32, depth: u32) -> Self {
        Self::new(
            ErrorCode::InvalidTransactionLevel,
            format!("Cannot roll back to level {} with {} open transaction level(s)", level, depth),
        )
    }

    /// Create a general database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Create an unknown connection error.
    pub fn unknown_connection(name: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::UnknownConnection,
            format!("Database connection [{}] not configured", name.into()),
        )
    }

    /// Create a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::DeserializationError, format!("Failed to deserialize row: {}", message))
    }

    /// Create an invalid data type error.
    pub fn invalid_data_type(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidDataType, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
    }

    // ============== Error Checks ==============

    /// Check if this error was raised before any SQL reached the driver.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::InvalidWhereExpression
                | ErrorCode::UnsupportedOperator
                | ErrorCode::InvalidBinding
                | ErrorCode::IncompleteQuery
                | ErrorCode::UnsupportedSchemaOperation
                | ErrorCode::InvalidSchema
        )
    }

    /// Check if this is a deadlock-classified error.
    pub fn is_deadlock(&self) -> bool {
        self.code == ErrorCode::Deadlock
    }

    /// Check if the server dropped the connection.
    pub fn is_lost_connection(&self) -> bool {
        self.code == ErrorCode::ConnectionLost
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConnectionFailed
                | ErrorCode::ConnectionLost
                | ErrorCode::ConnectionTimeout
                | ErrorCode::AuthenticationFailed
        )
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self.code, ErrorCode::QueryTimeout | ErrorCode::ConnectionTimeout)
    }

    /// Check if this error is retryable at a transaction boundary.
    pub fn is_retryable(&self) -> bool {
        self.is_deadlock()
    }

    /// Display the full error with the SQL, bindings and timing.
    pub fn display_full(&self) -> String {
        let mut output = format!("Error [{}]: {}\n", self.code.code(), self.message);

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref name) = self.context.connection {
            output.push_str(&format!("  → Connection: {}\n", name));
        }
        if let Some(ref sql) = self.context.sql {
            output.push_str(&format!("  → SQL: {}\n", sql));
        }
        if !self.context.bindings.is_empty() {
            output.push_str(&format!("  → Bindings: [{}]\n", self.context.bindings.join(", ")));
        }
        if let Some(elapsed) = self.context.elapsed {
            output.push_str(&format!("  → Elapsed: {:.2}ms\n", elapsed.as_secs_f64() * 1000.0));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::InvalidWhereExpression.code(), "Q1001");
        assert_eq!(ErrorCode::Deadlock.code(), "Q4002");
        assert_eq!(ErrorCode::UnsupportedSchemaOperation.code(), "Q8001");
    }

    #[test]
    fn test_compile_errors_are_not_retryable() {
        let err = QueryError::invalid_where("bad operator");
        assert!(err.is_compile_error());
        assert!(!err.is_retryable());
        assert!(QueryError::deadlock("deadlock found").is_retryable());
    }

    #[test]
    fn test_bindings_redacted() {
        let err = QueryError::database("boom")
            .with_sql("select * from users where password = ?")
            .with_bindings(&[Value::from("hunter2")], true);
        assert_eq!(err.context.bindings, vec![REDACTED.to_string()]);
        assert!(!err.display_full().contains("hunter2"));
    }

    #[test]
    fn test_bindings_rendered() {
        let err = QueryError::database("boom").with_bindings(&[Value::from(7), Value::Null], false);
        assert_eq!(err.context.bindings, vec!["7".to_string(), "NULL".to_string()]);
    }

    #[test]
    fn test_clone_keeps_source_and_help() {
        let err = QueryError::invalid_where("bad operator").with_source(fmt::Error);
        let copy = err.clone();
        assert_eq!(copy.context.help, err.context.help);
        assert!(std::error::Error::source(&copy).is_some());
    }

    #[test]
    fn test_display_full_includes_context() {
        let err = QueryError::database("syntax error")
            .with_connection("main")
            .with_sql("selec 1")
            .with_elapsed(Duration::from_millis(3));
        let output = err.display_full();
        assert!(output.contains("Q5001"));
        assert!(output.contains("selec 1"));
        assert!(output.contains("main"));
        assert!(output.contains("Elapsed"));
    }
}
