//! Classification of `tokio-postgres` errors.
//!
//! SQLSTATE classes decide first: `40001` and `40P01` are deadlocks, class `08`
//! and `57P01` are a dropped connection, class `28` an authentication failure. Errors
//! without a state fall back to the shared message lists.

use quarry_query::QueryError;
use quarry_query::detect::{is_deadlock_message, is_lost_connection_message};
use tokio_postgres::error::SqlState;

/// Convert a `tokio-postgres` error to a [`QueryError`].
pub fn classify(err: tokio_postgres::Error) -> QueryError {
    let message = match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    };
    classify_parts(err.code(), err.is_closed(), message).with_source(err)
}

/// Convert an error raised while connecting.
///
/// Anything that is not already a connection-class error, such as a missing
/// user or an unknown database, is reported as a failed connection.
pub fn classify_connect(err: tokio_postgres::Error) -> QueryError {
    let message = err.to_string();
    let classified = classify_parts(err.code(), err.is_closed(), message.clone());
    let classified = if classified.is_connection_error() {
        classified
    } else {
        QueryError::connection(message)
    };
    classified.with_source(err)
}

pub(crate) fn classify_parts(state: Option<&SqlState>, closed: bool, message: String) -> QueryError {
    match state {
        Some(s) if *s == SqlState::T_R_SERIALIZATION_FAILURE || *s == SqlState::T_R_DEADLOCK_DETECTED => {
            QueryError::deadlock(message)
        }
        Some(s) if s.code().starts_with("08") || *s == SqlState::ADMIN_SHUTDOWN => {
            QueryError::connection_lost(message)
        }
        Some(s) if s.code().starts_with("28") => QueryError::authentication_failed(message),
        Some(_) => QueryError::database(message),
        None if closed || is_lost_connection_message(&message) => QueryError::connection_lost(message),
        None if is_deadlock_message(&message) => QueryError::deadlock(message),
        None => QueryError::database(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_query::ErrorCode;

    fn classify_state(state: SqlState) -> QueryError {
        classify_parts(Some(&state), false, "failed".into())
    }

    #[test]
    fn test_serialization_failures_are_deadlocks() {
        assert!(classify_state(SqlState::T_R_DEADLOCK_DETECTED).is_deadlock());
        assert!(classify_state(SqlState::T_R_SERIALIZATION_FAILURE).is_deadlock());
    }

    #[test]
    fn test_connection_class() {
        assert!(classify_state(SqlState::CONNECTION_FAILURE).is_lost_connection());
        assert!(classify_state(SqlState::ADMIN_SHUTDOWN).is_lost_connection());
        assert_eq!(
            classify_state(SqlState::INVALID_PASSWORD).code,
            ErrorCode::AuthenticationFailed
        );
    }

    #[test]
    fn test_closed_client_is_lost() {
        assert!(classify_parts(None, true, "connection closed".into()).is_lost_connection());
        assert!(
            classify_parts(None, false, "server closed the connection unexpectedly".into())
                .is_lost_connection()
        );
    }

    #[test]
    fn test_unique_violation_is_database_error() {
        let err = classify_state(SqlState::UNIQUE_VIOLATION);
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.is_retryable());
    }
}
