//! Classification of `rusqlite` errors.

use quarry_query::QueryError;
use quarry_query::detect::{is_deadlock_message, is_lost_connection_message};
use rusqlite::ErrorCode;

/// Convert a `rusqlite` error to a [`QueryError`].
///
/// `SQLITE_BUSY` and `SQLITE_LOCKED` are reported as deadlocks so transactions
/// retry them; a file that cannot be opened is a connection error.
pub fn classify(err: rusqlite::Error) -> QueryError {
    let message = err.to_string();
    let classified = match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => QueryError::deadlock(message),
        Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::PermissionDenied) => {
            QueryError::connection(message)
        }
        _ if is_deadlock_message(&message) => QueryError::deadlock(message),
        _ if is_lost_connection_message(&message) => QueryError::connection_lost(message),
        _ => QueryError::database(message),
    };
    classified.with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_query::ErrorCode as Code;
    use rusqlite::ffi;

    fn failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_is_deadlock() {
        assert!(classify(failure(ffi::SQLITE_BUSY)).is_deadlock());
        assert!(classify(failure(ffi::SQLITE_LOCKED)).is_deadlock());
    }

    #[test]
    fn test_cannot_open_is_connection_error() {
        let err = classify(failure(ffi::SQLITE_CANTOPEN));
        assert_eq!(err.code, Code::ConnectionFailed);
    }

    #[test]
    fn test_constraint_is_database_error() {
        let err = classify(failure(ffi::SQLITE_CONSTRAINT));
        assert_eq!(err.code, Code::DatabaseError);
        assert!(!err.is_retryable());
    }
}
