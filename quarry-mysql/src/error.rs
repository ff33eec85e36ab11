//! Classification of `mysql_async` errors.

use mysql_async::{DriverError, Error};
use quarry_query::QueryError;
use quarry_query::detect::{is_deadlock_message, is_lost_connection_message};

/// Convert a `mysql_async` error to a [`QueryError`].
pub fn classify(err: Error) -> QueryError {
    let message = err.to_string();
    let classified = match &err {
        Error::Server(server) => classify_server(server.code, &server.message),
        Error::Io(_) | Error::Driver(DriverError::ConnectionClosed) => QueryError::connection_lost(message),
        _ if is_lost_connection_message(&message) => QueryError::connection_lost(message),
        _ if is_deadlock_message(&message) => QueryError::deadlock(message),
        _ => QueryError::database(message),
    };
    classified.with_source(err)
}

/// Convert an error raised while connecting.
pub fn classify_connect(err: Error) -> QueryError {
    let message = err.to_string();
    let classified = classify(err);
    if classified.is_connection_error() {
        classified
    } else {
        QueryError::connection(message)
    }
}

/// Classify a server error by its MySQL error number.
///
/// `1213` (deadlock) and `1205` (lock wait timeout) are retried by transactions;
/// `2006` and `2013` mean the server went away.
pub fn classify_server(code: u16, message: &str) -> QueryError {
    match code {
        1205 | 1213 => QueryError::deadlock(message),
        1044 | 1045 | 1698 => QueryError::authentication_failed(message),
        1053 | 1927 | 2006 | 2013 => QueryError::connection_lost(message),
        _ if is_lost_connection_message(message) => QueryError::connection_lost(message),
        _ if is_deadlock_message(message) => QueryError::deadlock(message),
        _ => QueryError::database(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_query::ErrorCode;

    #[test]
    fn test_lock_errors_are_deadlocks() {
        assert!(classify_server(1213, "Deadlock found when trying to get lock").is_deadlock());
        assert!(classify_server(1205, "Lock wait timeout exceeded").is_deadlock());
    }

    #[test]
    fn test_gone_away_is_lost() {
        assert!(classify_server(2006, "MySQL server has gone away").is_lost_connection());
        assert!(classify_server(1927, "Connection was killed").is_lost_connection());
    }

    #[test]
    fn test_access_denied() {
        assert_eq!(
            classify_server(1045, "Access denied for user 'app'").code,
            ErrorCode::AuthenticationFailed
        );
    }

    #[test]
    fn test_duplicate_entry_is_database_error() {
        let err = classify_server(1062, "Duplicate entry 'a@x.io' for key 'users_email_unique'");
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn test_io_error_is_lost() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(classify(Error::from(io)).is_lost_connection());
    }
}
