//! Message-based error classification shared by the drivers.
//!
//! Drivers check structured codes first (SQLSTATE, MySQL error numbers, SQLite
//! result codes) and fall back to these message lists for errors that only carry
//! text, such as I/O failures wrapped by the client library.

const LOST_CONNECTION_MESSAGES: &[&str] = &[
    "server has gone away",
    "no connection to the server",
    "lost connection",
    "is dead or not enabled",
    "error while sending",
    "decryption failed or bad record mac",
    "server closed the connection unexpectedly",
    "ssl connection has been closed unexpectedly",
    "error writing data to the connection",
    "resource deadlock avoided",
    "transaction() on null",
    "child connection forced to terminate due to client_idle_limit",
    "query_wait_timeout",
    "reset by peer",
    "physical connection is not usable",
    "connection refused",
    "broken pipe",
    "connection closed",
    "connection is closed",
    "connection timed out",
    "the connection is broken",
];

const DEADLOCK_MESSAGES: &[&str] = &[
    "deadlock found when trying to get lock",
    "deadlock detected",
    "the database file is locked",
    "database is locked",
    "database table is locked",
    "a table in the database is locked",
    "has been chosen as the deadlock victim",
    "lock wait timeout exceeded; try restarting transaction",
    "could not serialize access due to concurrent update",
    "could not serialize access due to read/write dependencies",
];

/// Whether an error message describes a dropped connection.
pub fn is_lost_connection_message(message: &str) -> bool {
    let message = message.to_lowercase();
    LOST_CONNECTION_MESSAGES.iter().any(|m| message.contains(m))
}

/// Whether an error message describes a deadlock or lock timeout.
pub fn is_deadlock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    DEADLOCK_MESSAGES.iter().any(|m| message.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lost_connection_messages() {
        assert!(is_lost_connection_message("SQLSTATE[HY000]: General error: 2006 MySQL server has gone away"));
        assert!(is_lost_connection_message("Connection reset by peer (os error 104)"));
        assert!(!is_lost_connection_message("syntax error at or near \"selec\""));
    }

    #[test]
    fn test_deadlock_messages() {
        assert!(is_deadlock_message("Deadlock found when trying to get lock; try restarting transaction"));
        assert!(is_deadlock_message("database is locked"));
        assert!(!is_deadlock_message("unique constraint failed"));
    }
}
