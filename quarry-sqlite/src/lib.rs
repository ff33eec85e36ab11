//! SQLite driver for Quarry.
//!
//! This crate provides the [`SqliteConnector`] and [`SqliteDriver`] used by
//! [`quarry_query::Connection`] for the embedded dialect, built on `rusqlite`
//! with the bundled SQLite library.
//!
//! # Features
//!
//! - In-memory and file databases
//! - `foreign_keys`, `busy_timeout` and `journal_mode` applied on open
//! - Busy and locked databases reported as deadlocks so transactions retry
//!
//! # Example
//!
//! ```rust
//! use quarry_query::{Connection, ConnectionConfig};
//! use quarry_sqlite::SqliteConnector;
//! use std::sync::Arc;
//!
//! let mut conn = Connection::open("main", ConnectionConfig::sqlite_memory(), Arc::new(SqliteConnector)).unwrap();
//! conn.unprepared("create table notes (body text)").unwrap();
//! conn.table("notes").insert(&mut conn, [("body", "hello")]).unwrap();
//! assert_eq!(conn.table("notes").count(&mut conn).unwrap(), 1);
//! ```

pub mod connector;
pub mod driver;
pub mod error;
pub mod types;

pub use connector::SqliteConnector;
pub use driver::SqliteDriver;
