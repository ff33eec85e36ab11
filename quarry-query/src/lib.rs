//! # quarry-query
//!
//! Query building and execution for Quarry.
//!
//! This crate provides:
//! - [`Value`] and [`Row`], the bound-parameter and result types
//! - Connection configuration from URLs, the environment, builders and TOML
//! - The [`Driver`] and [`Connector`] traits implemented by the dialect crates
//! - Dialect grammars compiling queries to SQL with ordered bindings
//! - A fluent [`Query`] builder
//! - [`Connection`] with query logging, listeners and savepoint-based transactions
//! - [`DatabaseManager`] for named connections
//!
//! ## Values
//!
//! ```rust
//! use quarry_query::Value;
//!
//! let v: Value = 42.into();
//! assert_eq!(v, Value::Int(42));
//!
//! let v: Value = Option::<&str>::None.into();
//! assert!(v.is_null());
//! ```
//!
//! ## Compiling a query
//!
//! Queries compile against any grammar without a live connection:
//!
//! ```rust
//! use quarry_query::{Query, Value};
//! use quarry_query::grammar::{MySqlGrammar, PostgresGrammar};
//!
//! let query = Query::table("users")
//!     .where_op("age", ">", 18)
//!     .where_in("role", ["admin", "owner"])
//!     .order_by_desc("id")
//!     .limit(10);
//!
//! let pg = query.to_sql(&PostgresGrammar::new("")).unwrap();
//! assert_eq!(
//!     pg.sql,
//!     r#"select * from "users" where "age" > $1 and "role" in ($2, $3) order by "id" desc limit 10"#
//! );
//!
//! let mysql = query.to_sql(&MySqlGrammar::new("")).unwrap();
//! assert_eq!(
//!     mysql.sql,
//!     "select * from `users` where `age` > ? and `role` in (?, ?) order by `id` desc limit 10"
//! );
//! assert_eq!(pg.bindings, mysql.bindings);
//! assert_eq!(pg.bindings[0], Value::Int(18));
//! ```
//!
//! ## Transactions
//!
//! ```rust,ignore
//! conn.transaction_with_attempts(3, |conn| {
//!     conn.table("accounts").r#where("id", 1).decrement(conn, "balance", 100)?;
//!     conn.table("accounts").r#where("id", 2).increment(conn, "balance", 100)?;
//!     Ok(())
//! })?;
//! ```

pub mod config;
pub mod connection;
pub mod descriptor;
pub mod detect;
pub mod driver;
pub mod error;
pub mod grammar;
pub mod logging;
pub mod manager;
pub mod query;
pub mod row;
pub mod sql;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{ConfigError, ConnectionConfig, DatabaseSettings, Dialect};
pub use connection::{Connection, ConnectionEvent, LoggedQuery};
pub use descriptor::{Direction, QueryDescriptor};
pub use driver::{Connector, Driver};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult};
pub use grammar::{QueryGrammar, grammar_for};
pub use manager::{ConnectionResolver, DatabaseManager};
pub use query::Query;
pub use row::Row;
pub use sql::{CompiledQuery, PlaceholderStyle, SqlBuilder};
pub use value::Value;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::config::{ConnectionConfig, DatabaseSettings, Dialect};
    pub use crate::connection::Connection;
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::manager::{ConnectionResolver, DatabaseManager};
    pub use crate::query::Query;
    pub use crate::row::Row;
    pub use crate::value::Value;
}
