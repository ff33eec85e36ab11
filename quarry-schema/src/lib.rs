//! # quarry-schema
//!
//! Table blueprints and dialect DDL for Quarry.
//!
//! - [`Table`] records columns, indexes, foreign keys and triggers in declaration order
//! - [`SchemaGrammar`] compiles a blueprint to one or more statements per dialect
//! - [`Schema`] runs blueprints against a [`quarry_query::Connection`]
//!
//! ```rust
//! use quarry_schema::grammar::{MySqlSchemaGrammar, SchemaGrammar, SqliteSchemaGrammar};
//! use quarry_schema::Table;
//!
//! let mut table = Table::create("users");
//! table.id();
//! table.string("email", 255).unique();
//!
//! let sqlite = SqliteSchemaGrammar::new("").compile(&table).unwrap();
//! assert_eq!(sqlite.len(), 2);
//!
//! let mysql = MySqlSchemaGrammar::new("").compile(&table).unwrap();
//! assert_eq!(mysql.len(), 1);
//! assert!(mysql[0].contains("unique key `users_email_unique` (`email`)"));
//! ```

pub mod builder;
pub mod column;
pub mod grammar;
pub mod table;
pub mod trigger;

pub use builder::Schema;
pub use column::{ColumnDefault, ColumnDefinition, ColumnType};
pub use grammar::{SchemaGrammar, schema_grammar_for};
pub use table::{Command, ForeignKey, IndexDefinition, IndexKind, ReferentialAction, Table};
pub use trigger::{Trigger, TriggerAction, TriggerEvent, TriggerTiming};
