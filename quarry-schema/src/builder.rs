//! The schema builder.
//!
//! [`Schema`] borrows a [`Connection`], builds [`Table`] blueprints through
//! closures and runs the compiled DDL. Every blueprint is compiled in full before
//! its first statement is sent, so a blueprint the dialect rejects leaves the
//! database untouched.
//!
//! ```rust,ignore
//! let mut schema = Schema::new(&mut conn);
//! schema.create("users", |table| {
//!     table.id();
//!     table.string("email", 255).unique();
//!     table.timestamps();
//! })?;
//! assert!(schema.has_column("users", "email")?);
//! ```

use crate::grammar::{SchemaGrammar, schema_grammar_for};
use crate::table::{Command, Table};
use quarry_query::{Connection, QueryError, QueryResult};
use tracing::{debug, info};

/// Schema operations against one connection.
pub struct Schema<'c> {
    connection: &'c mut Connection,
    grammar: Box<dyn SchemaGrammar>,
}

impl std::fmt::Debug for Schema<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("connection", &self.connection.name())
            .field("grammar", &self.grammar)
            .finish()
    }
}

impl<'c> Schema<'c> {
    /// Create a schema builder using the connection's dialect.
    pub fn new(connection: &'c mut Connection) -> Self {
        let grammar = schema_grammar_for(connection.config());
        Self { connection, grammar }
    }

    /// Schema grammar in use.
    pub fn grammar(&self) -> &dyn SchemaGrammar {
        self.grammar.as_ref()
    }

    /// Underlying connection.
    pub fn connection(&mut self) -> &mut Connection {
        self.connection
    }

    fn blueprint(&self, table: Table) -> Table {
        table.with_prefix(self.connection.table_prefix())
    }

    /// Create a table.
    pub fn create<F>(&mut self, table: &str, define: F) -> QueryResult<()>
    where
        F: FnOnce(&mut Table),
    {
        let mut blueprint = self.blueprint(Table::create(table));
        define(&mut blueprint);
        self.build(&blueprint)
    }

    /// Create a table unless it exists.
    pub fn create_if_not_exists<F>(&mut self, table: &str, define: F) -> QueryResult<()>
    where
        F: FnOnce(&mut Table),
    {
        let mut blueprint = self.blueprint(Table::create_if_not_exists(table));
        define(&mut blueprint);
        self.build(&blueprint)
    }

    /// Modify an existing table.
    pub fn table<F>(&mut self, table: &str, define: F) -> QueryResult<()>
    where
        F: FnOnce(&mut Table),
    {
        let mut blueprint = self.blueprint(Table::alter(table));
        define(&mut blueprint);
        self.build(&blueprint)
    }

    /// Drop a table.
    pub fn drop(&mut self, table: &str) -> QueryResult<()> {
        let mut blueprint = self.blueprint(Table::alter(table));
        blueprint.drop();
        self.build(&blueprint)
    }

    /// Drop a table if it exists.
    pub fn drop_if_exists(&mut self, table: &str) -> QueryResult<()> {
        let mut blueprint = self.blueprint(Table::alter(table));
        blueprint.drop_if_exists();
        self.build(&blueprint)
    }

    /// Rename a table.
    pub fn rename(&mut self, from: &str, to: &str) -> QueryResult<()> {
        let mut blueprint = self.blueprint(Table::alter(from));
        blueprint.rename(to);
        self.build(&blueprint)
    }

    /// Compile a blueprint without running it.
    pub fn to_sql(&self, table: &Table) -> QueryResult<Vec<String>> {
        self.grammar.compile(table)
    }

    /// Compile and run a blueprint.
    pub fn build(&mut self, table: &Table) -> QueryResult<()> {
        let statements = self.grammar.compile(table)?;
        debug!(table = table.name(), statements = statements.len(), "Compiled blueprint");
        self.check_dropped_foreign_keys(table)?;
        for sql in &statements {
            self.connection.unprepared(sql)?;
        }
        if table.is_creating() {
            info!(connection = self.connection.name(), table = table.name(), "Created table");
        }
        Ok(())
    }

    /// Reject foreign key drops that would leave the constraint in place.
    fn check_dropped_foreign_keys(&mut self, table: &Table) -> QueryResult<()> {
        if table.is_creating() || self.connection.pretending() {
            return Ok(());
        }
        for command in table.commands() {
            let Command::DropForeign(name) = command else {
                continue;
            };
            let Some(query) = self.grammar.compile_foreign_exists(table, name) else {
                continue;
            };
            let rows = self.connection.select_compiled(&query)?;
            let found = match rows.first() {
                Some(row) => row.get_i64("aggregate")? > 0,
                None => false,
            };
            if !found {
                return Err(QueryError::unsupported_schema(format!(
                    "{} cannot drop foreign key '{}' of '{}': it is part of the table definition",
                    self.grammar.dialect(),
                    name,
                    table.name()
                ))
                .with_help("Rebuild the table without the constraint and copy the rows across"));
            }
        }
        Ok(())
    }

    /// Whether a table exists.
    pub fn has_table(&mut self, table: &str) -> QueryResult<bool> {
        let query = self.grammar.compile_table_exists(table);
        let rows = self.connection.select_compiled(&query)?;
        match rows.first() {
            Some(row) => Ok(row.get_i64("aggregate")? > 0),
            None => Ok(false),
        }
    }

    /// Whether a table has a column, compared case-insensitively.
    pub fn has_column(&mut self, table: &str, column: &str) -> QueryResult<bool> {
        Ok(self
            .get_column_listing(table)?
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column)))
    }

    /// Whether a table has every listed column.
    pub fn has_columns(&mut self, table: &str, columns: &[&str]) -> QueryResult<bool> {
        let listing = self.get_column_listing(table)?;
        Ok(columns
            .iter()
            .all(|wanted| listing.iter().any(|c| c.eq_ignore_ascii_case(wanted))))
    }

    /// Column names of a table, in ordinal order.
    pub fn get_column_listing(&mut self, table: &str) -> QueryResult<Vec<String>> {
        let query = self.grammar.compile_column_listing(table);
        let rows = self.connection.select_compiled(&query)?;
        rows.iter()
            .map(|row| row.get_str("name").map(str::to_string))
            .collect()
    }

    /// Turn foreign key enforcement on.
    pub fn enable_foreign_key_constraints(&mut self) -> QueryResult<()> {
        let sql = self.grammar.compile_enable_foreign_keys();
        self.connection.unprepared(sql)
    }

    /// Turn foreign key enforcement off.
    pub fn disable_foreign_key_constraints(&mut self) -> QueryResult<()> {
        let sql = self.grammar.compile_disable_foreign_keys();
        self.connection.unprepared(sql)
    }

    /// Run `work` with foreign key enforcement off, turning it back on afterwards.
    pub fn without_foreign_key_constraints<T, F>(&mut self, work: F) -> QueryResult<T>
    where
        F: FnOnce(&mut Self) -> QueryResult<T>,
    {
        self.disable_foreign_key_constraints()?;
        let result = work(self);
        let enabled = self.enable_foreign_key_constraints();
        let value = result?;
        enabled?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quarry_query::testing::{RecordingDriver, ScriptedFailure};
    use quarry_query::{Dialect, ErrorCode, Row, Value};

    #[test]
    fn test_create_runs_every_statement() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Postgres);
        let mut schema = Schema::new(&mut conn);

        schema
            .create("users", |table| {
                table.id();
                table.string("email", 255).unique();
            })
            .unwrap();

        assert_eq!(
            driver.statements(),
            vec![
                r#"create table "users" ("id" bigserial primary key not null, "email" varchar(255) not null)"#,
                r#"create unique index "users_email_unique" on "users" ("email")"#,
            ]
        );
    }

    #[test]
    fn test_rejected_blueprint_sends_nothing() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        let mut schema = Schema::new(&mut conn);

        let err = schema
            .table("users", |table| {
                table.string("nickname", 20).nullable();
                table.drop_column("a");
                table.drop_column("b");
            })
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::UnsupportedSchemaOperation);
        assert!(driver.statements().is_empty());
    }

    #[test]
    fn test_has_table_and_columns() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);

        let mut count = Row::new();
        count.push("aggregate", Value::Int(1));
        driver.push_rows(vec![count]);
        let listing = ["id", "Email"]
            .iter()
            .map(|name| {
                let mut row = Row::new();
                row.push("name", Value::from(*name));
                row
            })
            .collect();
        driver.push_rows(listing);

        let mut schema = Schema::new(&mut conn);
        assert!(schema.has_table("users").unwrap());
        assert!(schema.has_column("users", "email").unwrap());
        assert_eq!(
            driver.statements()[0],
            "select count(*) as \"aggregate\" from sqlite_master where type = 'table' and name = ?"
        );
    }

    #[test]
    fn test_prefix_flows_into_blueprints() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::MySql);
        let mut config = conn.config().clone();
        config.prefix = "app_".into();
        let mut conn = quarry_query::Connection::from_driver("test", config, Box::new(driver.clone()));

        Schema::new(&mut conn).rename("users", "members").unwrap();
        assert_eq!(driver.statements(), vec!["rename table `app_users` to `app_members`"]);
    }

    #[test]
    fn test_work_error_wins_over_reenable_failure() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        driver.fail_next("foreign_keys = ON", ScriptedFailure::Database("database is locked".into()));

        let err = Schema::new(&mut conn)
            .without_foreign_key_constraints(|_| -> QueryResult<()> { Err(QueryError::incomplete("work failed")) })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IncompleteQuery);
        assert_eq!(
            driver.statements(),
            vec!["PRAGMA foreign_keys = OFF"]
        );
    }

    #[test]
    fn test_reenable_failure_reported_after_successful_work() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);
        driver.fail_next("foreign_keys = ON", ScriptedFailure::Database("database is locked".into()));

        let err = Schema::new(&mut conn)
            .without_foreign_key_constraints(|_| Ok(()))
            .unwrap_err();
        assert!(err.message.contains("database is locked"));
    }

    #[test]
    fn test_pretend_captures_ddl() {
        let driver = RecordingDriver::new();
        let mut conn = driver.connection(Dialect::Sqlite);

        let log = conn
            .pretend(|conn| {
                Schema::new(conn).drop_if_exists("sessions")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sql, r#"drop table if exists "sessions""#);
        assert!(driver.statements().is_empty());
    }
}
