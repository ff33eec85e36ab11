//! Dialect schema grammars.
//!
//! A [`SchemaGrammar`] turns a [`Table`] blueprint into DDL. One blueprint can
//! produce several statements: the table statement itself, secondary indexes,
//! column comments and the triggers a dialect needs to fill gaps in its DDL.
//!
//! | Concern                  | MySQL                      | PostgreSQL                  | SQLite                        |
//! |--------------------------|----------------------------|-----------------------------|-------------------------------|
//! | Secondary indexes        | inline on create           | `create index`              | `create index`                |
//! | ULID default             | `before insert` trigger    | plpgsql function + trigger  | `default (...)` expression    |
//! | Delete-action emulation  | MyISAM tables              | never                       | foreign keys added by `alter` |
//! | Transactional DDL        | no                         | yes                         | yes                           |

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlSchemaGrammar;
pub use postgres::PostgresSchemaGrammar;
pub use sqlite::SqliteSchemaGrammar;

use crate::column::{ColumnDefault, ColumnDefinition, ColumnType};
use crate::table::{Command, ForeignKey, IndexDefinition, IndexKind, ReferentialAction, Table};
use crate::trigger::{Trigger, TriggerEvent};
use quarry_query::grammar::QueryGrammar;
use quarry_query::{CompiledQuery, ConnectionConfig, Dialect, QueryError, QueryResult, Value};
use std::fmt::Debug;

/// Build the schema grammar for a connection configuration.
pub fn schema_grammar_for(config: &ConnectionConfig) -> Box<dyn SchemaGrammar> {
    match config.dialect {
        Dialect::MySql => Box::new(MySqlSchemaGrammar::from_config(config)),
        Dialect::Postgres => Box::new(PostgresSchemaGrammar::from_config(config)),
        Dialect::Sqlite => Box::new(SqliteSchemaGrammar::new(config.prefix.clone())),
    }
}

/// Compiles table blueprints to DDL for one dialect.
pub trait SchemaGrammar: Send + Sync + Debug {
    /// Query grammar used for identifier quoting and placeholders.
    fn grammar(&self) -> &dyn QueryGrammar;

    /// Dialect.
    fn dialect(&self) -> Dialect {
        self.grammar().dialect()
    }

    /// Whether DDL participates in transactions.
    fn supports_schema_transactions(&self) -> bool {
        true
    }

    /// Whether secondary indexes are declared inside `create table`.
    fn inline_indexes_on_create(&self) -> bool {
        false
    }

    /// Concrete column type.
    fn compile_type(&self, column: &ColumnDefinition) -> QueryResult<String>;

    /// Full column definition: name, type and modifiers.
    fn compile_column(&self, table: &Table, column: &ColumnDefinition) -> QueryResult<String>;

    /// Reject blueprints the dialect cannot execute.
    fn validate(&self, _table: &Table) -> QueryResult<()> {
        Ok(())
    }

    /// Compile a blueprint, replaying its commands in declaration order.
    fn compile(&self, table: &Table) -> QueryResult<Vec<String>> {
        if table.is_creating() && table.columns().iter().any(|c| c.change) {
            return Err(QueryError::invalid_schema(format!(
                "cannot change columns of '{}' while creating it",
                table.name()
            )));
        }
        self.validate(table)?;

        let mut statements = Vec::new();
        for command in table.commands() {
            statements.extend(self.compile_command(table, command)?);
        }
        Ok(statements)
    }

    /// Compile one command.
    fn compile_command(&self, table: &Table, command: &Command) -> QueryResult<Vec<String>> {
        match command {
            Command::Create => self.compile_create(table),
            Command::Column(i) => {
                let column = lookup(table.columns(), *i, "column")?;
                let mut statements = if table.is_creating() {
                    Vec::new()
                } else if column.change {
                    self.compile_change(table, column)?
                } else {
                    self.compile_add(table, column)?
                };
                statements.extend(self.compile_column_extras(table, column)?);
                Ok(statements)
            }
            Command::DropColumns(columns) => self.compile_drop_columns(table, columns),
            Command::RenameColumn { from, to } => self.compile_rename_column(table, from, to),
            Command::Index(i) => {
                let index = lookup(table.indexes(), *i, "index")?;
                let inline = index.kind == IndexKind::Primary || self.inline_indexes_on_create();
                if table.is_creating() && inline {
                    Ok(Vec::new())
                } else {
                    self.compile_index(table, index)
                }
            }
            Command::DropIndex { kind, name } => self.compile_drop_index(table, *kind, name),
            Command::Foreign(i) => {
                let foreign = lookup(table.foreign_keys(), *i, "foreign key")?;
                self.compile_foreign(table, foreign)
            }
            Command::DropForeign(name) => self.compile_drop_foreign(table, name),
            Command::Trigger(i) => {
                let trigger = lookup(table.triggers(), *i, "trigger")?;
                self.compile_trigger(trigger)
            }
            Command::Rename(to) => self.compile_rename(table, to),
            Command::Drop => Ok(vec![format!("drop table {}", self.wrap_table(table))]),
            Command::DropIfExists => Ok(vec![format!("drop table if exists {}", self.wrap_table(table))]),
        }
    }

    /// `create table` statement.
    fn compile_create(&self, table: &Table) -> QueryResult<Vec<String>>;

    /// Add a column to an existing table.
    fn compile_add(&self, table: &Table, column: &ColumnDefinition) -> QueryResult<Vec<String>>;

    /// Modify an existing column.
    fn compile_change(&self, table: &Table, column: &ColumnDefinition) -> QueryResult<Vec<String>>;

    /// Statements following a column: implied indexes, ULID generation, comments.
    fn compile_column_extras(&self, table: &Table, column: &ColumnDefinition) -> QueryResult<Vec<String>> {
        let mut statements = Vec::new();
        if !(table.is_creating() && self.inline_indexes_on_create()) {
            if column.unique {
                statements.extend(self.compile_index(table, &table.implied_index(column, IndexKind::Unique))?);
            }
            if column.index {
                statements.extend(self.compile_index(table, &table.implied_index(column, IndexKind::Index))?);
            }
        }
        if column.column_type == ColumnType::Ulid && !column.change {
            statements.extend(self.compile_ulid(table, column)?);
        }
        if let Some(comment) = &column.comment {
            statements.extend(self.compile_comment(table, column, comment));
        }
        Ok(statements)
    }

    /// Statements generating ULIDs for a column.
    fn compile_ulid(&self, _table: &Table, _column: &ColumnDefinition) -> QueryResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// Statements attaching a comment to a column, for dialects without inline comments.
    fn compile_comment(&self, _table: &Table, _column: &ColumnDefinition, _comment: &str) -> Vec<String> {
        Vec::new()
    }

    /// Drop columns.
    fn compile_drop_columns(&self, table: &Table, columns: &[String]) -> QueryResult<Vec<String>>;

    /// Rename a column.
    fn compile_rename_column(&self, table: &Table, from: &str, to: &str) -> QueryResult<Vec<String>> {
        Ok(vec![format!(
            "alter table {} rename column {} to {}",
            self.wrap_table(table),
            self.grammar().wrap(from),
            self.grammar().wrap(to)
        )])
    }

    /// Add an index or key.
    fn compile_index(&self, table: &Table, index: &IndexDefinition) -> QueryResult<Vec<String>>;

    /// Drop an index or key.
    fn compile_drop_index(&self, table: &Table, kind: IndexKind, name: &str) -> QueryResult<Vec<String>>;

    /// Add a foreign key, or the triggers emulating it.
    fn compile_foreign(&self, table: &Table, foreign: &ForeignKey) -> QueryResult<Vec<String>>;

    /// Drop a foreign key.
    fn compile_drop_foreign(&self, table: &Table, name: &str) -> QueryResult<Vec<String>>;

    /// Query counting, into `aggregate`, the objects a foreign key drop would
    /// remove. `None` when the dialect drops the constraint itself.
    fn compile_foreign_exists(&self, _table: &Table, _name: &str) -> Option<CompiledQuery> {
        None
    }

    /// Create a trigger.
    fn compile_trigger(&self, trigger: &Trigger) -> QueryResult<Vec<String>>;

    /// Rename the table.
    fn compile_rename(&self, table: &Table, to: &str) -> QueryResult<Vec<String>> {
        Ok(vec![format!(
            "alter table {} rename to {}",
            self.wrap_table(table),
            self.grammar().wrap_table(to)
        )])
    }

    /// Query counting tables named `table` (unprefixed) into an `aggregate` column.
    fn compile_table_exists(&self, table: &str) -> CompiledQuery;

    /// Query listing the columns of `table` (unprefixed) as `name`.
    fn compile_column_listing(&self, table: &str) -> CompiledQuery;

    /// Statement enabling foreign key enforcement.
    fn compile_enable_foreign_keys(&self) -> &'static str;

    /// Statement disabling foreign key enforcement.
    fn compile_disable_foreign_keys(&self) -> &'static str;

    /// Render a literal for a `default` clause.
    fn compile_literal(&self, value: &Value) -> String {
        literal(value, false)
    }

    /// Render a column default.
    fn compile_default(&self, default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::Value(value) => self.compile_literal(value),
            ColumnDefault::Expression(expression) => expression.clone(),
        }
    }

    /// Wrapped, prefixed table name.
    fn wrap_table(&self, table: &Table) -> String {
        self.grammar().wrap_table(table.name())
    }
}

fn lookup<'a, T>(items: &'a [T], index: usize, what: &str) -> QueryResult<&'a T> {
    items
        .get(index)
        .ok_or_else(|| QueryError::internal(format!("blueprint refers to missing {} #{}", what, index)))
}

/// Quote a string literal.
pub(crate) fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render a value as a SQL literal. `native_bool` emits `true`/`false` instead of `1`/`0`.
pub(crate) fn literal(value: &Value, native_bool: bool) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) if native_bool => b.to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => quote_string(s),
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            format!("x'{}'", hex)
        }
        Value::Json(json) => quote_string(&json.to_string()),
        Value::DateTime(dt) => quote_string(&dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::Date(d) => quote_string(&d.to_string()),
        Value::Time(t) => quote_string(&t.to_string()),
        Value::Uuid(u) => quote_string(&u.to_string()),
    }
}

/// `foreign key (...) references ... (...)` with its referential actions.
pub(crate) fn foreign_clause(grammar: &dyn QueryGrammar, foreign: &ForeignKey) -> QueryResult<String> {
    if foreign.on.is_empty() {
        return Err(QueryError::invalid_schema(format!(
            "foreign key '{}' does not name the referenced table",
            foreign.name
        ))
        .with_help("Call .on(\"table\") on the foreign key"));
    }
    if foreign.columns.len() != foreign.references.len() {
        return Err(QueryError::invalid_schema(format!(
            "foreign key '{}' has {} column(s) but references {}",
            foreign.name,
            foreign.columns.len(),
            foreign.references.len()
        )));
    }

    let mut sql = format!(
        "constraint {} foreign key ({}) references {} ({})",
        grammar.wrap_segment(&foreign.name),
        grammar.columnize(&foreign.columns),
        grammar.wrap_table(&foreign.on),
        grammar.columnize(&foreign.references)
    );
    if let Some(action) = foreign.on_delete {
        sql.push_str(" on delete ");
        sql.push_str(action.to_sql());
    }
    if let Some(action) = foreign.on_update {
        sql.push_str(" on update ");
        sql.push_str(action.to_sql());
    }
    Ok(sql)
}

/// Trigger on the referenced table applying a foreign key's delete action to
/// child rows. `None` when the key has no enforceable delete action.
pub(crate) fn delete_action_trigger(
    grammar: &dyn QueryGrammar,
    table: &Table,
    foreign: &ForeignKey,
) -> QueryResult<Option<Trigger>> {
    foreign_clause(grammar, foreign)?;

    let child = grammar.wrap_table(table.name());
    let matches = foreign
        .columns
        .iter()
        .zip(&foreign.references)
        .map(|(column, reference)| format!("{} = old.{}", grammar.wrap(column), grammar.wrap(reference)))
        .collect::<Vec<_>>()
        .join(" and ");

    let mut trigger = Trigger::new(foreign.trigger_name(), foreign.on.clone());
    trigger.if_not_exists = table.is_if_not_exists();

    match foreign.on_delete {
        None | Some(ReferentialAction::NoAction) => return Ok(None),
        Some(ReferentialAction::Cascade) => {
            trigger
                .after(TriggerEvent::Delete)
                .statement(format!("delete from {} where {}", child, matches));
        }
        Some(ReferentialAction::SetNull) => {
            let sets = foreign
                .columns
                .iter()
                .map(|c| format!("{} = null", grammar.wrap(c)))
                .collect::<Vec<_>>()
                .join(", ");
            trigger
                .after(TriggerEvent::Delete)
                .statement(format!("update {} set {} where {}", child, sets, matches));
        }
        Some(ReferentialAction::Restrict) => {
            let guard = format!("exists (select 1 from {} where {})", child, matches);
            let message = quote_string(&format!(
                "cannot delete from {}: rows in {} reference it",
                foreign.on,
                table.name()
            ));
            trigger.before(TriggerEvent::Delete);
            match grammar.dialect() {
                Dialect::Sqlite => {
                    trigger.statement(format!("select raise(abort, {}) where {}", message, guard));
                }
                _ => {
                    trigger
                        .when(guard)
                        .statement(format!("signal sqlstate '45000' set message_text = {}", message));
                }
            }
        }
    }
    Ok(Some(trigger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_literals() {
        assert_eq!(literal(&Value::String("it's".into()), false), "'it''s'");
        assert_eq!(literal(&Value::Bool(true), false), "1");
        assert_eq!(literal(&Value::Bool(true), true), "true");
        assert_eq!(literal(&Value::Bytes(vec![0xde, 0xad]), false), "x'dead'");
        assert_eq!(literal(&Value::Null, false), "null");
    }

    #[test]
    fn test_grammar_selection() {
        let mut config = ConnectionConfig::new(Dialect::MySql);
        assert!(!schema_grammar_for(&config).supports_schema_transactions());
        config.dialect = Dialect::Postgres;
        assert!(schema_grammar_for(&config).supports_schema_transactions());
        config.dialect = Dialect::Sqlite;
        assert_eq!(schema_grammar_for(&config).dialect(), Dialect::Sqlite);
    }

    #[test]
    fn test_foreign_key_needs_target() {
        let grammar = SqliteSchemaGrammar::new("");
        let mut table = Table::create("posts");
        table.foreign(&["user_id"]);
        let err = grammar.compile(&table).unwrap_err();
        assert_eq!(err.code, quarry_query::ErrorCode::InvalidSchema);
    }

    #[test]
    fn test_replay_keeps_order() {
        let grammar = SqliteSchemaGrammar::new("");
        let mut table = Table::alter("users");
        table.string("nickname", 50).nullable();
        table.index(&["nickname"]);
        table.rename_column("name", "full_name");

        assert_eq!(
            grammar.compile(&table).unwrap(),
            vec![
                r#"alter table "users" add column "nickname" varchar"#.to_string(),
                r#"create index "users_nickname_index" on "users" ("nickname")"#.to_string(),
                r#"alter table "users" rename column "name" to "full_name""#.to_string(),
            ]
        );
    }
}
