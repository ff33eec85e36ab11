//! SQLite schema grammar.
//!
//! SQLite's `alter table` can add, rename and drop one column at a time and
//! cannot touch constraints. Blueprints needing more are rejected by
//! [`SchemaGrammar::validate`] before any statement is produced.

use super::{SchemaGrammar, delete_action_trigger, foreign_clause};
use crate::column::{ColumnDefinition, ColumnType};
use crate::table::{Command, ForeignKey, IndexDefinition, IndexKind, Table};
use crate::trigger::{Trigger, TriggerAction};
use quarry_query::grammar::{QueryGrammar, SqliteGrammar};
use quarry_query::{CompiledQuery, QueryError, QueryResult, Value};
use tracing::warn;

/// Millisecond timestamp as 12 hex digits followed by 14 random hex digits.
///
/// 26 uppercase hex characters that sort by creation time. They are not
/// Crockford base-32 and do not decode as ULIDs.
const ULID_DEFAULT: &str = "(upper(printf('%012x', cast(strftime('%s', 'now') as integer) * 1000 \
     + cast(substr(strftime('%f', 'now'), 4) as integer))) || hex(randomblob(7)))";

/// Schema grammar for SQLite.
#[derive(Debug, Clone, Default)]
pub struct SqliteSchemaGrammar {
    grammar: SqliteGrammar,
}

impl SqliteSchemaGrammar {
    /// Create a grammar with a table prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            grammar: SqliteGrammar::new(prefix),
        }
    }

    fn unsupported(table: &Table, what: &str) -> QueryError {
        QueryError::unsupported_schema(format!(
            "SQLite cannot {} in a single modification of '{}'",
            what,
            table.name()
        ))
        .with_help("Split the change into several Schema::table() calls")
    }
}

impl SchemaGrammar for SqliteSchemaGrammar {
    fn grammar(&self) -> &dyn QueryGrammar {
        &self.grammar
    }

    fn compile_type(&self, column: &ColumnDefinition) -> QueryResult<String> {
        let sql = match &column.column_type {
            ColumnType::TinyInteger | ColumnType::SmallInteger | ColumnType::Integer | ColumnType::BigInteger => {
                "integer"
            }
            ColumnType::Decimal { .. } => "numeric",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Char(_) | ColumnType::String(_) | ColumnType::Uuid | ColumnType::Enum(_) => "varchar",
            ColumnType::Text | ColumnType::MediumText | ColumnType::LongText | ColumnType::Json => "text",
            ColumnType::Boolean => "tinyint(1)",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::DateTime | ColumnType::Timestamp => "datetime",
            ColumnType::Ulid => "char(26)",
            ColumnType::Binary => "blob",
        };
        Ok(sql.to_string())
    }

    fn compile_column(&self, _table: &Table, column: &ColumnDefinition) -> QueryResult<String> {
        let name = self.grammar.wrap(&column.name);
        let mut sql = format!("{} {}", name, self.compile_type(column)?);

        if column.auto_increment {
            if !column.column_type.is_integer() {
                return Err(QueryError::invalid_schema(format!(
                    "auto-increment column '{}' must be an integer",
                    column.name
                )));
            }
            sql.push_str(" primary key autoincrement");
        } else if column.primary {
            sql.push_str(" primary key");
        }

        if let ColumnType::Enum(allowed) = &column.column_type {
            let values: Vec<String> = allowed.iter().map(|v| super::quote_string(v)).collect();
            sql.push_str(&format!(" check ({} in ({}))", name, values.join(", ")));
        }

        if !column.nullable {
            sql.push_str(" not null");
        }

        if let Some(default) = &column.default {
            sql.push_str(" default ");
            sql.push_str(&self.compile_default(default));
        } else if column.use_current {
            sql.push_str(" default CURRENT_TIMESTAMP");
        } else if column.column_type == ColumnType::Ulid {
            sql.push_str(" default ");
            sql.push_str(ULID_DEFAULT);
        }
        Ok(sql)
    }

    fn validate(&self, table: &Table) -> QueryResult<()> {
        if table.is_creating() {
            return Ok(());
        }

        let mut dropped = 0;
        let mut renamed = 0;
        let mut dropped_foreign = 0;
        for command in table.commands() {
            match command {
                Command::DropColumns(columns) => dropped += columns.len(),
                Command::RenameColumn { .. } => renamed += 1,
                Command::DropForeign(_) => dropped_foreign += 1,
                Command::DropIndex {
                    kind: IndexKind::Primary,
                    ..
                } => return Err(Self::unsupported(table, "drop a primary key")),
                Command::Index(i) => {
                    if table.indexes().get(*i).map(|idx| idx.kind) == Some(IndexKind::Primary) {
                        return Err(Self::unsupported(table, "add a primary key"));
                    }
                }
                _ => {}
            }
        }

        let changed = table.columns().iter().filter(|c| c.change).count();
        if changed > 1 {
            return Err(Self::unsupported(table, "change more than one column"));
        }
        if changed == 1 {
            return Err(QueryError::unsupported_schema(format!(
                "SQLite cannot modify existing columns of '{}'",
                table.name()
            ))
            .with_help("Add a new column, copy the data, then drop the old column"));
        }
        if dropped > 1 {
            return Err(Self::unsupported(table, "drop more than one column"));
        }
        if renamed > 1 {
            return Err(Self::unsupported(table, "rename more than one column"));
        }
        if dropped_foreign > 1 {
            return Err(Self::unsupported(table, "drop more than one foreign key"));
        }

        for column in table.added_columns() {
            if column.primary || column.auto_increment {
                return Err(Self::unsupported(table, "add a primary key column"));
            }
            if column.column_type == ColumnType::Ulid && column.default.is_none() {
                return Err(QueryError::unsupported_schema(format!(
                    "SQLite cannot add ULID column '{}' to an existing table: generated defaults are not constant",
                    column.name
                )));
            }
        }
        Ok(())
    }

    fn compile_create(&self, table: &Table) -> QueryResult<Vec<String>> {
        let mut parts = table
            .added_columns()
            .map(|c| self.compile_column(table, c))
            .collect::<QueryResult<Vec<_>>>()?;

        for index in table.indexes().iter().filter(|i| i.kind == IndexKind::Primary) {
            parts.push(format!("primary key ({})", self.grammar.columnize(&index.columns)));
        }
        for foreign in table.foreign_keys() {
            parts.push(foreign_clause(&self.grammar, foreign)?);
        }

        Ok(vec![format!(
            "create {}table {}{} ({})",
            if table.is_temporary() { "temporary " } else { "" },
            if table.is_if_not_exists() { "if not exists " } else { "" },
            self.wrap_table(table),
            parts.join(", ")
        )])
    }

    fn compile_add(&self, table: &Table, column: &ColumnDefinition) -> QueryResult<Vec<String>> {
        Ok(vec![format!(
            "alter table {} add column {}",
            self.wrap_table(table),
            self.compile_column(table, column)?
        )])
    }

    fn compile_change(&self, table: &Table, column: &ColumnDefinition) -> QueryResult<Vec<String>> {
        Err(QueryError::unsupported_schema(format!(
            "SQLite cannot modify column '{}' of '{}'",
            column.name,
            table.name()
        )))
    }

    fn compile_drop_columns(&self, table: &Table, columns: &[String]) -> QueryResult<Vec<String>> {
        Ok(columns
            .iter()
            .map(|c| format!("alter table {} drop column {}", self.wrap_table(table), self.grammar.wrap(c)))
            .collect())
    }

    fn compile_index(&self, table: &Table, index: &IndexDefinition) -> QueryResult<Vec<String>> {
        let unique = match index.kind {
            IndexKind::Primary => return Err(Self::unsupported(table, "add a primary key")),
            IndexKind::Unique => "unique ",
            IndexKind::Index => "",
        };
        Ok(vec![format!(
            "create {}index {}{} on {} ({})",
            unique,
            if table.is_if_not_exists() { "if not exists " } else { "" },
            self.grammar.wrap_segment(&index.name),
            self.wrap_table(table),
            self.grammar.columnize(&index.columns)
        )])
    }

    fn compile_drop_index(&self, table: &Table, kind: IndexKind, name: &str) -> QueryResult<Vec<String>> {
        if kind == IndexKind::Primary {
            return Err(Self::unsupported(table, "drop a primary key"));
        }
        Ok(vec![format!("drop index {}", self.grammar.wrap_segment(name))])
    }

    fn compile_foreign(&self, table: &Table, foreign: &ForeignKey) -> QueryResult<Vec<String>> {
        if table.is_creating() {
            // Declared inline by compile_create.
            return Ok(Vec::new());
        }
        match delete_action_trigger(&self.grammar, table, foreign)? {
            Some(trigger) => self.compile_trigger(&trigger),
            None => {
                warn!(
                    table = table.name(),
                    foreign_key = %foreign.name,
                    "SQLite cannot add foreign keys to existing tables; constraint not enforced"
                );
                Ok(Vec::new())
            }
        }
    }

    fn compile_drop_foreign(&self, _table: &Table, name: &str) -> QueryResult<Vec<String>> {
        // Only keys added through alter exist separately, as delete-action triggers.
        Ok(vec![format!(
            "drop trigger if exists {}",
            self.grammar.wrap_segment(&format!("{}_on_delete", name))
        )])
    }

    fn compile_foreign_exists(&self, _table: &Table, name: &str) -> Option<CompiledQuery> {
        Some(CompiledQuery {
            sql: "select count(*) as \"aggregate\" from sqlite_master where type = 'trigger' and name = ?".into(),
            bindings: vec![Value::String(format!("{}_on_delete", name))],
        })
    }

    fn compile_trigger(&self, trigger: &Trigger) -> QueryResult<Vec<String>> {
        trigger.validate(self.dialect())?;
        let statements = match &trigger.action {
            TriggerAction::Statements(statements) => statements,
            TriggerAction::Function(_) => return Ok(Vec::new()),
        };

        let mut sql = format!(
            "create trigger {}{} {} {} on {} for each row",
            if trigger.if_not_exists { "if not exists " } else { "" },
            self.grammar.wrap_segment(&trigger.name),
            trigger.timing.to_sql(),
            trigger.event.to_sql(),
            self.grammar.wrap_table(&trigger.table)
        );
        if let Some(condition) = &trigger.condition {
            sql.push_str(" when ");
            sql.push_str(condition);
        }
        sql.push_str(" begin ");
        for statement in statements {
            sql.push_str(statement);
            sql.push_str("; ");
        }
        sql.push_str("end");
        Ok(vec![sql])
    }

    fn compile_table_exists(&self, table: &str) -> CompiledQuery {
        CompiledQuery {
            sql: "select count(*) as \"aggregate\" from sqlite_master where type = 'table' and name = ?".into(),
            bindings: vec![Value::String(format!("{}{}", self.grammar.table_prefix(), table))],
        }
    }

    fn compile_column_listing(&self, table: &str) -> CompiledQuery {
        CompiledQuery {
            sql: "select \"name\" from pragma_table_info(?) order by \"cid\"".into(),
            bindings: vec![Value::String(format!("{}{}", self.grammar.table_prefix(), table))],
        }
    }

    fn compile_enable_foreign_keys(&self) -> &'static str {
        "PRAGMA foreign_keys = ON"
    }

    fn compile_disable_foreign_keys(&self) -> &'static str {
        "PRAGMA foreign_keys = OFF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ReferentialAction;
    use pretty_assertions::assert_eq;
    use quarry_query::ErrorCode;

    fn compile(table: &Table) -> Vec<String> {
        SqliteSchemaGrammar::new("").compile(table).unwrap()
    }

    #[test]
    fn test_create_table() {
        let mut table = Table::create("users");
        table.id();
        table.string("email", 255).unique();
        table.boolean("active").default(true);
        table.enumeration("role", &["admin", "member"]);
        table.timestamp("created_at").use_current();

        assert_eq!(
            compile(&table),
            vec![
                r#"create table "users" ("id" integer primary key autoincrement not null, "email" varchar not null, "active" tinyint(1) not null default 1, "role" varchar check ("role" in ('admin', 'member')) not null, "created_at" datetime not null default CURRENT_TIMESTAMP)"#,
                r#"create unique index "users_email_unique" on "users" ("email")"#,
            ]
        );
    }

    #[test]
    fn test_create_if_not_exists_is_idempotent_sql() {
        let mut table = Table::create_if_not_exists("tags");
        table.increments("id");
        table.string("slug", 64).index();

        assert_eq!(
            compile(&table),
            vec![
                r#"create table if not exists "tags" ("id" integer primary key autoincrement not null, "slug" varchar not null)"#,
                r#"create index if not exists "tags_slug_index" on "tags" ("slug")"#,
            ]
        );
    }

    #[test]
    fn test_ulid_uses_default_expression() {
        let mut table = Table::create("events");
        table.ulid("id").primary();
        let sql = &compile(&table)[0];
        assert!(sql.starts_with(r#"create table "events" ("id" char(26) primary key not null default (upper(printf("#));
        assert!(sql.contains("hex(randomblob(7))"));
    }

    #[test]
    fn test_rejects_two_dropped_columns() {
        let mut table = Table::alter("users");
        table.drop_column("a");
        table.drop_column("b");
        let err = SqliteSchemaGrammar::new("").compile(&table).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedSchemaOperation);

        let mut table = Table::alter("users");
        table.drop_columns(&["a", "b"]);
        assert!(SqliteSchemaGrammar::new("").compile(&table).is_err());
    }

    #[test]
    fn test_rejects_alter_limits() {
        let grammar = SqliteSchemaGrammar::new("");

        let mut renames = Table::alter("users");
        renames.rename_column("a", "b").rename_column("c", "d");
        assert!(grammar.compile(&renames).is_err());

        let mut changes = Table::alter("users");
        changes.string("name", 100).change();
        assert_eq!(
            grammar.compile(&changes).unwrap_err().code,
            ErrorCode::UnsupportedSchemaOperation
        );

        let mut foreign = Table::alter("users");
        foreign.drop_foreign("a_foreign").drop_foreign("b_foreign");
        assert!(grammar.compile(&foreign).is_err());

        let mut primary = Table::alter("users");
        primary.drop_primary();
        assert!(grammar.compile(&primary).is_err());

        let mut ulid = Table::alter("users");
        ulid.ulid("public_id");
        assert!(grammar.compile(&ulid).is_err());
    }

    #[test]
    fn test_single_alter_operations_pass() {
        let mut table = Table::alter("users");
        table.drop_column("legacy");
        table.rename_column("name", "full_name");
        assert_eq!(
            compile(&table),
            vec![
                r#"alter table "users" drop column "legacy""#,
                r#"alter table "users" rename column "name" to "full_name""#,
            ]
        );
    }

    #[test]
    fn test_foreign_keys_inline_on_create() {
        let mut table = Table::create("posts");
        table.id();
        table.foreign_id("user_id");
        table.foreign(&["user_id"]).on("users").cascade_on_delete();

        let sql = compile(&table);
        assert_eq!(sql.len(), 1);
        assert!(sql[0].ends_with(
            r#"constraint "posts_user_id_foreign" foreign key ("user_id") references "users" ("id") on delete cascade)"#
        ));
    }

    #[test]
    fn test_foreign_key_on_alter_becomes_trigger() {
        let mut table = Table::alter("posts");
        table.foreign(&["user_id"]).on("users").cascade_on_delete();

        assert_eq!(
            compile(&table),
            vec![
                r#"create trigger "posts_user_id_foreign_on_delete" after delete on "users" for each row begin delete from "posts" where "user_id" = old."id"; end"#
            ]
        );

        let mut restrict = Table::alter("posts");
        restrict.foreign(&["user_id"]).on("users").on_delete(ReferentialAction::Restrict);
        let sql = compile(&restrict);
        assert!(sql[0].contains("before delete on \"users\""));
        assert!(sql[0].contains("select raise(abort, 'cannot delete from users: rows in posts reference it')"));

        let mut drop = Table::alter("posts");
        drop.drop_foreign("posts_user_id_foreign");
        assert_eq!(
            compile(&drop),
            vec![r#"drop trigger if exists "posts_user_id_foreign_on_delete""#]
        );
    }

    #[test]
    fn test_foreign_exists_looks_for_delete_trigger() {
        let table = Table::alter("posts");
        let query = SqliteSchemaGrammar::new("")
            .compile_foreign_exists(&table, "posts_user_id_foreign")
            .unwrap();
        assert!(query.sql.contains("type = 'trigger'"));
        assert_eq!(query.bindings, vec![Value::String("posts_user_id_foreign_on_delete".into())]);
    }

    #[test]
    fn test_trigger_with_condition() {
        let mut table = Table::alter("users");
        table
            .trigger("users_touch")
            .after(crate::TriggerEvent::Update)
            .when("new.email <> old.email")
            .statement("update users set verified_at = null where id = new.id");

        assert_eq!(
            compile(&table),
            vec![
                r#"create trigger "users_touch" after update on "users" for each row when new.email <> old.email begin update users set verified_at = null where id = new.id; end"#
            ]
        );
    }

    #[test]
    fn test_prefix_and_introspection() {
        let grammar = SqliteSchemaGrammar::new("app_");
        let mut table = Table::create("users").with_prefix("app_");
        table.increments("id");
        table.string("email", 100).unique();
        assert_eq!(
            grammar.compile(&table).unwrap()[1],
            r#"create unique index "app_users_email_unique" on "app_users" ("email")"#
        );

        let exists = grammar.compile_table_exists("users");
        assert_eq!(exists.bindings, vec![Value::String("app_users".into())]);

        let mut rename = Table::alter("users");
        rename.rename("members");
        assert_eq!(
            grammar.compile(&rename).unwrap(),
            vec![r#"alter table "app_users" rename to "app_members""#]
        );
    }
}
