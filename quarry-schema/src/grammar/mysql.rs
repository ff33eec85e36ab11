//! MySQL and MariaDB schema grammar.

use super::{SchemaGrammar, delete_action_trigger, foreign_clause, quote_string};
use crate::column::{ColumnDefinition, ColumnType};
use crate::table::{Command, ForeignKey, IndexDefinition, IndexKind, Table};
use crate::trigger::{Trigger, TriggerAction, TriggerEvent};
use quarry_query::grammar::{MySqlGrammar, QueryGrammar};
use quarry_query::{CompiledQuery, ConnectionConfig, QueryResult, Value};

/// Ten base-32 digits of milliseconds followed by sixteen random base-32 digits.
///
/// `conv` writes digits from `0-9A-V` rather than the Crockford alphabet, so the
/// values sort by creation time but do not decode as ULIDs.
const ULID_EXPRESSION: &str = "concat(\
     lpad(conv(floor(unix_timestamp(now(3)) * 1000), 10, 32), 10, '0'), \
     lpad(conv(floor(rand() * 1099511627776), 10, 32), 8, '0'), \
     lpad(conv(floor(rand() * 1099511627776), 10, 32), 8, '0'))";

/// Schema grammar for MySQL-family servers.
#[derive(Debug, Clone, Default)]
pub struct MySqlSchemaGrammar {
    grammar: MySqlGrammar,
    engine: Option<String>,
    charset: Option<String>,
    collation: Option<String>,
}

impl MySqlSchemaGrammar {
    /// Create a grammar with a table prefix and server defaults.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            grammar: MySqlGrammar::new(prefix),
            ..Self::default()
        }
    }

    /// Create a grammar from a connection configuration.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            grammar: MySqlGrammar::new(config.prefix.clone()),
            engine: config.mysql.engine.clone(),
            charset: config.charset.clone(),
            collation: config.collation.clone(),
        }
    }

    /// Set the default storage engine.
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    fn engine<'a>(&'a self, table: &'a Table) -> Option<&'a str> {
        table.engine().or(self.engine.as_deref())
    }

    /// MyISAM ignores foreign keys, so their delete actions become triggers.
    fn emulates_foreign_keys(&self, table: &Table) -> bool {
        self.engine(table)
            .map(|e| e.eq_ignore_ascii_case("myisam"))
            .unwrap_or(false)
    }

    fn inline_index(&self, index: &IndexDefinition) -> String {
        let columns = self.grammar.columnize(&index.columns);
        match index.kind {
            IndexKind::Primary => format!("primary key ({})", columns),
            IndexKind::Unique => format!("unique key {} ({})", self.grammar.wrap_segment(&index.name), columns),
            IndexKind::Index => format!("key {} ({})", self.grammar.wrap_segment(&index.name), columns),
        }
    }
}

impl SchemaGrammar for MySqlSchemaGrammar {
    fn grammar(&self) -> &dyn QueryGrammar {
        &self.grammar
    }

    fn supports_schema_transactions(&self) -> bool {
        false
    }

    fn inline_indexes_on_create(&self) -> bool {
        true
    }

    fn compile_type(&self, column: &ColumnDefinition) -> QueryResult<String> {
        let sql = match &column.column_type {
            ColumnType::TinyInteger => "tinyint".to_string(),
            ColumnType::SmallInteger => "smallint".to_string(),
            ColumnType::Integer => "int".to_string(),
            ColumnType::BigInteger => "bigint".to_string(),
            ColumnType::Decimal { precision, scale } => format!("decimal({}, {})", precision, scale),
            ColumnType::Float => "float".to_string(),
            ColumnType::Double => "double".to_string(),
            ColumnType::Char(length) => format!("char({})", length),
            ColumnType::String(length) => format!("varchar({})", length),
            ColumnType::Text => "text".to_string(),
            ColumnType::MediumText => "mediumtext".to_string(),
            ColumnType::LongText => "longtext".to_string(),
            ColumnType::Boolean => "tinyint(1)".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::Time => "time".to_string(),
            ColumnType::DateTime => "datetime".to_string(),
            ColumnType::Timestamp => "timestamp".to_string(),
            ColumnType::Uuid => "char(36)".to_string(),
            ColumnType::Ulid => "char(26)".to_string(),
            ColumnType::Json => "json".to_string(),
            ColumnType::Enum(allowed) => {
                let values: Vec<String> = allowed.iter().map(|v| quote_string(v)).collect();
                format!("enum({})", values.join(", "))
            }
            ColumnType::Binary => "blob".to_string(),
        };
        Ok(sql)
    }

    fn compile_column(&self, _table: &Table, column: &ColumnDefinition) -> QueryResult<String> {
        let mut sql = format!("{} {}", self.grammar.wrap(&column.name), self.compile_type(column)?);

        if column.unsigned && column.column_type.is_numeric() {
            sql.push_str(" unsigned");
        }
        sql.push_str(if column.nullable { " null" } else { " not null" });
        if let Some(default) = &column.default {
            sql.push_str(" default ");
            sql.push_str(&self.compile_default(default));
        } else if column.use_current {
            sql.push_str(" default CURRENT_TIMESTAMP");
        }
        if column.auto_increment {
            sql.push_str(" auto_increment primary key");
        } else if column.primary {
            sql.push_str(" primary key");
        }
        if let Some(comment) = &column.comment {
            sql.push_str(" comment ");
            sql.push_str(&quote_string(comment));
        }
        Ok(sql)
    }

    fn compile_create(&self, table: &Table) -> QueryResult<Vec<String>> {
        let mut parts = table
            .added_columns()
            .map(|c| self.compile_column(table, c))
            .collect::<QueryResult<Vec<_>>>()?;

        for command in table.commands() {
            match command {
                Command::Column(i) => {
                    if let Some(column) = table.columns().get(*i) {
                        if column.unique {
                            parts.push(self.inline_index(&table.implied_index(column, IndexKind::Unique)));
                        }
                        if column.index {
                            parts.push(self.inline_index(&table.implied_index(column, IndexKind::Index)));
                        }
                    }
                }
                Command::Index(i) => {
                    if let Some(index) = table.indexes().get(*i) {
                        parts.push(self.inline_index(index));
                    }
                }
                _ => {}
            }
        }

        if !self.emulates_foreign_keys(table) {
            for foreign in table.foreign_keys() {
                parts.push(foreign_clause(&self.grammar, foreign)?);
            }
        }

        let mut sql = format!(
            "create {}table {}{} ({})",
            if table.is_temporary() { "temporary " } else { "" },
            if table.is_if_not_exists() { "if not exists " } else { "" },
            self.wrap_table(table),
            parts.join(", ")
        );
        if let Some(engine) = self.engine(table) {
            sql.push_str(&format!(" engine = {}", engine));
        }
        if let Some(charset) = table.charset().or(self.charset.as_deref()) {
            sql.push_str(&format!(" default character set {}", charset));
        }
        if let Some(collation) = table.collation().or(self.collation.as_deref()) {
            sql.push_str(&format!(" collate {}", collation));
        }
        Ok(vec![sql])
    }

    fn compile_add(&self, table: &Table, column: &ColumnDefinition) -> QueryResult<Vec<String>> {
        Ok(vec![format!(
            "alter table {} add {}",
            self.wrap_table(table),
            self.compile_column(table, column)?
        )])
    }

    fn compile_change(&self, table: &Table, column: &ColumnDefinition) -> QueryResult<Vec<String>> {
        Ok(vec![format!(
            "alter table {} modify {}",
            self.wrap_table(table),
            self.compile_column(table, column)?
        )])
    }

    fn compile_ulid(&self, table: &Table, column: &ColumnDefinition) -> QueryResult<Vec<String>> {
        let name = table.index_name("ulid", std::slice::from_ref(&column.name));
        let wrapped = self.grammar.wrap(&column.name);

        let mut trigger = Trigger::new(name, table.name());
        trigger.if_not_exists = table.is_if_not_exists();
        trigger
            .before(TriggerEvent::Insert)
            .when(format!("new.{} is null", wrapped))
            .statement(format!("set new.{} = {}", wrapped, ULID_EXPRESSION));
        self.compile_trigger(&trigger)
    }

    fn compile_drop_columns(&self, table: &Table, columns: &[String]) -> QueryResult<Vec<String>> {
        let drops: Vec<String> = columns
            .iter()
            .map(|c| format!("drop {}", self.grammar.wrap(c)))
            .collect();
        Ok(vec![format!("alter table {} {}", self.wrap_table(table), drops.join(", "))])
    }

    fn compile_index(&self, table: &Table, index: &IndexDefinition) -> QueryResult<Vec<String>> {
        let columns = self.grammar.columnize(&index.columns);
        let clause = match index.kind {
            IndexKind::Primary => format!("add primary key ({})", columns),
            IndexKind::Unique => format!("add unique {}({})", self.grammar.wrap_segment(&index.name), columns),
            IndexKind::Index => format!("add index {}({})", self.grammar.wrap_segment(&index.name), columns),
        };
        Ok(vec![format!("alter table {} {}", self.wrap_table(table), clause)])
    }

    fn compile_drop_index(&self, table: &Table, kind: IndexKind, name: &str) -> QueryResult<Vec<String>> {
        let clause = match kind {
            IndexKind::Primary => "drop primary key".to_string(),
            _ => format!("drop index {}", self.grammar.wrap_segment(name)),
        };
        Ok(vec![format!("alter table {} {}", self.wrap_table(table), clause)])
    }

    fn compile_foreign(&self, table: &Table, foreign: &ForeignKey) -> QueryResult<Vec<String>> {
        if self.emulates_foreign_keys(table) {
            return match delete_action_trigger(&self.grammar, table, foreign)? {
                Some(trigger) => self.compile_trigger(&trigger),
                None => Ok(Vec::new()),
            };
        }
        let clause = foreign_clause(&self.grammar, foreign)?;
        if table.is_creating() {
            return Ok(Vec::new());
        }
        Ok(vec![format!("alter table {} add {}", self.wrap_table(table), clause)])
    }

    fn compile_drop_foreign(&self, table: &Table, name: &str) -> QueryResult<Vec<String>> {
        if self.emulates_foreign_keys(table) {
            return Ok(vec![format!(
                "drop trigger if exists {}",
                self.grammar.wrap_segment(&format!("{}_on_delete", name))
            )]);
        }
        Ok(vec![format!(
            "alter table {} drop foreign key {}",
            self.wrap_table(table),
            self.grammar.wrap_segment(name)
        )])
    }

    fn compile_trigger(&self, trigger: &Trigger) -> QueryResult<Vec<String>> {
        trigger.validate(self.dialect())?;
        let statements = match &trigger.action {
            TriggerAction::Statements(statements) => statements,
            TriggerAction::Function(_) => return Ok(Vec::new()),
        };

        let mut body = String::new();
        for statement in statements {
            body.push_str(statement);
            body.push_str("; ");
        }
        if let Some(condition) = &trigger.condition {
            body = format!("if {} then {}end if; ", condition, body);
        }

        Ok(vec![format!(
            "create trigger {}{} {} {} on {} for each row begin {}end",
            if trigger.if_not_exists { "if not exists " } else { "" },
            self.grammar.wrap_segment(&trigger.name),
            trigger.timing.to_sql(),
            trigger.event.to_sql(),
            self.grammar.wrap_table(&trigger.table),
            body
        )])
    }

    fn compile_rename(&self, table: &Table, to: &str) -> QueryResult<Vec<String>> {
        Ok(vec![format!(
            "rename table {} to {}",
            self.wrap_table(table),
            self.grammar.wrap_table(to)
        )])
    }

    fn compile_table_exists(&self, table: &str) -> CompiledQuery {
        CompiledQuery {
            sql: "select count(*) as `aggregate` from information_schema.tables \
                  where table_schema = database() and table_name = ? and table_type = 'BASE TABLE'"
                .into(),
            bindings: vec![Value::String(format!("{}{}", self.grammar.table_prefix(), table))],
        }
    }

    fn compile_column_listing(&self, table: &str) -> CompiledQuery {
        CompiledQuery {
            sql: "select column_name as `name` from information_schema.columns \
                  where table_schema = database() and table_name = ? order by ordinal_position"
                .into(),
            bindings: vec![Value::String(format!("{}{}", self.grammar.table_prefix(), table))],
        }
    }

    fn compile_enable_foreign_keys(&self) -> &'static str {
        "SET FOREIGN_KEY_CHECKS=1"
    }

    fn compile_disable_foreign_keys(&self) -> &'static str {
        "SET FOREIGN_KEY_CHECKS=0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ReferentialAction;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_inlines_indexes_and_keys() {
        let grammar = MySqlSchemaGrammar::new("").with_engine("InnoDB");
        let mut table = Table::create_if_not_exists("posts");
        table.id();
        table.foreign_id("user_id");
        table.string("slug", 120).unique();
        table.index(&["user_id", "slug"]);
        table.foreign(&["user_id"]).on("users").cascade_on_delete();

        assert_eq!(
            grammar.compile(&table).unwrap(),
            vec![
                "create table if not exists `posts` (`id` bigint unsigned not null auto_increment primary key, \
                 `user_id` bigint unsigned not null, `slug` varchar(120) not null, \
                 unique key `posts_slug_unique` (`slug`), key `posts_user_id_slug_index` (`user_id`, `slug`), \
                 constraint `posts_user_id_foreign` foreign key (`user_id`) references `users` (`id`) on delete cascade) \
                 engine = InnoDB"
            ]
        );
    }

    #[test]
    fn test_ulid_trigger() {
        let grammar = MySqlSchemaGrammar::new("");
        let mut table = Table::create("events");
        table.ulid("id").primary();

        let sql = grammar.compile(&table).unwrap();
        assert_eq!(sql[0], "create table `events` (`id` char(26) not null primary key)");
        assert!(sql[1].starts_with(
            "create trigger `events_id_ulid` before insert on `events` for each row begin if new.`id` is null then set new.`id` = concat("
        ));
        assert!(sql[1].ends_with("end if; end"));
    }

    #[test]
    fn test_myisam_emulates_cascade() {
        let grammar = MySqlSchemaGrammar::new("").with_engine("MyISAM");
        let mut table = Table::create("comments");
        table.id();
        table.foreign_id("post_id");
        table.foreign(&["post_id"]).on("posts").on_delete(ReferentialAction::Cascade);

        let sql = grammar.compile(&table).unwrap();
        assert!(!sql[0].contains("foreign key"));
        assert!(sql[0].ends_with("engine = MyISAM"));
        assert_eq!(
            sql[1],
            "create trigger `comments_post_id_foreign_on_delete` after delete on `posts` for each row \
             begin delete from `comments` where `post_id` = old.`id`; end"
        );

        let mut drop = Table::alter("comments");
        drop.drop_foreign("comments_post_id_foreign");
        assert_eq!(
            grammar.compile(&drop).unwrap(),
            vec!["drop trigger if exists `comments_post_id_foreign_on_delete`"]
        );
    }

    #[test]
    fn test_restrict_trigger_signals() {
        let grammar = MySqlSchemaGrammar::new("").with_engine("myisam");
        let mut table = Table::alter("comments");
        table.foreign(&["post_id"]).on("posts").on_delete(ReferentialAction::Restrict);
        let sql = grammar.compile(&table).unwrap();
        assert!(sql[0].contains("before delete on `posts`"));
        assert!(sql[0].contains("if exists (select 1 from `comments` where `post_id` = old.`id`) then signal sqlstate '45000'"));
    }

    #[test]
    fn test_alter_statements() {
        let grammar = MySqlSchemaGrammar::new("");
        let mut table = Table::alter("users");
        table.string("name", 100).nullable().change();
        table.integer("votes").unsigned().default(0).comment("score");
        table.drop_columns(&["a", "b"]);
        table.unique(&["email"]);
        table.drop_index("users_name_index");
        table.drop_foreign("users_team_id_foreign");
        table.rename("members");

        assert_eq!(
            grammar.compile(&table).unwrap(),
            vec![
                "alter table `users` modify `name` varchar(100) null",
                "alter table `users` add `votes` int unsigned not null default 0 comment 'score'",
                "alter table `users` drop `a`, drop `b`",
                "alter table `users` add unique `users_email_unique`(`email`)",
                "alter table `users` drop index `users_name_index`",
                "alter table `users` drop foreign key `users_team_id_foreign`",
                "rename table `users` to `members`",
            ]
        );
    }

    #[test]
    fn test_charset_and_collation_from_config() {
        let mut config = ConnectionConfig::new(quarry_query::Dialect::MySql);
        config.charset = Some("utf8mb4".into());
        config.collation = Some("utf8mb4_unicode_ci".into());
        let grammar = MySqlSchemaGrammar::from_config(&config);
        let mut table = Table::create("tags");
        table.increments("id");
        assert_eq!(
            grammar.compile(&table).unwrap(),
            vec![
                "create table `tags` (`id` int unsigned not null auto_increment primary key) \
                 default character set utf8mb4 collate utf8mb4_unicode_ci"
            ]
        );
    }
}
