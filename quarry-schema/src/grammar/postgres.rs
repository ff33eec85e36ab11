//! PostgreSQL schema grammar.

use super::{SchemaGrammar, foreign_clause, literal, quote_string};
use crate::column::{ColumnDefinition, ColumnType};
use crate::table::{ForeignKey, IndexDefinition, IndexKind, Table};
use crate::trigger::{Trigger, TriggerAction, TriggerEvent};
use quarry_query::grammar::{PostgresGrammar, QueryGrammar};
use quarry_query::{CompiledQuery, ConnectionConfig, QueryError, QueryResult, Value};

/// Schema grammar for PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresSchemaGrammar {
    grammar: PostgresGrammar,
    schema: String,
}

impl Default for PostgresSchemaGrammar {
    fn default() -> Self {
        Self::new("")
    }
}

impl PostgresSchemaGrammar {
    /// Create a grammar with a table prefix, introspecting the `public` schema.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            grammar: PostgresGrammar::new(prefix),
            schema: "public".to_string(),
        }
    }

    /// Create a grammar from a connection configuration.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let mut grammar = Self::new(config.prefix.clone());
        if let Some(schema) = &config.postgres.schema {
            grammar.schema = schema.clone();
        }
        grammar
    }

    /// Schema used by introspection queries.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn ulid_function(&self, column: &str) -> String {
        let column = self.grammar.wrap(column);
        format!(
            "declare alphabet constant text := '0123456789ABCDEFGHJKMNPQRSTVWXYZ'; ms bigint; ulid text := ''; \
             begin if new.{column} is null then \
             ms := floor(extract(epoch from clock_timestamp()) * 1000); \
             for i in 1..10 loop ulid := substr(alphabet, (ms % 32)::int + 1, 1) || ulid; ms := ms / 32; end loop; \
             for i in 1..16 loop ulid := ulid || substr(alphabet, floor(random() * 32)::int + 1, 1); end loop; \
             new.{column} := ulid; end if; return new; end;"
        )
    }
}

impl SchemaGrammar for PostgresSchemaGrammar {
    fn grammar(&self) -> &dyn QueryGrammar {
        &self.grammar
    }

    fn compile_type(&self, column: &ColumnDefinition) -> QueryResult<String> {
        if column.auto_increment {
            return match column.column_type {
                ColumnType::TinyInteger | ColumnType::SmallInteger => Ok("smallserial".into()),
                ColumnType::Integer => Ok("serial".into()),
                ColumnType::BigInteger => Ok("bigserial".into()),
                _ => Err(QueryError::invalid_schema(format!(
                    "auto-increment column '{}' must be an integer",
                    column.name
                ))),
            };
        }

        let sql = match &column.column_type {
            ColumnType::TinyInteger | ColumnType::SmallInteger => "smallint".to_string(),
            ColumnType::Integer => "integer".to_string(),
            ColumnType::BigInteger => "bigint".to_string(),
            ColumnType::Decimal { precision, scale } => format!("decimal({}, {})", precision, scale),
            ColumnType::Float => "real".to_string(),
            ColumnType::Double => "double precision".to_string(),
            ColumnType::Char(length) => format!("char({})", length),
            ColumnType::String(length) => format!("varchar({})", length),
            ColumnType::Text | ColumnType::MediumText | ColumnType::LongText => "text".to_string(),
            ColumnType::Boolean => "boolean".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::Time => "time(0) without time zone".to_string(),
            ColumnType::DateTime | ColumnType::Timestamp => "timestamp(0) without time zone".to_string(),
            ColumnType::Uuid => "uuid".to_string(),
            ColumnType::Ulid => "char(26)".to_string(),
            ColumnType::Json => "jsonb".to_string(),
            ColumnType::Enum(_) => "varchar(255)".to_string(),
            ColumnType::Binary => "bytea".to_string(),
        };
        Ok(sql)
    }

    fn compile_column(&self, _table: &Table, column: &ColumnDefinition) -> QueryResult<String> {
        let name = self.grammar.wrap(&column.name);
        let mut sql = format!("{} {}", name, self.compile_type(column)?);

        if column.auto_increment || column.primary {
            sql.push_str(" primary key");
        }
        if let ColumnType::Enum(allowed) = &column.column_type {
            let values: Vec<String> = allowed.iter().map(|v| quote_string(v)).collect();
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
        }
        Ok(sql)
    }

    fn compile_literal(&self, value: &Value) -> String {
        match value {
            Value::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                format!("'\\x{}'::bytea", hex)
            }
            other => literal(other, true),
        }
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
        if column.auto_increment {
            return Err(QueryError::unsupported_schema(format!(
                "PostgreSQL cannot turn column '{}' into a serial column",
                column.name
            )));
        }

        let name = self.grammar.wrap(&column.name);
        let ty = self.compile_type(column)?;
        let mut changes = vec![format!("alter column {} type {} using {}::{}", name, ty, name, ty)];
        changes.push(if column.nullable {
            format!("alter column {} drop not null", name)
        } else {
            format!("alter column {} set not null", name)
        });
        changes.push(match (&column.default, column.use_current) {
            (Some(default), _) => format!("alter column {} set default {}", name, self.compile_default(default)),
            (None, true) => format!("alter column {} set default CURRENT_TIMESTAMP", name),
            (None, false) => format!("alter column {} drop default", name),
        });

        Ok(vec![format!("alter table {} {}", self.wrap_table(table), changes.join(", "))])
    }

    fn compile_ulid(&self, table: &Table, column: &ColumnDefinition) -> QueryResult<Vec<String>> {
        let function = table.index_name("ulid", std::slice::from_ref(&column.name));
        let mut statements = vec![format!(
            "create or replace function {}() returns trigger as $$ {} $$ language plpgsql",
            self.grammar.wrap_segment(&function),
            self.ulid_function(&column.name)
        )];

        let mut trigger = Trigger::new(function.clone(), table.name());
        trigger.if_not_exists = table.is_if_not_exists();
        trigger.before(TriggerEvent::Insert).execute_function(function);
        statements.extend(self.compile_trigger(&trigger)?);
        Ok(statements)
    }

    fn compile_comment(&self, table: &Table, column: &ColumnDefinition, comment: &str) -> Vec<String> {
        vec![format!(
            "comment on column {}.{} is {}",
            self.wrap_table(table),
            self.grammar.wrap(&column.name),
            quote_string(comment)
        )]
    }

    fn compile_drop_columns(&self, table: &Table, columns: &[String]) -> QueryResult<Vec<String>> {
        let drops: Vec<String> = columns
            .iter()
            .map(|c| format!("drop column {}", self.grammar.wrap(c)))
            .collect();
        Ok(vec![format!("alter table {} {}", self.wrap_table(table), drops.join(", "))])
    }

    fn compile_index(&self, table: &Table, index: &IndexDefinition) -> QueryResult<Vec<String>> {
        let sql = match index.kind {
            IndexKind::Primary => format!(
                "alter table {} add primary key ({})",
                self.wrap_table(table),
                self.grammar.columnize(&index.columns)
            ),
            kind => format!(
                "create {}index {}{} on {} ({})",
                if kind == IndexKind::Unique { "unique " } else { "" },
                if table.is_if_not_exists() { "if not exists " } else { "" },
                self.grammar.wrap_segment(&index.name),
                self.wrap_table(table),
                self.grammar.columnize(&index.columns)
            ),
        };
        Ok(vec![sql])
    }

    fn compile_drop_index(&self, table: &Table, kind: IndexKind, name: &str) -> QueryResult<Vec<String>> {
        let sql = match kind {
            IndexKind::Primary => format!(
                "alter table {} drop constraint {}",
                self.wrap_table(table),
                self.grammar.wrap_segment(name)
            ),
            _ => format!("drop index {}", self.grammar.wrap_segment(name)),
        };
        Ok(vec![sql])
    }

    fn compile_foreign(&self, table: &Table, foreign: &ForeignKey) -> QueryResult<Vec<String>> {
        let clause = foreign_clause(&self.grammar, foreign)?;
        if table.is_creating() {
            return Ok(Vec::new());
        }
        Ok(vec![format!("alter table {} add {}", self.wrap_table(table), clause)])
    }

    fn compile_drop_foreign(&self, table: &Table, name: &str) -> QueryResult<Vec<String>> {
        Ok(vec![format!(
            "alter table {} drop constraint {}",
            self.wrap_table(table),
            self.grammar.wrap_segment(name)
        )])
    }

    fn compile_trigger(&self, trigger: &Trigger) -> QueryResult<Vec<String>> {
        trigger.validate(self.dialect())?;
        let function = match &trigger.action {
            TriggerAction::Function(function) => function,
            TriggerAction::Statements(_) => return Ok(Vec::new()),
        };

        let name = self.grammar.wrap_segment(&trigger.name);
        let on = self.grammar.wrap_table(&trigger.table);
        let mut statements = Vec::new();
        if trigger.if_not_exists {
            statements.push(format!("drop trigger if exists {} on {}", name, on));
        }

        let mut sql = format!(
            "create trigger {} {} {} on {} for each row",
            name,
            trigger.timing.to_sql(),
            trigger.event.to_sql(),
            on
        );
        if let Some(condition) = &trigger.condition {
            sql.push_str(&format!(" when ({})", condition));
        }
        sql.push_str(&format!(" execute function {}()", self.grammar.wrap_segment(function)));
        statements.push(sql);
        Ok(statements)
    }

    fn compile_table_exists(&self, table: &str) -> CompiledQuery {
        CompiledQuery {
            sql: "select count(*) as \"aggregate\" from information_schema.tables \
                  where table_schema = $1 and table_name = $2 and table_type = 'BASE TABLE'"
                .into(),
            bindings: vec![
                Value::String(self.schema.clone()),
                Value::String(format!("{}{}", self.grammar.table_prefix(), table)),
            ],
        }
    }

    fn compile_column_listing(&self, table: &str) -> CompiledQuery {
        CompiledQuery {
            sql: "select column_name as \"name\" from information_schema.columns \
                  where table_schema = $1 and table_name = $2 order by ordinal_position"
                .into(),
            bindings: vec![
                Value::String(self.schema.clone()),
                Value::String(format!("{}{}", self.grammar.table_prefix(), table)),
            ],
        }
    }

    fn compile_enable_foreign_keys(&self) -> &'static str {
        "SET CONSTRAINTS ALL IMMEDIATE"
    }

    fn compile_disable_foreign_keys(&self) -> &'static str {
        "SET CONSTRAINTS ALL DEFERRED"
    }
}
