//! MySQL and MariaDB grammar.

use super::{QueryGrammar, json_path};
use crate::config::Dialect;
use crate::descriptor::{Lock, QueryDescriptor};
use crate::error::{QueryError, QueryResult};
use crate::sql::{CompiledQuery, PlaceholderStyle, SqlBuilder};
use crate::value::Value;
use indexmap::IndexMap;

/// Grammar for MySQL-family servers.
#[derive(Debug, Clone, Default)]
pub struct MySqlGrammar {
    prefix: String,
}

impl MySqlGrammar {
    /// Create a grammar with a table prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl QueryGrammar for MySqlGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn table_prefix(&self) -> &str {
        &self.prefix
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn extra_operators(&self) -> &'static [&'static str] {
        &["<=>", "rlike", "not rlike", "regexp", "not regexp", "sounds like"]
    }

    fn compile_json_selector(&self, column: &str, path: &[&str]) -> String {
        format!("json_unquote(json_extract({}, '{}'))", column, json_path(path))
    }

    fn compile_begin(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn compile_random(&self) -> &'static str {
        "RAND()"
    }

    fn compile_lock(&self, lock: Lock) -> &'static str {
        match lock {
            Lock::Update => " for update",
            Lock::Shared => " lock in share mode",
        }
    }

    fn offset_only_limit(&self) -> Option<&'static str> {
        Some("18446744073709551615")
    }

    fn compile_empty_insert(&self) -> &'static str {
        " () values ()"
    }

    fn compile_upsert(
        &self,
        query: &QueryDescriptor,
        insert: &IndexMap<String, Value>,
        unique_by: &[String],
        update: &IndexMap<String, Value>,
    ) -> QueryResult<CompiledQuery> {
        // MySQL resolves conflicts against every unique key; the target column is
        // only checked for presence.
        if unique_by.is_empty() {
            return Err(QueryError::incomplete("upsert without a unique column"));
        }
        let mut sql = SqlBuilder::new(self.placeholder_style());
        self.compile_insert_into(&mut sql, query, std::slice::from_ref(insert))?;
        if update.is_empty() {
            let mut compiled = sql.build();
            compiled.sql = compiled.sql.replacen("insert into", "insert ignore into", 1);
            return Ok(compiled);
        }
        sql.push(" on duplicate key update ");
        for (i, (column, value)) in update.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push(format!("{} = ", self.wrap(column))).push_param(value.clone());
        }
        Ok(sql.build())
    }
}
