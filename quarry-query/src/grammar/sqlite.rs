//! SQLite grammar.

use super::{QueryGrammar, json_path};
use crate::config::Dialect;
use crate::descriptor::{Lock, QueryDescriptor};
use crate::error::{QueryError, QueryResult};
use crate::sql::{CompiledQuery, PlaceholderStyle};

/// Grammar for SQLite databases.
#[derive(Debug, Clone, Default)]
pub struct SqliteGrammar {
    prefix: String,
}

impl SqliteGrammar {
    /// Create a grammar with a table prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl QueryGrammar for SqliteGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn table_prefix(&self) -> &str {
        &self.prefix
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn extra_operators(&self) -> &'static [&'static str] {
        &["glob", "not glob"]
    }

    fn compile_json_selector(&self, column: &str, path: &[&str]) -> String {
        format!("json_extract({}, '{}')", column, json_path(path))
    }

    // SQLite locks the whole database file; row locks do not exist.
    fn compile_lock(&self, _lock: Lock) -> &'static str {
        ""
    }

    fn offset_only_limit(&self) -> Option<&'static str> {
        Some("-1")
    }

    fn row_id_column(&self) -> Option<&'static str> {
        Some("rowid")
    }

    fn compile_truncate(&self, query: &QueryDescriptor) -> QueryResult<Vec<CompiledQuery>> {
        let table = query
            .table
            .as_deref()
            .ok_or_else(|| QueryError::incomplete("truncate without a table"))?;
        Ok(vec![CompiledQuery::raw(format!("delete from {}", self.wrap_table(table)))])
    }

    fn compile_sequence_reset(&self, table: &str) -> Option<(CompiledQuery, CompiledQuery)> {
        let guard = CompiledQuery::raw(
            "select exists(select 1 from sqlite_master where type = 'table' and name = 'sqlite_sequence') as \"exists\"",
        );
        let mut reset = CompiledQuery::raw("delete from sqlite_sequence where name = ?");
        reset.bindings.push(format!("{}{}", self.prefix, table).into());
        Some((guard, reset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Lock;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truncate_resets_sequence() {
        let compiled = SqliteGrammar::new("")
            .compile_truncate(&QueryDescriptor::new("users"))
            .unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].sql, r#"delete from "users""#);

        let (guard, reset) = SqliteGrammar::new("app_").compile_sequence_reset("users").unwrap();
        assert!(guard.sql.contains("sqlite_sequence"));
        assert_eq!(reset.bindings, vec!["app_users".into()]);
    }

    #[test]
    fn test_lock_is_ignored() {
        let mut query = QueryDescriptor::new("users");
        query.lock = Some(Lock::Update);
        let compiled = SqliteGrammar::new("").compile_select(&query).unwrap();
        assert_eq!(compiled.sql, r#"select * from "users""#);
    }
}
