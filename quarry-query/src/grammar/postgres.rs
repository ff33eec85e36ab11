//! PostgreSQL grammar.

use super::QueryGrammar;
use crate::config::Dialect;
use crate::descriptor::QueryDescriptor;
use crate::error::{QueryError, QueryResult};
use crate::sql::{CompiledQuery, PlaceholderStyle};
use crate::value::Value;
use indexmap::IndexMap;

/// Grammar for PostgreSQL-family servers.
#[derive(Debug, Clone, Default)]
pub struct PostgresGrammar {
    prefix: String,
}

impl PostgresGrammar {
    /// Create a grammar with a table prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl QueryGrammar for PostgresGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn table_prefix(&self) -> &str {
        &self.prefix
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numbered
    }

    fn extra_operators(&self) -> &'static [&'static str] {
        &[
            "ilike",
            "not ilike",
            "~",
            "~*",
            "!~",
            "!~*",
            "similar to",
            "not similar to",
            "@>",
            "<@",
            "&&",
        ]
    }

    fn compile_json_selector(&self, column: &str, path: &[&str]) -> String {
        let mut out = column.to_string();
        for (i, segment) in path.iter().enumerate() {
            let arrow = if i + 1 == path.len() { "->>" } else { "->" };
            let segment = segment.trim_matches(|c| c == '\'' || c == '"');
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                out.push_str(&format!("{}{}", arrow, segment));
            } else {
                out.push_str(&format!("{}'{}'", arrow, segment.replace('\'', "''")));
            }
        }
        out
    }

    fn row_id_column(&self) -> Option<&'static str> {
        Some("ctid")
    }

    fn returns_inserted_id(&self) -> bool {
        true
    }

    fn compile_insert_get_id(
        &self,
        query: &QueryDescriptor,
        values: &IndexMap<String, Value>,
        key: &str,
    ) -> QueryResult<CompiledQuery> {
        let mut compiled = self.compile_insert(query, std::slice::from_ref(values))?;
        compiled.sql.push_str(&format!(" returning {}", self.wrap(key)));
        Ok(compiled)
    }

    fn compile_truncate(&self, query: &QueryDescriptor) -> QueryResult<Vec<CompiledQuery>> {
        let table = query
            .table
            .as_deref()
            .ok_or_else(|| QueryError::incomplete("truncate without a table"))?;
        Ok(vec![CompiledQuery::raw(format!(
            "truncate {} restart identity cascade",
            self.wrap_table(table)
        ))])
    }
}
