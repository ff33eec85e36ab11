//! SQL text assembly with ordered bindings.
//!
//! Grammars write statements through [`SqlBuilder`], which emits a placeholder and
//! records the bound value in the same call. Placeholder order and binding order
//! therefore cannot drift apart, whichever clauses a statement contains.

use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// Placeholder style of a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `?` for every parameter (MySQL, SQLite).
    #[default]
    Question,
    /// `$1`, `$2`, ... (PostgreSQL).
    Numbered,
}

impl PlaceholderStyle {
    /// Get the placeholder for the parameter at `index` (1-based).
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Question => "?".to_string(),
            Self::Numbered => format!("${}", index),
        }
    }
}

/// A compiled statement: SQL text plus bindings in placeholder order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledQuery {
    /// SQL text.
    pub sql: String,
    /// Values for the placeholders, in order.
    pub bindings: Vec<Value>,
}

impl CompiledQuery {
    /// Create a statement without bindings.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }
}

/// A SQL builder that keeps bindings aligned with placeholders.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    style: PlaceholderStyle,
    sql: String,
    bindings: Vec<Value>,
}

impl SqlBuilder {
    /// Create a new SQL builder.
    pub fn new(style: PlaceholderStyle) -> Self {
        Self {
            style,
            sql: String::with_capacity(128),
            bindings: Vec::new(),
        }
    }

    /// Push a SQL fragment.
    pub fn push(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.sql.push_str(sql.as_ref());
        self
    }

    /// Push a placeholder and bind its value.
    pub fn push_param(&mut self, value: Value) -> &mut Self {
        self.bindings.push(value);
        let placeholder = self.style.placeholder(self.bindings.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Push comma separated placeholders for a list of values.
    pub fn push_params(&mut self, values: &[Value]) -> &mut Self {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.push_param(value.clone());
        }
        self
    }

    /// Push a raw expression whose `?` markers are bound, in order, to `bindings`.
    ///
    /// `??` stands for a literal question mark. Markers inside quoted strings or
    /// quoted identifiers are left alone.
    pub fn push_raw(&mut self, expression: &str, bindings: &[Value]) -> QueryResult<&mut Self> {
        let expected = count_placeholders(expression);
        if expected != bindings.len() {
            return Err(QueryError::invalid_binding(expected, bindings.len())
                .with_sql(expression.to_string()));
        }

        let mut values = bindings.iter();
        let mut quote: Option<char> = None;
        let mut chars = expression.chars().peekable();
        while let Some(c) = chars.next() {
            match (quote, c) {
                (Some(q), c) if c == q => {
                    quote = None;
                    self.sql.push(c);
                }
                (Some(_), c) => self.sql.push(c),
                (None, '\'' | '"' | '`') => {
                    quote = Some(c);
                    self.sql.push(c);
                }
                (None, '?') if chars.peek() == Some(&'?') => {
                    chars.next();
                    self.sql.push('?');
                }
                (None, '?') => {
                    if let Some(value) = values.next() {
                        self.push_param(value.clone());
                    }
                }
                (None, c) => self.sql.push(c),
            }
        }
        Ok(self)
    }

    /// Number of bindings pushed so far.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Current SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Build the final statement.
    pub fn build(self) -> CompiledQuery {
        CompiledQuery {
            sql: self.sql,
            bindings: self.bindings,
        }
    }
}

/// Count the `?` markers outside quotes, treating `??` as an escaped literal.
pub fn count_placeholders(expression: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    let mut chars = expression.chars().peekable();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '?') if chars.peek() == Some(&'?') => {
                chars.next();
            }
            (None, '?') => count += 1,
            _ => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_numbered_placeholders() {
        let mut builder = SqlBuilder::new(PlaceholderStyle::Numbered);
        builder.push("a = ").push_param(Value::Int(1));
        builder.push(" and b = ").push_param(Value::Int(2));
        let compiled = builder.build();
        assert_eq!(compiled.sql, "a = $1 and b = $2");
        assert_eq!(compiled.bindings, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_raw_expression_binding() {
        let mut builder = SqlBuilder::new(PlaceholderStyle::Numbered);
        builder.push("x = ").push_param(Value::Int(1)).push(" and ");
        builder
            .push_raw("age > ? and note <> '?' and tags ?? 'a'", &[Value::Int(18)])
            .unwrap();
        let compiled = builder.build();
        assert_eq!(compiled.sql, "x = $1 and age > $2 and note <> '?' and tags ? 'a'");
        assert_eq!(compiled.bindings.len(), 2);
    }

    #[test]
    fn test_raw_binding_count_mismatch() {
        let mut builder = SqlBuilder::new(PlaceholderStyle::Question);
        let err = builder.push_raw("a = ? and b = ?", &[Value::Int(1)]).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::InvalidBinding);
    }
}
