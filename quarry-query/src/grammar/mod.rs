//! Dialect grammars: compile a [`QueryDescriptor`] into SQL text and bindings.
//!
//! [`QueryGrammar`] carries the whole compilation pipeline as provided methods. A
//! dialect implements the handful of required methods (quoting, placeholders,
//! operator whitelist, JSON paths) and overrides the provided ones only where its
//! SQL differs.
//!
//! | Concern          | MySQL                       | PostgreSQL              | SQLite                    |
//! |------------------|-----------------------------|-------------------------|---------------------------|
//! | Identifier quote | `` `name` ``                | `"name"`                | `"name"`                  |
//! | Placeholder      | `?`                         | `$1`, `$2`              | `?`                       |
//! | Upsert           | `on duplicate key update`   | `on conflict do update` | `on conflict do update`   |
//! | Random order     | `RAND()`                    | `RANDOM()`              | `RANDOM()`                |
//! | Shared lock      | `lock in share mode`        | `for share`             | none                      |
//!
//! Every value reaches the SQL through [`SqlBuilder::push_param`], so placeholder
//! order and binding order are the same by construction.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlGrammar;
pub use postgres::PostgresGrammar;
pub use sqlite::SqliteGrammar;

use crate::config::Dialect;
use crate::descriptor::{
    Aggregate, Assignment, Having, Join, JoinKind, Lock, Order, QueryDescriptor, Selection, Where,
};
use crate::error::{QueryError, QueryResult};
use crate::sql::{CompiledQuery, PlaceholderStyle, SqlBuilder};
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::trace;

/// Operators every dialect accepts.
pub const COMMON_OPERATORS: &[&str] = &[
    "=",
    "<",
    ">",
    "<=",
    ">=",
    "<>",
    "!=",
    "like",
    "not like",
    "between",
    "not between",
    "in",
    "not in",
    "is",
    "is not",
];

/// Build the grammar for a dialect with a table prefix.
pub fn grammar_for(dialect: Dialect, prefix: impl Into<String>) -> Arc<dyn QueryGrammar> {
    let prefix = prefix.into();
    match dialect {
        Dialect::MySql => Arc::new(MySqlGrammar::new(prefix)),
        Dialect::Postgres => Arc::new(PostgresGrammar::new(prefix)),
        Dialect::Sqlite => Arc::new(SqliteGrammar::new(prefix)),
    }
}

/// Collapse whitespace and lower-case an operator.
pub fn normalize_operator(operator: &str) -> String {
    operator
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Compiles query descriptors for one dialect.
pub trait QueryGrammar: Send + Sync + Debug {
    /// The dialect this grammar targets.
    fn dialect(&self) -> Dialect;

    /// Table prefix applied to every table reference.
    fn table_prefix(&self) -> &str;

    /// Identifier quote character.
    fn quote_char(&self) -> char;

    /// Placeholder style.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Operators accepted on top of [`COMMON_OPERATORS`].
    fn extra_operators(&self) -> &'static [&'static str];

    /// Compile a JSON selector. `column` is already wrapped; `path` holds the
    /// segments after the first `->`.
    fn compile_json_selector(&self, column: &str, path: &[&str]) -> String;

    /// Whether nested transactions map to savepoints.
    fn supports_savepoints(&self) -> bool {
        true
    }

    /// Statement opening a transaction.
    fn compile_begin(&self) -> &'static str {
        "BEGIN"
    }

    /// Statement creating a savepoint.
    fn compile_savepoint(&self, name: &str) -> String {
        format!("SAVEPOINT {}", name)
    }

    /// Statement rolling back to a savepoint.
    fn compile_savepoint_rollback(&self, name: &str) -> String {
        format!("ROLLBACK TO SAVEPOINT {}", name)
    }

    /// Statement releasing a savepoint.
    fn compile_savepoint_release(&self, name: &str) -> String {
        format!("RELEASE SAVEPOINT {}", name)
    }

    /// Expression used for random ordering.
    fn compile_random(&self) -> &'static str {
        "RANDOM()"
    }

    /// Locking clause, including its leading space.
    fn compile_lock(&self, lock: Lock) -> &'static str {
        match lock {
            Lock::Update => " for update",
            Lock::Shared => " for share",
        }
    }

    /// Limit emitted when only an offset was given, for dialects that require one.
    fn offset_only_limit(&self) -> Option<&'static str> {
        None
    }

    /// Row identifier column used to emulate `update/delete ... limit` with a
    /// sub-query. `None` means the dialect supports the clauses natively.
    fn row_id_column(&self) -> Option<&'static str> {
        None
    }

    /// Validate an operator against the dialect whitelist and return its normalized form.
    fn validate_operator(&self, operator: &str) -> QueryResult<String> {
        let normalized = normalize_operator(operator);
        if COMMON_OPERATORS.contains(&normalized.as_str())
            || self.extra_operators().contains(&normalized.as_str())
        {
            Ok(normalized)
        } else {
            Err(QueryError::invalid_where(format!(
                "operator '{}' is not allowed on {}",
                operator,
                self.dialect()
            ))
            .with_help("Use where_raw() for expressions the builder does not support"))
        }
    }

    /// Quote a single identifier segment.
    fn wrap_segment(&self, segment: &str) -> String {
        if segment == "*" {
            return segment.to_string();
        }
        let q = self.quote_char();
        let escaped = segment.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Wrap a table reference, applying the prefix to the table and its alias.
    fn wrap_table(&self, table: &str) -> String {
        if let Some((name, alias)) = split_alias(table) {
            return format!(
                "{} as {}",
                self.wrap_table(name),
                self.wrap_segment(&format!("{}{}", self.table_prefix(), alias))
            );
        }
        match table.rsplit_once('.') {
            Some((schema, name)) => format!(
                "{}.{}",
                self.wrap_segment(schema),
                self.wrap_segment(&format!("{}{}", self.table_prefix(), name))
            ),
            None => self.wrap_segment(&format!("{}{}", self.table_prefix(), table)),
        }
    }

    /// Wrap a column reference: `column`, `table.column`, `column as alias`, `*`,
    /// or a JSON path `column->key`.
    fn wrap(&self, value: &str) -> String {
        if let Some((expr, alias)) = split_alias(value) {
            return format!("{} as {}", self.wrap(expr), self.wrap_segment(alias));
        }
        if value.contains("->") {
            let mut parts = value.split("->").map(str::trim);
            let column = parts.next().unwrap_or_default();
            let path: Vec<&str> = parts.collect();
            return self.compile_json_selector(&self.wrap(column), &path);
        }
        match value.rsplit_once('.') {
            Some((table, column)) => format!("{}.{}", self.wrap_table(table), self.wrap_segment(column)),
            None => self.wrap_segment(value),
        }
    }

    /// Wrap and join a list of columns.
    fn columnize(&self, columns: &[String]) -> String {
        columns.iter().map(|c| self.wrap(c)).collect::<Vec<_>>().join(", ")
    }

    /// Compile a select statement.
    fn compile_select(&self, query: &QueryDescriptor) -> QueryResult<CompiledQuery> {
        let mut sql = SqlBuilder::new(self.placeholder_style());
        if query.aggregate.is_some() && !query.groups.is_empty() {
            self.compile_grouped_aggregate(&mut sql, query)?;
        } else {
            self.compile_select_into(&mut sql, query)?;
        }
        let compiled = sql.build();
        trace!(sql = %compiled.sql, bindings = compiled.bindings.len(), "Compiled select");
        Ok(compiled)
    }

    /// Write a select statement into an existing builder, so sub-queries share its
    /// placeholder numbering.
    fn compile_select_into(&self, sql: &mut SqlBuilder, query: &QueryDescriptor) -> QueryResult<()> {
        let table = query
            .table
            .as_deref()
            .ok_or_else(|| QueryError::incomplete("select without a table"))?;

        sql.push("select ");
        match &query.aggregate {
            Some(aggregate) => self.compile_aggregate(sql, query, aggregate),
            None => {
                if query.distinct {
                    sql.push("distinct ");
                }
                self.compile_columns(sql, &query.columns)?;
            }
        }
        sql.push(" from ").push(self.wrap_table(table));
        self.compile_joins(sql, &query.joins)?;
        self.compile_wheres(sql, &query.wheres)?;
        if !query.groups.is_empty() {
            sql.push(" group by ").push(self.columnize(&query.groups));
        }
        self.compile_havings(sql, &query.havings)?;
        self.compile_orders(sql, &query.orders);
        self.compile_limit_offset(sql, query.limit, query.offset);
        if let Some(lock) = query.lock {
            sql.push(self.compile_lock(lock));
        }
        Ok(())
    }

    /// Write the select list.
    fn compile_columns(&self, sql: &mut SqlBuilder, columns: &[Selection]) -> QueryResult<()> {
        if columns.is_empty() {
            sql.push("*");
            return Ok(());
        }
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            match column {
                Selection::Column(name) => {
                    sql.push(self.wrap(name));
                }
                Selection::Raw { sql: raw, bindings } => {
                    sql.push_raw(raw, bindings)?;
                }
            }
        }
        Ok(())
    }

    /// Write an aggregate select list, e.g. `count(*) as aggregate`.
    fn compile_aggregate(&self, sql: &mut SqlBuilder, query: &QueryDescriptor, aggregate: &Aggregate) {
        let column = if query.distinct && aggregate.column != "*" {
            format!("distinct {}", self.wrap(&aggregate.column))
        } else {
            self.wrap(&aggregate.column)
        };
        sql.push(format!("{}({}) as aggregate", aggregate.function, column));
    }

    /// Aggregate over a grouped query through a derived table.
    fn compile_grouped_aggregate(&self, sql: &mut SqlBuilder, query: &QueryDescriptor) -> QueryResult<()> {
        let mut inner = query.clone();
        let aggregate = inner.aggregate.take();
        sql.push("select ");
        if let Some(aggregate) = aggregate {
            sql.push(format!("{}(*) as aggregate", aggregate.function));
        }
        sql.push(" from (");
        self.compile_select_into(sql, &inner)?;
        sql.push(") as ").push(self.wrap_segment("aggregate_table"));
        Ok(())
    }

    /// Write the join clauses.
    fn compile_joins(&self, sql: &mut SqlBuilder, joins: &[Join]) -> QueryResult<()> {
        for join in joins {
            sql.push(format!(" {} join {}", join.kind.as_str(), self.wrap_table(&join.table)));
            if join.kind == JoinKind::Cross {
                continue;
            }
            for (i, condition) in join.conditions.iter().enumerate() {
                let operator = self.validate_operator(&condition.operator)?;
                sql.push(if i == 0 { " on ".to_string() } else { format!(" {} ", condition.boolean.as_str()) });
                sql.push(format!("{} {} {}", self.wrap(&condition.first), operator, self.wrap(&condition.second)));
            }
        }
        Ok(())
    }

    /// Write the where clause, including its leading ` where`.
    fn compile_wheres(&self, sql: &mut SqlBuilder, wheres: &[Where]) -> QueryResult<()> {
        if wheres.iter().all(is_empty_group) {
            return Ok(());
        }
        sql.push(" where ");
        self.compile_predicates(sql, wheres)
    }

    /// Write a list of predicates joined by their connectors.
    fn compile_predicates(&self, sql: &mut SqlBuilder, wheres: &[Where]) -> QueryResult<()> {
        let mut first = true;
        for clause in wheres.iter().filter(|w| !is_empty_group(w)) {
            if !first {
                sql.push(format!(" {} ", clause.boolean().as_str()));
            }
            first = false;
            self.compile_predicate(sql, clause)?;
        }
        Ok(())
    }

    /// Write one predicate.
    fn compile_predicate(&self, sql: &mut SqlBuilder, clause: &Where) -> QueryResult<()> {
        match clause {
            Where::Basic {
                column,
                operator,
                value,
                ..
            } => self.compile_basic(sql, column, operator, value),
            Where::Column {
                first,
                operator,
                second,
                ..
            } => {
                let operator = self.validate_operator(operator)?;
                sql.push(format!("{} {} {}", self.wrap(first), operator, self.wrap(second)));
                Ok(())
            }
            Where::In {
                column,
                values,
                negated,
                ..
            } => {
                if values.is_empty() {
                    // `in ()` is invalid SQL; an empty set matches nothing.
                    sql.push(if *negated { "1 = 1" } else { "0 = 1" });
                    return Ok(());
                }
                sql.push(self.wrap(column))
                    .push(if *negated { " not in (" } else { " in (" })
                    .push_params(values)
                    .push(")");
                Ok(())
            }
            Where::InSub {
                column,
                query,
                negated,
                ..
            } => {
                sql.push(self.wrap(column)).push(if *negated { " not in (" } else { " in (" });
                self.compile_select_into(sql, query)?;
                sql.push(")");
                Ok(())
            }
            Where::Null { column, negated, .. } => {
                sql.push(self.wrap(column))
                    .push(if *negated { " is not null" } else { " is null" });
                Ok(())
            }
            Where::Between {
                column,
                low,
                high,
                negated,
                ..
            } => {
                sql.push(self.wrap(column))
                    .push(if *negated { " not between " } else { " between " })
                    .push_param(low.clone())
                    .push(" and ")
                    .push_param(high.clone());
                Ok(())
            }
            Where::Nested { wheres, .. } => {
                sql.push("(");
                self.compile_predicates(sql, wheres)?;
                sql.push(")");
                Ok(())
            }
            Where::Exists { query, negated, .. } => {
                sql.push(if *negated { "not exists (" } else { "exists (" });
                self.compile_select_into(sql, query)?;
                sql.push(")");
                Ok(())
            }
            Where::Raw { sql: raw, bindings, .. } => {
                sql.push_raw(raw, bindings)?;
                Ok(())
            }
        }
    }

    /// Write `column operator ?`, translating null comparisons.
    fn compile_basic(&self, sql: &mut SqlBuilder, column: &str, operator: &str, value: &Value) -> QueryResult<()> {
        let operator = self.validate_operator(operator)?;
        match operator.as_str() {
            "in" | "not in" | "between" | "not between" => {
                return Err(QueryError::unsupported_operator(
                    format!("{} with a single value", operator),
                    self.dialect(),
                )
                .with_help("Use where_in() or where_between() for set and range comparisons"));
            }
            "is" | "is not" if !value.is_null() => {
                return Err(QueryError::unsupported_operator(
                    format!("{} with a non-null value", operator),
                    self.dialect(),
                ));
            }
            _ => {}
        }

        if value.is_null() {
            let suffix = match operator.as_str() {
                "=" | "is" => " is null",
                "<>" | "!=" | "is not" => " is not null",
                other => {
                    return Err(QueryError::unsupported_operator(
                        format!("{} with null", other),
                        self.dialect(),
                    ));
                }
            };
            sql.push(self.wrap(column)).push(suffix);
            return Ok(());
        }

        sql.push(format!("{} {} ", self.wrap(column), operator))
            .push_param(value.clone());
        Ok(())
    }

    /// Write the having clause.
    fn compile_havings(&self, sql: &mut SqlBuilder, havings: &[Having]) -> QueryResult<()> {
        for (i, having) in havings.iter().enumerate() {
            let boolean = match having {
                Having::Basic { boolean, .. } | Having::Raw { boolean, .. } => boolean,
            };
            sql.push(if i == 0 { " having ".to_string() } else { format!(" {} ", boolean.as_str()) });
            match having {
                Having::Basic {
                    column,
                    operator,
                    value,
                    ..
                } => self.compile_basic(sql, column, operator, value)?,
                Having::Raw { sql: raw, bindings, .. } => {
                    sql.push_raw(raw, bindings)?;
                }
            }
        }
        Ok(())
    }

    /// Write the order-by clause.
    fn compile_orders(&self, sql: &mut SqlBuilder, orders: &[Order]) {
        if orders.is_empty() {
            return;
        }
        let parts: Vec<String> = orders
            .iter()
            .map(|order| match order {
                Order::Column { column, direction } => format!("{} {}", self.wrap(column), direction.as_str()),
                Order::Random => self.compile_random().to_string(),
                Order::Raw(raw) => raw.clone(),
            })
            .collect();
        sql.push(" order by ").push(parts.join(", "));
    }

    /// Write limit and offset.
    fn compile_limit_offset(&self, sql: &mut SqlBuilder, limit: Option<u64>, offset: Option<u64>) {
        match (limit, offset) {
            (Some(limit), _) => {
                sql.push(format!(" limit {}", limit));
            }
            (None, Some(_)) => {
                if let Some(limit) = self.offset_only_limit() {
                    sql.push(format!(" limit {}", limit));
                }
            }
            (None, None) => {}
        }
        if let Some(offset) = offset {
            sql.push(format!(" offset {}", offset));
        }
    }

    /// Compile `select count(column) as aggregate ...`.
    fn compile_count(&self, query: &QueryDescriptor, column: &str) -> QueryResult<CompiledQuery> {
        let mut query = query.clone();
        query.orders.clear();
        query.limit = None;
        query.offset = None;
        query.aggregate = Some(Aggregate {
            function: "count".to_string(),
            column: column.to_string(),
        });
        self.compile_select(&query)
    }

    /// Compile `select exists(select ...) as "exists"`.
    fn compile_exists(&self, query: &QueryDescriptor) -> QueryResult<CompiledQuery> {
        let mut sql = SqlBuilder::new(self.placeholder_style());
        sql.push("select exists(");
        self.compile_select_into(&mut sql, query)?;
        sql.push(") as ").push(self.wrap_segment("exists"));
        Ok(sql.build())
    }

    /// Compile an insert of one or more rows sharing the same columns.
    fn compile_insert(&self, query: &QueryDescriptor, rows: &[IndexMap<String, Value>]) -> QueryResult<CompiledQuery> {
        let mut sql = SqlBuilder::new(self.placeholder_style());
        self.compile_insert_into(&mut sql, query, rows)?;
        Ok(sql.build())
    }

    /// Write an insert statement into a builder.
    fn compile_insert_into(
        &self,
        sql: &mut SqlBuilder,
        query: &QueryDescriptor,
        rows: &[IndexMap<String, Value>],
    ) -> QueryResult<()> {
        let table = query
            .table
            .as_deref()
            .ok_or_else(|| QueryError::incomplete("insert without a table"))?;
        sql.push("insert into ").push(self.wrap_table(table));

        let Some(first) = rows.first() else {
            return Err(QueryError::incomplete("insert without rows"));
        };
        if first.is_empty() {
            sql.push(self.compile_empty_insert());
            return Ok(());
        }

        let columns: Vec<String> = first.keys().cloned().collect();
        sql.push(" (").push(self.columnize(&columns)).push(") values ");
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(c)) {
                return Err(QueryError::incomplete(format!(
                    "insert row {} does not have the same columns as the first row",
                    i + 1
                )));
            }
            if i > 0 {
                sql.push(", ");
            }
            sql.push("(");
            for (j, column) in columns.iter().enumerate() {
                if j > 0 {
                    sql.push(", ");
                }
                sql.push_param(row[column].clone());
            }
            sql.push(")");
        }
        Ok(())
    }

    /// Suffix for an insert without columns.
    fn compile_empty_insert(&self) -> &'static str {
        " default values"
    }

    /// Whether [`QueryGrammar::compile_insert_get_id`] returns the key as a row.
    fn returns_inserted_id(&self) -> bool {
        false
    }

    /// Compile an insert that reports the new key. Dialects with `returning`
    /// append it; others rely on the driver's last insert id.
    fn compile_insert_get_id(
        &self,
        query: &QueryDescriptor,
        values: &IndexMap<String, Value>,
        _key: &str,
    ) -> QueryResult<CompiledQuery> {
        self.compile_insert(query, std::slice::from_ref(values))
    }

    /// Compile an upsert.
    ///
    /// `unique_by` names the conflict target; `insert` values are bound before
    /// `update` values. An empty `update` map turns the statement into an
    /// insert-or-ignore.
    fn compile_upsert(
        &self,
        query: &QueryDescriptor,
        insert: &IndexMap<String, Value>,
        unique_by: &[String],
        update: &IndexMap<String, Value>,
    ) -> QueryResult<CompiledQuery> {
        if unique_by.is_empty() {
            return Err(QueryError::incomplete("upsert without a unique column"));
        }
        let mut sql = SqlBuilder::new(self.placeholder_style());
        self.compile_insert_into(&mut sql, query, std::slice::from_ref(insert))?;
        sql.push(" on conflict (").push(self.columnize(unique_by)).push(")");
        if update.is_empty() {
            sql.push(" do nothing");
        } else {
            sql.push(" do update set ");
            for (i, (column, value)) in update.iter().enumerate() {
                if i > 0 {
                    sql.push(", ");
                }
                sql.push(format!("{} = ", self.wrap(column))).push_param(value.clone());
            }
        }
        Ok(sql.build())
    }

    /// Compile an update.
    fn compile_update(
        &self,
        query: &QueryDescriptor,
        values: &IndexMap<String, Assignment>,
    ) -> QueryResult<CompiledQuery> {
        let table = query
            .table
            .as_deref()
            .ok_or_else(|| QueryError::incomplete("update without a table"))?;
        if values.is_empty() {
            return Err(QueryError::incomplete("update without values"));
        }

        let mut sql = SqlBuilder::new(self.placeholder_style());
        sql.push("update ").push(self.wrap_table(table));

        let restricted = !query.joins.is_empty() || query.limit.is_some();
        let native = self.row_id_column().is_none();
        if native {
            self.compile_joins(&mut sql, &query.joins)?;
        }

        sql.push(" set ");
        for (i, (column, assignment)) in values.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            // Postgres and SQLite reject qualified assignment targets.
            let target = if native {
                self.wrap(column)
            } else {
                self.wrap_segment(column.rsplit('.').next().unwrap_or(column))
            };
            match assignment {
                Assignment::Value(value) => {
                    sql.push(format!("{} = ", target)).push_param(value.clone());
                }
                Assignment::Add(amount) => {
                    sql.push(format!("{} = {} + ", target, self.wrap(column)))
                        .push_param(amount.clone());
                }
            }
        }

        self.compile_restriction(&mut sql, query, restricted && !native)?;
        Ok(sql.build())
    }

    /// Compile a delete.
    fn compile_delete(&self, query: &QueryDescriptor) -> QueryResult<CompiledQuery> {
        let table = query
            .table
            .as_deref()
            .ok_or_else(|| QueryError::incomplete("delete without a table"))?;
        let mut sql = SqlBuilder::new(self.placeholder_style());
        let restricted = !query.joins.is_empty() || query.limit.is_some();
        let native = self.row_id_column().is_none();

        if native && !query.joins.is_empty() {
            let target = split_alias(table).map_or(table, |(_, alias)| alias);
            sql.push(format!("delete {} from {}", self.wrap_table(target), self.wrap_table(table)));
            self.compile_joins(&mut sql, &query.joins)?;
        } else {
            sql.push("delete from ").push(self.wrap_table(table));
        }

        self.compile_restriction(&mut sql, query, restricted && !native)?;
        Ok(sql.build())
    }

    /// Write the where, order and limit of an update or delete. With `emulate`,
    /// the restriction becomes `row_id in (select row_id ...)`.
    fn compile_restriction(&self, sql: &mut SqlBuilder, query: &QueryDescriptor, emulate: bool) -> QueryResult<()> {
        match (emulate, self.row_id_column()) {
            (true, Some(row_id)) => {
                let mut inner = query.clone();
                inner.columns = vec![Selection::Column(row_id.to_string())];
                if let Some(table) = inner.table.as_deref() {
                    let qualifier = split_alias(table).map_or(table, |(_, alias)| alias);
                    inner.columns = vec![Selection::Column(format!("{}.{}", qualifier, row_id))];
                }
                inner.lock = None;
                sql.push(format!(" where {} in (", row_id));
                self.compile_select_into(sql, &inner)?;
                sql.push(")");
            }
            _ => {
                self.compile_wheres(sql, &query.wheres)?;
                if self.row_id_column().is_none() {
                    self.compile_orders(sql, &query.orders);
                    if let Some(limit) = query.limit {
                        sql.push(format!(" limit {}", limit));
                    }
                }
            }
        }
        Ok(())
    }

    /// Compile the statements that empty a table.
    fn compile_truncate(&self, query: &QueryDescriptor) -> QueryResult<Vec<CompiledQuery>> {
        let table = query
            .table
            .as_deref()
            .ok_or_else(|| QueryError::incomplete("truncate without a table"))?;
        Ok(vec![CompiledQuery::raw(format!("truncate table {}", self.wrap_table(table)))])
    }

    /// Statements resetting an auto-increment sequence after a truncate emulated
    /// with `delete`: a guard select returning one boolean, and the reset itself,
    /// run only when the guard is true.
    fn compile_sequence_reset(&self, _table: &str) -> Option<(CompiledQuery, CompiledQuery)> {
        None
    }
}

/// Split `expr as alias` (case-insensitive `as`).
pub fn split_alias(value: &str) -> Option<(&str, &str)> {
    let lower = value.to_ascii_lowercase();
    lower
        .find(" as ")
        .map(|pos| (value[..pos].trim(), value[pos + 4..].trim()))
}

fn is_empty_group(clause: &Where) -> bool {
    matches!(clause, Where::Nested { wheres, .. } if wheres.iter().all(is_empty_group))
}

/// Build a `$."a"."b"[0]` JSON path for `json_extract`.
pub(crate) fn json_path(path: &[&str]) -> String {
    let mut out = String::from("$");
    for segment in path {
        let segment = segment.trim_matches(|c| c == '\'' || c == '"');
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            out.push_str(&format!("[{}]", segment));
        } else {
            out.push_str(&format!(".\"{}\"", segment.replace('\'', "''")));
        }
    }
    out
}
