//! Fluent query builder.
//!
//! A [`Query`] accumulates clauses into a [`QueryDescriptor`] and hands it to the
//! connection's grammar when an execution method runs. Builder methods take and
//! return `self`; execution methods borrow the query, so one query can be run
//! several times.
//!
//! Operators are checked against the dialect whitelist as soon as they are
//! given. A rejected operator does not interrupt the chain: it is stored and
//! returned by every later compile or execute call.
//!
//! ```rust,ignore
//! let adults = conn
//!     .table("users")
//!     .select(["id", "name"])
//!     .where_op("age", ">=", 18)
//!     .where_nested(|q| q.r#where("role", "admin").or_where("role", "owner"))
//!     .order_by_desc("created_at")
//!     .limit(10)
//!     .get(&mut conn)?;
//! ```

use crate::connection::Connection;
use crate::descriptor::{
    Assignment, Boolean, Direction, Having, Join, JoinCondition, JoinKind, Lock, Order, QueryDescriptor,
    Selection, Where,
};
use crate::error::{QueryError, QueryResult};
use crate::grammar::QueryGrammar;
use crate::row::Row;
use crate::sql::CompiledQuery;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

/// A fluent query against one table.
#[derive(Debug)]
pub struct Query {
    descriptor: QueryDescriptor,
    grammar: Option<Arc<dyn QueryGrammar>>,
    error: Option<QueryError>,
}

impl Query {
    /// Start a query without a grammar. Operators are validated when the query is
    /// compiled. Useful for sub-queries.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            descriptor: QueryDescriptor::new(table),
            grammar: None,
            error: None,
        }
    }

    /// Start a query whose operators are validated against `grammar` immediately.
    pub fn with_grammar(table: impl Into<String>, grammar: Arc<dyn QueryGrammar>) -> Self {
        Self {
            descriptor: QueryDescriptor::new(table),
            grammar: Some(grammar),
            error: None,
        }
    }

    /// The accumulated clauses.
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// The first error recorded while building, if any.
    pub fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    fn fail(&mut self, error: QueryError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn check_operator(&mut self, operator: &str) {
        if let Some(grammar) = &self.grammar {
            if let Err(e) = grammar.validate_operator(operator) {
                self.fail(e);
            }
        }
    }

    fn check(&self) -> QueryResult<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn child(&self) -> Self {
        Self {
            descriptor: QueryDescriptor {
                table: self.descriptor.table.clone(),
                ..QueryDescriptor::default()
            },
            grammar: self.grammar.clone(),
            error: None,
        }
    }

    fn absorb(&mut self, sub: Query) -> QueryDescriptor {
        if let Some(e) = sub.error {
            self.fail(e);
        }
        sub.descriptor
    }

    // ============== Select list ==============

    /// Replace the selected columns.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.columns = columns.into_iter().map(|c| Selection::Column(c.into())).collect();
        self
    }

    /// Add columns to the select list.
    pub fn add_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor
            .columns
            .extend(columns.into_iter().map(|c| Selection::Column(c.into())));
        self
    }

    /// Add a raw expression to the select list.
    pub fn select_raw(mut self, sql: impl Into<String>, bindings: impl Into<Vec<Value>>) -> Self {
        self.descriptor.columns.push(Selection::Raw {
            sql: sql.into(),
            bindings: bindings.into(),
        });
        self
    }

    /// Select distinct rows.
    pub fn distinct(mut self) -> Self {
        self.descriptor.distinct = true;
        self
    }

    // ============== Where ==============

    fn push_basic(mut self, column: String, operator: String, value: Value, boolean: Boolean) -> Self {
        self.check_operator(&operator);
        self.descriptor.wheres.push(Where::Basic {
            column,
            operator,
            value,
            boolean,
        });
        self
    }

    /// `column = value`
    pub fn r#where(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push_basic(column.into(), "=".to_string(), value.into(), Boolean::And)
    }

    /// `column operator value`, with the operator checked against the dialect whitelist.
    pub fn where_op(self, column: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push_basic(column.into(), operator.into(), value.into(), Boolean::And)
    }

    /// `or column = value`
    pub fn or_where(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push_basic(column.into(), "=".to_string(), value.into(), Boolean::Or)
    }

    /// `or column operator value`
    pub fn or_where_op(
        self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.push_basic(column.into(), operator.into(), value.into(), Boolean::Or)
    }

    /// A raw predicate whose `?` markers bind `bindings` in order.
    pub fn where_raw(mut self, sql: impl Into<String>, bindings: impl Into<Vec<Value>>) -> Self {
        self.descriptor.wheres.push(Where::Raw {
            sql: sql.into(),
            bindings: bindings.into(),
            boolean: Boolean::And,
        });
        self
    }

    /// `or` a raw predicate.
    pub fn or_where_raw(mut self, sql: impl Into<String>, bindings: impl Into<Vec<Value>>) -> Self {
        self.descriptor.wheres.push(Where::Raw {
            sql: sql.into(),
            bindings: bindings.into(),
            boolean: Boolean::Or,
        });
        self
    }

    fn push_in<I, V>(mut self, column: String, values: I, negated: bool, boolean: Boolean) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.descriptor.wheres.push(Where::In {
            column,
            values: values.into_iter().map(Into::into).collect(),
            negated,
            boolean,
        });
        self
    }

    /// `column in (values)`
    pub fn where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column.into(), values, false, Boolean::And)
    }

    /// `column not in (values)`
    pub fn where_not_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column.into(), values, true, Boolean::And)
    }

    /// `or column in (values)`
    pub fn or_where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column.into(), values, false, Boolean::Or)
    }

    fn push_in_sub(mut self, column: String, sub: Query, negated: bool) -> Self {
        let query = Box::new(self.absorb(sub));
        self.descriptor.wheres.push(Where::InSub {
            column,
            query,
            negated,
            boolean: Boolean::And,
        });
        self
    }

    /// `column in (select ...)`
    pub fn where_in_sub(self, column: impl Into<String>, sub: Query) -> Self {
        self.push_in_sub(column.into(), sub, false)
    }

    /// `column not in (select ...)`
    pub fn where_not_in_sub(self, column: impl Into<String>, sub: Query) -> Self {
        self.push_in_sub(column.into(), sub, true)
    }

    fn push_null(mut self, column: String, negated: bool, boolean: Boolean) -> Self {
        self.descriptor.wheres.push(Where::Null {
            column,
            negated,
            boolean,
        });
        self
    }

    /// `column is null`
    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.push_null(column.into(), false, Boolean::And)
    }

    /// `column is not null`
    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.push_null(column.into(), true, Boolean::And)
    }

    /// `or column is null`
    pub fn or_where_null(self, column: impl Into<String>) -> Self {
        self.push_null(column.into(), false, Boolean::Or)
    }

    fn push_between(mut self, column: String, low: Value, high: Value, negated: bool) -> Self {
        self.descriptor.wheres.push(Where::Between {
            column,
            low,
            high,
            negated,
            boolean: Boolean::And,
        });
        self
    }

    /// `column between low and high`
    pub fn where_between(self, column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_between(column.into(), low.into(), high.into(), false)
    }

    /// `column not between low and high`
    pub fn where_not_between(
        self,
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_between(column.into(), low.into(), high.into(), true)
    }

    fn push_column(mut self, first: String, operator: String, second: String, boolean: Boolean) -> Self {
        self.check_operator(&operator);
        self.descriptor.wheres.push(Where::Column {
            first,
            operator,
            second,
            boolean,
        });
        self
    }

    /// Compare two columns.
    pub fn where_column(
        self,
        first: impl Into<String>,
        operator: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        self.push_column(first.into(), operator.into(), second.into(), Boolean::And)
    }

    /// `or` compare two columns.
    pub fn or_where_column(
        self,
        first: impl Into<String>,
        operator: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        self.push_column(first.into(), operator.into(), second.into(), Boolean::Or)
    }

    fn push_nested<F>(mut self, build: F, boolean: Boolean) -> Self
    where
        F: FnOnce(Query) -> Query,
    {
        let group = build(self.child());
        let wheres = self.absorb(group).wheres;
        self.descriptor.wheres.push(Where::Nested { wheres, boolean });
        self
    }

    /// A parenthesised group built by `build`.
    pub fn where_nested<F>(self, build: F) -> Self
    where
        F: FnOnce(Query) -> Query,
    {
        self.push_nested(build, Boolean::And)
    }

    /// `or` a parenthesised group built by `build`.
    pub fn or_where_nested<F>(self, build: F) -> Self
    where
        F: FnOnce(Query) -> Query,
    {
        self.push_nested(build, Boolean::Or)
    }

    fn push_exists(mut self, sub: Query, negated: bool) -> Self {
        let query = Box::new(self.absorb(sub));
        self.descriptor.wheres.push(Where::Exists {
            query,
            negated,
            boolean: Boolean::And,
        });
        self
    }

    /// `exists (select ...)`
    pub fn where_exists(self, sub: Query) -> Self {
        self.push_exists(sub, false)
    }

    /// `not exists (select ...)`
    pub fn where_not_exists(self, sub: Query) -> Self {
        self.push_exists(sub, true)
    }

    // ============== Joins ==============

    fn push_join(mut self, kind: JoinKind, table: String, condition: Option<(String, String, String)>) -> Self {
        let conditions = match condition {
            Some((first, operator, second)) => {
                self.check_operator(&operator);
                vec![JoinCondition {
                    first,
                    operator,
                    second,
                    boolean: Boolean::And,
                }]
            }
            None => Vec::new(),
        };
        self.descriptor.joins.push(Join { kind, table, conditions });
        self
    }

    /// `inner join table on first operator second`
    pub fn join(
        self,
        table: impl Into<String>,
        first: impl Into<String>,
        operator: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        self.push_join(
            JoinKind::Inner,
            table.into(),
            Some((first.into(), operator.into(), second.into())),
        )
    }

    /// `left join table on first operator second`
    pub fn left_join(
        self,
        table: impl Into<String>,
        first: impl Into<String>,
        operator: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        self.push_join(
            JoinKind::Left,
            table.into(),
            Some((first.into(), operator.into(), second.into())),
        )
    }

    /// `right join table on first operator second`
    pub fn right_join(
        self,
        table: impl Into<String>,
        first: impl Into<String>,
        operator: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        self.push_join(
            JoinKind::Right,
            table.into(),
            Some((first.into(), operator.into(), second.into())),
        )
    }

    /// `cross join table`
    pub fn cross_join(self, table: impl Into<String>) -> Self {
        self.push_join(JoinKind::Cross, table.into(), None)
    }

    // ============== Grouping and ordering ==============

    /// Group by columns.
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    /// `having column operator value`
    pub fn having(mut self, column: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        let operator = operator.into();
        self.check_operator(&operator);
        self.descriptor.havings.push(Having::Basic {
            column: column.into(),
            operator,
            value: value.into(),
            boolean: Boolean::And,
        });
        self
    }

    /// `or having column operator value`
    pub fn or_having(
        mut self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let operator = operator.into();
        self.check_operator(&operator);
        self.descriptor.havings.push(Having::Basic {
            column: column.into(),
            operator,
            value: value.into(),
            boolean: Boolean::Or,
        });
        self
    }

    /// A raw having predicate.
    pub fn having_raw(mut self, sql: impl Into<String>, bindings: impl Into<Vec<Value>>) -> Self {
        self.descriptor.havings.push(Having::Raw {
            sql: sql.into(),
            bindings: bindings.into(),
            boolean: Boolean::And,
        });
        self
    }

    /// Order ascending by a column.
    pub fn order_by(self, column: impl Into<String>) -> Self {
        self.order_by_direction(column, Direction::Asc)
    }

    /// Order descending by a column.
    pub fn order_by_desc(self, column: impl Into<String>) -> Self {
        self.order_by_direction(column, Direction::Desc)
    }

    /// Order by a column in the given direction.
    pub fn order_by_direction(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.descriptor.orders.push(Order::Column {
            column: column.into(),
            direction,
        });
        self
    }

    /// Order by a raw expression.
    pub fn order_by_raw(mut self, sql: impl Into<String>) -> Self {
        self.descriptor.orders.push(Order::Raw(sql.into()));
        self
    }

    /// Newest first by `created_at`.
    pub fn latest(self) -> Self {
        self.order_by_desc("created_at")
    }

    /// Oldest first by `created_at`.
    pub fn oldest(self) -> Self {
        self.order_by("created_at")
    }

    /// Random order.
    pub fn in_random_order(mut self) -> Self {
        self.descriptor.orders.push(Order::Random);
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.descriptor.limit = Some(limit);
        self
    }

    /// Skip rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.descriptor.offset = Some(offset);
        self
    }

    /// Limit and offset for a 1-based page.
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        self.offset(page.saturating_sub(1).saturating_mul(per_page)).limit(per_page)
    }

    /// Lock selected rows for update.
    pub fn lock_for_update(mut self) -> Self {
        self.descriptor.lock = Some(Lock::Update);
        self
    }

    /// Take a shared lock on selected rows.
    pub fn shared_lock(mut self) -> Self {
        self.descriptor.lock = Some(Lock::Shared);
        self
    }

    // ============== Compilation ==============

    /// Compile the select statement for inspection.
    pub fn to_sql(&self, grammar: &dyn QueryGrammar) -> QueryResult<CompiledQuery> {
        self.check()?;
        grammar.compile_select(&self.descriptor)
    }

    // ============== Execution ==============

    /// Run the select and return all rows.
    pub fn get(&self, conn: &mut Connection) -> QueryResult<Vec<Row>> {
        self.check()?;
        let compiled = conn.grammar().compile_select(&self.descriptor)?;
        conn.select_compiled(&compiled)
    }

    /// Run the select with `limit 1` and return the first row.
    pub fn first(&self, conn: &mut Connection) -> QueryResult<Option<Row>> {
        self.check()?;
        let mut descriptor = self.descriptor.clone();
        descriptor.limit = Some(1);
        let compiled = conn.grammar().compile_select(&descriptor)?;
        Ok(conn.select_compiled(&compiled)?.into_iter().next())
    }

    /// Find a row by its `id` column.
    pub fn find(&self, conn: &mut Connection, id: impl Into<Value>) -> QueryResult<Option<Row>> {
        self.check()?;
        let mut descriptor = self.descriptor.clone();
        descriptor.wheres.push(Where::Basic {
            column: "id".to_string(),
            operator: "=".to_string(),
            value: id.into(),
            boolean: Boolean::And,
        });
        descriptor.limit = Some(1);
        let compiled = conn.grammar().compile_select(&descriptor)?;
        Ok(conn.select_compiled(&compiled)?.into_iter().next())
    }

    /// A single column of the first row.
    pub fn value(&self, conn: &mut Connection, column: impl Into<String>) -> QueryResult<Option<Value>> {
        self.check()?;
        let mut descriptor = self.descriptor.clone();
        descriptor.columns = vec![Selection::Column(column.into())];
        descriptor.limit = Some(1);
        let compiled = conn.grammar().compile_select(&descriptor)?;
        Ok(conn
            .select_compiled(&compiled)?
            .into_iter()
            .next()
            .and_then(|row| row.get_index(0).cloned()))
    }

    /// One column of every row.
    pub fn pluck(&self, conn: &mut Connection, column: impl Into<String>) -> QueryResult<Vec<Value>> {
        self.check()?;
        let mut descriptor = self.descriptor.clone();
        descriptor.columns = vec![Selection::Column(column.into())];
        let compiled = conn.grammar().compile_select(&descriptor)?;
        Ok(conn
            .select_compiled(&compiled)?
            .into_iter()
            .filter_map(|row| row.get_index(0).cloned())
            .collect())
    }

    /// Count matching rows.
    pub fn count(&self, conn: &mut Connection) -> QueryResult<i64> {
        self.check()?;
        let compiled = conn.grammar().compile_count(&self.descriptor, "*")?;
        let row = conn.select_compiled(&compiled)?.into_iter().next();
        // Pretended statements return no rows.
        match row {
            Some(row) => row.get_i64("aggregate"),
            None => Ok(0),
        }
    }

    /// Whether any row matches.
    pub fn exists(&self, conn: &mut Connection) -> QueryResult<bool> {
        self.check()?;
        let compiled = conn.grammar().compile_exists(&self.descriptor)?;
        let row = conn.select_compiled(&compiled)?.into_iter().next();
        Ok(row
            .and_then(|row| row.get_index(0).and_then(Value::as_bool))
            .unwrap_or(false))
    }

    /// Insert one row.
    pub fn insert<I, K, V>(&self, conn: &mut Connection, values: I) -> QueryResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.insert_many(conn, [values])
    }

    /// Insert several rows with the same columns in one statement.
    pub fn insert_many<R, I, K, V>(&self, conn: &mut Connection, rows: R) -> QueryResult<u64>
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.check()?;
        let rows: Vec<IndexMap<String, Value>> = rows.into_iter().map(to_map).collect();
        let compiled = conn.grammar().compile_insert(&self.descriptor, &rows)?;
        conn.execute_compiled(&compiled)
    }

    /// Insert one row and return its generated `id`.
    pub fn insert_get_id<I, K, V>(&self, conn: &mut Connection, values: I) -> QueryResult<i64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.check()?;
        let values = to_map(values);
        let grammar = conn.grammar().clone();
        let compiled = grammar.compile_insert_get_id(&self.descriptor, &values, "id")?;

        let id = if grammar.returns_inserted_id() {
            conn.select_compiled(&compiled)?
                .into_iter()
                .next()
                .and_then(|row| row.get_index(0).and_then(Value::as_i64))
        } else {
            conn.execute_compiled(&compiled)?;
            conn.last_insert_id()?
        };
        if conn.pretending() {
            return Ok(0);
        }
        id.ok_or_else(|| QueryError::database("insert did not report a generated id").with_sql(compiled.sql))
    }

    /// Update matching rows.
    pub fn update<I, K, V>(&self, conn: &mut Connection, values: I) -> QueryResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let assignments = values
            .into_iter()
            .map(|(k, v)| (k.into(), Assignment::Value(v.into())))
            .collect();
        self.run_update(conn, assignments)
    }

    /// Add `amount` to a column of matching rows.
    pub fn increment(&self, conn: &mut Connection, column: impl Into<String>, amount: impl Into<Value>) -> QueryResult<u64> {
        let assignments = IndexMap::from([(column.into(), Assignment::Add(amount.into()))]);
        self.run_update(conn, assignments)
    }

    /// Subtract `amount` from a column of matching rows.
    pub fn decrement(&self, conn: &mut Connection, column: impl Into<String>, amount: impl Into<Value>) -> QueryResult<u64> {
        let amount = match amount.into() {
            Value::Int(i) => match i.checked_neg() {
                Some(negated) => Value::Int(negated),
                None => {
                    return Err(QueryError::invalid_data_type(format!(
                        "cannot decrement by {}: the negated amount overflows",
                        i
                    )));
                }
            },
            Value::Float(f) => Value::Float(-f),
            other => {
                return Err(QueryError::invalid_data_type(format!(
                    "decrement needs a numeric amount, got {}",
                    other.kind()
                )));
            }
        };
        let assignments = IndexMap::from([(column.into(), Assignment::Add(amount))]);
        self.run_update(conn, assignments)
    }

    fn run_update(&self, conn: &mut Connection, assignments: IndexMap<String, Assignment>) -> QueryResult<u64> {
        self.check()?;
        let compiled = conn.grammar().compile_update(&self.descriptor, &assignments)?;
        conn.execute_compiled(&compiled)
    }

    /// Delete matching rows.
    pub fn delete(&self, conn: &mut Connection) -> QueryResult<u64> {
        self.check()?;
        let compiled = conn.grammar().compile_delete(&self.descriptor)?;
        conn.execute_compiled(&compiled)
    }

    /// Remove every row and reset the table's auto-increment counter.
    pub fn truncate(&self, conn: &mut Connection) -> QueryResult<()> {
        self.check()?;
        let grammar = conn.grammar().clone();
        for statement in grammar.compile_truncate(&self.descriptor)? {
            conn.execute_compiled(&statement)?;
        }
        let table = self.descriptor.table.as_deref().unwrap_or_default();
        if let Some((guard, reset)) = grammar.compile_sequence_reset(table) {
            let present = conn
                .select_compiled(&guard)?
                .into_iter()
                .next()
                .and_then(|row| row.get_index(0).and_then(Value::as_bool))
                .unwrap_or(false);
            if present {
                conn.execute_compiled(&reset)?;
            }
        }
        debug!(table = %table, "Table truncated");
        Ok(())
    }

    /// Insert a row, or update `update` columns when a row with the same
    /// `unique_by` values exists. An empty `update` keeps the existing row.
    pub fn upsert<I, K, V, U, UK, UV, C, S>(
        &self,
        conn: &mut Connection,
        values: I,
        unique_by: C,
        update: U,
    ) -> QueryResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
        U: IntoIterator<Item = (UK, UV)>,
        UK: Into<String>,
        UV: Into<Value>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check()?;
        let values = to_map(values);
        let update = to_map(update);
        let unique_by: Vec<String> = unique_by.into_iter().map(Into::into).collect();
        let compiled = conn
            .grammar()
            .compile_upsert(&self.descriptor, &values, &unique_by, &update)?;
        conn.execute_compiled(&compiled)
    }
}

fn to_map<I, K, V>(values: I) -> IndexMap<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    values.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
