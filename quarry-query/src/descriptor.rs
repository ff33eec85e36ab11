//! The in-memory description of a query before compilation.
//!
//! A [`QueryDescriptor`] is plain data: the builder in [`crate::query`] appends to
//! it and a [`crate::grammar::QueryGrammar`] reads it. Nothing here knows about SQL
//! text or dialects.

use crate::value::Value;

/// Boolean connector between two predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    /// `and`
    And,
    /// `or`
    Or,
}

impl Boolean {
    /// SQL keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// A selected column or expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// A column, possibly `table.column` or `column as alias`.
    Column(String),
    /// A raw expression, never wrapped.
    Raw {
        /// SQL text with `?` markers.
        sql: String,
        /// Values for the markers.
        bindings: Vec<Value>,
    },
}

/// One predicate of a where clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    /// `column operator ?`
    Basic {
        /// Column, possibly a JSON path (`data->key`).
        column: String,
        /// Operator as written by the caller.
        operator: String,
        /// Bound value.
        value: Value,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
    /// `first operator second`, comparing two columns.
    Column {
        /// Left column.
        first: String,
        /// Operator.
        operator: String,
        /// Right column.
        second: String,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
    /// `column [not] in (?, ?)`
    In {
        /// Column.
        column: String,
        /// Values.
        values: Vec<Value>,
        /// `not in` when set.
        negated: bool,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
    /// `column [not] in (select ...)`
    InSub {
        /// Column.
        column: String,
        /// Sub-query.
        query: Box<QueryDescriptor>,
        /// `not in` when set.
        negated: bool,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
    /// `column is [not] null`
    Null {
        /// Column.
        column: String,
        /// `is not null` when set.
        negated: bool,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
    /// `column [not] between ? and ?`
    Between {
        /// Column.
        column: String,
        /// Lower bound.
        low: Value,
        /// Upper bound.
        high: Value,
        /// `not between` when set.
        negated: bool,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
    /// A parenthesised group of predicates.
    Nested {
        /// Inner predicates.
        wheres: Vec<Where>,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
    /// `[not] exists (select ...)`
    Exists {
        /// Sub-query.
        query: Box<QueryDescriptor>,
        /// `not exists` when set.
        negated: bool,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
    /// Raw SQL with `?` markers.
    Raw {
        /// SQL text.
        sql: String,
        /// Values for the markers.
        bindings: Vec<Value>,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
}

impl Where {
    /// Connector to the previous predicate.
    pub fn boolean(&self) -> Boolean {
        match self {
            Self::Basic { boolean, .. }
            | Self::Column { boolean, .. }
            | Self::In { boolean, .. }
            | Self::InSub { boolean, .. }
            | Self::Null { boolean, .. }
            | Self::Between { boolean, .. }
            | Self::Nested { boolean, .. }
            | Self::Exists { boolean, .. }
            | Self::Raw { boolean, .. } => *boolean,
        }
    }
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `inner join`
    Inner,
    /// `left join`
    Left,
    /// `right join`
    Right,
    /// `cross join`
    Cross,
}

impl JoinKind {
    /// SQL keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Cross => "cross",
        }
    }
}

/// A join clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Join type.
    pub kind: JoinKind,
    /// Joined table, possibly with an alias.
    pub table: String,
    /// `on` conditions comparing columns.
    pub conditions: Vec<JoinCondition>,
}

/// One `on` condition of a join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    /// Left column.
    pub first: String,
    /// Operator.
    pub operator: String,
    /// Right column.
    pub second: String,
    /// Connector to the previous condition.
    pub boolean: Boolean,
}

/// A having predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Having {
    /// `column operator ?`
    Basic {
        /// Column or aggregate alias.
        column: String,
        /// Operator.
        operator: String,
        /// Bound value.
        value: Value,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
    /// Raw SQL with `?` markers.
    Raw {
        /// SQL text.
        sql: String,
        /// Values for the markers.
        bindings: Vec<Value>,
        /// Connector to the previous predicate.
        boolean: Boolean,
    },
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// SQL keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// An order-by entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Order {
    /// Order by a column.
    Column {
        /// Column.
        column: String,
        /// Direction.
        direction: Direction,
    },
    /// Dialect random ordering.
    Random,
    /// Raw SQL, never wrapped.
    Raw(String),
}

/// Row locking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    /// `for update`
    Update,
    /// Shared read lock.
    Shared,
}

/// An aggregate wrapped around the select list.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Function name, e.g. `count`.
    pub function: String,
    /// Column or `*`.
    pub column: String,
}

/// Right-hand side of an update assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `column = ?`
    Value(Value),
    /// `column = column + ?`
    Add(Value),
}

/// The accumulated clauses of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescriptor {
    /// Target table, possibly with an alias.
    pub table: Option<String>,
    /// Selected columns; empty means `*`.
    pub columns: Vec<Selection>,
    /// `select distinct`
    pub distinct: bool,
    /// Joins in call order.
    pub joins: Vec<Join>,
    /// Where predicates in call order.
    pub wheres: Vec<Where>,
    /// Group-by columns.
    pub groups: Vec<String>,
    /// Having predicates.
    pub havings: Vec<Having>,
    /// Order-by entries.
    pub orders: Vec<Order>,
    /// Row limit.
    pub limit: Option<u64>,
    /// Row offset.
    pub offset: Option<u64>,
    /// Locking clause.
    pub lock: Option<Lock>,
    /// Aggregate wrapper, set when compiling `count` and friends.
    pub aggregate: Option<Aggregate>,
}

impl QueryDescriptor {
    /// Create a descriptor targeting a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }
}
