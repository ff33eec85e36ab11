//! Row-level trigger definitions.
//!
//! Triggers are declared on a [`crate::Table`] and compiled by the schema grammar
//! of the connection. The grammars also generate triggers of their own: ULID
//! defaults on MySQL and PostgreSQL, and delete-action emulation for foreign keys
//! the dialect cannot enforce.
//!
//! | Feature              | PostgreSQL        | MySQL | SQLite |
//! |----------------------|-------------------|-------|--------|
//! | BEFORE / AFTER       | yes               | yes   | yes    |
//! | INSTEAD OF           | views only        | no    | yes    |
//! | Inline statements    | no, use functions | yes   | yes    |
//! | Trigger functions    | yes               | no    | no     |
//!
//! ```rust
//! use quarry_schema::{Table, TriggerEvent};
//!
//! let mut table = Table::alter("posts");
//! table
//!     .trigger("posts_touch_author")
//!     .after(TriggerEvent::Insert)
//!     .statement("update authors set post_count = post_count + 1 where id = new.author_id");
//! ```

use quarry_query::{Dialect, QueryError, QueryResult};
use serde::{Deserialize, Serialize};

/// When the trigger fires relative to the triggering event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerTiming {
    /// Fire before the operation (can modify the new row).
    Before,
    /// Fire after the operation.
    After,
    /// Replace the operation.
    InsteadOf,
}

impl TriggerTiming {
    /// SQL keyword.
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::InsteadOf => "instead of",
        }
    }
}

/// The DML event that fires the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerEvent {
    /// `insert`
    Insert,
    /// `update`
    Update,
    /// `delete`
    Delete,
}

impl TriggerEvent {
    /// SQL keyword.
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// What runs when the trigger fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerAction {
    /// Inline statements, without trailing semicolons.
    Statements(Vec<String>),
    /// A PostgreSQL trigger function, called with `execute function name()`.
    Function(String),
}

/// A row-level trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger name, without the table prefix.
    pub name: String,
    /// Table the trigger is attached to, without the table prefix.
    pub table: String,
    /// Timing.
    pub timing: TriggerTiming,
    /// Event.
    pub event: TriggerEvent,
    /// Optional `when` condition.
    pub condition: Option<String>,
    /// Action.
    pub action: TriggerAction,
    /// Emit the idempotent form of the statement.
    pub if_not_exists: bool,
}

impl Trigger {
    /// Create an `after insert` trigger with no statements yet.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            timing: TriggerTiming::After,
            event: TriggerEvent::Insert,
            condition: None,
            action: TriggerAction::Statements(Vec::new()),
            if_not_exists: false,
        }
    }

    /// Fire before `event`.
    pub fn before(&mut self, event: TriggerEvent) -> &mut Self {
        self.timing = TriggerTiming::Before;
        self.event = event;
        self
    }

    /// Fire after `event`.
    pub fn after(&mut self, event: TriggerEvent) -> &mut Self {
        self.timing = TriggerTiming::After;
        self.event = event;
        self
    }

    /// Replace `event`.
    pub fn instead_of(&mut self, event: TriggerEvent) -> &mut Self {
        self.timing = TriggerTiming::InsteadOf;
        self.event = event;
        self
    }

    /// Only fire when `condition` holds.
    pub fn when(&mut self, condition: impl Into<String>) -> &mut Self {
        self.condition = Some(condition.into());
        self
    }

    /// Append an inline statement.
    pub fn statement(&mut self, sql: impl Into<String>) -> &mut Self {
        let sql = sql.into();
        let sql = sql.trim().trim_end_matches(';').to_string();
        match &mut self.action {
            TriggerAction::Statements(statements) => statements.push(sql),
            TriggerAction::Function(_) => self.action = TriggerAction::Statements(vec![sql]),
        }
        self
    }

    /// Call a trigger function.
    pub fn execute_function(&mut self, name: impl Into<String>) -> &mut Self {
        self.action = TriggerAction::Function(name.into());
        self
    }

    /// Emit `if not exists` (or the dialect's idempotent equivalent).
    pub fn if_not_exists(&mut self) -> &mut Self {
        self.if_not_exists = true;
        self
    }

    /// Check the definition against what `dialect` can express.
    pub fn validate(&self, dialect: Dialect) -> QueryResult<()> {
        if matches!(&self.action, TriggerAction::Statements(s) if s.is_empty()) {
            return Err(QueryError::invalid_schema(format!(
                "trigger '{}' has no statements",
                self.name
            )));
        }

        match dialect {
            Dialect::MySql => {
                if self.timing == TriggerTiming::InsteadOf {
                    return Err(QueryError::unsupported_schema(
                        "MySQL does not support INSTEAD OF triggers",
                    ));
                }
                if matches!(self.action, TriggerAction::Function(_)) {
                    return Err(QueryError::unsupported_schema(
                        "MySQL triggers cannot call trigger functions; use inline statements",
                    ));
                }
            }
            Dialect::Postgres => {
                if matches!(self.action, TriggerAction::Statements(_)) {
                    return Err(QueryError::unsupported_schema(
                        "PostgreSQL triggers must execute a trigger function",
                    )
                    .with_help("Create the function in a migration and use execute_function()"));
                }
            }
            Dialect::Sqlite => {
                if matches!(self.action, TriggerAction::Function(_)) {
                    return Err(QueryError::unsupported_schema(
                        "SQLite triggers cannot call trigger functions; use inline statements",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_query::ErrorCode;

    #[test]
    fn test_statement_trims_semicolon() {
        let mut trigger = Trigger::new("audit", "users");
        trigger.after(TriggerEvent::Update).statement("insert into audits (id) values (new.id);");
        assert_eq!(
            trigger.action,
            TriggerAction::Statements(vec!["insert into audits (id) values (new.id)".into()])
        );
        assert_eq!(trigger.timing, TriggerTiming::After);
        assert_eq!(trigger.event, TriggerEvent::Update);
    }

    #[test]
    fn test_dialect_validation() {
        let mut inline = Trigger::new("audit", "users");
        inline.statement("select 1");
        assert!(inline.validate(Dialect::Sqlite).is_ok());
        assert!(inline.validate(Dialect::MySql).is_ok());
        assert_eq!(
            inline.validate(Dialect::Postgres).unwrap_err().code,
            ErrorCode::UnsupportedSchemaOperation
        );

        let mut function = Trigger::new("audit", "users");
        function.execute_function("audit_users");
        assert!(function.validate(Dialect::Postgres).is_ok());
        assert!(function.validate(Dialect::MySql).is_err());

        let mut instead = Trigger::new("audit", "users_view");
        instead.instead_of(TriggerEvent::Insert).statement("select 1");
        assert!(instead.validate(Dialect::MySql).is_err());
    }

    #[test]
    fn test_empty_trigger_is_invalid() {
        let trigger = Trigger::new("noop", "users");
        assert_eq!(
            trigger.validate(Dialect::Sqlite).unwrap_err().code,
            ErrorCode::InvalidSchema
        );
    }
}
