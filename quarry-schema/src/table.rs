//! Table blueprints.
//!
//! A [`Table`] records columns and structural commands in the order they are
//! declared. The schema grammar replays [`Table::commands`] in that order, so a
//! column added early in a blueprint can be indexed or renamed later in the same
//! blueprint.
//!
//! ```rust
//! use quarry_schema::{ReferentialAction, Table};
//!
//! let mut table = Table::create("posts");
//! table.id();
//! table.foreign_id("user_id");
//! table.string("title", 200).index();
//! table.json("meta").nullable();
//! table.timestamps();
//! table
//!     .foreign(&["user_id"])
//!     .references(&["id"])
//!     .on("users")
//!     .on_delete(ReferentialAction::Cascade);
//!
//! assert_eq!(table.columns().len(), 6);
//! ```

use crate::column::{ColumnDefinition, ColumnType};
use crate::trigger::Trigger;
use serde::{Deserialize, Serialize};

/// Kind of index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Primary key.
    Primary,
    /// Unique index.
    Unique,
    /// Plain index.
    Index,
}

impl IndexKind {
    /// Suffix used in generated index names.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Unique => "unique",
            Self::Index => "index",
        }
    }
}

/// An index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Kind.
    pub kind: IndexKind,
    /// Index name, prefixed.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<String>,
}

impl IndexDefinition {
    /// Override the generated name.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }
}

/// Action taken on child rows when the parent row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    /// Apply the change to the child rows.
    Cascade,
    /// Set the child columns to `null`.
    SetNull,
    /// Refuse the change.
    Restrict,
    /// Refuse the change at the end of the statement.
    #[default]
    NoAction,
}

impl ReferentialAction {
    /// SQL keywords.
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "cascade",
            Self::SetNull => "set null",
            Self::Restrict => "restrict",
            Self::NoAction => "no action",
        }
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name, prefixed.
    pub name: String,
    /// Local columns.
    pub columns: Vec<String>,
    /// Referenced columns.
    pub references: Vec<String>,
    /// Referenced table, without the prefix.
    pub on: String,
    /// Delete action.
    pub on_delete: Option<ReferentialAction>,
    /// Update action.
    pub on_update: Option<ReferentialAction>,
}

impl ForeignKey {
    /// Referenced columns.
    pub fn references(&mut self, columns: &[&str]) -> &mut Self {
        self.references = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Referenced table.
    pub fn on(&mut self, table: impl Into<String>) -> &mut Self {
        self.on = table.into();
        self
    }

    /// Delete action.
    pub fn on_delete(&mut self, action: ReferentialAction) -> &mut Self {
        self.on_delete = Some(action);
        self
    }

    /// Shorthand for `on_delete(ReferentialAction::Cascade)`.
    pub fn cascade_on_delete(&mut self) -> &mut Self {
        self.on_delete(ReferentialAction::Cascade)
    }

    /// Update action.
    pub fn on_update(&mut self, action: ReferentialAction) -> &mut Self {
        self.on_update = Some(action);
        self
    }

    /// Override the generated name.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Name of the trigger emulating the delete action.
    pub fn trigger_name(&self) -> String {
        format!("{}_on_delete", self.name)
    }
}

/// A structural command, replayed in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Create the table with every declared column.
    Create,
    /// Add or change the column at this position of [`Table::columns`].
    Column(usize),
    /// Drop columns.
    DropColumns(Vec<String>),
    /// Rename a column.
    RenameColumn {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Add the index at this position of [`Table::indexes`].
    Index(usize),
    /// Drop an index.
    DropIndex {
        /// Kind.
        kind: IndexKind,
        /// Name.
        name: String,
    },
    /// Add the foreign key at this position of [`Table::foreign_keys`].
    Foreign(usize),
    /// Drop a foreign key by name.
    DropForeign(String),
    /// Create the trigger at this position of [`Table::triggers`].
    Trigger(usize),
    /// Rename the table.
    Rename(String),
    /// Drop the table.
    Drop,
    /// Drop the table if it exists.
    DropIfExists,
}

/// A table blueprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    prefix: String,
    creating: bool,
    if_not_exists: bool,
    temporary: bool,
    engine: Option<String>,
    charset: Option<String>,
    collation: Option<String>,
    columns: Vec<ColumnDefinition>,
    indexes: Vec<IndexDefinition>,
    foreign_keys: Vec<ForeignKey>,
    triggers: Vec<Trigger>,
    commands: Vec<Command>,
}

impl Table {
    fn blank(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
            creating: false,
            if_not_exists: false,
            temporary: false,
            engine: None,
            charset: None,
            collation: None,
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            triggers: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Blueprint creating a table.
    pub fn create(name: impl Into<String>) -> Self {
        let mut table = Self::blank(name);
        table.creating = true;
        table.commands.push(Command::Create);
        table
    }

    /// Blueprint creating a table unless it exists. Indexes and triggers use
    /// their idempotent forms too.
    pub fn create_if_not_exists(name: impl Into<String>) -> Self {
        let mut table = Self::create(name);
        table.if_not_exists = true;
        table
    }

    /// Blueprint modifying an existing table.
    pub fn alter(name: impl Into<String>) -> Self {
        Self::blank(name)
    }

    /// Set the table prefix. Call before declaring indexes so generated names
    /// carry it.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Table name without the prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether this blueprint creates the table.
    pub fn is_creating(&self) -> bool {
        self.creating
    }

    /// Whether idempotent statements are requested.
    pub fn is_if_not_exists(&self) -> bool {
        self.if_not_exists
    }

    /// Whether the table is temporary.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Storage engine (MySQL).
    pub fn engine(&self) -> Option<&str> {
        self.engine.as_deref()
    }

    /// Character set (MySQL).
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// Collation (MySQL).
    pub fn collation(&self) -> Option<&str> {
        self.collation.as_deref()
    }

    /// Declared columns, in order.
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Columns added by this blueprint, excluding changed ones.
    pub fn added_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| !c.change)
    }

    /// Declared indexes.
    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    /// Declared foreign keys.
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Declared triggers.
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Commands in declaration order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Generated name for an index or constraint: `{prefix}{table}_{cols}_{suffix}`.
    pub fn index_name(&self, suffix: &str, columns: &[String]) -> String {
        format!("{}{}_{}_{}", self.prefix, self.name, columns.join("_"), suffix)
            .to_lowercase()
            .replace(['-', '.'], "_")
    }

    /// Index implied by a column's `unique()` or `index()` modifier.
    pub fn implied_index(&self, column: &ColumnDefinition, kind: IndexKind) -> IndexDefinition {
        let columns = vec![column.name.clone()];
        IndexDefinition {
            kind,
            name: self.index_name(kind.suffix(), &columns),
            columns,
        }
    }

    /// Use a storage engine (MySQL).
    pub fn set_engine(&mut self, engine: impl Into<String>) -> &mut Self {
        self.engine = Some(engine.into());
        self
    }

    /// Use a character set (MySQL).
    pub fn set_charset(&mut self, charset: impl Into<String>) -> &mut Self {
        self.charset = Some(charset.into());
        self
    }

    /// Use a collation (MySQL).
    pub fn set_collation(&mut self, collation: impl Into<String>) -> &mut Self {
        self.collation = Some(collation.into());
        self
    }

    /// Create a temporary table.
    pub fn temporary(&mut self) -> &mut Self {
        self.temporary = true;
        self
    }

    // Columns

    /// Add a column of any type.
    pub fn column(&mut self, name: impl Into<String>, column_type: ColumnType) -> &mut ColumnDefinition {
        let index = self.columns.len();
        self.columns.push(ColumnDefinition::new(name, column_type));
        self.commands.push(Command::Column(index));
        &mut self.columns[index]
    }

    /// Auto-incrementing big integer primary key named `id`.
    pub fn id(&mut self) -> &mut ColumnDefinition {
        self.big_increments("id")
    }

    /// Auto-incrementing unsigned integer primary key.
    pub fn increments(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer).unsigned().auto_increment()
    }

    /// Auto-incrementing unsigned big integer primary key.
    pub fn big_increments(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::BigInteger).unsigned().auto_increment()
    }

    /// 4-byte integer.
    pub fn integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer)
    }

    /// 1-byte integer.
    pub fn tiny_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::TinyInteger)
    }

    /// 2-byte integer.
    pub fn small_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::SmallInteger)
    }

    /// 8-byte integer.
    pub fn big_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::BigInteger)
    }

    /// Unsigned 4-byte integer.
    pub fn unsigned_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.integer(name).unsigned()
    }

    /// Unsigned 8-byte integer.
    pub fn unsigned_big_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.big_integer(name).unsigned()
    }

    /// Exact numeric.
    pub fn decimal(&mut self, name: impl Into<String>, precision: u32, scale: u32) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Decimal { precision, scale })
    }

    /// Single precision float.
    pub fn float(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Float)
    }

    /// Double precision float.
    pub fn double(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Double)
    }

    /// Variable-length string.
    pub fn string(&mut self, name: impl Into<String>, length: u32) -> &mut ColumnDefinition {
        self.column(name, ColumnType::String(length))
    }

    /// Fixed-length string.
    pub fn char(&mut self, name: impl Into<String>, length: u32) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Char(length))
    }

    /// Text.
    pub fn text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Text)
    }

    /// Medium text.
    pub fn medium_text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::MediumText)
    }

    /// Long text.
    pub fn long_text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::LongText)
    }

    /// Boolean.
    pub fn boolean(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Boolean)
    }

    /// Date.
    pub fn date(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Date)
    }

    /// Time.
    pub fn time(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Time)
    }

    /// Date and time.
    pub fn datetime(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::DateTime)
    }

    /// Timestamp.
    pub fn timestamp(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Timestamp)
    }

    /// Nullable `created_at` and `updated_at` timestamps.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
    }

    /// Nullable `deleted_at` timestamp.
    pub fn soft_deletes(&mut self) -> &mut ColumnDefinition {
        self.timestamp("deleted_at").nullable()
    }

    /// UUID.
    pub fn uuid(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Uuid)
    }

    /// ULID, generated on insert when the application supplies none.
    pub fn ulid(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Ulid)
    }

    /// JSON document.
    pub fn json(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Json)
    }

    /// String restricted to `allowed`.
    pub fn enumeration(&mut self, name: impl Into<String>, allowed: &[&str]) -> &mut ColumnDefinition {
        let allowed = allowed.iter().map(|v| v.to_string()).collect();
        self.column(name, ColumnType::Enum(allowed))
    }

    /// Binary blob.
    pub fn binary(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Binary)
    }

    /// Unsigned big integer meant to reference another table's `id`.
    pub fn foreign_id(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.unsigned_big_integer(name)
    }

    // Commands

    fn add_index(&mut self, kind: IndexKind, columns: &[&str]) -> &mut IndexDefinition {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let name = self.index_name(kind.suffix(), &columns);
        let index = self.indexes.len();
        self.indexes.push(IndexDefinition { kind, name, columns });
        self.commands.push(Command::Index(index));
        &mut self.indexes[index]
    }

    /// Primary key over `columns`.
    pub fn primary(&mut self, columns: &[&str]) -> &mut IndexDefinition {
        self.add_index(IndexKind::Primary, columns)
    }

    /// Unique index over `columns`.
    pub fn unique(&mut self, columns: &[&str]) -> &mut IndexDefinition {
        self.add_index(IndexKind::Unique, columns)
    }

    /// Plain index over `columns`.
    pub fn index(&mut self, columns: &[&str]) -> &mut IndexDefinition {
        self.add_index(IndexKind::Index, columns)
    }

    /// Drop one column.
    pub fn drop_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.commands.push(Command::DropColumns(vec![column.into()]));
        self
    }

    /// Drop several columns in one command.
    pub fn drop_columns(&mut self, columns: &[&str]) -> &mut Self {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        self.commands.push(Command::DropColumns(columns));
        self
    }

    /// Rename a column.
    pub fn rename_column(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.commands.push(Command::RenameColumn {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Drop the primary key.
    pub fn drop_primary(&mut self) -> &mut Self {
        let name = format!("{}{}_pkey", self.prefix, self.name);
        self.commands.push(Command::DropIndex {
            kind: IndexKind::Primary,
            name,
        });
        self
    }

    /// Drop a unique index by name.
    pub fn drop_unique(&mut self, name: impl Into<String>) -> &mut Self {
        self.commands.push(Command::DropIndex {
            kind: IndexKind::Unique,
            name: name.into(),
        });
        self
    }

    /// Drop a plain index by name.
    pub fn drop_index(&mut self, name: impl Into<String>) -> &mut Self {
        self.commands.push(Command::DropIndex {
            kind: IndexKind::Index,
            name: name.into(),
        });
        self
    }

    /// Foreign key over `columns`, referencing `id` until told otherwise.
    pub fn foreign(&mut self, columns: &[&str]) -> &mut ForeignKey {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let name = self.index_name("foreign", &columns);
        let index = self.foreign_keys.len();
        self.foreign_keys.push(ForeignKey {
            name,
            columns,
            references: vec!["id".to_string()],
            on: String::new(),
            on_delete: None,
            on_update: None,
        });
        self.commands.push(Command::Foreign(index));
        &mut self.foreign_keys[index]
    }

    /// Drop a foreign key by name.
    pub fn drop_foreign(&mut self, name: impl Into<String>) -> &mut Self {
        self.commands.push(Command::DropForeign(name.into()));
        self
    }

    /// Declare a trigger on this table.
    pub fn trigger(&mut self, name: impl Into<String>) -> &mut Trigger {
        let mut trigger = Trigger::new(name, self.name.clone());
        trigger.if_not_exists = self.if_not_exists;
        let index = self.triggers.len();
        self.triggers.push(trigger);
        self.commands.push(Command::Trigger(index));
        &mut self.triggers[index]
    }

    /// Rename the table.
    pub fn rename(&mut self, to: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Rename(to.into()));
        self
    }

    /// Drop the table.
    pub fn drop(&mut self) -> &mut Self {
        self.commands.push(Command::Drop);
        self
    }

    /// Drop the table if it exists.
    pub fn drop_if_exists(&mut self) -> &mut Self {
        self.commands.push(Command::DropIfExists);
        self
    }
}
