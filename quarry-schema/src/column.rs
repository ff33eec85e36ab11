//! Column definitions and their fluent modifiers.

use quarry_query::Value;
use serde::{Deserialize, Serialize};

/// Semantic column type, mapped to a concrete type by each schema grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// 1-byte integer.
    TinyInteger,
    /// 2-byte integer.
    SmallInteger,
    /// 4-byte integer.
    Integer,
    /// 8-byte integer.
    BigInteger,
    /// Exact numeric.
    Decimal {
        /// Total digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Fixed-length string.
    Char(u32),
    /// Variable-length string.
    String(u32),
    /// Text.
    Text,
    /// Medium text (MySQL `mediumtext`).
    MediumText,
    /// Long text (MySQL `longtext`).
    LongText,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time without zone.
    DateTime,
    /// Timestamp.
    Timestamp,
    /// UUID.
    Uuid,
    /// ULID, stored as 26 characters and generated on insert when absent.
    Ulid,
    /// JSON document, or text where the dialect has no JSON type.
    Json,
    /// String restricted to a set of values.
    Enum(Vec<String>),
    /// Binary blob.
    Binary,
}

impl ColumnType {
    /// Integer family.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::TinyInteger | Self::SmallInteger | Self::Integer | Self::BigInteger
        )
    }

    /// Any numeric type that accepts `unsigned`.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Self::Decimal { .. } | Self::Float | Self::Double)
    }
}

/// A column default.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    /// A literal value, rendered by the grammar.
    Value(Value),
    /// A raw SQL expression, emitted as-is.
    Expression(String),
}

/// A column and its modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Semantic type.
    pub column_type: ColumnType,
    /// `null` allowed.
    pub nullable: bool,
    /// Default value.
    pub default: Option<ColumnDefault>,
    /// Unsigned numeric (MySQL only).
    pub unsigned: bool,
    /// Auto-increment; implies primary key.
    pub auto_increment: bool,
    /// Inline primary key.
    pub primary: bool,
    /// Create a unique index on this column.
    pub unique: bool,
    /// Create a plain index on this column.
    pub index: bool,
    /// Column comment.
    pub comment: Option<String>,
    /// Default to the current timestamp.
    pub use_current: bool,
    /// Modify an existing column instead of adding one.
    pub change: bool,
}

impl ColumnDefinition {
    /// Create a non-null column without modifiers.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            default: None,
            unsigned: false,
            auto_increment: false,
            primary: false,
            unique: false,
            index: false,
            comment: None,
            use_current: false,
            change: false,
        }
    }

    /// Allow `null`.
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    /// Set a literal default.
    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    /// Set a raw default expression.
    pub fn default_raw(&mut self, expression: impl Into<String>) -> &mut Self {
        self.default = Some(ColumnDefault::Expression(expression.into()));
        self
    }

    /// Mark as unsigned.
    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    /// Mark as auto-increment primary key.
    pub fn auto_increment(&mut self) -> &mut Self {
        self.auto_increment = true;
        self
    }

    /// Mark as primary key.
    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    /// Add a unique index.
    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    /// Add a plain index.
    pub fn index(&mut self) -> &mut Self {
        self.index = true;
        self
    }

    /// Attach a comment.
    pub fn comment(&mut self, comment: impl Into<String>) -> &mut Self {
        self.comment = Some(comment.into());
        self
    }

    /// Default to `CURRENT_TIMESTAMP`.
    pub fn use_current(&mut self) -> &mut Self {
        self.use_current = true;
        self
    }

    /// Modify the existing column rather than add it.
    pub fn change(&mut self) -> &mut Self {
        self.change = true;
        self
    }
}
