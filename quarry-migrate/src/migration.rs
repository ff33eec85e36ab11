//! Migration units and discovery.
//!
//! A unit is anything implementing [`Migration`]. Units written in Rust
//! implement the trait directly; [`SqlMigration`] loads one from a directory:
//!
//! ```text
//! migrations/
//!   2024_01_01_000000_create_users/
//!     up.sql
//!     down.sql          (optional)
//!     migration.toml    (optional: connection = "audit", transaction = false)
//! ```
//!
//! Unit names start with a timestamp (`YYYY_MM_DD_HHMMSS`, `YYYY_MM_DD` or
//! fourteen digits) and are run in lexicographic order.

use crate::error::{MigrateResult, MigrationError};
use quarry_query::{Connection, QueryResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One reversible schema change.
pub trait Migration: Send + Sync {
    /// Unique name, beginning with its timestamp.
    fn name(&self) -> &str;

    /// Apply the change.
    fn up(&self, conn: &mut Connection) -> QueryResult<()>;

    /// Revert the change.
    fn down(&self, conn: &mut Connection) -> QueryResult<()>;

    /// Connection to run on instead of the migrator's.
    fn connection(&self) -> Option<&str> {
        None
    }

    /// Whether to wrap `up`/`down` in a transaction.
    fn use_transaction(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for dyn Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration").field("name", &self.name()).finish_non_exhaustive()
    }
}

/// Split a unit name into its timestamp prefix and description.
///
/// Accepts `2024_01_31_120000_name`, `2024_01_31_name` and `20240131120000_name`.
pub fn parse_migration_name(name: &str) -> MigrateResult<(&str, &str)> {
    fn digits(s: &str, n: usize) -> bool {
        s.len() == n && s.bytes().all(|b| b.is_ascii_digit())
    }

    let parts: Vec<&str> = name.splitn(5, '_').collect();

    let split = match parts.as_slice() {
        [y, m, d, t, rest] if digits(y, 4) && digits(m, 2) && digits(d, 2) && digits(t, 6) && !rest.is_empty() => {
            Some(y.len() + m.len() + d.len() + t.len() + 3)
        }
        [y, m, d, ..] if digits(y, 4) && digits(m, 2) && digits(d, 2) && parts.len() > 3 => {
            Some(y.len() + m.len() + d.len() + 2)
        }
        [stamp, ..] if digits(stamp, 14) && parts.len() > 1 => Some(stamp.len()),
        _ => None,
    };

    match split {
        Some(at) if at + 1 < name.len() => Ok((&name[..at], &name[at + 1..])),
        _ => Err(MigrationError::invalid(format!(
            "'{}' must start with a timestamp such as 2024_01_31_120000_",
            name
        ))),
    }
}

/// Optional per-unit settings read from `migration.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationManifest {
    /// Connection override.
    pub connection: Option<String>,
    /// Whether to wrap the unit in a transaction.
    pub transaction: bool,
}

impl Default for MigrationManifest {
    fn default() -> Self {
        Self {
            connection: None,
            transaction: true,
        }
    }
}

/// A migration loaded from a directory of SQL files.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    name: String,
    path: PathBuf,
    up_sql: String,
    down_sql: Option<String>,
    manifest: MigrationManifest,
}

impl SqlMigration {
    /// Build a unit from SQL text.
    pub fn new(name: impl Into<String>, up_sql: impl Into<String>, down_sql: Option<String>) -> MigrateResult<Self> {
        let name = name.into();
        parse_migration_name(&name)?;
        Ok(Self {
            name,
            path: PathBuf::new(),
            up_sql: up_sql.into(),
            down_sql,
            manifest: MigrationManifest::default(),
        })
    }

    /// Load a unit from its directory.
    pub fn load(dir: &Path) -> MigrateResult<Self> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrationError::invalid(format!("invalid directory name: {}", dir.display())))?;
        parse_migration_name(name)?;

        let up_sql = std::fs::read_to_string(dir.join("up.sql"))?;
        let down_path = dir.join("down.sql");
        let down_sql = if down_path.is_file() {
            Some(std::fs::read_to_string(down_path)?)
        } else {
            None
        };
        let manifest_path = dir.join("migration.toml");
        let manifest = if manifest_path.is_file() {
            toml::from_str(&std::fs::read_to_string(manifest_path)?)?
        } else {
            MigrationManifest::default()
        };

        Ok(Self {
            name: name.to_string(),
            path: dir.to_path_buf(),
            up_sql,
            down_sql,
            manifest,
        })
    }

    /// Set the manifest.
    pub fn with_manifest(mut self, manifest: MigrationManifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Directory the unit was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SQL run by `up`.
    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    /// SQL run by `down`, if any.
    pub fn down_sql(&self) -> Option<&str> {
        self.down_sql.as_deref()
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, conn: &mut Connection) -> QueryResult<()> {
        conn.unprepared(&self.up_sql)
    }

    /// Without `down.sql` reverting only removes the repository record.
    fn down(&self, conn: &mut Connection) -> QueryResult<()> {
        match &self.down_sql {
            Some(sql) => conn.unprepared(sql),
            None => {
                warn!(migration = %self.name, "No down.sql, nothing to revert");
                Ok(())
            }
        }
    }

    fn connection(&self) -> Option<&str> {
        self.manifest.connection.as_deref()
    }

    fn use_transaction(&self) -> bool {
        self.manifest.transaction
    }
}

/// Load every unit directory under `path`, sorted by name.
///
/// A missing directory yields no units. Subdirectories without `up.sql` are
/// ignored; ones with `up.sql` but a malformed name are an error.
pub fn discover(path: &Path) -> MigrateResult<Vec<SqlMigration>> {
    if !path.exists() {
        debug!(path = %path.display(), "Migration directory does not exist");
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let dir = entry?.path();
        if dir.is_dir() && dir.join("up.sql").is_file() {
            dirs.push(dir);
        }
    }
    dirs.sort();

    let units = dirs
        .iter()
        .map(|dir| SqlMigration::load(dir))
        .collect::<MigrateResult<Vec<_>>>()?;
    debug!(path = %path.display(), count = units.len(), "Discovered migrations");
    Ok(units)
}
