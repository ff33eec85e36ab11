//! Scaffolding for new SQL migration units.

use crate::error::{MigrateResult, MigrationError};
use crate::migration::parse_migration_name;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

/// Creates `<timestamp>_<name>/` directories with `up.sql` and `down.sql` stubs.
#[derive(Debug, Clone)]
pub struct MigrationCreator {
    path: PathBuf,
}

/// Which stub pair to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stub {
    Blank,
    Create,
    Update,
}

impl MigrationCreator {
    /// Create units under `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Directory units are written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a new unit and return its directory.
    ///
    /// `table` with `create` set writes a create-table stub, `table` alone an
    /// alter-table stub. Without a table, names like `create_users_table` or
    /// `add_email_to_users_table` pick the table and stub themselves.
    pub fn create(&self, name: &str, table: Option<&str>, create: bool) -> MigrateResult<PathBuf> {
        validate_name(name)?;
        self.ensure_unique(name)?;

        let (table, create) = match table {
            Some(table) => (Some(table.to_string()), create),
            None => match guess_table(name) {
                Some((table, guessed_create)) => (Some(table), create || guessed_create),
                None => (None, false),
            },
        };
        let stub = match (&table, create) {
            (Some(_), true) => Stub::Create,
            (Some(_), false) => Stub::Update,
            (None, _) => Stub::Blank,
        };
        let (up, down) = render(stub, table.as_deref().unwrap_or_default());

        let dir = self
            .path
            .join(format!("{}_{}", Utc::now().format("%Y_%m_%d_%H%M%S"), name));
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("up.sql"), up)?;
        std::fs::write(dir.join("down.sql"), down)?;

        info!(path = %dir.display(), "Created migration");
        Ok(dir)
    }

    fn ensure_unique(&self, name: &str) -> MigrateResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(existing) = file_name.to_str() else {
                continue;
            };
            if let Ok((_, existing)) = parse_migration_name(existing) {
                if existing == name {
                    return Err(MigrationError::invalid(format!("a migration named '{}' already exists", name)));
                }
            }
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> MigrateResult<()> {
    let valid = name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MigrationError::invalid(format!(
            "'{}' is not a snake_case migration name",
            name
        )))
    }
}

/// Table name and whether it is being created, from `create_x_table`,
/// `..._to_x_table`, `..._from_x_table` or `..._in_x_table`.
fn guess_table(name: &str) -> Option<(String, bool)> {
    let body = name.strip_suffix("_table")?;
    if let Some(table) = body.strip_prefix("create_") {
        return (!table.is_empty()).then(|| (table.to_string(), true));
    }
    ["_to_", "_from_", "_in_"]
        .iter()
        .filter_map(|marker| body.rfind(marker).map(|at| &body[at + marker.len()..]))
        .filter(|table| !table.is_empty())
        .min_by_key(|table| table.len())
        .map(|table| (table.to_string(), false))
}

fn render(stub: Stub, table: &str) -> (String, String) {
    match stub {
        Stub::Blank => (
            "-- Write the statements that apply this migration.\n".to_string(),
            "-- Write the statements that revert this migration.\n".to_string(),
        ),
        Stub::Create => (
            format!("create table {table} (\n    id integer primary key\n);\n"),
            format!("drop table {table};\n"),
        ),
        Stub::Update => (
            format!("-- alter table {table} add column ...;\n"),
            format!("-- alter table {table} drop column ...;\n"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::SqlMigration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_guess_table() {
        assert_eq!(guess_table("create_users_table"), Some(("users".to_string(), true)));
        assert_eq!(
            guess_table("add_email_to_users_table"),
            Some(("users".to_string(), false))
        );
        assert_eq!(
            guess_table("remove_votes_from_post_stats_table"),
            Some(("post_stats".to_string(), false))
        );
        assert_eq!(guess_table("backfill_slugs"), None);
    }

    #[test]
    fn test_create_stub() {
        let dir = TempDir::new().unwrap();
        let creator = MigrationCreator::new(dir.path());

        let path = creator.create("create_users_table", None, false).unwrap();
        let unit = SqlMigration::load(&path).unwrap();
        assert_eq!(
            unit.up_sql(),
            "create table users (\n    id integer primary key\n);\n"
        );
        assert_eq!(unit.down_sql(), Some("drop table users;\n"));

        let (_, name) = parse_migration_name(path.file_name().unwrap().to_str().unwrap()).unwrap();
        assert_eq!(name, "create_users_table");
    }

    #[test]
    fn test_explicit_table_stubs() {
        let dir = TempDir::new().unwrap();
        let creator = MigrationCreator::new(dir.path().join("nested"));

        let path = creator.create("tweak_accounts", Some("accounts"), false).unwrap();
        let up = std::fs::read_to_string(path.join("up.sql")).unwrap();
        assert!(up.starts_with("-- alter table accounts"));

        let path = creator.create("start_audit", Some("audit_log"), true).unwrap();
        let up = std::fs::read_to_string(path.join("up.sql")).unwrap();
        assert!(up.starts_with("create table audit_log"));
    }

    #[test]
    fn test_rejects_bad_and_duplicate_names() {
        let dir = TempDir::new().unwrap();
        let creator = MigrationCreator::new(dir.path());

        assert!(matches!(
            creator.create("CreateUsers", None, false),
            Err(MigrationError::InvalidMigration(_))
        ));
        assert!(creator.create("../escape", None, false).is_err());

        creator.create("backfill_slugs", None, false).unwrap();
        let err = creator.create("backfill_slugs", None, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
