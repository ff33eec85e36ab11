//! The migrator.
//!
//! [`Migrator`] collects units from registered [`Migration`]s and discovered
//! directories, compares them with the [`MigrationRepository`], and applies or
//! reverts them in batches. Connections come from a [`ConnectionResolver`], so
//! the same migrator runs against a single [`Connection`] or a
//! [`quarry_query::DatabaseManager`].

use crate::error::{Direction, MigrateResult, MigrationError};
use crate::migration::{Migration, discover};
use crate::repository::{DatabaseMigrationRepository, MigrationRepository};
use quarry_query::config::MigrationSettings;
use quarry_query::{Connection, ConnectionResolver, LoggedQuery, QueryResult};
use quarry_schema::schema_grammar_for;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Options for [`Migrator::migrate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
    /// Capture the SQL each unit would run instead of running it.
    pub pretend: bool,
    /// Give every unit its own batch so they can be rolled back one at a time.
    pub step: bool,
}

impl MigrateOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretend mode.
    pub fn pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }

    /// Enable one batch per unit.
    pub fn step(mut self, step: bool) -> Self {
        self.step = step;
        self
    }
}

/// Options for [`Migrator::rollback`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackOptions {
    /// Capture the SQL each unit would run instead of running it.
    pub pretend: bool,
    /// Number of batches to revert; the latest batch when unset.
    pub step: Option<usize>,
}

impl RollbackOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretend mode.
    pub fn pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }

    /// Revert this many batches.
    pub fn step(mut self, steps: usize) -> Self {
        self.step = Some(steps);
        self
    }
}

/// Statements a unit would have run.
#[derive(Debug, Clone)]
pub struct PretendedMigration {
    /// Migration name.
    pub migration: String,
    /// Captured statements.
    pub queries: Vec<LoggedQuery>,
}

/// Result of a migrate, rollback or reset.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// Units applied or reverted, in the order they ran.
    pub migrations: Vec<String>,
    /// Captured statements per unit when pretending.
    pub pretended: Vec<PretendedMigration>,
    /// Total duration in milliseconds.
    pub duration_ms: i64,
}

impl MigrationReport {
    /// Whether nothing ran or was captured.
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty() && self.pretended.is_empty()
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        if !self.pretended.is_empty() {
            let statements: usize = self.pretended.iter().map(|p| p.queries.len()).sum();
            format!("{} migrations pretended ({} statements)", self.pretended.len(), statements)
        } else if self.migrations.is_empty() {
            "Nothing to do".to_string()
        } else {
            format!("{} migrations in {}ms", self.migrations.len(), self.duration_ms)
        }
    }
}

/// One known unit and where it stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatusEntry {
    /// Migration name.
    pub name: String,
    /// Batch it was applied in, if applied.
    pub batch: Option<i64>,
}

impl MigrationStatusEntry {
    /// Whether the unit is applied.
    pub fn is_applied(&self) -> bool {
        self.batch.is_some()
    }
}

/// Applied and pending units, in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Every known unit.
    pub entries: Vec<MigrationStatusEntry>,
}

impl MigrationStatus {
    /// Names of applied units.
    pub fn applied(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.is_applied())
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Names of pending units.
    pub fn pending(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !e.is_applied())
            .map(|e| e.name.as_str())
            .collect()
    }
}

/// Runs migration units against connections from a resolver.
pub struct Migrator<R: MigrationRepository = DatabaseMigrationRepository> {
    repository: R,
    units: Vec<Arc<dyn Migration>>,
    paths: Vec<PathBuf>,
    database: Option<String>,
}

impl<R: MigrationRepository + std::fmt::Debug> std::fmt::Debug for Migrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("repository", &self.repository)
            .field("units", &self.units.iter().map(|u| u.name()).collect::<Vec<_>>())
            .field("paths", &self.paths)
            .field("database", &self.database)
            .finish()
    }
}

impl Migrator<DatabaseMigrationRepository> {
    /// Build a migrator from the `[migrations]` settings.
    pub fn from_settings(settings: &MigrationSettings) -> Self {
        Self::new(DatabaseMigrationRepository::new(settings.table.clone())).path(settings.path.clone())
    }
}

enum Stage {
    Unit,
    Record,
}

impl<R: MigrationRepository> Migrator<R> {
    /// Create a migrator over a repository with no units.
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            units: Vec::new(),
            paths: Vec::new(),
            database: None,
        }
    }

    /// Discover SQL units in a directory.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Register a unit.
    pub fn add(mut self, unit: impl Migration + 'static) -> Self {
        self.units.push(Arc::new(unit));
        self
    }

    /// Keep the repository on a named connection instead of the default one.
    /// Units without their own connection run there too.
    pub fn on_connection(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    /// The repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Every known unit sorted by name.
    pub fn migrations(&self) -> MigrateResult<Vec<Arc<dyn Migration>>> {
        let mut units = self.units.clone();
        for path in &self.paths {
            for unit in discover(path)? {
                units.push(Arc::new(unit));
            }
        }
        units.sort_by(|a, b| a.name().cmp(b.name()));

        if let Some(pair) = units.windows(2).find(|pair| pair[0].name() == pair[1].name()) {
            return Err(MigrationError::invalid(format!("duplicate migration name '{}'", pair[0].name())));
        }
        Ok(units)
    }

    fn repository_connection<'r, C: ConnectionResolver>(&self, resolver: &'r mut C) -> QueryResult<&'r mut Connection> {
        resolver.connection(self.database.as_deref())
    }

    fn repository_connection_name<C: ConnectionResolver>(&self, resolver: &C) -> String {
        self.database
            .clone()
            .unwrap_or_else(|| resolver.default_connection().to_string())
    }

    /// Apply every pending unit.
    pub fn migrate<C: ConnectionResolver>(&self, resolver: &mut C, options: MigrateOptions) -> MigrateResult<MigrationReport> {
        let start = Instant::now();
        let units = self.migrations()?;

        let conn = self.repository_connection(resolver)?;
        let exists = self.repository.repository_exists(conn)?;
        if !exists && !options.pretend {
            self.repository.create_repository(conn)?;
        }
        let (ran, mut batch) = if exists {
            let ran: HashSet<String> = self.repository.get_ran(conn)?.into_iter().collect();
            (ran, self.repository.get_next_batch_number(conn)?)
        } else {
            (HashSet::new(), 1)
        };

        let pending: Vec<_> = units.into_iter().filter(|u| !ran.contains(u.name())).collect();
        let mut report = MigrationReport::default();
        if pending.is_empty() {
            info!("Nothing to migrate");
            return Ok(report);
        }

        info!(pending = pending.len(), batch, pretend = options.pretend, "Running migrations");
        for unit in &pending {
            if options.pretend {
                report.pretended.push(self.pretend_unit(resolver, unit.as_ref(), Direction::Up)?);
                continue;
            }

            let repository = &self.repository;
            self.run_unit(resolver, unit.as_ref(), Direction::Up, |conn| {
                repository.log(conn, unit.name(), batch)
            })?;
            info!(migration = unit.name(), batch, "Migrated");
            report.migrations.push(unit.name().to_string());
            if options.step {
                batch += 1;
            }
        }

        report.duration_ms = elapsed_ms(start);
        Ok(report)
    }

    /// Revert the latest batch, or the `step` latest batches.
    pub fn rollback<C: ConnectionResolver>(
        &self,
        resolver: &mut C,
        options: RollbackOptions,
    ) -> MigrateResult<MigrationReport> {
        let conn = self.repository_connection(resolver)?;
        if !self.repository.repository_exists(conn)? {
            info!("Nothing to rollback");
            return Ok(MigrationReport::default());
        }
        let records = match options.step {
            Some(steps) => self.repository.get_migrations(conn, steps)?,
            None => self.repository.get_last(conn)?,
        };
        let names: Vec<String> = records.into_iter().map(|r| r.migration).collect();
        self.revert(resolver, &names, options.pretend)
    }

    /// Revert every applied unit.
    pub fn reset<C: ConnectionResolver>(&self, resolver: &mut C, pretend: bool) -> MigrateResult<MigrationReport> {
        let conn = self.repository_connection(resolver)?;
        if !self.repository.repository_exists(conn)? {
            info!("Nothing to reset");
            return Ok(MigrationReport::default());
        }
        let mut names = self.repository.get_ran(conn)?;
        names.reverse();
        self.revert(resolver, &names, pretend)
    }

    /// Reset, then migrate from scratch.
    pub fn refresh<C: ConnectionResolver>(&self, resolver: &mut C) -> MigrateResult<(MigrationReport, MigrationReport)> {
        let reset = self.reset(resolver, false)?;
        let migrated = self.migrate(resolver, MigrateOptions::default())?;
        Ok((reset, migrated))
    }

    /// Report applied and pending units without changing anything.
    pub fn status<C: ConnectionResolver>(&self, resolver: &mut C) -> MigrateResult<MigrationStatus> {
        let units = self.migrations()?;
        let conn = self.repository_connection(resolver)?;
        let batches = if self.repository.repository_exists(conn)? {
            self.repository.get_migration_batches(conn)?
        } else {
            BTreeMap::new()
        };

        for name in batches.keys() {
            if !units.iter().any(|u| u.name() == name) {
                warn!(migration = %name, "Applied migration has no matching unit");
            }
        }

        let entries = units
            .iter()
            .map(|unit| MigrationStatusEntry {
                name: unit.name().to_string(),
                batch: batches.get(unit.name()).copied(),
            })
            .collect();
        Ok(MigrationStatus { entries })
    }

    /// Run `down` for each named unit in the given order.
    fn revert<C: ConnectionResolver>(&self, resolver: &mut C, names: &[String], pretend: bool) -> MigrateResult<MigrationReport> {
        let start = Instant::now();
        let mut report = MigrationReport::default();
        if names.is_empty() {
            info!("Nothing to rollback");
            return Ok(report);
        }

        let units = self.migrations()?;
        let targets = names
            .iter()
            .map(|name| {
                units
                    .iter()
                    .find(|u| u.name() == name)
                    .cloned()
                    .ok_or_else(|| MigrationError::NotFound(name.clone()))
            })
            .collect::<MigrateResult<Vec<_>>>()?;

        info!(count = targets.len(), pretend, "Rolling back migrations");
        for unit in &targets {
            if pretend {
                report.pretended.push(self.pretend_unit(resolver, unit.as_ref(), Direction::Down)?);
                continue;
            }

            let repository = &self.repository;
            self.run_unit(resolver, unit.as_ref(), Direction::Down, |conn| {
                repository.delete(conn, unit.name())
            })?;
            info!(migration = unit.name(), "Rolled back");
            report.migrations.push(unit.name().to_string());
        }

        report.duration_ms = elapsed_ms(start);
        Ok(report)
    }

    /// Run one half of a unit and then `record` on the repository connection.
    ///
    /// When the unit shares the repository connection and is wrapped in a
    /// transaction, the record is written inside that transaction.
    fn run_unit<C, F>(&self, resolver: &mut C, unit: &dyn Migration, direction: Direction, mut record: F) -> MigrateResult<()>
    where
        C: ConnectionResolver,
        F: FnMut(&mut Connection) -> QueryResult<()>,
    {
        let repository_name = self.repository_connection_name(resolver);
        let unit_name = unit.connection().unwrap_or(repository_name.as_str()).to_string();
        let shared = unit_name == repository_name;

        let conn = resolver.connection(Some(unit_name.as_str()))?;
        let wrap = unit.use_transaction() && schema_grammar_for(conn.config()).supports_schema_transactions();
        debug!(
            migration = unit.name(),
            connection = %unit_name,
            %direction,
            transaction = wrap,
            "Running migration unit"
        );

        let mut stage = Stage::Unit;
        let mut body = |conn: &mut Connection| -> QueryResult<()> {
            match direction {
                Direction::Up => unit.up(conn)?,
                Direction::Down => unit.down(conn)?,
            }
            if shared {
                stage = Stage::Record;
                record(conn)?;
            }
            Ok(())
        };
        let result = if wrap { conn.transaction(&mut body) } else { body(conn) };

        match result {
            Ok(()) if shared => Ok(()),
            Ok(()) => {
                let conn = resolver.connection(Some(repository_name.as_str()))?;
                record(conn)?;
                Ok(())
            }
            Err(source) => match stage {
                Stage::Unit => Err(MigrationError::UnitFailed {
                    migration: unit.name().to_string(),
                    direction,
                    source,
                }),
                Stage::Record => Err(source.into()),
            },
        }
    }

    fn pretend_unit<C: ConnectionResolver>(
        &self,
        resolver: &mut C,
        unit: &dyn Migration,
        direction: Direction,
    ) -> MigrateResult<PretendedMigration> {
        let repository_name = self.repository_connection_name(resolver);
        let conn = resolver.connection(Some(unit.connection().unwrap_or(repository_name.as_str())))?;
        let queries = conn
            .pretend(|conn| match direction {
                Direction::Up => unit.up(conn),
                Direction::Down => unit.down(conn),
            })
            .map_err(|source| MigrationError::UnitFailed {
                migration: unit.name().to_string(),
                direction,
                source,
            })?;
        Ok(PretendedMigration {
            migration: unit.name().to_string(),
            queries,
        })
    }
}

fn elapsed_ms(start: Instant) -> i64 {
    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::SqlMigration;
    use pretty_assertions::assert_eq;
    use quarry_query::ConnectionConfig;
    use quarry_schema::Schema;
    use quarry_sqlite::SqliteConnector;

    struct CreateTable {
        name: &'static str,
        table: &'static str,
    }

    impl Migration for CreateTable {
        fn name(&self) -> &str {
            self.name
        }

        fn up(&self, conn: &mut Connection) -> QueryResult<()> {
            Schema::new(conn).create(self.table, |table| {
                table.id();
                table.string("title", 100);
            })
        }

        fn down(&self, conn: &mut Connection) -> QueryResult<()> {
            Schema::new(conn).drop(self.table)
        }
    }

    fn connect() -> Connection {
        Connection::open("main", ConnectionConfig::sqlite_memory(), Arc::new(SqliteConnector)).unwrap()
    }

    fn units(names: &[(&'static str, &'static str)]) -> Migrator {
        names.iter().fold(
            Migrator::new(DatabaseMigrationRepository::default()),
            |migrator, &(name, table)| migrator.add(CreateTable { name, table }),
        )
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = connect();
        let migrator = units(&[("2024_01_02_posts", "posts"), ("2024_01_01_users", "users")]);

        let report = migrator.migrate(&mut conn, MigrateOptions::new()).unwrap();
        assert_eq!(report.migrations, vec!["2024_01_01_users", "2024_01_02_posts"]);

        let again = migrator.migrate(&mut conn, MigrateOptions::new()).unwrap();
        assert!(again.is_empty());
        assert_eq!(again.summary(), "Nothing to do");

        let batches = migrator.repository().get_migration_batches(&mut conn).unwrap();
        assert_eq!(batches.values().copied().collect::<Vec<_>>(), vec![1, 1]);
    }

    #[test]
    fn test_step_gives_each_unit_a_batch() {
        let mut conn = connect();
        let migrator = units(&[("2024_01_01_users", "users"), ("2024_01_02_posts", "posts")]);

        migrator.migrate(&mut conn, MigrateOptions::new().step(true)).unwrap();
        let rolled = migrator.rollback(&mut conn, RollbackOptions::new()).unwrap();
        assert_eq!(rolled.migrations, vec!["2024_01_02_posts"]);

        let mut schema = Schema::new(&mut conn);
        assert!(schema.has_table("users").unwrap());
        assert!(!schema.has_table("posts").unwrap());
    }

    #[test]
    fn test_failed_unit_leaves_completed_units_recorded() {
        let mut conn = connect();
        let broken = SqlMigration::new(
            "2024_01_02_broken",
            "create table audit (id integer); insert into missing values (1);",
            None,
        )
        .unwrap();
        let migrator = units(&[("2024_01_01_users", "users")]).add(broken);

        let err = migrator.migrate(&mut conn, MigrateOptions::new()).unwrap_err();
        match &err {
            MigrationError::UnitFailed { migration, direction, .. } => {
                assert_eq!(migration, "2024_01_02_broken");
                assert_eq!(*direction, Direction::Up);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(
            migrator.repository().get_ran(&mut conn).unwrap(),
            vec!["2024_01_01_users"]
        );
        assert!(!Schema::new(&mut conn).has_table("audit").unwrap());
    }

    #[test]
    fn test_pretend_runs_nothing() {
        let mut conn = connect();
        let migrator = units(&[("2024_01_01_users", "users")]);

        let report = migrator.migrate(&mut conn, MigrateOptions::new().pretend(true)).unwrap();
        assert!(report.migrations.is_empty());
        assert_eq!(report.pretended.len(), 1);
        assert_eq!(report.pretended[0].migration, "2024_01_01_users");
        assert!(report.pretended[0].queries[0].sql.starts_with("create table \"users\""));

        assert!(!migrator.repository().repository_exists(&mut conn).unwrap());
        assert!(!Schema::new(&mut conn).has_table("users").unwrap());
    }

    #[test]
    fn test_unknown_recorded_migration_blocks_rollback() {
        let mut conn = connect();
        let migrator = units(&[("2024_01_01_users", "users")]);
        migrator.migrate(&mut conn, MigrateOptions::new()).unwrap();
        migrator.repository().log(&mut conn, "2024_01_05_ghost", 1).unwrap();

        let err = migrator.rollback(&mut conn, RollbackOptions::new()).unwrap_err();
        assert!(matches!(err, MigrationError::NotFound(ref name) if name == "2024_01_05_ghost"));
        assert!(Schema::new(&mut conn).has_table("users").unwrap());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let migrator = units(&[("2024_01_01_users", "users"), ("2024_01_01_users", "members")]);
        assert!(matches!(
            migrator.migrations(),
            Err(MigrationError::InvalidMigration(_))
        ));
    }

    #[test]
    fn test_unit_on_unknown_connection_fails() {
        let mut conn = connect();
        let unit = SqlMigration::new("2024_01_01_audit", "create table audit (id integer)", None)
            .unwrap()
            .with_manifest(toml::from_str("connection = \"audit\"").unwrap());
        let migrator = Migrator::new(DatabaseMigrationRepository::default()).add(unit);

        let err = migrator.migrate(&mut conn, MigrateOptions::new()).unwrap_err();
        assert!(matches!(err, MigrationError::Query(_)));
        assert!(migrator.repository().get_ran(&mut conn).unwrap().is_empty());
    }
}
