//! Applied-migration bookkeeping.

use chrono::Utc;
use quarry_query::{Connection, QueryResult, Row, Value};
use quarry_schema::Schema;
use std::collections::BTreeMap;
use tracing::info;

/// Default repository table name.
pub const DEFAULT_TABLE: &str = "migrations";

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration name.
    pub migration: String,
    /// Batch it was applied in.
    pub batch: i64,
}

impl MigrationRecord {
    fn from_row(row: &Row) -> QueryResult<Self> {
        Ok(Self {
            migration: row.get_str("migration")?.to_string(),
            batch: row.get_i64("batch")?,
        })
    }
}

/// Storage for the set of applied migrations.
///
/// Every method receives the connection the repository lives on.
pub trait MigrationRepository {
    /// Create the storage.
    fn create_repository(&self, conn: &mut Connection) -> QueryResult<()>;

    /// Whether the storage exists.
    fn repository_exists(&self, conn: &mut Connection) -> QueryResult<bool>;

    /// Names of applied migrations, oldest first.
    fn get_ran(&self, conn: &mut Connection) -> QueryResult<Vec<String>>;

    /// Migrations in the `steps` most recent batches, newest first.
    fn get_migrations(&self, conn: &mut Connection, steps: usize) -> QueryResult<Vec<MigrationRecord>>;

    /// Migrations in the most recent batch, newest first.
    fn get_last(&self, conn: &mut Connection) -> QueryResult<Vec<MigrationRecord>>;

    /// Batch number of every applied migration.
    fn get_migration_batches(&self, conn: &mut Connection) -> QueryResult<BTreeMap<String, i64>>;

    /// Highest batch number, or zero.
    fn get_last_batch_number(&self, conn: &mut Connection) -> QueryResult<i64>;

    /// Batch number the next run should use.
    fn get_next_batch_number(&self, conn: &mut Connection) -> QueryResult<i64> {
        Ok(self.get_last_batch_number(conn)? + 1)
    }

    /// Record a migration as applied.
    fn log(&self, conn: &mut Connection, migration: &str, batch: i64) -> QueryResult<()>;

    /// Remove a migration's record.
    fn delete(&self, conn: &mut Connection, migration: &str) -> QueryResult<()>;
}

/// Repository stored in a database table with `id`, `migration`, `batch` and
/// `applied_at` columns.
#[derive(Debug, Clone)]
pub struct DatabaseMigrationRepository {
    table: String,
}

impl Default for DatabaseMigrationRepository {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE)
    }
}

impl DatabaseMigrationRepository {
    /// Use the given table.
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    /// Table name, without the connection prefix.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn records(rows: Vec<Row>) -> QueryResult<Vec<MigrationRecord>> {
        rows.iter().map(MigrationRecord::from_row).collect()
    }
}

impl MigrationRepository for DatabaseMigrationRepository {
    fn create_repository(&self, conn: &mut Connection) -> QueryResult<()> {
        Schema::new(conn).create(&self.table, |table| {
            table.increments("id");
            table.string("migration", 255).unique();
            table.integer("batch");
            table.timestamp("applied_at").nullable();
        })?;
        info!(table = %self.table, "Migration table created");
        Ok(())
    }

    fn repository_exists(&self, conn: &mut Connection) -> QueryResult<bool> {
        Schema::new(conn).has_table(&self.table)
    }

    fn get_ran(&self, conn: &mut Connection) -> QueryResult<Vec<String>> {
        let rows = conn
            .table(&self.table)
            .order_by("batch")
            .order_by("migration")
            .get(conn)?;
        rows.iter()
            .map(|row| row.get_str("migration").map(str::to_string))
            .collect()
    }

    fn get_migrations(&self, conn: &mut Connection, steps: usize) -> QueryResult<Vec<MigrationRecord>> {
        let last = self.get_last_batch_number(conn)?;
        if steps == 0 || last == 0 {
            return Ok(Vec::new());
        }
        let steps = i64::try_from(steps).unwrap_or(i64::MAX);
        let oldest = last.saturating_sub(steps - 1);
        let rows = conn
            .table(&self.table)
            .where_op("batch", ">=", oldest)
            .order_by_desc("batch")
            .order_by_desc("migration")
            .get(conn)?;
        Self::records(rows)
    }

    fn get_last(&self, conn: &mut Connection) -> QueryResult<Vec<MigrationRecord>> {
        self.get_migrations(conn, 1)
    }

    fn get_migration_batches(&self, conn: &mut Connection) -> QueryResult<BTreeMap<String, i64>> {
        let rows = conn.table(&self.table).get(conn)?;
        Ok(Self::records(rows)?
            .into_iter()
            .map(|r| (r.migration, r.batch))
            .collect())
    }

    fn get_last_batch_number(&self, conn: &mut Connection) -> QueryResult<i64> {
        let batch = conn
            .table(&self.table)
            .order_by_desc("batch")
            .value(conn, "batch")?;
        Ok(batch.as_ref().and_then(Value::as_i64).unwrap_or(0))
    }

    fn log(&self, conn: &mut Connection, migration: &str, batch: i64) -> QueryResult<()> {
        conn.table(&self.table).insert(
            conn,
            [
                ("migration", Value::from(migration)),
                ("batch", Value::Int(batch)),
                ("applied_at", Value::DateTime(Utc::now().naive_utc())),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, conn: &mut Connection, migration: &str) -> QueryResult<()> {
        conn.table(&self.table).r#where("migration", migration).delete(conn)?;
        Ok(())
    }
}
