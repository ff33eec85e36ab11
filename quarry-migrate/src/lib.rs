//! # quarry-migrate
//!
//! Versioned schema migrations for Quarry.
//!
//! ## Features
//!
//! - Units written in Rust ([`Migration`]) or as SQL directories ([`SqlMigration`])
//! - Applied units tracked by batch in a repository table ([`DatabaseMigrationRepository`])
//! - Migrate, rollback, reset, refresh and status through [`Migrator`]
//! - Pretend mode that captures SQL instead of running it
//! - Per-unit connections and transaction opt-out
//! - Stub generation with [`MigrationCreator`]
//!
//! ## Layout
//!
//! ```text
//! migrations/
//! ├── 2024_01_01_000000_create_users/
//! │   ├── up.sql
//! │   └── down.sql
//! └── 2024_01_02_000000_add_email_to_users/
//!     ├── up.sql
//!     ├── down.sql
//!     └── migration.toml
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use quarry_migrate::{MigrateOptions, Migrator, RollbackOptions};
//! use quarry_query::DatabaseManager;
//!
//! let mut manager = DatabaseManager::new(settings.clone());
//! let migrator = Migrator::from_settings(&settings.migrations);
//!
//! let report = migrator.migrate(&mut manager, MigrateOptions::new())?;
//! println!("{}", report.summary());
//!
//! let status = migrator.status(&mut manager)?;
//! for name in status.pending() {
//!     println!("pending: {name}");
//! }
//!
//! migrator.rollback(&mut manager, RollbackOptions::new().step(1))?;
//! ```

pub mod creator;
pub mod error;
pub mod migration;
pub mod migrator;
pub mod repository;

pub use creator::MigrationCreator;
pub use error::{Direction, MigrateResult, MigrationError};
pub use migration::{Migration, MigrationManifest, SqlMigration, discover, parse_migration_name};
pub use migrator::{
    MigrateOptions, MigrationReport, MigrationStatus, MigrationStatusEntry, Migrator, PretendedMigration,
    RollbackOptions,
};
pub use repository::{DatabaseMigrationRepository, MigrationRecord, MigrationRepository};
