//! Migration registry and ledger
//!
//! Applications register numbered steps with a [`MigrationRegistry`], usually
//! at boot. [`Migrator::apply`] compares the registry with the
//! `migration_ledger` table and runs every pending step in id order inside a
//! single transaction, writing one ledger row per step.
//!
//! # Example
//!
//! ```rust,no_run
//! use tidemark::migration::{MigrationRegistry, Migrator};
//! use tidemark::Cancellation;
//! # fn run(database: &dyn tidemark::Database) -> Result<(), tidemark::migration::MigrationError> {
//! let registry = MigrationRegistry::new();
//! registry.touch_function(1)?;
//! registry.raw_sql(2, "create extension pgcrypto", "CREATE EXTENSION IF NOT EXISTS pgcrypto")?;
//!
//! let report = Migrator::new(&registry)?.apply(database, &Cancellation::new())?;
//! println!("applied {:?}", report.applied);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod error;
pub mod ledger;
pub mod migrator;
pub mod record;
pub mod registry;
pub mod status;

pub use checksum::{checksum, validate_checksum};
pub use error::MigrationError;
pub use ledger::{AppliedMigration, LedgerStore, PgLedger};
pub use migrator::{ApplyReport, Migrator};
pub use record::{MigrationRecord, LEDGER_TABLE};
pub use registry::{LookupEnum, MigrationRegistry, MigrationStep};
pub use status::MigrationStatus;
