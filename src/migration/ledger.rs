//! Ledger table access

use chrono::{DateTime, Utc};

use crate::executor::Executor;
use crate::migration::record::{MigrationRecord, LEDGER_TABLE};
use crate::migration::MigrationError;
use crate::schema::{Entity, EntityDescriptor};
use crate::sql::{CommandKind, Filter, Selection, Statement, Synthesizer};
use crate::value::Value;

/// What the ledger says about one applied step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub migration_id: u64,
    pub description: String,
    pub checksum: String,
    pub applied_on: DateTime<Utc>,
}

impl From<MigrationRecord> for AppliedMigration {
    fn from(record: MigrationRecord) -> Self {
        Self {
            migration_id: record.migration_id,
            description: record.description,
            checksum: record.checksum,
            applied_on: record.applied_on,
        }
    }
}

/// Storage of applied migration steps.
///
/// Every call runs on the caller's executor, so inside [`Migrator::apply`]
/// ledger writes share the migration transaction.
///
/// [`Migrator::apply`]: crate::migration::Migrator::apply
pub trait LedgerStore {
    /// # Errors
    ///
    /// Returns `MigrationError` when the lookup fails.
    fn exists(&self, executor: &dyn Executor) -> Result<bool, MigrationError>;

    /// # Errors
    ///
    /// Returns `MigrationError` when the DDL fails.
    fn create(&self, executor: &dyn Executor) -> Result<(), MigrationError>;

    /// Applied steps in id order.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` when the ledger cannot be read.
    fn applied(&self, executor: &dyn Executor) -> Result<Vec<AppliedMigration>, MigrationError>;

    /// # Errors
    ///
    /// Returns `MigrationError` when the row cannot be written.
    fn record(&self, executor: &dyn Executor, record: &MigrationRecord) -> Result<(), MigrationError>;

    /// Create the ledger unless it exists. Returns whether it was created.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` when the lookup or the DDL fails.
    fn ensure(&self, executor: &dyn Executor) -> Result<bool, MigrationError> {
        if self.exists(executor)? {
            return Ok(false);
        }
        self.create(executor)?;
        Ok(true)
    }
}

impl<T: LedgerStore + ?Sized> LedgerStore for &T {
    fn exists(&self, executor: &dyn Executor) -> Result<bool, MigrationError> {
        (**self).exists(executor)
    }

    fn create(&self, executor: &dyn Executor) -> Result<(), MigrationError> {
        (**self).create(executor)
    }

    fn applied(&self, executor: &dyn Executor) -> Result<Vec<AppliedMigration>, MigrationError> {
        (**self).applied(executor)
    }

    fn record(&self, executor: &dyn Executor, record: &MigrationRecord) -> Result<(), MigrationError> {
        (**self).record(executor, record)
    }
}

/// The `migration_ledger` table, described by [`MigrationRecord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PgLedger;

impl PgLedger {
    fn descriptor() -> Result<&'static EntityDescriptor, MigrationError> {
        Ok(EntityDescriptor::of::<MigrationRecord>()?)
    }
}

impl LedgerStore for PgLedger {
    fn exists(&self, executor: &dyn Executor) -> Result<bool, MigrationError> {
        let mut statement = Statement::new(CommandKind::Select, "SELECT to_regclass($1) IS NOT NULL");
        statement.bind("table", Value::Text(LEDGER_TABLE.to_string()));
        let row = statement.query_one(executor)?;
        row.try_get(0).map_err(|e| MigrationError::Decode(e.to_string()))
    }

    fn create(&self, executor: &dyn Executor) -> Result<(), MigrationError> {
        for ddl in Self::descriptor()?.ddl_statements() {
            Statement::new(CommandKind::Ddl, ddl.as_str()).execute(executor)?;
        }
        log::info!("created migration ledger table {LEDGER_TABLE}");
        Ok(())
    }

    fn applied(&self, executor: &dyn Executor) -> Result<Vec<AppliedMigration>, MigrationError> {
        let descriptor = Self::descriptor()?;
        let statement =
            Synthesizer::new(descriptor).select(&Filter::all().order_by("migration_id"), Selection::All)?;
        statement
            .query_all(executor)?
            .iter()
            .map(|row| {
                MigrationRecord::from_row(row, descriptor)
                    .map(AppliedMigration::from)
                    .map_err(|e| MigrationError::Decode(e.to_string()))
            })
            .collect()
    }

    fn record(&self, executor: &dyn Executor, record: &MigrationRecord) -> Result<(), MigrationError> {
        let statement = Synthesizer::new(Self::descriptor()?)
            .tagged("migration_ledger")
            .insert(record)?;
        statement.query_one(executor)?;
        Ok(())
    }
}
