//! Migrator - applies pending registry steps inside one transaction

use chrono::Utc;
use std::collections::HashMap;

use crate::cancel::Cancellation;
use crate::config::MigrationConfig;
use crate::executor::{Database, Executor};
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
use crate::migration::checksum::{checksum, validate_checksum};
use crate::migration::ledger::{AppliedMigration, LedgerStore, PgLedger};
use crate::migration::record::MigrationRecord;
use crate::migration::registry::{MigrationRegistry, MigrationStep};
use crate::migration::{MigrationError, MigrationStatus};
use crate::schema::EntityDescriptor;
use crate::sql::{CommandKind, Statement};
use crate::value::Value;

/// Outcome of a successful [`Migrator::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Ids of the steps applied, in order
    pub applied: Vec<u64>,
    /// Whether the ledger table was created by this run
    pub ledger_created: bool,
}

pub struct Migrator<'r, L = PgLedger> {
    registry: &'r MigrationRegistry,
    ledger: L,
    lock_key: Option<i64>,
}

impl<'r> Migrator<'r, PgLedger> {
    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` if the ledger entity cannot be described.
    pub fn new(registry: &'r MigrationRegistry) -> Result<Self, MigrationError> {
        Self::with_ledger(registry, PgLedger)
    }

    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` if the ledger entity cannot be described.
    pub fn from_config(registry: &'r MigrationRegistry, config: &MigrationConfig) -> Result<Self, MigrationError> {
        let migrator = Self::new(registry)?;
        Ok(if config.lock_enabled {
            migrator.lock_key(config.lock_key)
        } else {
            migrator.without_lock()
        })
    }
}

impl<'r, L: LedgerStore> Migrator<'r, L> {
    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` if the ledger entity cannot be described.
    pub fn with_ledger(registry: &'r MigrationRegistry, ledger: L) -> Result<Self, MigrationError> {
        EntityDescriptor::of::<MigrationRecord>()?;
        Ok(Self {
            registry,
            ledger,
            lock_key: Some(MigrationConfig::default().lock_key),
        })
    }

    /// Serialize concurrent `apply` calls on this advisory lock key.
    #[must_use]
    pub fn lock_key(mut self, key: i64) -> Self {
        self.lock_key = Some(key);
        self
    }

    #[must_use]
    pub fn without_lock(mut self) -> Self {
        self.lock_key = None;
        self
    }

    /// Split the registry against the ledger.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::ChecksumMismatch` when a hand-written step's
    /// text changed since it ran. Declaration-derived steps that changed are
    /// listed in [`MigrationStatus::modified`] instead.
    pub fn plan(&self, applied: &[AppliedMigration]) -> Result<MigrationStatus, MigrationError> {
        let mut by_id: HashMap<u64, &AppliedMigration> = applied.iter().map(|a| (a.migration_id, a)).collect();
        let mut status = MigrationStatus {
            applied: Vec::new(),
            pending: Vec::new(),
            unknown: Vec::new(),
            modified: Vec::new(),
        };

        for step in self.registry.steps() {
            match by_id.remove(&step.id) {
                Some(record) => {
                    match validate_checksum(step.id, &record.checksum, &step.checksum()) {
                        Ok(()) => {}
                        Err(_) if step.derived => {
                            log::warn!(
                                "migration {} ({}) no longer matches its declaration; it stays applied",
                                step.id,
                                step.description
                            );
                            status.modified.push(step.id);
                        }
                        Err(e) => return Err(e),
                    }
                    status.applied.push(record.clone());
                }
                None => status.pending.push(step),
            }
        }

        let mut unknown: Vec<_> = by_id.into_values().cloned().collect();
        unknown.sort_by_key(|a| a.migration_id);
        for record in &unknown {
            log::warn!(
                "ledger row {} ({}) has no registered migration",
                record.migration_id,
                record.description
            );
        }
        status.unknown = unknown;
        Ok(status)
    }

    /// Applied and pending steps, without changing anything.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` if the ledger cannot be read or a checksum differs.
    pub fn status(&self, executor: &dyn Executor) -> Result<MigrationStatus, MigrationError> {
        let applied = if self.ledger.exists(executor)? {
            self.ledger.applied(executor)?
        } else {
            Vec::new()
        };
        self.plan(&applied)
    }

    /// Apply every pending step in id order, all or nothing.
    ///
    /// Steps and their ledger rows run sequentially in one transaction. Any
    /// failure, including cancellation, rolls the whole batch back.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` wrapping the first failure.
    pub fn apply(&self, database: &dyn Database, cancel: &Cancellation) -> Result<ApplyReport, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::migration_span(self.registry.len()).entered();

        let transaction = database.begin()?;
        match self.apply_in(transaction.as_executor(), cancel) {
            Ok(report) => {
                transaction.commit()?;
                #[cfg(feature = "metrics")]
                METRICS.record_migrations_applied(report.applied.len() as u64);
                if report.applied.is_empty() {
                    log::debug!("migrations up to date");
                } else {
                    log::info!("applied {} migrations: {:?}", report.applied.len(), report.applied);
                }
                Ok(report)
            }
            Err(e) => {
                log::warn!("migration batch failed, rolling back: {e}");
                if let Err(rollback) = transaction.rollback() {
                    log::warn!("rollback after failed migration batch also failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    fn apply_in(&self, executor: &dyn Executor, cancel: &Cancellation) -> Result<ApplyReport, MigrationError> {
        if let Some(key) = self.lock_key {
            let mut lock = Statement::new(CommandKind::Select, "SELECT pg_advisory_xact_lock($1)");
            lock.bind("key", Value::BigInt(key));
            lock.execute(executor)?;
        }

        let ledger_created = self.ledger.ensure(executor)?;
        let applied = self.ledger.applied(executor)?;
        let status = self.plan(&applied)?;

        let mut report = ApplyReport {
            applied: Vec::with_capacity(status.pending.len()),
            ledger_created,
        };
        for step in &status.pending {
            if cancel.is_cancelled() {
                return Err(MigrationError::Cancelled { id: step.id });
            }
            self.run_step(executor, step)?;
            report.applied.push(step.id);
        }
        Ok(report)
    }

    fn run_step(&self, executor: &dyn Executor, step: &MigrationStep) -> Result<(), MigrationError> {
        log::debug!("applying migration {}: {}", step.id, step.description);
        for text in &step.statements {
            Statement::new(CommandKind::Ddl, text.as_str())
                .execute(executor)
                .map_err(|source| MigrationError::StepFailed {
                    id: step.id,
                    description: step.description.clone(),
                    source,
                })?;
        }

        let sql_text = step.sql_text();
        let record = MigrationRecord {
            id: None,
            migration_id: step.id,
            table_id: step.table.clone(),
            description: step.description.clone(),
            checksum: checksum(&sql_text),
            sql_text,
            applied_on: Utc::now(),
            date_created: step.created,
        };
        self.ledger.record(executor, &record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{DbError, TransactionScope};
    use crate::tests_cfg::{Account, Membership};
    use may_postgres::types::ToSql;
    use may_postgres::Row;
    use std::cell::{Cell, RefCell};

    /// Buffers statements per transaction; only committed ones become visible.
    #[derive(Default)]
    struct FakeDatabase {
        committed: RefCell<Vec<String>>,
        rollbacks: Cell<usize>,
        fail_on: Option<&'static str>,
    }

    struct FakeTransaction<'a> {
        database: &'a FakeDatabase,
        buffered: RefCell<Vec<String>>,
    }

    impl Executor for FakeTransaction<'_> {
        fn execute(&self, query: &str, _params: &[&dyn ToSql]) -> Result<u64, DbError> {
            if self.database.fail_on.is_some_and(|f| query.contains(f)) {
                return Err(DbError::Query(format!("syntax error near {query}")));
            }
            self.buffered.borrow_mut().push(query.to_string());
            Ok(0)
        }

        fn query_one(&self, query: &str, _params: &[&dyn ToSql]) -> Result<Row, DbError> {
            Err(DbError::Query(format!("unexpected query {query}")))
        }

        fn query_all(&self, query: &str, _params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
            Err(DbError::Query(format!("unexpected query {query}")))
        }
    }

    impl TransactionScope for FakeTransaction<'_> {
        fn as_executor(&self) -> &dyn Executor {
            self
        }

        fn commit(self: Box<Self>) -> Result<(), DbError> {
            let FakeTransaction { database, buffered } = *self;
            database.committed.borrow_mut().extend(buffered.into_inner());
            Ok(())
        }

        fn rollback(self: Box<Self>) -> Result<(), DbError> {
            self.database.rollbacks.set(self.database.rollbacks.get() + 1);
            Ok(())
        }
    }

    impl Database for FakeDatabase {
        fn begin(&self) -> Result<Box<dyn TransactionScope + '_>, DbError> {
            Ok(Box::new(FakeTransaction {
                database: self,
                buffered: RefCell::new(Vec::new()),
            }))
        }
    }

    /// Ledger rows go through the executor so they share the transaction.
    #[derive(Default)]
    struct FakeLedger {
        applied: Vec<AppliedMigration>,
        exists: bool,
    }

    const RECORD_MARKER: &str = "INSERT INTO migration_ledger";

    impl LedgerStore for FakeLedger {
        fn exists(&self, _executor: &dyn Executor) -> Result<bool, MigrationError> {
            Ok(self.exists)
        }

        fn create(&self, executor: &dyn Executor) -> Result<(), MigrationError> {
            executor.execute("CREATE TABLE migration_ledger ()", &[])?;
            Ok(())
        }

        fn applied(&self, _executor: &dyn Executor) -> Result<Vec<AppliedMigration>, MigrationError> {
            Ok(self.applied.clone())
        }

        fn record(&self, executor: &dyn Executor, record: &MigrationRecord) -> Result<(), MigrationError> {
            executor.execute(&format!("{RECORD_MARKER} {}", record.migration_id), &[])?;
            Ok(())
        }
    }

    fn five_steps() -> MigrationRegistry {
        let registry = MigrationRegistry::new();
        registry.touch_function(1).unwrap();
        registry.create_table::<Account>(2).unwrap();
        registry.raw_sql(3, "broken step", "ALTER TABLE accounts ADD COLUMN oops").unwrap();
        registry.create_table::<Membership>(4).unwrap();
        registry.raw_sql(5, "seed", "INSERT INTO accounts (user_name) VALUES ('root')").unwrap();
        registry
    }

    fn applied_from(registry: &MigrationRegistry) -> Vec<AppliedMigration> {
        registry
            .steps()
            .into_iter()
            .map(|step| AppliedMigration {
                migration_id: step.id,
                description: step.description.clone(),
                checksum: checksum(&step.sql_text()),
                applied_on: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn test_applies_every_pending_step_with_ledger_rows() {
        let registry = five_steps();
        let database = FakeDatabase::default();
        let ledger = FakeLedger::default();
        let migrator = Migrator::with_ledger(&registry, &ledger).unwrap();

        let report = migrator.apply(&database, &Cancellation::new()).unwrap();
        assert_eq!(report.applied, vec![1, 2, 3, 4, 5]);
        assert!(report.ledger_created);

        let committed = database.committed.borrow();
        assert_eq!(committed[0], "SELECT pg_advisory_xact_lock($1)");
        assert_eq!(committed.iter().filter(|s| s.starts_with(RECORD_MARKER)).count(), 5);
        let first_record = committed.iter().position(|s| s.starts_with(RECORD_MARKER)).unwrap();
        assert!(committed[first_record - 1].starts_with("CREATE OR REPLACE FUNCTION touch_last_modified()"));
    }

    #[test]
    fn test_fully_applied_ledger_is_a_no_op() {
        let registry = five_steps();
        let database = FakeDatabase::default();
        let ledger = FakeLedger {
            applied: applied_from(&registry),
            exists: true,
        };
        let migrator = Migrator::with_ledger(&registry, &ledger).unwrap().without_lock();

        let report = migrator.apply(&database, &Cancellation::new()).unwrap();
        assert!(report.applied.is_empty());
        assert!(!report.ledger_created);
        assert!(database.committed.borrow().is_empty());
    }

    #[test]
    fn test_failing_step_commits_nothing() {
        let registry = five_steps();
        let database = FakeDatabase {
            fail_on: Some("ADD COLUMN oops"),
            ..FakeDatabase::default()
        };
        let ledger = FakeLedger::default();
        let migrator = Migrator::with_ledger(&registry, &ledger).unwrap();

        let err = migrator.apply(&database, &Cancellation::new()).unwrap_err();
        assert!(matches!(err, MigrationError::StepFailed { id: 3, .. }));
        assert!(database.committed.borrow().is_empty());
        assert_eq!(database.rollbacks.get(), 1);
    }

    #[test]
    fn test_cancelled_batch_rolls_back() {
        let registry = five_steps();
        let database = FakeDatabase::default();
        let ledger = FakeLedger::default();
        let cancel = Cancellation::new();
        cancel.cancel();

        let err = Migrator::with_ledger(&registry, &ledger)
            .unwrap()
            .apply(&database, &cancel)
            .unwrap_err();
        assert!(matches!(err, MigrationError::Cancelled { id: 1 }));
        assert!(database.committed.borrow().is_empty());
        assert_eq!(database.rollbacks.get(), 1);
    }

    #[test]
    fn test_changed_step_text_is_rejected() {
        let registry = five_steps();
        let mut applied = applied_from(&registry);
        applied[4].checksum = checksum("INSERT INTO accounts (user_name) VALUES ('admin')");
        let ledger = FakeLedger { applied, exists: true };
        let database = FakeDatabase::default();

        let err = Migrator::with_ledger(&registry, &ledger)
            .unwrap()
            .apply(&database, &Cancellation::new())
            .unwrap_err();
        assert!(matches!(err, MigrationError::ChecksumMismatch { id: 5, .. }));
        assert!(database.committed.borrow().is_empty());
    }

    #[test]
    fn test_evolved_entity_still_applies_new_steps() {
        let registry = five_steps();
        let mut applied = applied_from(&registry);
        // accounts gained a column after step 2 ran
        applied[1].checksum = checksum("CREATE TABLE accounts (id UUID)");
        registry
            .raw_sql(6, "add accounts.email", "ALTER TABLE accounts ADD COLUMN email TEXT")
            .unwrap();
        let ledger = FakeLedger { applied, exists: true };
        let database = FakeDatabase::default();
        let migrator = Migrator::with_ledger(&registry, &ledger).unwrap().without_lock();

        let report = migrator.apply(&database, &Cancellation::new()).unwrap();
        assert_eq!(report.applied, vec![6]);
        assert!(database.committed.borrow()[0].contains("ADD COLUMN email"));

        let status = migrator.plan(&ledger.applied).unwrap();
        assert_eq!(status.modified, vec![2]);
        assert!(status.has_drift());
        assert_eq!(status.applied.len(), 5);
    }

    #[test]
    fn test_status_reports_pending_and_unknown() {
        let registry = five_steps();
        let mut applied = applied_from(&registry);
        applied.truncate(2);
        applied.push(AppliedMigration {
            migration_id: 99,
            description: "removed step".into(),
            checksum: checksum("SELECT 1"),
            applied_on: Utc::now(),
        });
        let ledger = FakeLedger { applied, exists: true };
        let database = FakeDatabase::default();
        let transaction = database.begin().unwrap();

        let status = Migrator::with_ledger(&registry, &ledger)
            .unwrap()
            .status(transaction.as_executor())
            .unwrap();
        assert_eq!(status.latest_applied(), Some(2));
        assert_eq!(status.next_pending(), Some(3));
        assert_eq!(status.pending.len(), 3);
        assert_eq!(status.unknown[0].migration_id, 99);
        assert!(!status.is_up_to_date());
    }
}
