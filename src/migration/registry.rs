//! Migration registry
//!
//! Steps are registered with strictly increasing ids. Each registration runs
//! its factory immediately, so a broken entity declaration or lookup enum fails
//! at boot rather than at deployment.

use chrono::{DateTime, Utc};
use sea_query::{ColumnDef, OnConflict, PostgresQueryBuilder, Query, Table};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::migration::checksum::checksum;
use crate::migration::MigrationError;
use crate::schema::{Entity, EntityDescriptor, TOUCH_FUNCTION_SQL};

/// An enum persisted as an `(id, name)` lookup table.
pub trait LookupEnum {
    const TABLE: &'static str;

    /// Every variant as `(id, name)`.
    fn variants() -> &'static [(i32, &'static str)];
}

/// One registered migration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub id: u64,
    pub description: String,
    /// Table the step creates, if any
    pub table: Option<String>,
    pub statements: Vec<String>,
    pub created: DateTime<Utc>,
    /// Text regenerated from a declaration on every boot (entity DDL, lookup
    /// enums). A changed checksum on such a step is reported, not fatal.
    pub derived: bool,
}

impl MigrationStep {
    pub fn new(id: u64, description: impl Into<String>, statements: Vec<String>) -> Self {
        Self {
            id,
            description: description.into(),
            table: None,
            statements,
            created: Utc::now(),
            derived: false,
        }
    }

    #[must_use]
    pub fn derived(mut self) -> Self {
        self.derived = true;
        self
    }

    #[must_use]
    pub fn for_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// The text stored in the ledger.
    pub fn sql_text(&self) -> String {
        self.statements.join(";\n")
    }

    pub fn checksum(&self) -> String {
        checksum(&self.sql_text())
    }
}

/// Ordered set of migration steps, owned by the application.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    steps: Mutex<BTreeMap<u64, MigrationStep>>,
    last_id: AtomicU64,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step built by `factory`. The factory receives the step id.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` for a reused or non-increasing id, or whatever
    /// the factory reports.
    pub fn register<F>(&self, id: u64, factory: F) -> Result<(), MigrationError>
    where
        F: FnOnce(u64) -> Result<MigrationStep, MigrationError>,
    {
        if id == 0 {
            return Err(MigrationError::ReservedId);
        }
        let mut steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
        if steps.contains_key(&id) {
            return Err(MigrationError::DuplicateId(id));
        }
        let last = self.last_id.load(Ordering::SeqCst);
        if id <= last {
            return Err(MigrationError::NonMonotonicId { id, last });
        }

        let mut step = factory(id)?;
        step.id = id;
        log::debug!("registered migration {id}: {}", step.description);
        steps.insert(id, step);
        self.last_id.store(id, Ordering::SeqCst);
        Ok(())
    }

    /// `CREATE TABLE` (plus indexes and trigger) for `E`.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Configuration` when `E`'s declaration is invalid.
    pub fn create_table<E: Entity>(&self, id: u64) -> Result<(), MigrationError> {
        self.register(id, |id| {
            let descriptor = EntityDescriptor::of::<E>()?;
            Ok(MigrationStep::new(
                id,
                format!("create table {}", descriptor.table()),
                descriptor.ddl_statements().to_vec(),
            )
            .for_table(descriptor.table())
            .derived())
        })
    }

    /// Lookup table for `L`, filled with its variants.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Render` when the statements cannot be built.
    pub fn lookup_table<L: LookupEnum>(&self, id: u64) -> Result<(), MigrationError> {
        self.register(id, |id| {
            let statements = lookup_statements::<L>().map_err(|message| MigrationError::Render { id, message })?;
            Ok(MigrationStep::new(id, format!("lookup table {}", L::TABLE), statements)
                .for_table(L::TABLE)
                .derived())
        })
    }

    /// # Errors
    ///
    /// Returns `MigrationError` for a reused or non-increasing id.
    pub fn raw_sql(&self, id: u64, description: &str, sql: impl Into<String>) -> Result<(), MigrationError> {
        let sql = sql.into();
        self.register(id, |id| Ok(MigrationStep::new(id, description, vec![sql])))
    }

    /// The shared `touch_last_modified()` trigger function. Register it before
    /// any table that has the trigger.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` for a reused or non-increasing id.
    pub fn touch_function(&self, id: u64) -> Result<(), MigrationError> {
        self.raw_sql(id, "create function touch_last_modified", TOUCH_FUNCTION_SQL)
    }

    /// All steps in id order.
    pub fn steps(&self) -> Vec<MigrationStep> {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<MigrationStep> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).get(&id).cloned()
    }

    pub fn last_id(&self) -> u64 {
        self.last_id.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lookup_statements<L: LookupEnum>() -> Result<Vec<String>, String> {
    let create = Table::create()
        .table(L::TABLE)
        .if_not_exists()
        .col(ColumnDef::new("id").integer().not_null().primary_key())
        .col(ColumnDef::new("name").text().not_null().unique_key())
        .to_string(PostgresQueryBuilder);

    let mut statements = vec![create];
    let variants = L::variants();
    if !variants.is_empty() {
        let mut insert = Query::insert();
        insert.into_table(L::TABLE).columns(["id", "name"]);
        for (id, name) in variants {
            insert
                .values([(*id).into(), (*name).into()])
                .map_err(|e| e.to_string())?;
        }
        insert.on_conflict(OnConflict::column("id").do_nothing().to_owned());
        statements.push(insert.to_string(PostgresQueryBuilder));
    }
    Ok(statements)
}
