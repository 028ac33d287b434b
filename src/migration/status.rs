//! Migration status reporting

use crate::migration::ledger::AppliedMigration;
use crate::migration::registry::MigrationStep;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Ledger rows with a registered step
    pub applied: Vec<AppliedMigration>,

    /// Registered steps not yet in the ledger, in id order
    pub pending: Vec<MigrationStep>,

    /// Ledger rows no registered step accounts for. They do not block `apply`.
    pub unknown: Vec<AppliedMigration>,

    /// Applied steps generated from a declaration whose text has changed since
    /// they ran. They stay applied; evolve the table with a new step.
    pub modified: Vec<u64>,
}

impl MigrationStatus {
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn latest_applied(&self) -> Option<u64> {
        self.applied.iter().map(|m| m.migration_id).max()
    }

    #[must_use]
    pub fn has_drift(&self) -> bool {
        !self.modified.is_empty()
    }

    #[must_use]
    pub fn next_pending(&self) -> Option<u64> {
        self.pending.first().map(|s| s.id)
    }
}
