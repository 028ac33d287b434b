//! Migration error types

use thiserror::Error;

use crate::error::ConfigurationError;
use crate::executor::DbError;
use crate::sql::{StatementError, SynthesisError};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Statement(#[from] StatementError),

    /// A step's statement failed; the whole batch was rolled back.
    #[error("Migration {id} ({description}) failed: {source}")]
    StepFailed {
        id: u64,
        description: String,
        #[source]
        source: StatementError,
    },

    #[error(
        "Migration {id} was modified after being applied.\n\
         Stored checksum: {stored}\n\
         Current checksum: {current}"
    )]
    ChecksumMismatch { id: u64, stored: String, current: String },

    #[error("Migration id {0} is already registered")]
    DuplicateId(u64),

    #[error("Migration id {id} must be greater than the last registered id {last}")]
    NonMonotonicId { id: u64, last: u64 },

    #[error("Migration id 0 is reserved")]
    ReservedId,

    #[error("Migration {id} was cancelled before it ran; nothing was committed")]
    Cancelled { id: u64 },

    #[error("Ledger row could not be decoded: {0}")]
    Decode(String),

    #[error("Could not render migration {id}: {message}")]
    Render { id: u64, message: String },
}
