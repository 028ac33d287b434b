//! Crate-level error types.

use thiserror::Error;

use crate::executor::DbError;
use crate::sql::{StatementError, SynthesisError};

/// Fatal schema declaration errors, raised while an entity's descriptor is built.
///
/// These are startup-time errors: every entity is expected to be derived (for
/// example by registering it with a migration) before traffic is served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("entity `{entity}` declares no schema-eligible columns")]
    NoColumns { entity: String },

    #[error("entity `{entity}` must declare exactly one primary key, found {count}")]
    PrimaryKeyCount { entity: String, count: usize },

    #[error("column `{column}` is a foreign key without a target table")]
    ForeignKeyWithoutTarget { column: String },

    #[error("column `{column}` is both a foreign key and explicitly indexed; foreign keys are indexed implicitly")]
    ForeignKeyIndexed { column: String },

    #[error("column `{column}` is both unique and explicitly indexed; unique columns are indexed implicitly")]
    UniqueIndexed { column: String },

    #[error("member `{member}` has semantic type {semantic} with no column mapping")]
    UnmappedType { member: String, semantic: String },

    #[error("column `{column}` of type {column_type} does not accept size {size}")]
    SizeNotApplicable {
        column: String,
        column_type: String,
        size: String,
    },

    #[error("column `{column}` of type {column_type} does not accept check constraints")]
    ChecksNotApplicable { column: String, column_type: String },

    #[error("column `{column}` has an empty check expression")]
    EmptyCheck { column: String },

    #[error("column `{column}` of type {column_type} cannot be an identity column")]
    IdentityNotApplicable { column: String, column_type: String },

    #[error("column `{column}` declares both an identity mode and a default expression")]
    IdentityWithDefault { column: String },

    #[error("primary key `{column}` must be a UUID column, found {column_type}")]
    PrimaryKeyType { column: String, column_type: String },

    #[error("primary key `{column}` cannot be nullable")]
    NullablePrimaryKey { column: String },

    #[error("primary key `{column}` cannot declare {option}")]
    PrimaryKeyOption { column: String, option: &'static str },

    #[error("entity `{entity}` declares column `{column}` more than once")]
    DuplicateColumn { entity: String, column: String },

    #[error("`{name}` is not a valid SQL identifier")]
    InvalidIdentifier { name: String },

    #[error("entity `{entity}` produced a non-contiguous ordinal layout")]
    OrdinalLayout { entity: String },
}

/// Top-level error returned by the executing helpers in [`crate::sql::crud`].
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("expected at most one row from `{table}`, found {count}")]
    MultipleRows { table: String, count: usize },

    #[error("operation was cancelled")]
    Cancelled,
}
