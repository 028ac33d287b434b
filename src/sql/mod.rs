//! Parameterized SQL synthesis and execution.

pub mod cache;
pub mod copy;
pub mod crud;
pub mod filter;
pub mod statement;
pub mod synth;

pub use cache::EndpointCache;
pub use copy::{CopyFormat, CopySink, CopyStream, CopyWriter, DEFAULT_CHUNK_BYTES};
pub use crud::UpsertOutcome;
pub use filter::{Filter, MatchMode};
pub use statement::{BoundParameter, CommandKind, Statement, StatementError};
pub use synth::{Selection, SynthesisError, Synthesizer};
