//! Executing helpers over [`Synthesizer`] statements.
//!
//! Each helper synthesizes one statement for the entity's shared descriptor,
//! runs it on the given executor and decodes the result.

use may_postgres::Row;
use uuid::Uuid;

use crate::cancel::Cancellation;
use crate::error::Error;
use crate::executor::{DbError, Executor};
use crate::schema::{Entity, EntityDescriptor};
use crate::sql::copy::{CopySink, CopyWriter};
use crate::sql::filter::Filter;
use crate::sql::statement::Statement;
use crate::sql::synth::{Selection, Synthesizer};

/// Result of [`upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: Uuid,
    /// `false` when an existing row matched and nothing was written
    pub inserted: bool,
}

fn decode<T>(statement: &Statement, row: &Row, index: usize) -> Result<T, Error>
where
    T: for<'a> may_postgres::types::FromSql<'a>,
{
    row.try_get(index)
        .map_err(|e| Error::from(statement.error(DbError::Decode(e.to_string()))))
}

fn rows_to_entities<E: Entity>(
    statement: &Statement,
    descriptor: &EntityDescriptor,
    rows: &[Row],
) -> Result<Vec<E>, Error> {
    rows.iter()
        .map(|row| E::from_row(row, descriptor).map_err(|e| Error::from(statement.error(e))))
        .collect()
}

fn at_most_one<E: Entity>(descriptor: &EntityDescriptor, mut entities: Vec<E>) -> Result<Option<E>, Error> {
    if entities.len() > 1 {
        return Err(Error::MultipleRows {
            table: descriptor.table().to_string(),
            count: entities.len(),
        });
    }
    Ok(entities.pop())
}

/// Insert `entity` and return it carrying the new id.
///
/// # Errors
///
/// Returns `Error` when the descriptor, the statement, or the execution fails.
pub fn insert<E: Entity>(executor: &dyn Executor, entity: E) -> Result<E, Error> {
    let synth = Synthesizer::for_entity::<E>()?;
    let statement = synth.insert(&entity)?;
    let row = statement.query_one(executor)?;
    let id: Uuid = decode(&statement, &row, 0)?;
    Ok(entity.with_id(id))
}

/// # Errors
///
/// Returns `Error` when the entity has no id or the execution fails.
pub fn update<E: Entity>(executor: &dyn Executor, entity: &E) -> Result<u64, Error> {
    let statement = Synthesizer::for_entity::<E>()?.update(entity)?;
    Ok(statement.execute(executor)?)
}

/// # Errors
///
/// Returns `Error` when the execution fails.
pub fn delete_by_id<E: Entity>(executor: &dyn Executor, id: Uuid) -> Result<u64, Error> {
    let statement = Synthesizer::for_entity::<E>()?.delete_by_id(id);
    Ok(statement.execute(executor)?)
}

/// # Errors
///
/// Returns `Error` for an empty id set or when the execution fails.
pub fn delete_by_ids<E: Entity>(executor: &dyn Executor, ids: &[Uuid]) -> Result<u64, Error> {
    let statement = Synthesizer::for_entity::<E>()?.delete_by_ids(ids)?;
    Ok(statement.execute(executor)?)
}

/// # Errors
///
/// Returns `Error` for an empty filter or when the execution fails.
pub fn delete_where<E: Entity>(executor: &dyn Executor, filter: &Filter) -> Result<u64, Error> {
    let statement = Synthesizer::for_entity::<E>()?.delete_where(filter)?;
    Ok(statement.execute(executor)?)
}

/// # Errors
///
/// Returns `Error` when the execution or row decoding fails.
pub fn get_by_id<E: Entity>(executor: &dyn Executor, id: Uuid) -> Result<Option<E>, Error> {
    let synth = Synthesizer::for_entity::<E>()?;
    let statement = synth.select_by_id(id);
    let rows = statement.query_all(executor)?;
    at_most_one(synth.descriptor(), rows_to_entities(&statement, synth.descriptor(), &rows)?)
}

/// # Errors
///
/// Returns `Error` when the filter names an unknown column or the execution fails.
pub fn find<E: Entity>(executor: &dyn Executor, filter: &Filter, selection: Selection) -> Result<Vec<E>, Error> {
    let synth = Synthesizer::for_entity::<E>()?;
    let statement = synth.select(filter, selection)?;
    let rows = statement.query_all(executor)?;
    rows_to_entities(&statement, synth.descriptor(), &rows)
}

/// The one row matching `filter`, if any.
///
/// # Errors
///
/// Returns `Error::MultipleRows` when more than one row matches.
pub fn find_single<E: Entity>(executor: &dyn Executor, filter: &Filter) -> Result<Option<E>, Error> {
    let descriptor = EntityDescriptor::of::<E>()?;
    at_most_one(descriptor, find(executor, filter, Selection::Single)?)
}

/// # Errors
///
/// Returns `Error` when the execution or row decoding fails.
pub fn find_all<E: Entity>(executor: &dyn Executor) -> Result<Vec<E>, Error> {
    find(executor, &Filter::all(), Selection::All)
}

/// # Errors
///
/// Returns `Error` when the filter names an unknown column or the execution fails.
pub fn count<E: Entity>(executor: &dyn Executor, filter: &Filter) -> Result<i64, Error> {
    let statement = Synthesizer::for_entity::<E>()?.count(filter)?;
    let row = statement.query_one(executor)?;
    decode(&statement, &row, 0)
}

/// # Errors
///
/// Returns `Error` when the filter names an unknown column or the execution fails.
pub fn exists<E: Entity>(executor: &dyn Executor, filter: &Filter) -> Result<bool, Error> {
    let statement = Synthesizer::for_entity::<E>()?.exists(filter)?;
    let row = statement.query_one(executor)?;
    decode(&statement, &row, 0)
}

/// Insert `entity` unless a row matches `filter`.
///
/// # Errors
///
/// Returns `Error` for an empty filter or when the execution fails.
pub fn upsert<E: Entity>(executor: &dyn Executor, entity: &E, filter: &Filter) -> Result<UpsertOutcome, Error> {
    let statement = Synthesizer::for_entity::<E>()?.upsert(entity, filter)?;
    let row = statement.query_one(executor)?;
    Ok(UpsertOutcome {
        id: decode(&statement, &row, 0)?,
        inserted: decode(&statement, &row, 1)?,
    })
}

/// Stream `entities` into their table with `COPY`.
///
/// `sink` is usually a [`crate::PgExecutor`] or a [`crate::Transaction`].
///
/// # Errors
///
/// Returns `Error::Cancelled` when `cancel` fires before the stream completes.
/// An import cancelled before its first chunk never opens the COPY; one
/// cancelled later drops its stream, which aborts the COPY.
pub fn bulk_import<'e, E, I>(sink: &dyn CopySink, entities: I, cancel: &Cancellation) -> Result<u64, Error>
where
    E: Entity + 'e,
    I: IntoIterator<Item = &'e E>,
{
    let descriptor = EntityDescriptor::of::<E>()?;
    let mut writer = CopyWriter::new(descriptor, sink);
    for entity in entities {
        if cancel.is_cancelled() {
            log::info!("bulk import into {} cancelled after {} rows", descriptor.table(), writer.rows());
            return Err(Error::Cancelled);
        }
        writer.write(entity)?;
    }
    writer.finish()
}
