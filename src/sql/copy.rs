//! Bulk import through `COPY ... FROM STDIN`.
//!
//! [`CopyWriter`] encodes rows in ordinal column order. When every column has a
//! wire type the payload uses the binary format, otherwise the text format.
//! Encoded rows are sent to the open [`CopyStream`] whenever the buffer grows
//! past the chunk size, so memory stays bounded however many rows are written.

use bytes::{BufMut, Bytes, BytesMut};
use may_postgres::{Client, CopyInSink};
use postgres_types::{IsNull, ToSql, Type};
use uuid::Uuid;

use crate::error::Error;
use crate::executor::{instrumented, DbError, PgExecutor};
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
use crate::schema::{ColumnDescriptor, Entity, EntityDescriptor, IdentityMode};
use crate::sql::statement::Statement;
use crate::sql::synth::{SynthesisError, Synthesizer};
use crate::transaction::Transaction;
use crate::value::Value;

const BINARY_SIGNATURE: &[u8] = b"PGCOPY\n\xff\r\n\0";

/// Buffered bytes that trigger a send to the server.
pub const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;

/// Driver seam for the COPY sub-protocol.
pub trait CopySink {
    /// Start `statement` and return the stream that feeds it.
    ///
    /// # Errors
    ///
    /// Returns `DbError` when the server rejects the statement.
    fn open(&self, statement: &str) -> Result<Box<dyn CopyStream + '_>, DbError>;
}

/// Input side of one running COPY. Dropping it without [`CopyStream::finish`]
/// aborts the COPY.
pub trait CopyStream {
    /// # Errors
    ///
    /// Returns `DbError` when the connection fails or the server rejects the data.
    fn send(&mut self, chunk: Bytes) -> Result<(), DbError>;

    /// End the input. Returns the number of rows the server accepted.
    ///
    /// # Errors
    ///
    /// Returns `DbError` when the server rejects the data.
    fn finish(self: Box<Self>) -> Result<u64, DbError>;
}

struct PgCopyStream {
    sink: CopyInSink<Bytes>,
}

impl CopyStream for PgCopyStream {
    fn send(&mut self, chunk: Bytes) -> Result<(), DbError> {
        self.sink.send(chunk)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64, DbError> {
        Ok(self.sink.finish()?)
    }
}

fn open_on(client: &Client, statement: &str) -> Result<Box<dyn CopyStream>, DbError> {
    let sink = instrumented(statement, || client.copy_in::<_, Bytes>(statement))?;
    Ok(Box::new(PgCopyStream { sink }))
}

impl CopySink for PgExecutor {
    fn open(&self, statement: &str) -> Result<Box<dyn CopyStream + '_>, DbError> {
        open_on(self.client(), statement)
    }
}

impl CopySink for Transaction {
    fn open(&self, statement: &str) -> Result<Box<dyn CopyStream + '_>, DbError> {
        if self.is_closed() {
            return Err(DbError::TransactionClosed);
        }
        open_on(self.client(), statement)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFormat {
    Binary,
    Text,
}

/// Encodes and streams one import for a single table.
///
/// The COPY starts on the first flush. A cancelled or failed writer that never
/// flushed has sent nothing; one dropped mid-stream aborts the COPY.
pub struct CopyWriter<'d, 's> {
    descriptor: &'d EntityDescriptor,
    columns: Vec<(&'d ColumnDescriptor, Option<Type>)>,
    format: CopyFormat,
    statement: Statement,
    sink: &'s dyn CopySink,
    stream: Option<Box<dyn CopyStream + 's>>,
    buffer: BytesMut,
    chunk_bytes: usize,
    rows: u64,
}

impl<'d, 's> CopyWriter<'d, 's> {
    pub fn new(descriptor: &'d EntityDescriptor, sink: &'s dyn CopySink) -> Self {
        let columns: Vec<_> = descriptor
            .copy_columns()
            .map(|c| (c, c.column_type().postgres_type()))
            .collect();
        let format = if columns.iter().all(|(_, ty)| ty.is_some()) {
            CopyFormat::Binary
        } else {
            CopyFormat::Text
        };

        let mut statement = Synthesizer::new(descriptor).copy_statement();
        let mut buffer = BytesMut::with_capacity(DEFAULT_CHUNK_BYTES);
        if format == CopyFormat::Binary {
            statement.text.push_str(" WITH (FORMAT binary)");
            buffer.put_slice(BINARY_SIGNATURE);
            buffer.put_i32(0); // flags
            buffer.put_i32(0); // header extension length
        }
        Self {
            descriptor,
            columns,
            format,
            statement,
            sink,
            stream: None,
            buffer,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            rows: 0,
        }
    }

    #[must_use]
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    pub fn format(&self) -> CopyFormat {
        self.format
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// The COPY statement matching this writer's format.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    fn row_values<E: Entity>(&self, entity: &E) -> Result<Vec<Value>, SynthesisError> {
        self.columns
            .iter()
            .map(|(column, _)| {
                if column.is_primary_key() {
                    return Ok(Value::Uuid(entity.id().unwrap_or_else(Uuid::new_v4)));
                }
                let missing = || SynthesisError::MissingValue {
                    table: self.descriptor.table().to_string(),
                    member: column.member().to_string(),
                };
                let value = entity.column_value(column.member()).ok_or_else(missing)?;
                // COPY has no per-row DEFAULT
                if value.is_null() && column.identity() == IdentityMode::ByDefault {
                    return Err(missing());
                }
                Ok(value)
            })
            .collect()
    }

    /// Append one entity. Entities without an id get a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `Error` when a member value is missing or cannot be encoded, or
    /// when sending a full chunk fails.
    pub fn write<E: Entity>(&mut self, entity: &E) -> Result<(), Error> {
        let values = self.row_values(entity)?;
        match self.format {
            CopyFormat::Binary => self.write_binary(&values)?,
            CopyFormat::Text => self.write_text(&values),
        }
        self.rows += 1;
        if self.buffer.len() >= self.chunk_bytes {
            self.flush()?;
        }
        Ok(())
    }

    fn write_binary(&mut self, values: &[Value]) -> Result<(), DbError> {
        let field_count = i16::try_from(values.len()).map_err(|_| DbError::Other("too many COPY columns".into()))?;
        self.buffer.put_i16(field_count);
        let mut field = BytesMut::new();
        for ((column, ty), value) in self.columns.iter().zip(values) {
            let ty = ty.as_ref().unwrap_or(&Type::TEXT);
            field.clear();
            let is_null = value
                .to_sql(ty, &mut field)
                .map_err(|e| DbError::Other(format!("encoding `{}` for COPY: {e}", column.name())))?;
            match is_null {
                IsNull::Yes => self.buffer.put_i32(-1),
                IsNull::No => {
                    let len = i32::try_from(field.len())
                        .map_err(|_| DbError::Other(format!("`{}` value too large for COPY", column.name())))?;
                    self.buffer.put_i32(len);
                    self.buffer.put_slice(&field);
                }
            }
        }
        Ok(())
    }

    fn write_text(&mut self, values: &[Value]) {
        let line = values
            .iter()
            .map(|v| v.copy_text().map_or_else(|| "\\N".to_string(), |t| escape_text(&t)))
            .collect::<Vec<_>>()
            .join("\t");
        self.buffer.put_slice(line.as_bytes());
        self.buffer.put_u8(b'\n');
    }

    fn open_stream(&mut self) -> Result<(), Error> {
        if self.stream.is_none() {
            let stream = self.sink.open(&self.statement.text).map_err(|e| self.statement.error(e))?;
            log::debug!("started COPY into {}", self.descriptor.table());
            self.stream = Some(stream);
        }
        Ok(())
    }

    /// Send everything buffered so far.
    ///
    /// # Errors
    ///
    /// Returns `Error::Statement` carrying the COPY text when the sink fails.
    pub fn flush(&mut self) -> Result<(), Error> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.open_stream()?;
        let chunk = self.buffer.split().freeze();
        if let Some(stream) = self.stream.as_mut() {
            stream.send(chunk).map_err(|e| self.statement.error(e))?;
        }
        Ok(())
    }

    /// Send the trailer and end the COPY.
    ///
    /// # Errors
    ///
    /// Returns `Error::Statement` carrying the COPY text when the sink fails.
    pub fn finish(mut self) -> Result<u64, Error> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::copy_span(self.descriptor.table()).entered();

        if self.format == CopyFormat::Binary {
            self.buffer.put_i16(-1);
        }
        self.flush()?;
        self.open_stream()?;
        let copied = match self.stream.take() {
            Some(stream) => stream.finish().map_err(|e| self.statement.error(e))?,
            None => 0,
        };

        #[cfg(feature = "metrics")]
        METRICS.record_rows_copied(self.descriptor.table(), copied);
        log::info!("copied {copied} rows into {}", self.descriptor.table());
        Ok(copied)
    }
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}
