//! Synthesized statements and their execution.

use may_postgres::types::ToSql;
use may_postgres::Row;
use std::fmt;
use thiserror::Error;

use crate::executor::{DbError, Executor};
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
use crate::value::Value;

/// The SQL command a statement runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
    Copy,
    Ddl,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Select => "select",
            CommandKind::Insert => "insert",
            CommandKind::Update => "update",
            CommandKind::Delete => "delete",
            CommandKind::Upsert => "upsert",
            CommandKind::Copy => "copy",
            CommandKind::Ddl => "ddl",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `$n` parameter and the column it binds.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub placeholder: usize,
    pub column: String,
    pub value: Value,
}

impl fmt::Display for BoundParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${} ({}) = {}", self.placeholder, self.column, self.value)
    }
}

/// A statement execution failure, carrying what was sent.
#[derive(Debug, Error)]
#[error("statement failed: {text} [{}]: {source}", render_parameters(.parameters))]
pub struct StatementError {
    pub text: String,
    pub parameters: Vec<BoundParameter>,
    pub tag: Option<String>,
    #[source]
    pub source: DbError,
}

fn render_parameters(parameters: &[BoundParameter]) -> String {
    parameters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Statement text plus its bound parameters. Built per call.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub parameters: Vec<BoundParameter>,
    pub kind: CommandKind,
    /// Caller-supplied label carried into metrics and errors
    pub tag: Option<String>,
}

impl Statement {
    pub fn new(kind: CommandKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
            kind,
            tag: None,
        }
    }

    /// Bind the next parameter and return its placeholder number.
    pub fn bind(&mut self, column: impl Into<String>, value: Value) -> usize {
        let placeholder = self.parameters.len() + 1;
        self.parameters.push(BoundParameter {
            placeholder,
            column: column.into(),
            value,
        });
        placeholder
    }

    #[must_use]
    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.parameters.iter().map(|p| &p.value)
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        self.parameters.iter().map(|p| &p.value as &dyn ToSql).collect()
    }

    fn record(&self) {
        #[cfg(feature = "metrics")]
        METRICS.record_statement(self.kind.as_str(), self.tag.as_deref());
    }

    fn fail(&self, source: DbError) -> StatementError {
        log::warn!("{} statement failed: {source}", self.kind);
        StatementError {
            text: self.text.clone(),
            parameters: self.parameters.clone(),
            tag: self.tag.clone(),
            source,
        }
    }

    /// # Errors
    ///
    /// Returns `StatementError` wrapping the driver failure.
    pub fn execute(&self, executor: &dyn Executor) -> Result<u64, StatementError> {
        self.record();
        executor.execute(&self.text, &self.params()).map_err(|e| self.fail(e))
    }

    /// # Errors
    ///
    /// Returns `StatementError` wrapping the driver failure, including a row
    /// count other than one.
    pub fn query_one(&self, executor: &dyn Executor) -> Result<Row, StatementError> {
        self.record();
        executor.query_one(&self.text, &self.params()).map_err(|e| self.fail(e))
    }

    /// # Errors
    ///
    /// Returns `StatementError` wrapping the driver failure.
    pub fn query_all(&self, executor: &dyn Executor) -> Result<Vec<Row>, StatementError> {
        self.record();
        executor.query_all(&self.text, &self.params()).map_err(|e| self.fail(e))
    }

    /// Wrap a failure that happened after execution, such as row decoding.
    pub fn error(&self, source: DbError) -> StatementError {
        self.fail(source)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records `execute` calls; queries returning rows always fail.
    #[derive(Default)]
    pub(crate) struct RecordingExecutor {
        pub executed: RefCell<Vec<(String, usize)>>,
        pub fail_on: Option<String>,
    }

    impl Executor for RecordingExecutor {
        fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
            if self.fail_on.as_deref().is_some_and(|f| query.contains(f)) {
                return Err(DbError::Query(format!("refused: {query}")));
            }
            self.executed.borrow_mut().push((query.to_string(), params.len()));
            Ok(1)
        }

        fn query_one(&self, query: &str, _params: &[&dyn ToSql]) -> Result<Row, DbError> {
            Err(DbError::Query(format!("no rows for {query}")))
        }

        fn query_all(&self, query: &str, _params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
            Err(DbError::Query(format!("no rows for {query}")))
        }
    }

    #[test]
    fn test_bind_assigns_positions_in_order() {
        let mut statement = Statement::new(CommandKind::Select, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(statement.bind("a", Value::Int(1)), 1);
        assert_eq!(statement.bind("b", Value::Null), 2);
        assert_eq!(statement.values().count(), 2);
    }

    #[test]
    fn test_execute_passes_every_parameter() {
        let executor = RecordingExecutor::default();
        let mut statement = Statement::new(CommandKind::Delete, "DELETE FROM t WHERE a = $1");
        statement.bind("a", Value::Text("x".into()));
        assert_eq!(statement.execute(&executor).unwrap(), 1);
        assert_eq!(
            executor.executed.borrow().as_slice(),
            &[("DELETE FROM t WHERE a = $1".to_string(), 1)]
        );
    }

    #[test]
    fn test_failure_carries_text_and_parameters() {
        let executor = RecordingExecutor::default();
        let mut statement =
            Statement::new(CommandKind::Select, "SELECT * FROM t WHERE a = $1").with_tag(Some("lookup".into()));
        statement.bind("a", Value::BigInt(9));

        let err = statement.query_one(&executor).unwrap_err();
        assert_eq!(err.text, "SELECT * FROM t WHERE a = $1");
        assert_eq!(err.parameters[0].value, Value::BigInt(9));
        assert_eq!(err.tag.as_deref(), Some("lookup"));
        assert!(err.to_string().contains("$1 (a) = 9"));
    }
}
