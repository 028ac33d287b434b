//! Helpers for tests that need a live PostgreSQL.
//!
//! [`TestDatabase::connect`] reads `TIDEMARK_TEST_DATABASE_URL` and returns
//! `Ok(None)` when it is unset, so database tests skip instead of failing on
//! machines without a server. Each handle works in its own throwaway schema,
//! dropped again when the handle goes out of scope.

use uuid::Uuid;

use crate::connection::connect;
use crate::executor::{DbError, Executor, PgExecutor};

pub const DATABASE_URL_ENV: &str = "TIDEMARK_TEST_DATABASE_URL";

pub struct TestDatabase {
    executor: PgExecutor,
    schema: String,
}

impl TestDatabase {
    /// Connect and switch into a fresh schema.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the URL is set but the connection or schema setup fails.
    pub fn connect() -> Result<Option<Self>, DbError> {
        let Ok(url) = std::env::var(DATABASE_URL_ENV) else {
            log::info!("{DATABASE_URL_ENV} not set, skipping database test");
            return Ok(None);
        };

        let client = connect(&url).map_err(|e| DbError::Other(e.to_string()))?;
        let executor = PgExecutor::new(client);
        let schema = format!("tidemark_test_{}", Uuid::new_v4().simple());
        executor.execute(&format!("CREATE SCHEMA {schema}"), &[])?;
        executor.execute(&format!("SET search_path TO {schema}, public"), &[])?;
        log::debug!("test database ready in schema {schema}");
        Ok(Some(Self { executor, schema }))
    }

    pub fn executor(&self) -> &PgExecutor {
        &self.executor
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let drop_schema = format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema);
        if let Err(e) = self.executor.execute(&drop_schema, &[]) {
            log::warn!("failed to drop test schema {}: {e}", self.schema);
        }
    }
}
