//! `MigrationRecord` - one row of the `migration_ledger` table

use chrono::{DateTime, Utc};
use may_postgres::Row;
use uuid::Uuid;

use crate::executor::DbError;
use crate::schema::{Entity, EntityDescriptor, SqlField, TableBuilder};
use crate::value::Value;

/// Table holding one row per applied migration step. Rows are never updated
/// or deleted.
pub const LEDGER_TABLE: &str = "migration_ledger";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub id: Option<Uuid>,
    /// Registration id, also the application order
    pub migration_id: u64,
    /// Table the step creates, when it creates one
    pub table_id: Option<String>,
    pub description: String,
    pub sql_text: String,
    /// `SHA-256` of `sql_text`
    pub checksum: String,
    pub applied_on: DateTime<Utc>,
    /// When the step was registered
    pub date_created: DateTime<Utc>,
}

impl Entity for MigrationRecord {
    fn table_name() -> &'static str {
        LEDGER_TABLE
    }

    fn define(table: &mut TableBuilder) {
        table.column::<Option<Uuid>>("id").primary_key();
        table.column::<u64>("migration_id").unique();
        table.column::<Option<String>>("table_id").size(128);
        table.column::<String>("description");
        table.column::<String>("sql_text");
        table.column::<String>("checksum").size(64);
        table.column::<DateTime<Utc>>("applied_on").default_expr("now()");
        table.column::<DateTime<Utc>>("date_created");
        table.touch_trigger(false);
    }

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn with_id(self, id: Uuid) -> Self {
        Self { id: Some(id), ..self }
    }

    fn column_value(&self, member: &str) -> Option<Value> {
        let value = match member {
            "id" => self.id.to_value(),
            "migration_id" => self.migration_id.to_value(),
            "table_id" => self.table_id.to_value(),
            "description" => self.description.to_value(),
            "sql_text" => self.sql_text.to_value(),
            "checksum" => self.checksum.to_value(),
            "applied_on" => self.applied_on.to_value(),
            "date_created" => self.date_created.to_value(),
            _ => return None,
        };
        Some(value)
    }

    fn from_row(row: &Row, descriptor: &EntityDescriptor) -> Result<Self, DbError> {
        Ok(Self {
            id: SqlField::from_row(row, descriptor.member_column("id")?)?,
            migration_id: SqlField::from_row(row, descriptor.member_column("migration_id")?)?,
            table_id: SqlField::from_row(row, descriptor.member_column("table_id")?)?,
            description: SqlField::from_row(row, descriptor.member_column("description")?)?,
            sql_text: SqlField::from_row(row, descriptor.member_column("sql_text")?)?,
            checksum: SqlField::from_row(row, descriptor.member_column("checksum")?)?,
            applied_on: SqlField::from_row(row, descriptor.member_column("applied_on")?)?,
            date_created: SqlField::from_row(row, descriptor.member_column("date_created")?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_table_ddl() {
        let descriptor = EntityDescriptor::build::<MigrationRecord>().unwrap();
        let statements = descriptor.ddl_statements();
        assert_eq!(statements.len(), 1);
        let ddl = &statements[0];
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS migration_ledger ("));
        assert!(ddl.contains("migration_id NUMERIC(20,0) NOT NULL UNIQUE"));
        assert!(ddl.contains("table_id VARCHAR(128) NULL"));
        assert!(ddl.contains("checksum VARCHAR(64) NOT NULL"));
        assert!(ddl.contains("sql_text TEXT NOT NULL"));
    }
}
