//! Statement synthesis from entity descriptors.
//!
//! Every operation here is pure: it reads the descriptor and the call's data
//! and returns a [`Statement`]. Nothing is executed and nothing is cached.

use thiserror::Error;
use uuid::Uuid;

use crate::error::ConfigurationError;
use crate::schema::{ColumnDescriptor, Entity, EntityDescriptor, IdentityMode};
use crate::sql::filter::Filter;
use crate::sql::statement::{CommandKind, Statement};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("`{column}` is not a column of {table}")]
    UnknownColumn { table: String, column: String },

    #[error("{operation} on {table} requires a non-empty filter")]
    EmptyFilter { table: String, operation: &'static str },

    #[error("delete from {table} was given an empty id set")]
    EmptyIdSet { table: String },

    #[error("entity for {table} has no value for member `{member}`")]
    MissingValue { table: String, member: String },

    #[error("entity for {table} has no id")]
    MissingId { table: String },

    #[error("{table} has no columns to update")]
    NothingToUpdate { table: String },
}

/// Which rows of a filtered select are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    /// At most two rows, so callers can detect a non-unique match
    Single,
    First,
    Last,
    Random,
    Page { limit: u32, offset: u32 },
}

/// Builds statements for one entity's descriptor.
#[derive(Debug, Clone)]
pub struct Synthesizer<'d> {
    descriptor: &'d EntityDescriptor,
    tag: Option<String>,
}

impl<'d> Synthesizer<'d> {
    pub fn new(descriptor: &'d EntityDescriptor) -> Self {
        Self { descriptor, tag: None }
    }

    /// Label attached to every statement this synthesizer produces.
    #[must_use]
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn descriptor(&self) -> &'d EntityDescriptor {
        self.descriptor
    }

    fn statement(&self, kind: CommandKind, text: impl Into<String>) -> Statement {
        Statement::new(kind, text).with_tag(self.tag.clone())
    }

    fn table(&self) -> String {
        self.descriptor.table().to_string()
    }

    fn key(&self) -> &'d ColumnDescriptor {
        self.descriptor.primary_key()
    }

    pub fn select_by_id(&self, id: Uuid) -> Statement {
        let mut statement = self.statement(CommandKind::Select, self.descriptor.select_by_id_text());
        statement.bind(self.key().name(), Value::Uuid(id));
        statement
    }

    /// # Errors
    ///
    /// Returns `SynthesisError::UnknownColumn` for a filter or order term that
    /// names no column.
    pub fn select(&self, filter: &Filter, selection: Selection) -> Result<Statement, SynthesisError> {
        let mut statement = self.statement(CommandKind::Select, "");
        let mut text = format!("SELECT * FROM {}", self.descriptor.table());
        if let Some(predicate) = filter.render(self.descriptor, &mut statement)? {
            text.push_str(" WHERE ");
            text.push_str(&predicate);
        }

        let (order_column, descending) = match filter.ordering(self.descriptor)? {
            Some((column, descending)) => (column, descending),
            None => (self.key(), false),
        };
        let direction = |reverse: bool| if descending != reverse { "DESC" } else { "ASC" };
        match selection {
            Selection::All => {
                if filter.ordering(self.descriptor)?.is_some() {
                    text.push_str(&format!(" ORDER BY {} {}", order_column.name(), direction(false)));
                }
            }
            Selection::Single => text.push_str(" LIMIT 2"),
            Selection::First => {
                text.push_str(&format!(" ORDER BY {} {} LIMIT 1", order_column.name(), direction(false)));
            }
            Selection::Last => {
                text.push_str(&format!(" ORDER BY {} {} LIMIT 1", order_column.name(), direction(true)));
            }
            Selection::Random => text.push_str(" ORDER BY random() LIMIT 1"),
            Selection::Page { limit, offset } => {
                let limit = statement.bind("limit", Value::BigInt(i64::from(limit)));
                let offset = statement.bind("offset", Value::BigInt(i64::from(offset)));
                text.push_str(&format!(
                    " ORDER BY {} {} LIMIT ${limit} OFFSET ${offset}",
                    order_column.name(),
                    direction(false)
                ));
            }
        }
        statement.text = text;
        Ok(statement)
    }

    /// # Errors
    ///
    /// Returns `SynthesisError::UnknownColumn` for an unknown filter term.
    pub fn count(&self, filter: &Filter) -> Result<Statement, SynthesisError> {
        let mut statement = self.statement(CommandKind::Select, "");
        let mut text = format!("SELECT COUNT(*) FROM {}", self.descriptor.table());
        if let Some(predicate) = filter.render(self.descriptor, &mut statement)? {
            text.push_str(" WHERE ");
            text.push_str(&predicate);
        }
        statement.text = text;
        Ok(statement)
    }

    /// # Errors
    ///
    /// Returns `SynthesisError::UnknownColumn` for an unknown filter term.
    pub fn exists(&self, filter: &Filter) -> Result<Statement, SynthesisError> {
        let mut statement = self.statement(CommandKind::Select, "");
        let mut inner = format!("SELECT 1 FROM {}", self.descriptor.table());
        if let Some(predicate) = filter.render(self.descriptor, &mut statement)? {
            inner.push_str(" WHERE ");
            inner.push_str(&predicate);
        }
        statement.text = format!("SELECT EXISTS ({inner})");
        Ok(statement)
    }

    /// Writable columns with the entity's values. A `BY DEFAULT` identity left
    /// NULL is omitted so the server generates (or keeps) it.
    fn written<E: Entity>(&self, entity: &E) -> Result<Vec<(&'d ColumnDescriptor, Value)>, SynthesisError> {
        let mut written = Vec::with_capacity(self.descriptor.writable_columns().count());
        for column in self.descriptor.writable_columns() {
            let value = entity
                .column_value(column.member())
                .ok_or_else(|| SynthesisError::MissingValue {
                    table: self.table(),
                    member: column.member().to_string(),
                })?;
            if value.is_null() && column.identity() == IdentityMode::ByDefault {
                continue;
            }
            written.push((column, value));
        }
        Ok(written)
    }

    fn writes_every_column(&self, written: &[(&ColumnDescriptor, Value)]) -> bool {
        written.len() == self.descriptor.writable_columns().count()
    }

    /// `INSERT ... RETURNING id`. The database always assigns the id.
    ///
    /// # Errors
    ///
    /// Returns `SynthesisError::MissingValue` when the entity cannot supply a
    /// declared member.
    pub fn insert<E: Entity>(&self, entity: &E) -> Result<Statement, SynthesisError> {
        let written = self.written(entity)?;
        let mut statement = if self.writes_every_column(&written) {
            self.statement(CommandKind::Insert, self.descriptor.insert_text())
        } else if written.is_empty() {
            self.statement(
                CommandKind::Insert,
                format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", self.descriptor.table(), self.key().name()),
            )
        } else {
            let names: Vec<_> = written.iter().map(|(c, _)| c.name()).collect();
            let placeholders: Vec<_> = (1..=written.len()).map(|n| format!("${n}")).collect();
            self.statement(
                CommandKind::Insert,
                format!(
                    "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                    self.descriptor.table(),
                    names.join(", "),
                    placeholders.join(", "),
                    self.key().name()
                ),
            )
        };
        for (column, value) in written {
            statement.bind(column.name(), value);
        }
        Ok(statement)
    }

    /// # Errors
    ///
    /// Returns `SynthesisError` when the entity has no id, the table has
    /// nothing to update, or a member value is missing.
    pub fn update<E: Entity>(&self, entity: &E) -> Result<Statement, SynthesisError> {
        let id = entity.id().ok_or_else(|| SynthesisError::MissingId { table: self.table() })?;
        let written = self.written(entity)?;
        if written.is_empty() {
            return Err(SynthesisError::NothingToUpdate { table: self.table() });
        }
        let text = match self.descriptor.update_text() {
            Some(text) if self.writes_every_column(&written) => text.to_string(),
            _ => {
                let assignments: Vec<_> = written
                    .iter()
                    .enumerate()
                    .map(|(i, (c, _))| format!("{} = ${}", c.name(), i + 1))
                    .collect();
                format!(
                    "UPDATE {} SET {} WHERE {} = ${}",
                    self.descriptor.table(),
                    assignments.join(", "),
                    self.key().name(),
                    written.len() + 1
                )
            }
        };
        let mut statement = self.statement(CommandKind::Update, text);
        for (column, value) in written {
            statement.bind(column.name(), value);
        }
        statement.bind(self.key().name(), Value::Uuid(id));
        Ok(statement)
    }

    pub fn delete_by_id(&self, id: Uuid) -> Statement {
        let mut statement = self.statement(CommandKind::Delete, self.descriptor.delete_by_id_text());
        statement.bind(self.key().name(), Value::Uuid(id));
        statement
    }

    /// # Errors
    ///
    /// Returns `SynthesisError::EmptyIdSet` for an empty slice.
    pub fn delete_by_ids(&self, ids: &[Uuid]) -> Result<Statement, SynthesisError> {
        if ids.is_empty() {
            return Err(SynthesisError::EmptyIdSet { table: self.table() });
        }
        let mut statement = self.statement(
            CommandKind::Delete,
            format!("DELETE FROM {} WHERE {} = ANY($1)", self.descriptor.table(), self.key().name()),
        );
        statement.bind(self.key().name(), Value::UuidArray(ids.to_vec()));
        Ok(statement)
    }

    /// # Errors
    ///
    /// Returns `SynthesisError::EmptyFilter` rather than deleting every row.
    pub fn delete_where(&self, filter: &Filter) -> Result<Statement, SynthesisError> {
        let mut statement = self.statement(CommandKind::Delete, "");
        let predicate = filter
            .render(self.descriptor, &mut statement)?
            .ok_or_else(|| SynthesisError::EmptyFilter {
                table: self.table(),
                operation: "delete",
            })?;
        statement.text = format!("DELETE FROM {} WHERE {predicate}", self.descriptor.table());
        Ok(statement)
    }

    /// Insert `entity` unless a row matches `filter`, in one statement.
    ///
    /// The statement returns one row `(id, inserted)`: the existing row's id
    /// with `false`, or the new id with `true`.
    ///
    /// # Errors
    ///
    /// Returns `SynthesisError` for an empty filter, an unknown filter term, or
    /// a missing member value.
    pub fn upsert<E: Entity>(&self, entity: &E, filter: &Filter) -> Result<Statement, SynthesisError> {
        let table = self.descriptor.table();
        let key = self.key().name();
        let mut statement = self.statement(CommandKind::Upsert, "");
        let predicate = filter
            .render(self.descriptor, &mut statement)?
            .ok_or_else(|| SynthesisError::EmptyFilter {
                table: self.table(),
                operation: "upsert",
            })?;

        let mut names = Vec::new();
        let mut casts = Vec::new();
        for (column, value) in self.written(entity)? {
            let n = statement.bind(column.name(), value);
            names.push(column.name());
            casts.push(format!("${n}::{}", column.column_type().cast_text()));
        }

        let insert = if names.is_empty() {
            format!("INSERT INTO {table} SELECT WHERE NOT EXISTS (SELECT 1 FROM existing) RETURNING {key}")
        } else {
            format!(
                "INSERT INTO {table} ({}) SELECT {} WHERE NOT EXISTS (SELECT 1 FROM existing) RETURNING {key}",
                names.join(", "),
                casts.join(", ")
            )
        };
        statement.text = format!(
            "WITH existing AS (SELECT {key} FROM {table} WHERE {predicate} LIMIT 1), \
             inserted AS ({insert}) \
             SELECT {key}, false AS inserted FROM existing \
             UNION ALL SELECT {key}, true AS inserted FROM inserted"
        );
        Ok(statement)
    }

    /// The `COPY ... FROM STDIN` statement for bulk import.
    pub fn copy_statement(&self) -> Statement {
        self.statement(CommandKind::Copy, self.descriptor.copy_text())
    }
}

impl Synthesizer<'static> {
    /// Synthesizer over the shared descriptor of `E`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when the descriptor cannot be built.
    pub fn for_entity<E: Entity>() -> Result<Self, ConfigurationError> {
        Ok(Self::new(EntityDescriptor::of::<E>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_cfg::{Account, Membership, Ticket};

    fn accounts() -> Synthesizer<'static> {
        Synthesizer::for_entity::<Account>().unwrap()
    }

    #[test]
    fn test_select_by_id_binds_the_id() {
        let id = Uuid::new_v4();
        let statement = accounts().select_by_id(id);
        assert_eq!(statement.text, "SELECT * FROM accounts WHERE id = $1");
        assert!(!statement.text.contains(&id.to_string()));
        assert_eq!(statement.parameters.len(), 1);
        assert_eq!(statement.parameters[0].value, Value::Uuid(id));
        assert_eq!(statement.kind, CommandKind::Select);
    }

    #[test]
    fn test_select_variants() {
        let synth = accounts();
        let filter = Filter::all().eq("active", true);
        assert_eq!(
            synth.select(&filter, Selection::All).unwrap().text,
            "SELECT * FROM accounts WHERE active = $1"
        );
        assert_eq!(
            synth.select(&filter, Selection::Single).unwrap().text,
            "SELECT * FROM accounts WHERE active = $1 LIMIT 2"
        );
        assert_eq!(
            synth.select(&Filter::all(), Selection::First).unwrap().text,
            "SELECT * FROM accounts ORDER BY id ASC LIMIT 1"
        );
        assert_eq!(
            synth.select(&Filter::all().order_by("created"), Selection::Last).unwrap().text,
            "SELECT * FROM accounts ORDER BY created DESC LIMIT 1"
        );
        assert_eq!(
            synth.select(&Filter::all(), Selection::Random).unwrap().text,
            "SELECT * FROM accounts ORDER BY random() LIMIT 1"
        );

        let page = synth.select(&filter, Selection::Page { limit: 10, offset: 20 }).unwrap();
        assert_eq!(
            page.text,
            "SELECT * FROM accounts WHERE active = $1 ORDER BY id ASC LIMIT $2 OFFSET $3"
        );
        assert_eq!(page.parameters[1].value, Value::BigInt(10));
        assert_eq!(page.parameters[2].value, Value::BigInt(20));
    }

    #[test]
    fn test_count_and_exists() {
        let synth = accounts();
        assert_eq!(synth.count(&Filter::all()).unwrap().text, "SELECT COUNT(*) FROM accounts");
        assert_eq!(
            synth.exists(&Filter::any().eq("user_name", "a").eq("user_name", "b")).unwrap().text,
            "SELECT EXISTS (SELECT 1 FROM accounts WHERE user_name = $1 OR user_name = $2)"
        );
    }

    #[test]
    fn test_insert_and_update_bind_in_placeholder_order() {
        let synth = accounts();
        let account = Account::named("alice");
        let insert = synth.insert(&account).unwrap();
        let columns: Vec<_> = insert.parameters.iter().map(|p| p.column.as_str()).collect();
        assert_eq!(columns, vec!["active", "created", "user_name", "bio"]);
        assert_eq!(insert.parameters[2].value, Value::Text("alice".into()));

        assert_eq!(
            synth.update(&account).unwrap_err(),
            SynthesisError::MissingId { table: "accounts".into() }
        );
        let id = Uuid::new_v4();
        let update = synth.update(&account.with_id(id)).unwrap();
        assert_eq!(update.parameters.len(), 5);
        assert_eq!(update.parameters[4].placeholder, 5);
        assert_eq!(update.parameters[4].value, Value::Uuid(id));
    }

    #[test]
    fn test_by_default_identity_left_null_is_generated() {
        let synth = Synthesizer::for_entity::<Ticket>().unwrap();
        let unnumbered = Ticket::titled("printer on fire");

        let insert = synth.insert(&unnumbered).unwrap();
        assert_eq!(insert.text, "INSERT INTO tickets (title) VALUES ($1) RETURNING id");
        assert_eq!(insert.parameters.len(), 1);
        assert!(insert.parameters.iter().all(|p| !p.value.is_null()));

        let numbered = Ticket {
            number: Some(7),
            ..unnumbered.clone()
        };
        let insert = synth.insert(&numbered).unwrap();
        assert_eq!(insert.text, "INSERT INTO tickets (number, title) VALUES ($1, $2) RETURNING id");
        assert_eq!(insert.parameters[0].value, Value::BigInt(7));

        let update = synth.update(&unnumbered.clone().with_id(Uuid::new_v4())).unwrap();
        assert_eq!(update.text, "UPDATE tickets SET title = $1 WHERE id = $2");

        let upsert = synth
            .upsert(&unnumbered, &Filter::all().eq("title", "printer on fire"))
            .unwrap();
        assert!(upsert.text.contains("INSERT INTO tickets (title) SELECT $2::TEXT WHERE"));
    }

    #[test]
    fn test_deletes() {
        let synth = accounts();
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let statement = synth.delete_by_ids(&ids).unwrap();
        assert_eq!(statement.text, "DELETE FROM accounts WHERE id = ANY($1)");
        assert_eq!(statement.parameters[0].value, Value::UuidArray(ids));
        assert!(matches!(synth.delete_by_ids(&[]), Err(SynthesisError::EmptyIdSet { .. })));
        assert!(matches!(
            synth.delete_where(&Filter::all()),
            Err(SynthesisError::EmptyFilter { operation: "delete", .. })
        ));
        assert_eq!(
            synth.delete_where(&Filter::all().eq("bio", Value::Null)).unwrap().text,
            "DELETE FROM accounts WHERE bio IS NULL"
        );
    }

    #[test]
    fn test_upsert_is_one_statement() {
        let synth = accounts().tagged("signup");
        let statement = synth
            .upsert(&Account::named("alice"), &Filter::all().eq("user_name", "alice"))
            .unwrap();
        assert_eq!(
            statement.text,
            "WITH existing AS (SELECT id FROM accounts WHERE user_name = $1 LIMIT 1), \
             inserted AS (INSERT INTO accounts (active, created, user_name, bio) \
             SELECT $2::BOOLEAN, $3::TIMESTAMPTZ, $4::VARCHAR, $5::TEXT \
             WHERE NOT EXISTS (SELECT 1 FROM existing) RETURNING id) \
             SELECT id, false AS inserted FROM existing \
             UNION ALL SELECT id, true AS inserted FROM inserted"
        );
        assert_eq!(statement.tag.as_deref(), Some("signup"));
        assert_eq!(statement.parameters.len(), 5);
    }

    #[test]
    fn test_upsert_casts_leave_length_checks_to_the_column() {
        let synth = accounts();
        let long_name = "x".repeat(70);
        let statement = synth
            .upsert(&Account::named(&long_name), &Filter::all().eq("user_name", long_name.as_str()))
            .unwrap();
        assert!(statement.text.contains("$4::VARCHAR,"));
        assert!(!statement.text.contains("VARCHAR(64)"));
        assert_eq!(statement.parameters[3].value, Value::Text(long_name));
    }

    #[test]
    fn test_copy_statement_uses_ordinal_order() {
        let synth = Synthesizer::for_entity::<Membership>().unwrap();
        assert_eq!(
            synth.copy_statement().text,
            "COPY memberships (joined, account_id, id, role) FROM STDIN"
        );
    }
}
