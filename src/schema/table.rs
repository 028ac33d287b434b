//! Entity declaration.
//!
//! An entity states its columns once, through [`Entity::define`]. The derive
//! macro generates this impl from field attributes; hand-written impls use the
//! same [`TableBuilder`] calls.

use may_postgres::Row;
use uuid::Uuid;

use crate::executor::DbError;
use crate::schema::column::ColumnSpec;
use crate::schema::descriptor::EntityDescriptor;
use crate::schema::field::SqlField;
use crate::value::Value;

/// A type persisted as one table row.
///
/// # Examples
///
/// ```
/// use tidemark::schema::{Entity, EntityDescriptor, SqlField, TableBuilder};
/// use tidemark::{DbError, Value};
/// use uuid::Uuid;
///
/// struct Tag {
///     id: Option<Uuid>,
///     label: String,
/// }
///
/// impl Entity for Tag {
///     fn table_name() -> &'static str {
///         "tags"
///     }
///
///     fn define(table: &mut TableBuilder) {
///         table.column::<Option<Uuid>>("id").primary_key();
///         table.column::<String>("label").size(32).unique();
///     }
///
///     fn id(&self) -> Option<Uuid> {
///         self.id
///     }
///
///     fn with_id(self, id: Uuid) -> Self {
///         Self { id: Some(id), ..self }
///     }
///
///     fn column_value(&self, member: &str) -> Option<Value> {
///         match member {
///             "id" => Some(self.id.to_value()),
///             "label" => Some(self.label.to_value()),
///             _ => None,
///         }
///     }
///
///     fn from_row(row: &may_postgres::Row, descriptor: &EntityDescriptor) -> Result<Self, DbError> {
///         Ok(Self {
///             id: SqlField::from_row(row, descriptor.member_column("id")?)?,
///             label: SqlField::from_row(row, descriptor.member_column("label")?)?,
///         })
///     }
/// }
///
/// let descriptor = EntityDescriptor::of::<Tag>().unwrap();
/// assert_eq!(descriptor.insert_text(), "INSERT INTO tags (label) VALUES ($1) RETURNING id");
/// ```
pub trait Entity: Sized + 'static {
    fn table_name() -> &'static str;

    /// Declare every persisted member. Called once per process, when the
    /// descriptor is built.
    fn define(table: &mut TableBuilder);

    /// The primary key, `None` until the row has been inserted.
    fn id(&self) -> Option<Uuid>;

    /// The same entity carrying a database-assigned id.
    #[must_use]
    fn with_id(self, id: Uuid) -> Self;

    /// The bound value of a declared member, `None` for unknown members.
    fn column_value(&self, member: &str) -> Option<Value>;

    /// # Errors
    ///
    /// Returns `DbError::Decode` when a column is missing or does not fit its field.
    fn from_row(row: &Row, descriptor: &EntityDescriptor) -> Result<Self, DbError>;
}

/// Collects the column declarations of one entity.
#[derive(Debug)]
pub struct TableBuilder {
    columns: Vec<ColumnSpec>,
    skipped: Vec<&'static str>,
    touch_trigger: bool,
}

impl TableBuilder {
    pub(crate) fn new() -> Self {
        Self {
            columns: Vec::new(),
            skipped: Vec::new(),
            touch_trigger: true,
        }
    }

    /// Declare a member backed by field type `T`.
    pub fn column<T: SqlField>(&mut self, member: &'static str) -> &mut ColumnSpec {
        let index = self.columns.len();
        self.columns.push(ColumnSpec::new(member, T::SEMANTIC, T::NULLABLE));
        &mut self.columns[index]
    }

    /// Record a member as deliberately not persisted.
    pub fn skip(&mut self, member: &'static str) -> &mut Self {
        self.skipped.push(member);
        self
    }

    /// Whether the table gets the `last_modified` trigger. On by default.
    pub fn touch_trigger(&mut self, enabled: bool) -> &mut Self {
        self.touch_trigger = enabled;
        self
    }

    pub(crate) fn into_parts(self) -> (Vec<ColumnSpec>, Vec<&'static str>, bool) {
        (self.columns, self.skipped, self.touch_trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::SemanticType;

    #[test]
    fn test_column_picks_up_field_semantics() {
        let mut table = TableBuilder::new();
        table.column::<Option<String>>("nickname").size(20);
        table.column::<i64>("visits");
        table.skip("scratch").touch_trigger(false);

        let (columns, skipped, touch) = table.into_parts();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].semantic, SemanticType::String);
        assert!(columns[0].field_nullable);
        assert!(!columns[1].field_nullable);
        assert_eq!(skipped, vec!["scratch"]);
        assert!(!touch);
    }
}
