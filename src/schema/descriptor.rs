//! Entity descriptors.
//!
//! A descriptor is built once per entity type and then shared for the life of
//! the process. Statement texts that never change between calls are rendered
//! lazily and kept on the descriptor.

use once_cell::sync::{Lazy, OnceCell};
use std::any::TypeId;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use crate::error::ConfigurationError;
use crate::executor::DbError;
use crate::schema::column::ColumnDescriptor;
use crate::schema::ddl;
use crate::schema::naming::{validate_identifier, NameConvention, SnakeCase};
use crate::schema::table::{Entity, TableBuilder};
use crate::schema::types::{StorageClass, TypeMap};

static DESCRIPTORS: Lazy<RwLock<HashMap<TypeId, &'static EntityDescriptor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// The complete, ordered column set of one entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    entity: &'static str,
    table: String,
    columns: Vec<ColumnDescriptor>,
    by_name: HashMap<String, usize>,
    by_member: HashMap<&'static str, usize>,
    primary_key: usize,
    writable: Vec<usize>,
    skipped: Vec<&'static str>,
    touch_trigger: bool,
    ddl: OnceCell<Vec<String>>,
    column_list: OnceCell<String>,
    insert: OnceCell<String>,
    update: OnceCell<Option<String>>,
    select_by_id: OnceCell<String>,
    delete_by_id: OnceCell<String>,
    copy: OnceCell<String>,
}

impl EntityDescriptor {
    /// The shared descriptor for `E`, built on first use.
    ///
    /// A failed build is not remembered: the next call builds again and reports
    /// the same error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when the entity's declaration is invalid.
    pub fn of<E: Entity>() -> Result<&'static EntityDescriptor, ConfigurationError> {
        let key = TypeId::of::<E>();
        if let Some(descriptor) = DESCRIPTORS
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
        {
            return Ok(descriptor);
        }

        let mut cache = DESCRIPTORS.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(descriptor) = cache.get(&key).copied() {
            return Ok(descriptor);
        }
        let descriptor: &'static EntityDescriptor = Box::leak(Box::new(Self::build::<E>()?));
        cache.insert(key, descriptor);
        log::debug!(
            "built descriptor for {} ({} columns)",
            descriptor.entity,
            descriptor.columns.len()
        );
        Ok(descriptor)
    }

    /// Build a descriptor with the default type map, bypassing the shared cache.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when the entity's declaration is invalid.
    pub fn build<E: Entity>() -> Result<Self, ConfigurationError> {
        Self::build_with::<E>(&TypeMap::postgres(), &SnakeCase)
    }

    /// # Errors
    ///
    /// Returns `ConfigurationError` when the entity's declaration is invalid.
    pub fn build_with<E: Entity>(
        types: &TypeMap,
        names: &dyn NameConvention,
    ) -> Result<Self, ConfigurationError> {
        let entity = std::any::type_name::<E>();
        let table = E::table_name().to_string();
        validate_identifier(&table)?;

        let mut builder = TableBuilder::new();
        E::define(&mut builder);
        let (specs, skipped, touch_trigger) = builder.into_parts();

        let specs: Vec<_> = specs
            .into_iter()
            .filter(|spec| !skipped.contains(&spec.member()))
            .collect();
        if specs.is_empty() {
            return Err(ConfigurationError::NoColumns {
                entity: entity.to_string(),
            });
        }
        let key_count = specs.iter().filter(|spec| spec.is_primary_key()).count();
        if key_count != 1 {
            return Err(ConfigurationError::PrimaryKeyCount {
                entity: entity.to_string(),
                count: key_count,
            });
        }

        let mut columns = Vec::with_capacity(specs.len());
        let mut members = HashSet::new();
        let mut names_seen = HashSet::new();
        for spec in specs {
            let column = ColumnDescriptor::from_spec(spec, types, names)?;
            if !members.insert(column.member()) || !names_seen.insert(column.name().to_lowercase()) {
                return Err(ConfigurationError::DuplicateColumn {
                    entity: entity.to_string(),
                    column: column.name().to_string(),
                });
            }
            columns.push(column);
        }

        columns.sort_by(layout_order);

        let mut writable = Vec::new();
        for (ordinal, column) in columns.iter_mut().enumerate() {
            column.assign_ordinal(ordinal);
            if column.is_writable() {
                writable.push(ordinal);
                column.assign_placeholder(writable.len());
            }
        }

        let by_name = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name().to_lowercase(), i))
            .collect();
        let by_member = columns.iter().enumerate().map(|(i, c)| (c.member(), i)).collect();
        let primary_key = columns
            .iter()
            .position(ColumnDescriptor::is_primary_key)
            .ok_or_else(|| ConfigurationError::PrimaryKeyCount {
                entity: entity.to_string(),
                count: 0,
            })?;

        let descriptor = Self {
            entity,
            table,
            columns,
            by_name,
            by_member,
            primary_key,
            writable,
            skipped,
            touch_trigger,
            ddl: OnceCell::new(),
            column_list: OnceCell::new(),
            insert: OnceCell::new(),
            update: OnceCell::new(),
            select_by_id: OnceCell::new(),
            delete_by_id: OnceCell::new(),
            copy: OnceCell::new(),
        };
        descriptor.verify_ordinals()?;
        Ok(descriptor)
    }

    fn verify_ordinals(&self) -> Result<(), ConfigurationError> {
        let mut seen = vec![false; self.columns.len()];
        for column in &self.columns {
            match column.ordinal() {
                Some(ordinal) if ordinal < seen.len() && !seen[ordinal] => seen[ordinal] = true,
                _ => {
                    return Err(ConfigurationError::OrdinalLayout {
                        entity: self.entity.to_string(),
                    })
                }
            }
        }
        if seen.iter().all(|s| *s) && self.by_name.len() == self.columns.len() {
            Ok(())
        } else {
            Err(ConfigurationError::OrdinalLayout {
                entity: self.entity.to_string(),
            })
        }
    }

    /// Rust type name of the entity.
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns in ordinal order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Case-insensitive lookup by column name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.by_name.get(&name.to_lowercase()).map(|i| &self.columns[*i])
    }

    pub fn column_by_ordinal(&self, ordinal: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(ordinal)
    }

    /// Lookup by declared member name.
    pub fn member(&self, member: &str) -> Option<&ColumnDescriptor> {
        self.by_member.get(member).map(|i| &self.columns[*i])
    }

    /// The column name of a member, for row decoding.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Decode` for undeclared members.
    pub fn member_column(&self, member: &str) -> Result<&str, DbError> {
        self.member(member)
            .map(ColumnDescriptor::name)
            .ok_or_else(|| DbError::Decode(format!("`{member}` is not a column of {}", self.table)))
    }

    pub fn primary_key(&self) -> &ColumnDescriptor {
        &self.columns[self.primary_key]
    }

    /// Columns bound by INSERT and UPDATE, in placeholder order.
    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.writable.iter().map(|i| &self.columns[*i])
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_foreign_key())
    }

    /// Columns that get a `CREATE INDEX`: explicitly indexed ones and foreign keys.
    pub fn indexed_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_indexed() || c.is_foreign_key())
    }

    /// Members excluded through [`TableBuilder::skip`].
    pub fn skipped_members(&self) -> &[&'static str] {
        &self.skipped
    }

    pub fn has_touch_trigger(&self) -> bool {
        self.touch_trigger
    }

    /// The DDL statements for this table, in execution order.
    pub fn ddl_statements(&self) -> &[String] {
        self.ddl.get_or_init(|| ddl::render(self))
    }

    /// All DDL statements as one script.
    pub fn ddl(&self) -> String {
        self.ddl_statements()
            .iter()
            .map(|s| format!("{s};\n"))
            .collect()
    }

    /// Column names in ordinal order, comma separated.
    pub fn column_list(&self) -> &str {
        self.column_list.get_or_init(|| {
            self.columns
                .iter()
                .map(ColumnDescriptor::name)
                .collect::<Vec<_>>()
                .join(", ")
        })
    }

    pub fn insert_text(&self) -> &str {
        self.insert.get_or_init(|| {
            let key = self.primary_key().name();
            if self.writable.is_empty() {
                return format!("INSERT INTO {} DEFAULT VALUES RETURNING {key}", self.table);
            }
            let names: Vec<_> = self.writable_columns().map(ColumnDescriptor::name).collect();
            let placeholders: Vec<_> = self.writable_columns().filter_map(ColumnDescriptor::placeholder).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {key}",
                self.table,
                names.join(", "),
                placeholders.join(", ")
            )
        })
    }

    /// `None` when the entity has nothing to update besides its key.
    pub fn update_text(&self) -> Option<&str> {
        self.update
            .get_or_init(|| {
                if self.writable.is_empty() {
                    return None;
                }
                let assignments: Vec<_> = self.writable_columns().filter_map(ColumnDescriptor::assignment).collect();
                Some(format!(
                    "UPDATE {} SET {} WHERE {} = ${}",
                    self.table,
                    assignments.join(", "),
                    self.primary_key().name(),
                    self.writable.len() + 1
                ))
            })
            .as_deref()
    }

    pub fn select_by_id_text(&self) -> &str {
        self.select_by_id.get_or_init(|| {
            format!("SELECT * FROM {} WHERE {} = $1", self.table, self.primary_key().name())
        })
    }

    pub fn delete_by_id_text(&self) -> &str {
        self.delete_by_id.get_or_init(|| {
            format!("DELETE FROM {} WHERE {} = $1", self.table, self.primary_key().name())
        })
    }

    /// Columns streamed by bulk import, in ordinal order. Only
    /// `GENERATED ALWAYS` identity columns are left out.
    pub fn copy_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_writable() || c.is_primary_key())
    }

    pub fn copy_text(&self) -> &str {
        self.copy.get_or_init(|| {
            let names: Vec<_> = self.copy_columns().map(ColumnDescriptor::name).collect();
            format!("COPY {} ({}) FROM STDIN", self.table, names.join(", "))
        })
    }
}

/// Fixed-width columns first (narrowest first), then bounded variable-width,
/// then unbounded; ties broken by declared size and finally by name.
fn layout_order(a: &ColumnDescriptor, b: &ColumnDescriptor) -> Ordering {
    let (sa, sb) = (a.column_type().storage(), b.column_type().storage());
    sa.rank()
        .cmp(&sb.rank())
        .then_with(|| a.column_type().is_variable_length().cmp(&b.column_type().is_variable_length()))
        .then_with(|| fixed_width(sa).cmp(&fixed_width(sb)))
        .then_with(|| a.size().magnitude().cmp(&b.size().magnitude()))
        .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
}

fn fixed_width(storage: StorageClass) -> u16 {
    match storage {
        StorageClass::Fixed(width) => width,
        StorageClass::Bounded | StorageClass::Unbounded => 0,
    }
}
