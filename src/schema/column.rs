//! Column metadata.
//!
//! A [`ColumnSpec`] is what an entity declares for one member. Validation and
//! type mapping turn it into an immutable [`ColumnDescriptor`] whose text
//! fragments are rendered once and reused by every synthesized statement.

use std::fmt;

use crate::error::ConfigurationError;
use crate::schema::naming::{validate_identifier, NameConvention};
use crate::schema::types::{ColumnSize, ColumnType, SemanticType, TypeMap};

/// Identity-generation mode for integer columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityMode {
    #[default]
    None,
    Always,
    ByDefault,
}

impl IdentityMode {
    fn clause(&self) -> Option<&'static str> {
        match self {
            IdentityMode::None => None,
            IdentityMode::Always => Some("GENERATED ALWAYS AS IDENTITY"),
            IdentityMode::ByDefault => Some("GENERATED BY DEFAULT AS IDENTITY"),
        }
    }
}

/// How multiple check expressions on one column combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckJoin {
    #[default]
    All,
    Any,
}

impl CheckJoin {
    fn operator(&self) -> &'static str {
        match self {
            CheckJoin::All => " AND ",
            CheckJoin::Any => " OR ",
        }
    }
}

/// Declared options for one member, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub(crate) member: &'static str,
    pub(crate) semantic: SemanticType,
    pub(crate) field_nullable: bool,
    pub(crate) column_name: Option<String>,
    pub(crate) column_type: Option<ColumnType>,
    pub(crate) size: ColumnSize,
    pub(crate) nullable: bool,
    pub(crate) primary_key: bool,
    pub(crate) unique: bool,
    pub(crate) indexed: bool,
    pub(crate) foreign_key: Option<String>,
    pub(crate) identity: IdentityMode,
    pub(crate) checks: Vec<String>,
    pub(crate) check_join: CheckJoin,
    pub(crate) default_expr: Option<String>,
}

impl ColumnSpec {
    /// `field_nullable` comes from the field type (`Option<T>`).
    pub fn new(member: &'static str, semantic: SemanticType, field_nullable: bool) -> Self {
        Self {
            member,
            semantic,
            field_nullable,
            column_name: None,
            column_type: None,
            size: ColumnSize::None,
            nullable: false,
            primary_key: false,
            unique: false,
            indexed: false,
            foreign_key: None,
            identity: IdentityMode::None,
            checks: Vec::new(),
            check_join: CheckJoin::All,
            default_expr: None,
        }
    }

    pub fn primary_key(&mut self) -> &mut Self {
        self.primary_key = true;
        self
    }

    pub fn column_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.column_name = Some(name.into());
        self
    }

    /// Override the mapped column type.
    pub fn column_type(&mut self, column_type: ColumnType) -> &mut Self {
        self.column_type = Some(column_type);
        self
    }

    /// Declare a character/bit length.
    pub fn size(&mut self, length: u32) -> &mut Self {
        self.size = ColumnSize::Length(length);
        self
    }

    pub fn precision(&mut self, precision: u8, scale: u8) -> &mut Self {
        self.size = ColumnSize::Precision { precision, scale };
        self
    }

    /// Declare an inclusive value range.
    pub fn range(&mut self, min: i64, max: i64) -> &mut Self {
        self.size = ColumnSize::Range { min, max };
        self
    }

    /// Force the column nullable regardless of the field type.
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn indexed(&mut self) -> &mut Self {
        self.indexed = true;
        self
    }

    /// Reference `target(id)`.
    pub fn foreign_key(&mut self, target: impl Into<String>) -> &mut Self {
        self.foreign_key = Some(target.into());
        self
    }

    pub fn identity(&mut self, mode: IdentityMode) -> &mut Self {
        self.identity = mode;
        self
    }

    pub fn check(&mut self, expression: impl Into<String>) -> &mut Self {
        self.checks.push(expression.into());
        self
    }

    /// Combine this column's checks with OR instead of AND.
    pub fn checks_any(&mut self) -> &mut Self {
        self.check_join = CheckJoin::Any;
        self
    }

    pub fn default_expr(&mut self, expression: impl Into<String>) -> &mut Self {
        self.default_expr = Some(expression.into());
        self
    }

    pub fn member(&self) -> &'static str {
        self.member
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }
}

/// Full, validated metadata for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    member: &'static str,
    name: String,
    column_type: ColumnType,
    size: ColumnSize,
    nullable: bool,
    primary_key: bool,
    unique: bool,
    indexed: bool,
    foreign_key: Option<String>,
    identity: IdentityMode,
    checks: Vec<String>,
    check_join: CheckJoin,
    default_expr: Option<String>,
    ordinal: Option<usize>,
    placeholder: Option<usize>,
    type_text: String,
    definition: String,
}

impl ColumnDescriptor {
    /// Validate a spec and render its fragments.
    pub fn from_spec(
        spec: ColumnSpec,
        types: &TypeMap,
        names: &dyn NameConvention,
    ) -> Result<Self, ConfigurationError> {
        let name = spec
            .column_name
            .clone()
            .unwrap_or_else(|| names.column_name(spec.member));
        validate_identifier(&name)?;

        if spec.indexed && spec.foreign_key.is_some() {
            return Err(ConfigurationError::ForeignKeyIndexed { column: name });
        }
        if spec.indexed && spec.unique {
            return Err(ConfigurationError::UniqueIndexed { column: name });
        }
        let foreign_key = match spec.foreign_key {
            Some(target) if target.trim().is_empty() => {
                return Err(ConfigurationError::ForeignKeyWithoutTarget { column: name });
            }
            Some(target) => {
                validate_identifier(&target)?;
                Some(target)
            }
            None => None,
        };

        let (column_type, size) = match spec.column_type {
            Some(column_type) => (column_type, spec.size),
            None => types.map(spec.member, spec.semantic, spec.size)?,
        };

        if !column_type.accepts_size(&size) {
            return Err(ConfigurationError::SizeNotApplicable {
                column: name,
                column_type: column_type.to_string(),
                size: size.to_string(),
            });
        }
        if !spec.checks.is_empty() && !column_type.accepts_checks() {
            return Err(ConfigurationError::ChecksNotApplicable {
                column: name,
                column_type: column_type.to_string(),
            });
        }
        if spec.checks.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigurationError::EmptyCheck { column: name });
        }
        if spec.identity != IdentityMode::None {
            if !column_type.is_integer() {
                return Err(ConfigurationError::IdentityNotApplicable {
                    column: name,
                    column_type: column_type.to_string(),
                });
            }
            if spec.default_expr.is_some() {
                return Err(ConfigurationError::IdentityWithDefault { column: name });
            }
        }

        if spec.primary_key {
            if column_type != ColumnType::Uuid {
                return Err(ConfigurationError::PrimaryKeyType {
                    column: name,
                    column_type: column_type.to_string(),
                });
            }
            if spec.nullable {
                return Err(ConfigurationError::NullablePrimaryKey { column: name });
            }
            let conflicting = if spec.identity != IdentityMode::None {
                Some("an identity mode")
            } else if spec.default_expr.is_some() {
                Some("a default expression")
            } else if foreign_key.is_some() {
                Some("a foreign key")
            } else {
                None
            };
            if let Some(option) = conflicting {
                return Err(ConfigurationError::PrimaryKeyOption { column: name, option });
            }
        }

        // Option<Uuid> on the key only means "not yet assigned".
        let nullable = !spec.primary_key
            && spec.identity == IdentityMode::None
            && (spec.nullable || spec.field_nullable);

        let type_text = column_type.type_text(&size);
        let mut descriptor = Self {
            member: spec.member,
            name,
            column_type,
            size,
            nullable,
            primary_key: spec.primary_key,
            unique: spec.unique && !spec.primary_key,
            indexed: spec.indexed,
            foreign_key,
            identity: spec.identity,
            checks: spec.checks,
            check_join: spec.check_join,
            default_expr: spec.default_expr,
            ordinal: None,
            placeholder: None,
            type_text,
            definition: String::new(),
        };
        descriptor.definition = descriptor.render_definition();
        Ok(descriptor)
    }

    fn render_definition(&self) -> String {
        let mut line = format!("{} {}", self.name, self.type_text);
        line.push_str(if self.nullable { " NULL" } else { " NOT NULL" });
        if self.primary_key {
            line.push_str(" PRIMARY KEY DEFAULT gen_random_uuid()");
        }
        if self.unique {
            line.push_str(" UNIQUE");
        }
        if let Some(clause) = self.identity.clause() {
            line.push(' ');
            line.push_str(clause);
        }
        if let Some(check) = self.check_clause() {
            line.push(' ');
            line.push_str(&check);
        }
        if let Some(default) = &self.default_expr {
            line.push_str(" DEFAULT ");
            line.push_str(default);
        }
        line
    }

    /// `CHECK ( a AND b )`, including the implicit range bounds.
    pub fn check_clause(&self) -> Option<String> {
        let mut expressions: Vec<String> = Vec::with_capacity(self.checks.len() + 1);
        if let ColumnSize::Range { min, max } = self.size {
            expressions.push(format!("{} >= {min} AND {} <= {max}", self.name, self.name));
        }
        expressions.extend(self.checks.iter().map(|c| c.trim().to_string()));
        if expressions.is_empty() {
            return None;
        }
        if expressions.len() == 1 {
            return Some(format!("CHECK ( {} )", expressions[0]));
        }
        let joined = expressions
            .iter()
            .map(|e| format!("({e})"))
            .collect::<Vec<_>>()
            .join(self.check_join.operator());
        Some(format!("CHECK ( {joined} )"))
    }

    pub(crate) fn assign_ordinal(&mut self, ordinal: usize) {
        debug_assert!(self.ordinal.is_none(), "ordinal assigned twice for {}", self.name);
        if self.ordinal.is_none() {
            self.ordinal = Some(ordinal);
        }
    }

    pub(crate) fn assign_placeholder(&mut self, position: usize) {
        self.placeholder = Some(position);
    }

    pub fn member(&self) -> &'static str {
        self.member
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn size(&self) -> ColumnSize {
        self.size
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.is_some()
    }

    pub fn foreign_key_target(&self) -> Option<&str> {
        self.foreign_key.as_deref()
    }

    pub fn identity(&self) -> IdentityMode {
        self.identity
    }

    pub fn checks(&self) -> &[String] {
        &self.checks
    }

    pub fn check_join(&self) -> CheckJoin {
        self.check_join
    }

    pub fn default_expr(&self) -> Option<&str> {
        self.default_expr.as_deref()
    }

    /// Position in the entity's layout. Always `Some` once the owning
    /// descriptor is built.
    pub fn ordinal(&self) -> Option<usize> {
        self.ordinal
    }

    /// The `$n` placeholder in INSERT/UPDATE statements, or `None` for columns
    /// that are never written (primary key, `GENERATED ALWAYS` identity).
    pub fn placeholder(&self) -> Option<String> {
        self.placeholder.map(|n| format!("${n}"))
    }

    /// `name = $n`
    pub fn assignment(&self) -> Option<String> {
        self.placeholder().map(|p| format!("{} = {p}", self.name))
    }

    pub fn type_text(&self) -> &str {
        &self.type_text
    }

    /// The column line of `CREATE TABLE`.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Whether INSERT/UPDATE statements bind this column.
    pub fn is_writable(&self) -> bool {
        !self.primary_key && self.identity != IdentityMode::Always
    }
}

impl fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.definition)
    }
}
