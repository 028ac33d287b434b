//! Equality filters.

use crate::schema::{ColumnDescriptor, EntityDescriptor};
use crate::sql::statement::Statement;
use crate::sql::synth::SynthesisError;
use crate::value::Value;

/// How filter terms combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

impl MatchMode {
    fn operator(&self) -> &'static str {
        match self {
            MatchMode::All => " AND ",
            MatchMode::Any => " OR ",
        }
    }
}

/// Ordered `column = value` terms. A null value matches `IS NULL`.
///
/// Terms name either the declared member or the column.
///
/// ```
/// use tidemark::sql::{Filter, MatchMode};
///
/// let filter = Filter::all().eq("user_name", "alice").eq("bio", None::<String>);
/// assert_eq!(filter.mode(), MatchMode::All);
/// assert_eq!(filter.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    terms: Vec<(String, Value)>,
    mode: MatchMode,
    order_by: Option<(String, bool)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn any() -> Self {
        Self {
            mode: MatchMode::Any,
            ..Self::default()
        }
    }

    pub fn matching(mode: MatchMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((column.into(), value.into()));
        self
    }

    /// Sort `first` and `last` selections by this column instead of the key.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some((column.into(), false));
        self
    }

    #[must_use]
    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some((column.into(), true));
        self
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.terms.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Render the predicate and bind its values. `None` for an empty filter.
    pub(crate) fn render(
        &self,
        descriptor: &EntityDescriptor,
        statement: &mut Statement,
    ) -> Result<Option<String>, SynthesisError> {
        if self.terms.is_empty() {
            return Ok(None);
        }
        let mut fragments = Vec::with_capacity(self.terms.len());
        for (name, value) in &self.terms {
            let column = resolve(descriptor, name)?;
            if value.is_null() {
                fragments.push(format!("{} IS NULL", column.name()));
            } else {
                let n = statement.bind(column.name(), value.clone());
                fragments.push(format!("{} = ${n}", column.name()));
            }
        }
        Ok(Some(fragments.join(self.mode.operator())))
    }

    /// The `ORDER BY` target, if one was given, with its direction.
    pub(crate) fn ordering<'d>(
        &self,
        descriptor: &'d EntityDescriptor,
    ) -> Result<Option<(&'d ColumnDescriptor, bool)>, SynthesisError> {
        match &self.order_by {
            Some((name, descending)) => Ok(Some((resolve(descriptor, name)?, *descending))),
            None => Ok(None),
        }
    }
}

pub(crate) fn resolve<'d>(
    descriptor: &'d EntityDescriptor,
    name: &str,
) -> Result<&'d ColumnDescriptor, SynthesisError> {
    descriptor
        .member(name)
        .or_else(|| descriptor.column(name))
        .ok_or_else(|| SynthesisError::UnknownColumn {
            table: descriptor.table().to_string(),
            column: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::statement::CommandKind;
    use crate::tests_cfg::Account;

    #[test]
    fn test_render_binds_values_and_nulls_inline() {
        let descriptor = EntityDescriptor::build::<Account>().unwrap();
        let mut statement = Statement::new(CommandKind::Select, "");
        let filter = Filter::any().eq("user_name", "alice").eq("bio", Value::Null).eq("ACTIVE", true);

        let predicate = filter.render(&descriptor, &mut statement).unwrap();
        assert_eq!(predicate.as_deref(), Some("user_name = $1 OR bio IS NULL OR active = $2"));
        assert_eq!(
            statement.values().cloned().collect::<Vec<_>>(),
            vec![Value::Text("alice".into()), Value::Bool(true)]
        );
    }

    #[test]
    fn test_unknown_column() {
        let descriptor = EntityDescriptor::build::<Account>().unwrap();
        let mut statement = Statement::new(CommandKind::Select, "");
        let err = Filter::all()
            .eq("nope", 1)
            .render(&descriptor, &mut statement)
            .unwrap_err();
        assert_eq!(
            err,
            SynthesisError::UnknownColumn {
                table: "accounts".into(),
                column: "nope".into()
            }
        );
    }
}
