//! Name normalization for tables and columns.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigurationError;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_$]{0,62}$").unwrap_or_else(|e| unreachable!("identifier pattern: {e}"))
});

/// Maps declared member/type names to SQL identifiers.
pub trait NameConvention: Send + Sync {
    fn column_name(&self, member: &str) -> String;
    fn table_name(&self, type_name: &str) -> String;
}

/// The default convention: `snake_case` columns, plural `snake_case` tables.
///
/// Table names get a trailing `s` unless they already end in one. This is what
/// `#[derive(Entity)]` uses when no `#[table_name]` is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCase;

impl NameConvention for SnakeCase {
    fn column_name(&self, member: &str) -> String {
        snake_case(member)
    }

    fn table_name(&self, type_name: &str) -> String {
        let mut name = snake_case(type_name);
        if !name.ends_with('s') {
            name.push('s');
        }
        name
    }
}

/// Convert an identifier to `snake_case`.
///
/// Runs of capitals are kept together (`HTTPStatus` becomes `http_status`).
pub fn snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !result.ends_with('_') {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// Reject names that would need quoting or could smuggle SQL into DDL text.
pub fn validate_identifier(name: &str) -> Result<(), ConfigurationError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("UserId"), "user_id");
        assert_eq!(snake_case("user_id"), "user_id");
        assert_eq!(snake_case("User"), "user");
        assert_eq!(snake_case("HTTPStatus"), "http_status");
        assert_eq!(snake_case("lastModified2Db"), "last_modified2_db");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("user_name").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("UserName").is_err());
        assert!(validate_identifier("name; DROP TABLE x").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_convention_maps_both_names() {
        assert_eq!(SnakeCase.table_name("AccessGroup"), "access_groups");
        assert_eq!(SnakeCase.table_name("HTTPRequest"), "http_requests");
        assert_eq!(SnakeCase.table_name("Address"), "address");
        assert_eq!(SnakeCase.column_name("dateCreated"), "date_created");
    }
}
