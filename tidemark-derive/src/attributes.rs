//! Attribute parsing utilities

use syn::punctuated::Punctuated;
use syn::{Attribute, Expr, ExprLit, Field, Ident, Lit, Token};

/// Extract a string value from a `#[name = "value"]` attribute.
fn string_value(attr: &Attribute) -> syn::Result<String> {
    let meta = attr.meta.require_name_value()?;
    match &meta.value {
        Expr::Lit(ExprLit { lit: Lit::Str(s), .. }) => Ok(s.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn int_value(attr: &Attribute) -> syn::Result<u32> {
    let meta = attr.meta.require_name_value()?;
    match &meta.value {
        Expr::Lit(ExprLit { lit: Lit::Int(i), .. }) => i.base10_parse(),
        other => Err(syn::Error::new_spanned(other, "expected an integer literal")),
    }
}

fn bool_value(attr: &Attribute) -> syn::Result<bool> {
    let meta = attr.meta.require_name_value()?;
    match &meta.value {
        Expr::Lit(ExprLit { lit: Lit::Bool(b), .. }) => Ok(b.value),
        other => Err(syn::Error::new_spanned(other, "expected `true` or `false`")),
    }
}

/// Two comma-separated expressions, e.g. `#[range(0, 100)]`.
fn pair(attr: &Attribute) -> syn::Result<(Expr, Expr)> {
    let args = attr.parse_args_with(Punctuated::<Expr, Token![,]>::parse_terminated)?;
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(syn::Error::new_spanned(attr, "expected two arguments")),
    }
}

/// Struct-level attributes.
pub struct EntityAttributes {
    pub table_name: Option<String>,
    pub touch_trigger: Option<bool>,
}

pub fn parse_entity_attributes(attrs: &[Attribute]) -> syn::Result<EntityAttributes> {
    let mut parsed = EntityAttributes {
        table_name: None,
        touch_trigger: None,
    };
    for attr in attrs {
        if attr.path().is_ident("table_name") {
            parsed.table_name = Some(string_value(attr)?);
        } else if attr.path().is_ident("touch_trigger") {
            parsed.touch_trigger = Some(bool_value(attr)?);
        }
    }
    Ok(parsed)
}

pub enum Identity {
    Always,
    ByDefault,
}

/// Everything a field can declare about its column.
#[derive(Default)]
pub struct ColumnAttributes {
    pub is_primary_key: bool,
    pub column_name: Option<String>,
    pub column_type: Option<Ident>,
    pub size: Option<u32>,
    pub precision: Option<(Expr, Expr)>,
    pub range: Option<(Expr, Expr)>,
    pub is_nullable: bool,
    pub is_unique: bool,
    pub is_indexed: bool,
    pub foreign_key: Option<String>,
    pub identity: Option<Identity>,
    pub checks: Vec<String>,
    pub checks_any: bool,
    pub default_expr: Option<String>,
    pub is_skipped: bool,
}

pub fn parse_column_attributes(field: &Field) -> syn::Result<ColumnAttributes> {
    let mut attrs = ColumnAttributes::default();

    for attr in &field.attrs {
        let path = attr.path();
        if path.is_ident("primary_key") {
            attrs.is_primary_key = true;
        } else if path.is_ident("column_name") {
            attrs.column_name = Some(string_value(attr)?);
        } else if path.is_ident("column_type") {
            let name = string_value(attr)?;
            let ident = syn::parse_str::<Ident>(&name)
                .map_err(|_| syn::Error::new_spanned(attr, format!("`{name}` is not a column type")))?;
            attrs.column_type = Some(ident);
        } else if path.is_ident("size") {
            attrs.size = Some(int_value(attr)?);
        } else if path.is_ident("precision") {
            attrs.precision = Some(pair(attr)?);
        } else if path.is_ident("range") {
            attrs.range = Some(pair(attr)?);
        } else if path.is_ident("nullable") {
            attrs.is_nullable = true;
        } else if path.is_ident("unique") {
            attrs.is_unique = true;
        } else if path.is_ident("indexed") {
            attrs.is_indexed = true;
        } else if path.is_ident("foreign_key") {
            attrs.foreign_key = Some(string_value(attr)?);
        } else if path.is_ident("identity") {
            attrs.identity = Some(match attr.meta.require_name_value() {
                Ok(_) => match string_value(attr)?.as_str() {
                    "always" => Identity::Always,
                    "by_default" => Identity::ByDefault,
                    other => {
                        return Err(syn::Error::new_spanned(
                            attr,
                            format!("identity must be \"always\" or \"by_default\", found \"{other}\""),
                        ))
                    }
                },
                Err(_) => Identity::Always,
            });
        } else if path.is_ident("check") {
            attrs.checks.push(string_value(attr)?);
        } else if path.is_ident("checks_any") {
            attrs.checks_any = true;
        } else if path.is_ident("default_expr") {
            attrs.default_expr = Some(string_value(attr)?);
        } else if path.is_ident("skip") {
            attrs.is_skipped = true;
        }
    }

    Ok(attrs)
}
