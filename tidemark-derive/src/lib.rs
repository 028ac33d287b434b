//! Procedural macros for Tidemark
//!
//! This crate provides the `Entity` derive. Use it through the re-export in
//! `tidemark` rather than depending on this crate directly.

mod attributes;
mod entity;

use proc_macro::TokenStream;

/// Derive macro for `Entity` - generates the `tidemark::schema::Entity` impl
///
/// Struct attributes:
/// - `#[table_name = "..."]` (default: `SnakeCase` table name, e.g. `AuditEvent` becomes `audit_events`)
/// - `#[touch_trigger = false]` to leave out the `last_modified` trigger
///
/// Field attributes: `primary_key`, `column_name = ".."`, `column_type = ".."`,
/// `size = n`, `precision(p, s)`, `range(min, max)`, `nullable`, `unique`,
/// `indexed`, `foreign_key = "table"`, `identity` / `identity = "by_default"`,
/// `check = ".."` (repeatable), `checks_any`, `default_expr = ".."` and `skip`.
///
/// Exactly one field must carry `#[primary_key]`. Skipped fields are rebuilt
/// with `Default::default()` when a row is decoded.
///
/// ```ignore
/// use tidemark::Entity;
/// use uuid::Uuid;
///
/// #[derive(Entity)]
/// #[table_name = "accounts"]
/// pub struct Account {
///     #[primary_key]
///     pub id: Option<Uuid>,
///     #[size = 64]
///     #[unique]
///     pub user_name: String,
///     #[check = "score >= 0"]
///     pub score: i32,
/// }
/// ```
#[proc_macro_derive(
    Entity,
    attributes(
        table_name,
        touch_trigger,
        primary_key,
        column_name,
        column_type,
        size,
        precision,
        range,
        nullable,
        unique,
        indexed,
        foreign_key,
        identity,
        check,
        checks_any,
        default_expr,
        skip
    )
)]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity::derive_entity(input)
}
