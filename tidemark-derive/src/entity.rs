//! Derive macro for `Entity`
//!
//! Generates `define` from the field attributes, plus the value accessors the
//! synthesizer needs. All paths go through `::tidemark` so user crates only
//! depend on the main crate.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

use crate::attributes::{self, ColumnAttributes, Identity};

pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn column_declaration(member: &str, field_type: &syn::Type, attrs: &ColumnAttributes) -> TokenStream2 {
    let mut calls = Vec::new();
    if attrs.is_primary_key {
        calls.push(quote! { .primary_key() });
    }
    if let Some(name) = &attrs.column_name {
        calls.push(quote! { .column_name(#name) });
    }
    if let Some(column_type) = &attrs.column_type {
        calls.push(quote! { .column_type(::tidemark::schema::ColumnType::#column_type) });
    }
    if let Some(size) = attrs.size {
        calls.push(quote! { .size(#size) });
    }
    if let Some((precision, scale)) = &attrs.precision {
        calls.push(quote! { .precision(#precision, #scale) });
    }
    if let Some((min, max)) = &attrs.range {
        calls.push(quote! { .range(#min, #max) });
    }
    if attrs.is_nullable {
        calls.push(quote! { .nullable() });
    }
    if attrs.is_unique {
        calls.push(quote! { .unique() });
    }
    if attrs.is_indexed {
        calls.push(quote! { .indexed() });
    }
    if let Some(target) = &attrs.foreign_key {
        calls.push(quote! { .foreign_key(#target) });
    }
    match attrs.identity {
        Some(Identity::Always) => calls.push(quote! { .identity(::tidemark::schema::IdentityMode::Always) }),
        Some(Identity::ByDefault) => calls.push(quote! { .identity(::tidemark::schema::IdentityMode::ByDefault) }),
        None => {}
    }
    for check in &attrs.checks {
        calls.push(quote! { .check(#check) });
    }
    if attrs.checks_any {
        calls.push(quote! { .checks_any() });
    }
    if let Some(expression) = &attrs.default_expr {
        calls.push(quote! { .default_expr(#expression) });
    }

    quote! {
        table.column::<#field_type>(#member)#(#calls)*;
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let fields = match &input.data {
        Data::Struct(syn::DataStruct {
            fields: Fields::Named(fields),
            ..
        }) => &fields.named,
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Entity can only be derived for structs with named fields",
            ))
        }
    };

    let entity_attrs = attributes::parse_entity_attributes(&input.attrs)?;
    // Without an explicit name the runtime naming convention decides, once.
    let table_name = match entity_attrs.table_name {
        Some(name) => quote! { #name },
        None => {
            let type_name = struct_name.to_string();
            quote! {{
                static NAME: ::tidemark::once_cell::sync::Lazy<::std::string::String> =
                    ::tidemark::once_cell::sync::Lazy::new(|| {
                        ::tidemark::schema::NameConvention::table_name(&::tidemark::schema::SnakeCase, #type_name)
                    });
                NAME.as_str()
            }}
        }
    };

    let mut declarations = Vec::new();
    let mut value_arms = Vec::new();
    let mut row_fields = Vec::new();
    let mut primary_keys = Vec::new();

    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let member = field_name.to_string();
        let field_type = &field.ty;
        let attrs = attributes::parse_column_attributes(field)?;

        if attrs.is_skipped {
            declarations.push(quote! { table.skip(#member); });
            row_fields.push(quote! { #field_name: ::core::default::Default::default(), });
            continue;
        }
        if attrs.is_primary_key {
            primary_keys.push(field_name);
        }

        declarations.push(column_declaration(&member, field_type, &attrs));
        value_arms.push(quote! {
            #member => ::core::option::Option::Some(::tidemark::schema::SqlField::to_value(&self.#field_name)),
        });
        row_fields.push(quote! {
            #field_name: ::tidemark::schema::SqlField::from_row(row, descriptor.member_column(#member)?)?,
        });
    }

    let primary_key = match primary_keys.as_slice() {
        [key] => *key,
        [] => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Entity requires exactly one #[primary_key] field",
            ))
        }
        [_, extra, ..] => {
            return Err(syn::Error::new_spanned(
                extra,
                "Entity requires exactly one #[primary_key] field",
            ))
        }
    };

    let touch_trigger = entity_attrs
        .touch_trigger
        .map(|enabled| quote! { table.touch_trigger(#enabled); });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::tidemark::schema::Entity for #struct_name #ty_generics #where_clause {
            fn table_name() -> &'static str {
                #table_name
            }

            fn define(table: &mut ::tidemark::schema::TableBuilder) {
                #(#declarations)*
                #touch_trigger
            }

            fn id(&self) -> ::core::option::Option<::tidemark::uuid::Uuid> {
                ::tidemark::schema::KeyField::key(&self.#primary_key)
            }

            #[allow(clippy::needless_update)]
            fn with_id(self, id: ::tidemark::uuid::Uuid) -> Self {
                Self {
                    #primary_key: ::tidemark::schema::KeyField::from_key(id),
                    ..self
                }
            }

            fn column_value(&self, member: &str) -> ::core::option::Option<::tidemark::Value> {
                match member {
                    #(#value_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            fn from_row(
                row: &::tidemark::may_postgres::Row,
                descriptor: &::tidemark::schema::EntityDescriptor,
            ) -> ::core::result::Result<Self, ::tidemark::DbError> {
                ::core::result::Result::Ok(Self {
                    #(#row_fields)*
                })
            }
        }
    })
}
