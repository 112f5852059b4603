//! Procedural macros for careerdb
//!
//! This crate provides `#[derive(Entity)]`, which turns an annotated struct
//! into a table the generic repository can work with:
//!
//! - `DatabaseEntity` - table name, display name and static schema metadata
//! - `FromSqlRow` - row decoding through `ColumnValue`
//! - `FieldAccess` - column values by name
//! - `RelationLoader` - bulk loading of `#[relation]` fields
//! - `Entity` - ties the struct to its create and update inputs

use convert_case::{Case, Casing};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Path, Type, parse_macro_input};

/// Derive the ORM traits for an entity struct.
///
/// # Usage
///
/// ```ignore
/// #[derive(Debug, Clone, Entity)]
/// #[entity(table = "skills", create = CreateSkill, update = UpdateSkill)]
/// pub struct Skill {
///     #[column(primary_key)]
///     pub id: String,
///     #[column(references = User)]
///     pub user_id: String,
///     pub name: String,
///     #[column(created_at)]
///     pub created_at: DateTime<Utc>,
///
///     #[relation(belongs_to, target = User, local_key = "user_id")]
///     pub user: Option<Box<User>>,
/// }
/// ```
///
/// Column attributes: `primary_key`, `unique`, `references = Type`,
/// `default = "sql"`, `created_at`, `updated_at`.
///
/// Relation attributes: one of `has_one`, `has_many`, `belongs_to`, plus
/// `target = Type` and the joining columns. `has_one`/`has_many` take
/// `foreign_key` (column on the target) and optionally `local_key` (defaults
/// to `id`); `belongs_to` takes `local_key` and optionally `foreign_key`
/// (defaults to `id`).
#[proc_macro_derive(Entity, attributes(entity, column, relation))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct EntityAttrs {
    table: Option<String>,
    name: Option<String>,
    create: Option<Path>,
    update: Option<Path>,
}

#[derive(Default)]
struct ColumnAttrs {
    primary_key: bool,
    unique: bool,
    references: Option<Path>,
    default: Option<String>,
    created_at: bool,
    updated_at: bool,
}

enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
}

struct RelationAttrs {
    kind: RelationKind,
    target: Path,
    local_key: String,
    foreign_key: String,
}

struct ColumnField {
    ident: Ident,
    ty: Type,
    attrs: ColumnAttrs,
}

struct RelationField {
    ident: Ident,
    attrs: RelationAttrs,
}

fn parse_entity_attrs(input: &DeriveInput) -> syn::Result<EntityAttrs> {
    let mut attrs = EntityAttrs::default();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                attrs.table = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("name") {
                attrs.name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("create") {
                attrs.create = Some(meta.value()?.parse::<Path>()?);
            } else if meta.path.is_ident("update") {
                attrs.update = Some(meta.value()?.parse::<Path>()?);
            } else {
                return Err(meta.error("unknown entity attribute"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

fn parse_column_attrs(field: &syn::Field) -> syn::Result<ColumnAttrs> {
    let mut attrs = ColumnAttrs::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("column")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                attrs.primary_key = true;
            } else if meta.path.is_ident("unique") {
                attrs.unique = true;
            } else if meta.path.is_ident("created_at") {
                attrs.created_at = true;
            } else if meta.path.is_ident("updated_at") {
                attrs.updated_at = true;
            } else if meta.path.is_ident("references") {
                attrs.references = Some(meta.value()?.parse::<Path>()?);
            } else if meta.path.is_ident("default") {
                attrs.default = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                return Err(meta.error("unknown column attribute"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

fn parse_relation_attrs(attr: &syn::Attribute) -> syn::Result<RelationAttrs> {
    let mut kind = None;
    let mut target = None;
    let mut local_key = None;
    let mut foreign_key = None;

    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("has_one") {
            kind = Some(RelationKind::HasOne);
        } else if meta.path.is_ident("has_many") {
            kind = Some(RelationKind::HasMany);
        } else if meta.path.is_ident("belongs_to") {
            kind = Some(RelationKind::BelongsTo);
        } else if meta.path.is_ident("target") {
            target = Some(meta.value()?.parse::<Path>()?);
        } else if meta.path.is_ident("local_key") {
            local_key = Some(meta.value()?.parse::<LitStr>()?.value());
        } else if meta.path.is_ident("foreign_key") {
            foreign_key = Some(meta.value()?.parse::<LitStr>()?.value());
        } else {
            return Err(meta.error("unknown relation attribute"));
        }
        Ok(())
    })?;

    let kind = kind.ok_or_else(|| {
        syn::Error::new_spanned(attr, "relation needs one of has_one, has_many, belongs_to")
    })?;
    let target = target.ok_or_else(|| syn::Error::new_spanned(attr, "relation needs `target`"))?;

    let (local_key, foreign_key) = match kind {
        RelationKind::BelongsTo => (
            local_key.ok_or_else(|| syn::Error::new_spanned(attr, "belongs_to needs `local_key`"))?,
            foreign_key.unwrap_or_else(|| "id".to_string()),
        ),
        RelationKind::HasOne | RelationKind::HasMany => (
            local_key.unwrap_or_else(|| "id".to_string()),
            foreign_key.ok_or_else(|| {
                syn::Error::new_spanned(attr, "has_one/has_many need `foreign_key`")
            })?,
        ),
    };

    Ok(RelationAttrs {
        kind,
        target,
        local_key,
        foreign_key,
    })
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let entity_attrs = parse_entity_attrs(input)?;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(input, "Entity can only be derived for structs"));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new_spanned(input, "Entity requires named fields"));
    };

    let mut columns: Vec<ColumnField> = Vec::new();
    let mut relations: Vec<RelationField> = Vec::new();
    for field in &named.named {
        let field_ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new_spanned(field, "Entity requires named fields"))?;
        match field.attrs.iter().find(|a| a.path().is_ident("relation")) {
            Some(attr) => relations.push(RelationField {
                ident: field_ident,
                attrs: parse_relation_attrs(attr)?,
            }),
            None => columns.push(ColumnField {
                ident: field_ident,
                ty: field.ty.clone(),
                attrs: parse_column_attrs(field)?,
            }),
        }
    }

    let struct_name = ident.to_string();
    let table = entity_attrs
        .table
        .unwrap_or_else(|| format!("{}s", struct_name.to_case(Case::Snake)));
    let display = entity_attrs.name.unwrap_or_else(|| struct_name.clone());

    let primary_keys: Vec<&ColumnField> = columns.iter().filter(|c| c.attrs.primary_key).collect();
    let [primary_key] = primary_keys.as_slice() else {
        return Err(syn::Error::new_spanned(
            input,
            "Entity needs exactly one #[column(primary_key)] field",
        ));
    };
    let primary_key = primary_key.ident.to_string();

    let stamp = |pick: fn(&ColumnAttrs) -> bool| -> TokenStream2 {
        match columns.iter().find(|c| pick(&c.attrs)) {
            Some(c) => {
                let name = c.ident.to_string();
                quote! { Some(#name) }
            }
            None => quote! { None },
        }
    };
    let created_at = stamp(|a| a.created_at);
    let updated_at = stamp(|a| a.updated_at);

    let column_defs = columns.iter().map(|c| {
        let name = c.ident.to_string();
        let ty = &c.ty;
        let primary = c.attrs.primary_key;
        let unique = c.attrs.unique;
        let references = match &c.attrs.references {
            Some(target) => quote! {
                Some(crate::orm::ForeignKeyDef {
                    table: <#target as crate::orm::DatabaseEntity>::TABLE_NAME,
                    column: "id",
                })
            },
            None => quote! { None },
        };
        let default = match &c.attrs.default {
            Some(sql) => quote! { Some(#sql) },
            None => quote! { None },
        };
        quote! {
            crate::orm::ColumnDef {
                name: #name,
                kind: <#ty as crate::orm::ColumnValue>::KIND,
                nullable: <#ty as crate::orm::ColumnValue>::NULLABLE,
                is_primary_key: #primary,
                is_unique: #unique,
                references: #references,
                default: #default,
            }
        }
    });

    let relation_defs = relations.iter().map(|r| {
        let name = r.ident.to_string();
        let target = &r.attrs.target;
        let kind = match r.attrs.kind {
            RelationKind::HasOne => quote! { crate::orm::RelationKind::HasOne },
            RelationKind::HasMany => quote! { crate::orm::RelationKind::HasMany },
            RelationKind::BelongsTo => quote! { crate::orm::RelationKind::BelongsTo },
        };
        let local = &r.attrs.local_key;
        let foreign = &r.attrs.foreign_key;
        quote! {
            crate::orm::RelationDef {
                name: #name,
                kind: #kind,
                target: <#target as crate::orm::DatabaseEntity>::schema,
                local_column: #local,
                foreign_column: #foreign,
            }
        }
    });

    let decode_fields = columns.iter().map(|c| {
        let field = &c.ident;
        let name = field.to_string();
        quote! { #field: crate::orm::decode_column(row, #name)? }
    });
    let empty_relations = relations.iter().map(|r| {
        let field = &r.ident;
        quote! { #field: None }
    });

    let access_arms = columns.iter().map(|c| {
        let field = &c.ident;
        let name = field.to_string();
        quote! { #name => Some(crate::orm::ColumnValue::to_value(&self.#field)) }
    });

    let loaders = relations.iter().map(|r| {
        let field = &r.ident;
        let name = field.to_string();
        let target = &r.attrs.target;
        let assign = match r.attrs.kind {
            RelationKind::HasMany => quote! { entity.#field = Some(rows); },
            RelationKind::HasOne | RelationKind::BelongsTo => {
                quote! { entity.#field = crate::orm::single(rows, args)?; }
            }
        };
        quote! {
            if let Some(args) = include.get(#name) {
                let relation = schema.require_relation(#name)?;
                let batches = crate::orm::load_relation::<Self, #target>(
                    &*entities, relation, args, &mut *conn, ctx,
                )
                .await?;
                for (entity, rows) in entities.iter_mut().zip(batches) {
                    #assign
                }
            }
        }
    });

    let entity_impl = match (&entity_attrs.create, &entity_attrs.update) {
        (Some(create), Some(update)) => quote! {
            impl crate::orm::Entity for #ident {
                type Create = #create;
                type Update = #update;
            }
        },
        (None, None) => quote! {},
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "#[entity] needs both `create` and `update`, or neither",
            ));
        }
    };

    Ok(quote! {
        impl crate::orm::DatabaseEntity for #ident {
            const TABLE_NAME: &'static str = #table;
            const ENTITY_NAME: &'static str = #display;

            fn schema() -> &'static crate::orm::EntitySchema {
                static SCHEMA: crate::orm::EntitySchema = crate::orm::EntitySchema {
                    table: #table,
                    name: #display,
                    primary_key: #primary_key,
                    columns: &[#(#column_defs),*],
                    relations: &[#(#relation_defs),*],
                    created_at: #created_at,
                    updated_at: #updated_at,
                };
                &SCHEMA
            }
        }

        impl crate::orm::FromSqlRow for #ident {
            fn from_row(row: &::sqlx::sqlite::SqliteRow) -> ::std::result::Result<Self, ::sqlx::Error> {
                Ok(Self {
                    #(#decode_fields,)*
                    #(#empty_relations,)*
                })
            }
        }

        impl crate::orm::FieldAccess for #ident {
            fn field_value(&self, column: &str) -> Option<crate::orm::SqlValue> {
                match column {
                    #(#access_arms,)*
                    _ => None,
                }
            }
        }

        impl crate::orm::RelationLoader for #ident {
            #[allow(unused_variables)]
            fn load_relations<'a>(
                entities: &'a mut [Self],
                include: &'a crate::orm::Include,
                conn: &'a mut ::sqlx::SqliteConnection,
                ctx: &'a crate::orm::QueryContext,
            ) -> ::futures::future::BoxFuture<'a, crate::error::Result<()>> {
                Box::pin(async move {
                    let schema = <Self as crate::orm::DatabaseEntity>::schema();
                    include.validate(schema)?;
                    if entities.is_empty() {
                        return Ok(());
                    }
                    #(#loaders)*
                    Ok(())
                })
            }
        }

        #entity_impl
    })
}
