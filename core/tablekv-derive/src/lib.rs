//! tablekv Derive — procedural macros for tablekv.
//!
//! Provides `#[derive(Record)]` for compile-time schema generation.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, Type, parse_macro_input};

/// Derive macro mapping a struct's fields onto table columns.
///
/// # Example
///
/// ```ignore
/// #[derive(Default, Record)]
/// #[tkv(table_name = "balloons")]
/// pub struct Balloon {
///     pub id: u32,
///     pub color: String,
///     pub size: i32,
///     #[tkv(ignore)]
///     pub scratch: Vec<String>,
/// }
/// ```
///
/// The identity field is the one marked `#[tkv(id)]`, else the field named
/// `id`; it must be a `u32`. Column names are lower-cased field names. The
/// table name defaults to the lower-cased struct name.
///
/// Generates a `tablekv_core::Record` implementation.
#[proc_macro_derive(Record, attributes(tkv))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

struct FieldInfo<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    column: String,
    ignore: bool,
    id: bool,
}

fn expand(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let table_name = extract_table_name(&input)?.unwrap_or_else(|| name.to_string().to_lowercase());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Record can only be derived for structs",
            ));
        }
    };

    let mut infos = Vec::with_capacity(fields.len());
    for f in fields {
        let ident = f.ident.as_ref().expect("named field");
        let (ignore, id) = field_flags(f)?;
        let column = ident.to_string().trim_start_matches("r#").to_lowercase();
        infos.push(FieldInfo {
            ident,
            ty: &f.ty,
            column,
            ignore,
            id,
        });
    }

    let id_field = match infos.iter().filter(|f| f.id).count() {
        0 => infos.iter().find(|f| f.column == "id"),
        1 => infos.iter().find(|f| f.id),
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "only one field may be marked #[tkv(id)]",
            ));
        }
    };
    let Some(id_field) = id_field else {
        return Err(syn::Error::new_spanned(
            name,
            "Record needs an identity field: a `u32` named `id` or marked #[tkv(id)]",
        ));
    };
    let id_ident = id_field.ident;

    let columns: Vec<&FieldInfo> = infos
        .iter()
        .filter(|f| f.ident != id_ident)
        .collect();

    let column_defs = columns.iter().map(|f| {
        let column = &f.column;
        let ty = f.ty;
        if f.ignore {
            quote! { ::tablekv_core::schema::ColumnDef::ignored(#column) }
        } else {
            quote! {
                ::tablekv_core::schema::ColumnDef::new(
                    #column,
                    <#ty as ::tablekv_core::codec::ColumnValue>::TAG
                )
            }
        }
    });

    let stored: Vec<&&FieldInfo> = columns.iter().filter(|f| !f.ignore).collect();

    let getters = stored.iter().map(|f| {
        let column = &f.column;
        let ident = f.ident;
        let ty = f.ty;
        quote! {
            #column => ::core::option::Option::Some(
                <#ty as ::tablekv_core::codec::ColumnValue>::to_value(&self.#ident)
            ),
        }
    });

    let setters = stored.iter().map(|f| {
        let column = &f.column;
        let ident = f.ident;
        let ty = f.ty;
        quote! {
            #column => {
                self.#ident = <#ty as ::tablekv_core::codec::ColumnValue>::from_value(value, column)?;
                ::core::result::Result::Ok(())
            }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::tablekv_core::schema::Record for #name #ty_generics #where_clause {
            const TABLE_NAME: &'static str = #table_name;

            fn columns() -> &'static [::tablekv_core::schema::ColumnDef] {
                static COLUMNS: &[::tablekv_core::schema::ColumnDef] = &[
                    #(#column_defs),*
                ];
                COLUMNS
            }

            fn id(&self) -> u32 {
                self.#id_ident
            }

            fn set_id(&mut self, id: u32) {
                self.#id_ident = id;
            }

            fn column_value(&self, column: &str) -> ::core::option::Option<::tablekv_core::codec::Value> {
                match column {
                    #(#getters)*
                    _ => ::core::option::Option::None,
                }
            }

            #[allow(unreachable_code, unused_variables)]
            fn set_column(
                &mut self,
                column: &str,
                value: ::tablekv_core::codec::Value,
            ) -> ::tablekv_core::error::TkvResult<()> {
                match column {
                    #(#setters)*
                    _ => ::core::result::Result::Err(::tablekv_core::error::TkvError::UnknownColumn {
                        table: #table_name.to_string(),
                        column: column.to_string(),
                    }),
                }
            }
        }
    };

    Ok(expanded)
}

fn extract_table_name(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut table_name = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("tkv") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table_name") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                let name = lit.value();
                if name.is_empty() || name.contains('.') {
                    return Err(syn::Error::new_spanned(
                        &lit,
                        "table_name must be non-empty and contain no '.'",
                    ));
                }
                table_name = Some(name);
                Ok(())
            } else {
                Err(meta.error("unsupported tkv attribute, expected `table_name`"))
            }
        })?;
    }
    Ok(table_name)
}

fn field_flags(field: &syn::Field) -> syn::Result<(bool, bool)> {
    let (mut ignore, mut id) = (false, false);
    for attr in &field.attrs {
        if !attr.path().is_ident("tkv") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("ignore") {
                ignore = true;
                Ok(())
            } else if meta.path.is_ident("id") {
                id = true;
                Ok(())
            } else {
                Err(meta.error("unsupported tkv field attribute, expected `id` or `ignore`"))
            }
        })?;
    }
    Ok((ignore, id))
}
