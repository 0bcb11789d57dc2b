//! Derive macro implementation for `HazelcastPortable`.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, LitInt};

pub fn derive_portable_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let attrs = StructAttrs::parse(&input.attrs)?;
    let factory_id = attrs.factory_id.ok_or_else(|| {
        syn::Error::new(
            Span::call_site(),
            "HazelcastPortable requires #[hazelcast(factory_id = N)]",
        )
    })?;
    let class_id = attrs.class_id.ok_or_else(|| {
        syn::Error::new(
            Span::call_site(),
            "HazelcastPortable requires #[hazelcast(class_id = N)]",
        )
    })?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "HazelcastPortable only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "HazelcastPortable can only be derived for structs",
            ))
        }
    };

    let mut write_stmts = Vec::new();
    let mut read_stmts = Vec::new();

    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let field_attrs = FieldAttrs::parse(&field.attrs)?;
        if field_attrs.skip {
            continue;
        }
        let wire_name = field_attrs
            .field_name
            .unwrap_or_else(|| field_ident.to_string());

        let Some(accessors) = Accessors::for_type(&type_to_string(&field.ty)) else {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "unsupported field type for HazelcastPortable; use a primitive, String, \
                 Option<String>, Vec of those, or #[hazelcast(skip)]",
            ));
        };
        write_stmts.push(accessors.write(field_ident, &wire_name));
        read_stmts.push(accessors.read(field_ident, &wire_name));
    }

    let class_version = attrs.version.map(|version| {
        quote! {
            fn class_version(&self) -> Option<i32> {
                Some(#version)
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::hazelcast_serialization::serialization::portable::Portable
            for #name #ty_generics #where_clause
        {
            fn factory_id(&self) -> i32 {
                #factory_id
            }

            fn class_id(&self) -> i32 {
                #class_id
            }

            #class_version

            fn write_portable(
                &self,
                writer: &mut dyn ::hazelcast_serialization::serialization::portable::PortableWriter,
            ) -> ::hazelcast_serialization::Result<()> {
                #(#write_stmts)*
                Ok(())
            }

            fn read_portable(
                &mut self,
                reader: &mut dyn ::hazelcast_serialization::serialization::portable::PortableReader,
            ) -> ::hazelcast_serialization::Result<()> {
                #(#read_stmts)*
                Ok(())
            }
        }
    })
}

/// How a Rust field type maps onto the portable writer and reader.
enum Accessors {
    /// `bool`, `i8`, `u16`, `i16`, `i32`, `i64`, `f32`, `f64`.
    Primitive(&'static str),
    /// `String`; a null string reads back empty.
    String,
    /// `Option<String>`.
    OptionalString,
    /// `Vec<T>` of a primitive; a null array reads back empty.
    Array(&'static str),
    /// `Option<Vec<T>>` of a primitive.
    OptionalArray(&'static str),
    /// `Vec<String>`.
    StringArray,
    /// `Vec<Option<String>>`.
    NullableStringArray,
    /// `Option<Vec<Option<String>>>`.
    OptionalStringArray,
}

impl Accessors {
    fn for_type(ty: &str) -> Option<Self> {
        if let Some(kind) = primitive_kind(ty) {
            return Some(Self::Primitive(kind));
        }
        match ty {
            "String" => return Some(Self::String),
            "Option<String>" => return Some(Self::OptionalString),
            "Vec<String>" => return Some(Self::StringArray),
            "Vec<Option<String>>" => return Some(Self::NullableStringArray),
            "Option<Vec<Option<String>>>" => return Some(Self::OptionalStringArray),
            _ => {}
        }
        if let Some(inner) = strip_generic(ty, "Option<Vec<") {
            return primitive_kind(inner.trim_end_matches('>')).map(Self::OptionalArray);
        }
        if let Some(inner) = strip_generic(ty, "Vec<") {
            return primitive_kind(inner).map(Self::Array);
        }
        None
    }

    fn write(&self, field: &syn::Ident, wire_name: &str) -> proc_macro2::TokenStream {
        match self {
            Self::Primitive(kind) => {
                let method = method_ident("write", kind, "");
                quote! { writer.#method(#wire_name, self.#field)?; }
            }
            Self::String => quote! { writer.write_string(#wire_name, Some(self.#field.as_str()))?; },
            Self::OptionalString => {
                quote! { writer.write_string(#wire_name, self.#field.as_deref())?; }
            }
            Self::Array(kind) => {
                let method = method_ident("write", kind, "_array");
                quote! { writer.#method(#wire_name, Some(self.#field.as_slice()))?; }
            }
            Self::OptionalArray(kind) => {
                let method = method_ident("write", kind, "_array");
                quote! { writer.#method(#wire_name, self.#field.as_deref())?; }
            }
            Self::StringArray => quote! {
                let values: Vec<Option<String>> = self.#field.iter().cloned().map(Some).collect();
                writer.write_string_array(#wire_name, Some(values.as_slice()))?;
            },
            Self::NullableStringArray => {
                quote! { writer.write_string_array(#wire_name, Some(self.#field.as_slice()))?; }
            }
            Self::OptionalStringArray => {
                quote! { writer.write_string_array(#wire_name, self.#field.as_deref())?; }
            }
        }
    }

    fn read(&self, field: &syn::Ident, wire_name: &str) -> proc_macro2::TokenStream {
        match self {
            Self::Primitive(kind) => {
                let method = method_ident("read", kind, "");
                quote! { self.#field = reader.#method(#wire_name)?; }
            }
            Self::String => {
                quote! { self.#field = reader.read_string(#wire_name)?.unwrap_or_default(); }
            }
            Self::OptionalString => quote! { self.#field = reader.read_string(#wire_name)?; },
            Self::Array(kind) => {
                let method = method_ident("read", kind, "_array");
                quote! { self.#field = reader.#method(#wire_name)?.unwrap_or_default(); }
            }
            Self::OptionalArray(kind) => {
                let method = method_ident("read", kind, "_array");
                quote! { self.#field = reader.#method(#wire_name)?; }
            }
            Self::StringArray => quote! {
                self.#field = reader
                    .read_string_array(#wire_name)?
                    .unwrap_or_default()
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect();
            },
            Self::NullableStringArray => quote! {
                self.#field = reader.read_string_array(#wire_name)?.unwrap_or_default();
            },
            Self::OptionalStringArray => {
                quote! { self.#field = reader.read_string_array(#wire_name)?; }
            }
        }
    }
}

fn primitive_kind(ty: &str) -> Option<&'static str> {
    Some(match ty {
        "bool" => "bool",
        "i8" => "byte",
        "u16" => "char",
        "i16" => "short",
        "i32" => "int",
        "i64" => "long",
        "f32" => "float",
        "f64" => "double",
        _ => return None,
    })
}

fn strip_generic<'a>(ty: &'a str, prefix: &str) -> Option<&'a str> {
    ty.strip_prefix(prefix)?.strip_suffix('>')
}

fn method_ident(prefix: &str, kind: &str, suffix: &str) -> syn::Ident {
    syn::Ident::new(&format!("{prefix}_{kind}{suffix}"), Span::call_site())
}

fn type_to_string(ty: &syn::Type) -> String {
    quote!(#ty).to_string().replace(' ', "")
}

#[derive(Default)]
struct StructAttrs {
    factory_id: Option<i32>,
    class_id: Option<i32>,
    version: Option<i32>,
}

impl StructAttrs {
    fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut parsed = Self::default();
        for attr in attrs {
            if !attr.path().is_ident("hazelcast") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                let slot = if meta.path.is_ident("factory_id") {
                    &mut parsed.factory_id
                } else if meta.path.is_ident("class_id") {
                    &mut parsed.class_id
                } else if meta.path.is_ident("version") {
                    &mut parsed.version
                } else {
                    return Err(meta.error("expected `factory_id`, `class_id` or `version`"));
                };
                let value: LitInt = meta.value()?.parse()?;
                *slot = Some(value.base10_parse()?);
                Ok(())
            })?;
        }
        Ok(parsed)
    }
}

#[derive(Default)]
struct FieldAttrs {
    field_name: Option<String>,
    skip: bool,
}

impl FieldAttrs {
    fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut parsed = Self::default();
        for attr in attrs {
            if !attr.path().is_ident("hazelcast") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    parsed.skip = true;
                    Ok(())
                } else if meta.path.is_ident("field_name") {
                    let lit: Lit = meta.value()?.parse()?;
                    match lit {
                        Lit::Str(name) => {
                            parsed.field_name = Some(name.value());
                            Ok(())
                        }
                        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
                    }
                } else {
                    Err(meta.error("expected `field_name` or `skip`"))
                }
            })?;
        }
        Ok(parsed)
    }
}
