//! `#[derive(Events)]` implementation.
//!
//! # Enum-level attributes `#[events(...)]`
//!
//! | Key | Example | Description |
//! |-----|---------|-------------|
//! | `crate` | `"herald_core"` | Path the generated code uses for the herald crate |
//! | `kind` | `"ChatKind"` | Name of the generated kind enum |
//! | `module` | `"chat"` | Name of the generated marker module |
//! | `local` | | Do not generate the relay codec |
//!
//! # Variant-level attributes `#[event(...)]`
//!
//! | Key | Example | Description |
//! |-----|---------|-------------|
//! | `name` | `"user-joined"` | Event name used in errors and on the relay wire |

use std::collections::HashSet;

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{
    Attribute, Data, DataEnum, DeriveInput, Fields, Ident, LitStr, Path, Type, Visibility,
    spanned::Spanned,
};

// ============================================================================
// Attribute structures
// ============================================================================

/// Options from `#[events(...)]`.
struct SchemaAttrs {
    krate: Path,
    kind: Option<Ident>,
    module: Option<Ident>,
    local: bool,
}

/// One parsed variant.
struct Variant {
    ident: Ident,
    name: LitStr,
    payload: Option<Type>,
}

// ============================================================================
// Entry point
// ============================================================================

pub fn derive_events(input: &DeriveInput) -> syn::Result<TokenStream> {
    let data = match &input.data {
        Data::Enum(data) => data,
        Data::Struct(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Events can only be derived for enums; each variant is one event kind",
            ));
        }
        Data::Union(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Events cannot be derived for unions",
            ));
        }
    };

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "Events does not support generic enums",
        ));
    }

    let attrs = parse_schema_attrs(&input.attrs)?;
    let variants = parse_variants(data)?;
    if variants.is_empty() {
        return Err(syn::Error::new(
            input.ident.span(),
            "Events requires at least one variant",
        ));
    }

    Ok(generate(input, &attrs, &variants))
}

// ============================================================================
// Attribute parsing
// ============================================================================

fn parse_schema_attrs(attrs: &[Attribute]) -> syn::Result<SchemaAttrs> {
    let mut result = SchemaAttrs {
        krate: syn::parse_quote!(::herald),
        kind: None,
        module: None,
        local: false,
    };

    for attr in attrs {
        if !attr.path().is_ident("events") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                result.krate = meta.value()?.parse::<LitStr>()?.parse()?;
            } else if meta.path.is_ident("kind") {
                result.kind = Some(meta.value()?.parse::<LitStr>()?.parse()?);
            } else if meta.path.is_ident("module") {
                result.module = Some(meta.value()?.parse::<LitStr>()?.parse()?);
            } else if meta.path.is_ident("local") {
                result.local = true;
            } else {
                return Err(meta.error("expected `crate`, `kind`, `module` or `local`"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

fn parse_variant_name(attrs: &[Attribute]) -> syn::Result<Option<LitStr>> {
    let mut name = None;

    for attr in attrs {
        if !attr.path().is_ident("event") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                Err(meta.error("expected `name`"))
            }
        })?;
    }

    Ok(name)
}

fn parse_variants(data: &DataEnum) -> syn::Result<Vec<Variant>> {
    let mut seen = HashSet::new();
    let mut variants = Vec::with_capacity(data.variants.len());

    for variant in &data.variants {
        let payload = match &variant.fields {
            Fields::Unit => None,
            Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                Some(fields.unnamed[0].ty.clone())
            }
            fields => {
                return Err(syn::Error::new(
                    fields.span(),
                    "event variants must be unit or have exactly one unnamed field",
                ));
            }
        };

        let name = parse_variant_name(&variant.attrs)?.unwrap_or_else(|| {
            LitStr::new(&to_snake_case(&variant.ident.to_string()), variant.ident.span())
        });
        if !seen.insert(name.value()) {
            return Err(syn::Error::new(
                name.span(),
                format!("duplicate event name `{}`", name.value()),
            ));
        }

        variants.push(Variant {
            ident: variant.ident.clone(),
            name,
            payload,
        });
    }

    Ok(variants)
}

/// Converts `CamelCase` to `snake_case`, keeping acronyms together
/// (`HTTPRequest` becomes `http_request`).
fn to_snake_case(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

// ============================================================================
// Code generation
// ============================================================================

fn generate(input: &DeriveInput, attrs: &SchemaAttrs, variants: &[Variant]) -> TokenStream {
    let name = &input.ident;
    let vis = &input.vis;
    let kind = attrs
        .kind
        .clone()
        .unwrap_or_else(|| format_ident!("{}Kind", name));
    let module = attrs.module.clone().unwrap_or_else(|| {
        Ident::new(&to_snake_case(&name.to_string()), name.span())
    });

    let kind_enum = generate_kind_enum(name, vis, &kind, &attrs.krate, variants);
    let markers = generate_markers(name, vis, &module, variants);
    let schema_impl = generate_schema_impl(name, &kind, attrs, variants);
    let kind_impls = generate_kind_impls(name, &kind, &module, &attrs.krate, variants);

    quote! {
        #kind_enum
        #markers
        #schema_impl
        #kind_impls
    }
}

fn generate_kind_enum(
    name: &Ident,
    vis: &Visibility,
    kind: &Ident,
    krate: &Path,
    variants: &[Variant],
) -> TokenStream {
    let doc = format!("Event kinds of `{name}`.");
    let idents: Vec<&Ident> = variants.iter().map(|v| &v.ident).collect();
    let names: Vec<&LitStr> = variants.iter().map(|v| &v.name).collect();

    quote! {
        #[doc = #doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #vis enum #kind {
            #(#idents,)*
        }

        impl #krate::EventName for #kind {
            fn name(&self) -> &'static str {
                match self {
                    #(Self::#idents => #names,)*
                }
            }

            fn from_name(name: &str) -> ::core::option::Option<Self> {
                match name {
                    #(#names => ::core::option::Option::Some(Self::#idents),)*
                    _ => ::core::option::Option::None,
                }
            }

            fn all() -> &'static [Self] {
                &[#(Self::#idents,)*]
            }
        }

        impl ::core::fmt::Display for #kind {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(#krate::EventName::name(self))
            }
        }
    }
}

fn generate_markers(
    name: &Ident,
    vis: &Visibility,
    module: &Ident,
    variants: &[Variant],
) -> TokenStream {
    let module_doc = format!("Marker types for the event kinds of `{name}`.");
    let markers = variants.iter().map(|v| {
        let ident = &v.ident;
        let doc = format!("The `{}` event.", v.name.value());
        quote! {
            #[doc = #doc]
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
            pub struct #ident;
        }
    });

    quote! {
        #[doc = #module_doc]
        #vis mod #module {
            #(#markers)*
        }
    }
}

fn generate_schema_impl(
    name: &Ident,
    kind: &Ident,
    attrs: &SchemaAttrs,
    variants: &[Variant],
) -> TokenStream {
    let krate = &attrs.krate;
    let kind_arms = variants.iter().map(|v| {
        let ident = &v.ident;
        match v.payload {
            Some(_) => quote! { Self::#ident(_) => #kind::#ident },
            None => quote! { Self::#ident => #kind::#ident },
        }
    });

    let codec = if attrs.local {
        quote! {}
    } else {
        generate_codec(kind, krate, variants)
    };

    quote! {
        impl #krate::EventSchema for #name {
            type Kind = #kind;

            fn kind(&self) -> #kind {
                match self {
                    #(#kind_arms,)*
                }
            }

            #codec
        }
    }
}

fn generate_codec(kind: &Ident, krate: &Path, variants: &[Variant]) -> TokenStream {
    let json = quote! { #krate::__private::serde_json };

    let encode_arms = variants.iter().map(|v| {
        let ident = &v.ident;
        let event = &v.name;
        match v.payload {
            Some(_) => quote! {
                Self::#ident(payload) => #json::to_value(payload)
                    .map_err(|err| #krate::RelayError::encode(#event, err))?
            },
            None => quote! { Self::#ident => #json::Value::Null },
        }
    });

    let decode_arms = variants.iter().map(|v| {
        let ident = &v.ident;
        match v.payload {
            Some(_) => quote! {
                ::core::option::Option::Some(#kind::#ident) => #json::from_value(message.payload)
                    .map(Self::#ident)
                    .map_err(|err| #krate::RelayError::decode(message.event, err))
            },
            None => quote! {
                ::core::option::Option::Some(#kind::#ident) => ::core::result::Result::Ok(Self::#ident)
            },
        }
    });

    quote! {
        fn to_message(&self) -> #krate::RelayResult<#krate::RelayMessage> {
            let event = #krate::EventName::name(&#krate::EventSchema::kind(self));
            let payload = match self {
                #(#encode_arms,)*
            };
            ::core::result::Result::Ok(#krate::RelayMessage::new(event, payload))
        }

        fn from_message(message: #krate::RelayMessage) -> #krate::RelayResult<Self> {
            match <#kind as #krate::EventName>::from_name(&message.event) {
                #(#decode_arms,)*
                ::core::option::Option::None => ::core::result::Result::Err(
                    #krate::RelayError::UnknownEvent { event: message.event },
                ),
            }
        }
    }
}

fn generate_kind_impls(
    name: &Ident,
    kind: &Ident,
    module: &Ident,
    krate: &Path,
    variants: &[Variant],
) -> TokenStream {
    let impls = variants.iter().map(|v| {
        let ident = &v.ident;
        let (payload_ty, wrap, extract) = match &v.payload {
            Some(ty) => (
                quote! { #ty },
                quote! { #name::#ident(payload) },
                quote! { #name::#ident(payload) => ::core::option::Option::Some(payload) },
            ),
            None => (
                quote! { () },
                quote! {{
                    let () = payload;
                    #name::#ident
                }},
                quote! { #name::#ident => ::core::option::Option::Some(&()) },
            ),
        };

        quote! {
            impl #krate::EventKind<#name> for #module::#ident {
                type Payload = #payload_ty;

                const KIND: #kind = #kind::#ident;

                fn wrap(payload: Self::Payload) -> #name {
                    #wrap
                }

                #[allow(unreachable_patterns)]
                fn payload(event: &#name) -> ::core::option::Option<&Self::Payload> {
                    match event {
                        #extract,
                        _ => ::core::option::Option::None,
                    }
                }
            }
        }
    });

    quote! { #(#impls)* }
}
