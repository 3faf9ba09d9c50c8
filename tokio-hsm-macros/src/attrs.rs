//! Attribute parsing for `#[derive(Event)]`.

use darling::ast::{Data, Fields};
use darling::util::Ignored;
use darling::{FromDeriveInput, FromVariant};
use syn::{Generics, Ident, Path, Type};

/// Enum-level `#[event(..)]` arguments.
#[derive(FromDeriveInput)]
#[darling(attributes(event), supports(enum_any))]
pub struct EventInput {
    pub ident: Ident,
    pub generics: Generics,
    pub data: Data<EventVariant, Ignored>,

    /// Reply type of `call`, e.g. `#[event(reply = "u32")]` (default: `()`).
    #[darling(default)]
    pub reply: Option<Type>,

    /// Path to the runtime crate, for re-exports (default: `::tokio_hsm`).
    #[darling(default, rename = "crate")]
    pub krate: Option<Path>,
}

/// Variant-level `#[event(name = "...")]` arguments.
#[derive(FromVariant)]
#[darling(attributes(event))]
pub struct EventVariant {
    pub ident: Ident,
    pub fields: Fields<syn::Field>,

    /// Protocol name, defaults to the variant identifier.
    #[darling(default)]
    pub name: Option<String>,
}

impl EventVariant {
    pub fn protocol_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.ident.to_string())
    }
}
