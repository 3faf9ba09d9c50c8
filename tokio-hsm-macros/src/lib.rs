//! Derive macro for tokio-hsm event enums.

use darling::FromDeriveInput;
use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod attrs;
mod codegen;
mod validation;

/// Derives `tokio_hsm::Event` for an enum.
///
/// Each variant's protocol name is its identifier unless renamed with
/// `#[event(name = "...")]`. The enum-level `#[event(reply = "Type")]` sets the value a
/// handler can return to a `call`er.
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.write_errors().into(),
    }
}

fn expand(input: &DeriveInput) -> darling::Result<proc_macro2::TokenStream> {
    let parsed = attrs::EventInput::from_derive_input(input)?;
    // `supports(enum_any)` has already rejected structs and unions.
    let darling::ast::Data::Enum(variants) = &parsed.data else {
        unreachable!("Event input is always an enum")
    };
    let variants: Vec<&attrs::EventVariant> = variants.iter().collect();
    validation::unique_names(&variants)?;

    Ok(codegen::generate(&parsed, &variants))
}
