//! Checks on the parsed event enum.

use std::collections::HashMap;

use syn::Error;

use crate::attrs::EventVariant;

/// Rejects two variants sharing a protocol name.
pub fn unique_names(variants: &[&EventVariant]) -> syn::Result<()> {
    let mut seen: HashMap<String, &syn::Ident> = HashMap::new();
    let mut errors: Option<Error> = None;

    for variant in variants {
        let name = variant.protocol_name();
        if let Some(first) = seen.get(&name) {
            let err = Error::new_spanned(
                &variant.ident,
                format!("event name `{name}` is already used by variant `{first}`"),
            );
            match &mut errors {
                Some(errors) => errors.combine(err),
                None => errors = Some(err),
            }
        } else {
            seen.insert(name, &variant.ident);
        }
    }

    match errors {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
