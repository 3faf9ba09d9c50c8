//! Code generation for the `Event` impl.

use darling::ast::Style;
use proc_macro2::TokenStream;
use quote::quote;

use crate::attrs::{EventInput, EventVariant};

/// Generate `impl Event` for the parsed enum.
pub fn generate(input: &EventInput, variants: &[&EventVariant]) -> TokenStream {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let krate = match &input.krate {
        Some(path) => quote! { #path },
        None => quote! { ::tokio_hsm },
    };
    let reply = match &input.reply {
        Some(ty) => quote! { #ty },
        None => quote! { () },
    };

    let names: Vec<String> = variants.iter().map(|v| v.protocol_name()).collect();
    let arms = variants.iter().zip(&names).map(|(variant, name)| {
        let v = &variant.ident;
        match variant.fields.style {
            Style::Unit => quote! { Self::#v => #name, },
            Style::Tuple => quote! { Self::#v(..) => #name, },
            Style::Struct => quote! { Self::#v { .. } => #name, },
        }
    });

    // An uninhabited enum has no value to name.
    let body = if variants.is_empty() {
        quote! { match *self {} }
    } else {
        quote! {
            match self {
                #(#arms)*
            }
        }
    };

    quote! {
        impl #impl_generics #krate::Event for #ident #ty_generics #where_clause {
            type Reply = #reply;

            fn name(&self) -> &'static str {
                #body
            }

            fn names() -> &'static [&'static str] {
                &[#(#names),*]
            }
        }
    }
}
