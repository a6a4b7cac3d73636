use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, parse_macro_input};

pub fn derive_component(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    // Structs and enums qualify; a union has no well-defined cleared state.
    if let Data::Union(_) = ast.data {
        return syn::Error::new_spanned(&ast.ident, "a union cannot be a component")
            .to_compile_error()
            .into();
    }

    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    // The absolute path resolves from dependants and, thanks to the
    // `extern crate self as strata_ecs` alias, from this crate's own tests.
    TokenStream::from(quote! {
        impl #impl_generics ::strata_ecs::ecs::component::Component
            for #name #ty_generics #where_clause
        {
        }
    })
}
