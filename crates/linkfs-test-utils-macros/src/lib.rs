// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `#[logged_test]`: a `#[test]` that writes its own log file.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::spanned::Spanned;
use syn::{parse_macro_input, ItemFn};

/// Turns a plain function into a test with a per-test log.
///
/// The body runs as an inner function that receives the test's
/// `logger: &mut TestLogger`. Its return value (`()` or any `Result` whose
/// error is `Display`) decides the verdict written to the log; a panic is
/// recorded as a failure. Other attributes such as `#[serial]` or `#[ignore]`
/// are kept on the generated test.
///
/// ```ignore
/// use linkfs_test_utils::logged_test;
///
/// #[logged_test]
/// fn resolves_links() {
///     logger.log("linking").unwrap();
/// }
/// ```
#[proc_macro_attribute]
pub fn logged_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    match expand(attr, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(attr: TokenStream, input: ItemFn) -> syn::Result<proc_macro2::TokenStream> {
    if !attr.is_empty() {
        return Err(syn::Error::new(
            proc_macro2::TokenStream::from(attr).span(),
            "#[logged_test] takes no arguments",
        ));
    }
    let sig = &input.sig;
    if let Some(token) = &sig.asyncness {
        return Err(syn::Error::new(token.span, "#[logged_test] tests must be synchronous"));
    }
    if !sig.inputs.is_empty() || !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            sig.ident.span(),
            "#[logged_test] tests take no parameters or generics",
        ));
    }

    let name = &sig.ident;
    let label = name.to_string();
    let body_fn = format_ident!("__{}_body", name);
    let output = &sig.output;
    let block = &input.block;
    let vis = &input.vis;
    let attrs = input
        .attrs
        .iter()
        .filter(|attr| !attr.path().is_ident("logged_test"));

    Ok(quote! {
        #[::core::prelude::v1::test]
        #(#attrs)*
        #vis fn #name() #output {
            #[allow(unused_variables)]
            fn #body_fn(logger: &mut ::linkfs_test_utils::TestLogger) #output #block

            let mut logger = match ::linkfs_test_utils::TestLogger::new(#label) {
                ::std::result::Result::Ok(logger) => logger,
                ::std::result::Result::Err(err) => panic!("cannot create test log: {}", err),
            };
            let outcome = #body_fn(&mut logger);
            ::linkfs_test_utils::TestOutcome::record(outcome, &mut logger)
        }
    })
}
