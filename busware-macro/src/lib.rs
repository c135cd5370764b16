/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![forbid(unsafe_code)]

//! Busware Macro Library
//!
//! Procedural macros for declaring the types Busware moves around.
//!
//! # Message Macro
//!
//! [`bus_message`] makes a type usable as a goal, feedback, result, request
//! or response payload:
//!
//! ```ignore
//! #[bus_message]
//! pub struct MoveGoal {
//!     pub x: f64,
//!     pub y: f64,
//! }
//! ```
//!
//! # Action and Service Macros
//!
//! [`bus_action`] and [`bus_service`] bind payload types to a marker type:
//!
//! ```ignore
//! #[bus_action(goal = MoveGoal, feedback = f64, result = String)]
//! pub struct Move;
//!
//! #[bus_service(request = (i64, i64), response = i64)]
//! pub struct Add;
//! ```

use proc_macro::TokenStream;

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Type};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(trait_name)
                    || meta.path.segments.last().is_some_and(|s| s.ident == trait_name)
                {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Builds `#[derive(...)]` for the listed traits the input does not derive yet.
fn missing_derives(input: &DeriveInput, wanted: &[(&str, TokenStream2)]) -> TokenStream2 {
    let traits: Vec<&TokenStream2> = wanted
        .iter()
        .filter(|(name, _)| !has_derive(input, name))
        .map(|(_, path)| path)
        .collect();
    if traits.is_empty() {
        quote!()
    } else {
        quote!(#[derive(#(#traits),*)])
    }
}

/// Type arguments parsed from `#[bus_action(...)]` or `#[bus_service(...)]`.
#[derive(Default)]
struct TypeArgs {
    entries: Vec<(String, Type)>,
}

impl TypeArgs {
    fn parser<'a>(
        &'a mut self,
        allowed: &'static [&'static str],
        macro_name: &'static str,
    ) -> impl syn::parse::Parser<Output = ()> + 'a {
        syn::meta::parser(move |meta| {
            let Some(key) = allowed.iter().find(|key| meta.path.is_ident(key)) else {
                return Err(meta.error(format!(
                    "unsupported {macro_name} property, expected one of: {}",
                    allowed.join(", ")
                )));
            };
            let ty: Type = meta.value()?.parse()?;
            self.entries.push(((*key).to_string(), ty));
            Ok(())
        })
    }

    fn require(&self, key: &str, span: &syn::Ident) -> syn::Result<&Type> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, ty)| ty)
            .ok_or_else(|| syn::Error::new_spanned(span, format!("missing `{key} = <type>`")))
    }
}

/// Makes a type usable as a Busware payload.
///
/// Expands to:
/// - `#[derive(Clone, Debug, Serialize, Deserialize)]` (only the ones not already present)
/// - A compile-time assertion that the type is `Send + Sync + 'static`
///
/// The serde derives go through `busware::prelude::serde`, so the calling
/// crate needs no direct `serde` dependency.
#[proc_macro_attribute]
pub fn bus_message(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let needs_serde = !has_derive(&input, "Serialize") || !has_derive(&input, "Deserialize");
    let derives = missing_derives(
        &input,
        &[
            ("Clone", quote!(Clone)),
            ("Debug", quote!(Debug)),
            ("Serialize", quote!(::busware::prelude::serde::Serialize)),
            ("Deserialize", quote!(::busware::prelude::serde::Deserialize)),
        ],
    );
    let serde_crate = if needs_serde {
        quote!(#[serde(crate = "::busware::prelude::serde")])
    } else {
        quote!()
    };

    let assert_ident = quote::format_ident!("_AssertBusMessage_{}", name);

    let expanded = quote! {
        #derives
        #serde_crate
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}

/// Implements `busware::prelude::Action` for a marker type.
///
/// ```ignore
/// #[bus_action(goal = u64, feedback = u64, result = String)]
/// pub struct Countdown;
/// ```
///
/// All three of `goal`, `feedback` and `result` are required. `Debug` and
/// `Clone` are derived on the marker when missing.
#[proc_macro_attribute]
pub fn bus_action(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = TypeArgs::default();
    let parser = args.parser(&["goal", "feedback", "result"], "bus_action");
    parse_macro_input!(attr with parser);
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let types = args.require("goal", name).and_then(|goal| {
        let feedback = args.require("feedback", name)?;
        let result = args.require("result", name)?;
        Ok((goal, feedback, result))
    });
    let (goal, feedback, result) = match types {
        Ok(types) => types,
        Err(e) => return e.to_compile_error().into(),
    };
    let derives = missing_derives(&input, &[("Debug", quote!(Debug)), ("Clone", quote!(Clone))]);

    let expanded = quote! {
        #derives
        #input

        impl #impl_generics ::busware::prelude::Action for #name #ty_generics #where_clause {
            type Goal = #goal;
            type Feedback = #feedback;
            type Result = #result;
        }
    };

    TokenStream::from(expanded)
}

/// Implements `busware::prelude::Service` for a marker type.
///
/// ```ignore
/// #[bus_service(request = (i64, i64), response = i64)]
/// pub struct Add;
/// ```
///
/// Both `request` and `response` are required.
#[proc_macro_attribute]
pub fn bus_service(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = TypeArgs::default();
    let parser = args.parser(&["request", "response"], "bus_service");
    parse_macro_input!(attr with parser);
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let types = args.require("request", name).and_then(|request| {
        let response = args.require("response", name)?;
        Ok((request, response))
    });
    let (request, response) = match types {
        Ok(types) => types,
        Err(e) => return e.to_compile_error().into(),
    };
    let derives = missing_derives(&input, &[("Debug", quote!(Debug)), ("Clone", quote!(Clone))]);

    let expanded = quote! {
        #derives
        #input

        impl #impl_generics ::busware::prelude::Service for #name #ty_generics #where_clause {
            type Request = #request;
            type Response = #response;
        }
    };

    TokenStream::from(expanded)
}
