/*
 *  Pheme - Discord bot for tallying and rewarding community activity.
 *  Copyright (C) 2025  Manuel de Castro
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

/*
 * The crate doubles as a procedural macro library, so the binary can annotate its command handlers
 * with `#[pheme::log_cmd]`.
 */
extern crate proc_macro;
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use quote::ToTokens as _; // To use function.into_token_stream().
use syn::{parse_macro_input, FnArg, Ident, ItemFn, Pat};

fn error_at<T: syn::spanned::Spanned>(node: &T, message: &str) -> TokenStream {
    darling::Error::from(syn::Error::new(node.span(), message))
        .write_errors()
        .into()
}

/**
 * Logs the invocation of a command handler and, if it returns an error, the failure.
 *
 * The annotated function must be `async`, and its first argument must be the invocation context
 * (anything exposing `invocation_string()` and `author()`, such as a poise `Context` or a chat
 * command `Invocation`). The original body is moved into a nested function, which is awaited
 * between the two log statements, so early `return`s and `?` keep their meaning.
 */
#[proc_macro_attribute]
pub fn log_cmd(_macro_attrs: TokenStream, function: TokenStream) -> TokenStream {
    let mut function = parse_macro_input!(function as ItemFn);

    if function.sig.asyncness.is_none() {
        return error_at(
            &function.sig,
            "[log_cmd] only async command handlers can be annotated",
        );
    }

    // Every argument must be a plain identifier, so it can be forwarded to the nested body:
    let mut arg_idents: Vec<Ident> = Vec::with_capacity(function.sig.inputs.len());
    for arg in &function.sig.inputs {
        let FnArg::Typed(typed) = arg else {
            return error_at(arg, "[log_cmd] `self` argument is not allowed");
        };
        let Pat::Ident(ident) = &*typed.pat else {
            return error_at(&typed.pat, "[log_cmd] expected an identifier");
        };
        arg_idents.push(ident.ident.clone());
    }
    let Some(ctx_ident) = arg_idents.first().cloned() else {
        return error_at(
            &function.sig,
            "[log_cmd] function must have at least one argument",
        );
    };

    // The nested body keeps the original signature, minus attributes and visibility:
    let mut body = function.clone();
    body.attrs.clear();
    body.vis = syn::Visibility::Inherited;
    body.sig.ident = format_ident!("__{}_body", function.sig.ident);
    for arg in body.sig.inputs.iter_mut() {
        if let FnArg::Typed(typed) = arg {
            typed.attrs.clear();
        }
    }
    // The outer function only forwards its arguments, so it never needs them to be `mut`:
    for arg in function.sig.inputs.iter_mut() {
        if let FnArg::Typed(typed) = arg {
            if let Pat::Ident(ident) = &mut *typed.pat {
                ident.mutability = None;
            }
        }
    }
    let body_ident = body.sig.ident.clone();

    let wrapped = quote! {{
        #body

        crate::utils::elog_cmd!(#ctx_ident);
        let result = #body_ident(#(#arg_idents),*).await;
        if let ::std::result::Result::Err(error) = &result {
            crate::utils::elog_cmd_failure!(#ctx_ident, error);
        }
        result
    }};
    function.block = match syn::parse2(wrapped) {
        Ok(block) => Box::new(block),
        Err(error) => return error.to_compile_error().into(),
    };

    function.into_token_stream().into()
}
