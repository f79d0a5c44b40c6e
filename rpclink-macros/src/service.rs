//! `#[service]` implementation
//!
//! Expansion walks the methods of an inherent `impl` block and emits one
//! registration call per exposed method into a generated
//! `impl rpclink_engine::Service`:
//!
//! 1. **Parse**: the block as `syn::ItemImpl`
//! 2. **Classify**: each method as request, notify, subservice or skipped
//! 3. **Strip**: `#[subservice]` markers from the emitted block
//! 4. **Quote**: the original block followed by the `Service` impl
//!
//! # Code Generation Example
//!
//! Input:
//! ```ignore
//! #[service]
//! impl Calculator {
//!     pub async fn add(&self, _link: Link, (a, b): (i64, i64)) -> Result<i64, RpcError> {
//!         Ok(a + b)
//!     }
//! }
//! ```
//!
//! Generated output (abridged):
//! ```ignore
//! impl ::rpclink_engine::Service for Calculator {
//!     fn register(
//!         self: ::std::sync::Arc<Self>,
//!         node: &mut ::rpclink_engine::ServiceBuilder,
//!     ) -> ::rpclink_engine::Result<()> {
//!         {
//!             let service = ::std::sync::Arc::clone(&self);
//!             node.request("Add", move |link: ::rpclink_engine::Link, params: (i64, i64)| {
//!                 let service = ::std::sync::Arc::clone(&service);
//!                 async move { service.add(link, params).await }
//!             })?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::ext::IdentExt;
use syn::{FnArg, ImplItem, ImplItemFn, ItemImpl, ReturnType, Type, Visibility};

const SUBSERVICE: &str = "subservice";

pub fn expand(attr: TokenStream, mut item: ItemImpl) -> syn::Result<TokenStream> {
    if !attr.is_empty() {
        return Err(syn::Error::new(
            Span::call_site(),
            "#[service] does not take arguments",
        ));
    }
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[service] must be placed on an inherent impl block",
        ));
    }

    let mut registrations = Vec::new();
    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };

        if strip_subservice(method) {
            registrations.push(subservice_registration(method)?);
        } else if let Some(registration) = method_registration(method) {
            registrations.push(registration);
        }
    }

    let self_ty = &item.self_ty;
    let (impl_generics, _, where_clause) = item.generics.split_for_impl();

    Ok(quote! {
        #item

        impl #impl_generics ::rpclink_engine::Service for #self_ty #where_clause {
            fn register(
                self: ::std::sync::Arc<Self>,
                node: &mut ::rpclink_engine::ServiceBuilder,
            ) -> ::rpclink_engine::Result<()> {
                #(#registrations)*
                ::std::result::Result::Ok(())
            }
        }
    })
}

/// Remove `#[subservice]` from the method, reporting whether it was there
fn strip_subservice(method: &mut ImplItemFn) -> bool {
    let before = method.attrs.len();
    method
        .attrs
        .retain(|attr| !attr.path().is_ident(SUBSERVICE));
    method.attrs.len() != before
}

fn subservice_registration(method: &ImplItemFn) -> syn::Result<TokenStream> {
    let sig = &method.sig;
    let shape_ok = sig.asyncness.is_none()
        && sig.inputs.len() == 1
        && matches!(sig.inputs.first(), Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none())
        && matches!(sig.output, ReturnType::Type(..));
    if !shape_ok {
        return Err(syn::Error::new_spanned(
            sig,
            "#[subservice] methods must look like `fn name(&self) -> Arc<T>`",
        ));
    }

    let ident = &sig.ident;
    let name = pascal_case(&ident.unraw().to_string());
    Ok(quote! {
        node.subservice(#name, self.#ident())?;
    })
}

/// Registration for an exposed method, `None` when the method is skipped
///
/// Exposed methods are `pub async fn` taking `&self` and exactly two more
/// arguments (the link and the params).
fn method_registration(method: &ImplItemFn) -> Option<TokenStream> {
    let sig = &method.sig;
    if !matches!(method.vis, Visibility::Public(_)) || sig.asyncness.is_none() {
        return None;
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none() => {}
        _ => return None,
    }
    let typed: Vec<_> = inputs
        .map(|arg| match arg {
            FnArg::Typed(pat) => Some(&pat.ty),
            FnArg::Receiver(_) => None,
        })
        .collect::<Option<_>>()?;
    if typed.len() != 2 {
        return None;
    }
    let params_ty = typed[1];

    let ident = &sig.ident;
    let name = pascal_case(&ident.unraw().to_string());
    let register = if returns_unit(&sig.output) {
        quote!(notify)
    } else {
        quote!(request)
    };

    Some(quote! {
        {
            let service = ::std::sync::Arc::clone(&self);
            node.#register(#name, move |link: ::rpclink_engine::Link, params: #params_ty| {
                let service = ::std::sync::Arc::clone(&service);
                async move { service.#ident(link, params).await }
            })?;
        }
    })
}

fn returns_unit(output: &ReturnType) -> bool {
    match output {
        ReturnType::Default => true,
        ReturnType::Type(_, ty) => matches!(&**ty, Type::Tuple(t) if t.elems.is_empty()),
    }
}

/// `add_item` → `AddItem`
pub(crate) fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
