//! Procedural macros for rpclink
//!
//! # Available Macros
//!
//! ## `#[service]` - Service Registration
//!
//! Turns an inherent `impl` block into an `rpclink_engine::Service`, so the
//! type can be passed to `Rpc::register` or nested with `#[subservice]`.
//!
//! Without the macro, a service registers its methods by hand:
//!
//! ```ignore
//! impl Service for Calculator {
//!     fn register(self: Arc<Self>, node: &mut ServiceBuilder) -> Result<()> {
//!         let this = Arc::clone(&self);
//!         node.request("Add", move |link, args: AddArgs| {
//!             let this = Arc::clone(&this);
//!             async move { this.add(link, args).await }
//!         })?;
//!         Ok(())
//!     }
//! }
//! ```
//!
//! With the macro:
//!
//! ```ignore
//! #[rpclink_macros::service]
//! impl Calculator {
//!     pub async fn add(&self, _link: Link, args: AddArgs) -> Result<i64, RpcError> {
//!         Ok(args.a + args.b)
//!     }
//! }
//! ```
//!
//! The generated code refers to `::rpclink_engine`, so the crate using the
//! macro must depend on `rpclink-engine` directly.

mod service;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemImpl};

/// Generate an `rpclink_engine::Service` impl for an `impl` block
///
/// # Exposed Methods
///
/// A method is exposed when it is `pub async fn`, takes `&self` and exactly
/// two more arguments: the `Link` the call arrived on and the params.
///
/// - A method returning `Result<R, RpcError>` becomes a **request** method
/// - A method returning `()` becomes a **notify** method
///
/// Every other method (private helpers, sync functions, other arities) is
/// left out without complaint.
///
/// Wire names are the method names in PascalCase (`add_item` → `AddItem`);
/// lookups are case-insensitive, so peers may call `"additem"` too.
///
/// # Subservices
///
/// A method marked `#[subservice]` with the shape `fn name(&self) -> Arc<T>`,
/// where `T: Service`, becomes a child scope named after the method:
///
/// ```ignore
/// #[service]
/// impl Root {
///     #[subservice]
///     pub fn files(&self) -> Arc<Files> {
///         Arc::clone(&self.files)
///     }
/// }
/// // peers call "Files.Read", "Files.Write", ...
/// ```
///
/// # Limitations
///
/// - Only inherent impl blocks are accepted
/// - The macro takes no arguments
/// - Generic impls must bound their parameters so that the type is
///   `Send + Sync + 'static`
#[proc_macro_attribute]
pub fn service(attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = parse_macro_input!(item as ItemImpl);
    service::expand(attr.into(), item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
