//! Registry owner
//!
//! [`Rpc`] holds the service tree that answers inbound calls and creates
//! links that share it. The tree is swapped as a whole: a new registration
//! is built completely before it replaces the installed tree, and a failed
//! registration leaves the old tree in place. Dispatch tasks take a
//! snapshot (one `Arc` clone) and never observe a half-built tree.
//!
//! ```rust
//! use rpclink_engine::{Link, Rpc, ServiceBuilder};
//! use rpclink_core::RpcError;
//!
//! let mut root = ServiceBuilder::new("Echo");
//! root.request("Say", |_l: Link, s: String| async move { Ok::<_, RpcError>(s) })
//!     .unwrap();
//!
//! let rpc = Rpc::new();
//! rpc.register_node(root.build());
//! assert!(rpc.lookup("say").is_some());
//! ```

use crate::builder::LinkBuilder;
use crate::link::{Link, LinkConfig};
use crate::registry::{MethodDescriptor, Service, ServiceBuilder, ServiceNode};
use crate::transport::Transport;
use rpclink_core::Result;
use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared service registry and link factory
///
/// Cloning is cheap; clones share the registry.
#[derive(Clone, Default)]
pub struct Rpc {
    tree: Arc<RwLock<Arc<ServiceNode>>>,
}

impl Rpc {
    /// Create a registry with an empty tree
    ///
    /// Links attached to an empty registry can still call their peer; every
    /// inbound request is answered with Method not found.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build `service` into a tree and install it
    pub fn register<S: Service>(&self, service: S) -> Result<()> {
        self.register_arc(Arc::new(service))
    }

    /// Like [`Rpc::register`] for a service that is already shared
    pub fn register_arc<S: Service>(&self, service: Arc<S>) -> Result<()> {
        let mut builder = ServiceBuilder::for_service::<S>();
        service.register(&mut builder)?;
        self.register_node(builder.build());
        Ok(())
    }

    /// Install a tree built by hand, replacing the current one
    pub fn register_node(&self, node: ServiceNode) {
        tracing::debug!(tree = %node.describe(), "Registering service tree");
        let node = Arc::new(node);
        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = node;
    }

    /// The currently installed tree
    pub fn snapshot(&self) -> Arc<ServiceNode> {
        Arc::clone(&self.tree.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Resolve a dotted method path against the current tree
    pub fn lookup(&self, path: &str) -> Option<Arc<MethodDescriptor>> {
        self.snapshot().lookup(path)
    }

    /// Render the current tree
    pub fn describe(&self) -> String {
        self.snapshot().describe()
    }

    /// Every resolvable path in the current tree
    pub fn paths(&self) -> Vec<String> {
        self.snapshot().paths()
    }

    /// Create a link with default options over `transport`
    ///
    /// `user_context` is handed back by `Link::user_context`; pass `()` when
    /// there is none.
    pub fn attach<T, U>(&self, transport: T, user_context: U) -> Link
    where
        T: Transport,
        U: Any + Send + Sync,
    {
        let config = LinkConfig {
            user_context: Arc::new(user_context),
            ..Default::default()
        };
        Link::new(self.clone(), transport, config)
    }

    /// Start configuring a link over `transport`
    pub fn link<T: Transport>(&self, transport: T) -> LinkBuilder<T> {
        LinkBuilder::new(self.clone(), transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpclink_core::{Error, RpcError};

    struct Counter;

    impl Service for Counter {
        fn register(self: Arc<Self>, node: &mut ServiceBuilder) -> Result<()> {
            node.request(
                "Get",
                |_l: Link, _: ()| async { Ok::<_, RpcError>(1) },
            )?;
            Ok(())
        }
    }

    struct Broken;

    impl Service for Broken {
        fn register(self: Arc<Self>, node: &mut ServiceBuilder) -> Result<()> {
            node.request(
                "Get",
                |_l: Link, _: ()| async { Ok::<_, RpcError>(1) },
            )?;
            node.request(
                "GET",
                |_l: Link, _: ()| async { Ok::<_, RpcError>(2) },
            )?;
            Ok(())
        }
    }

    #[test]
    fn test_empty_registry() {
        let rpc = Rpc::new();
        assert!(rpc.lookup("anything").is_none());
        assert!(rpc.paths().is_empty());
    }

    #[test]
    fn test_register_names_root_after_type() {
        let rpc = Rpc::new();
        rpc.register(Counter).unwrap();
        assert_eq!(rpc.snapshot().name(), "Counter");
        assert!(rpc.describe().starts_with("Counter\n"));
        assert!(rpc.lookup("get").is_some());
    }

    #[test]
    fn test_failed_register_keeps_previous_tree() {
        let rpc = Rpc::new();
        rpc.register(Counter).unwrap();
        let before = rpc.snapshot();

        assert!(matches!(rpc.register(Broken), Err(Error::Registration(_))));
        assert!(Arc::ptr_eq(&before, &rpc.snapshot()));
    }

    #[test]
    fn test_register_swaps_tree_for_clones() {
        let rpc = Rpc::new();
        let shared = rpc.clone();
        rpc.register(Counter).unwrap();
        assert!(shared.lookup("Get").is_some());

        rpc.register_node(ServiceNode::empty());
        assert!(shared.lookup("Get").is_none());
    }
}
