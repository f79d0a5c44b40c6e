//! Hierarchical service registry
//!
//! Methods are grouped into a tree of [`ServiceNode`]s. A dotted path such as
//! `"Files.Meta.Stat"` walks child scopes (`Files`, then `Meta`) and resolves
//! the last segment (`Stat`) against the final scope's methods. Every
//! segment is matched case-insensitively, so `"files.meta.stat"` reaches the
//! same [`MethodDescriptor`].
//!
//! Trees are built once through a [`ServiceBuilder`], normally driven by a
//! type implementing [`Service`] (by hand or via `#[rpclink_macros::service]`),
//! and are immutable afterwards. Name problems are caught while building:
//!
//! - empty names
//! - names containing `.`
//! - two methods, or two child scopes, whose names differ only in case
//!
//! ```rust
//! use rpclink_engine::{Link, ServiceBuilder};
//! use rpclink_core::RpcError;
//!
//! let mut files = ServiceBuilder::new("Files");
//! files
//!     .request("Read", |_l: Link, path: String| async move {
//!         Ok::<_, RpcError>(format!("contents of {path}"))
//!     })
//!     .unwrap();
//!
//! let mut root = ServiceBuilder::new("Root");
//! root.node("Files", files.build()).unwrap();
//! let tree = root.build();
//!
//! assert!(tree.lookup("files.read").is_some());
//! assert!(tree.lookup("Files.Write").is_none());
//! ```

use crate::handler::{notify_fn, request_fn, NotifyHandler, RequestHandler};
use crate::link::Link;
use rpclink_core::{Error, Result, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Whether a method answers calls or only accepts notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Called with an id; produces one response
    Request,
    /// Called without an id; never responds
    Notify,
}

enum Callable {
    Request(Arc<dyn RequestHandler>),
    Notify(Arc<dyn NotifyHandler>),
}

/// One exposed method
///
/// Holds the callable and the declared parameter/result type names. The
/// result type is `None` for notify methods.
pub struct MethodDescriptor {
    name: String,
    params_type: &'static str,
    result_type: Option<&'static str>,
    callable: Callable,
    calls: AtomicU64,
}

impl MethodDescriptor {
    /// Name as registered (original case)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request or notify
    pub fn kind(&self) -> MethodKind {
        match self.callable {
            Callable::Request(_) => MethodKind::Request,
            Callable::Notify(_) => MethodKind::Notify,
        }
    }

    /// True for request methods
    pub fn is_request(&self) -> bool {
        self.kind() == MethodKind::Request
    }

    /// Declared parameter type
    pub fn params_type(&self) -> &'static str {
        self.params_type
    }

    /// Declared result type, `None` for notify methods
    pub fn result_type(&self) -> Option<&'static str> {
        self.result_type
    }

    /// How many times the method has been invoked (informational)
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn request_handler(&self) -> Option<Arc<dyn RequestHandler>> {
        match &self.callable {
            Callable::Request(handler) => Some(Arc::clone(handler)),
            Callable::Notify(_) => None,
        }
    }

    pub(crate) fn notify_handler(&self) -> Option<Arc<dyn NotifyHandler>> {
        match &self.callable {
            Callable::Notify(handler) => Some(Arc::clone(handler)),
            Callable::Request(_) => None,
        }
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("params_type", &self.params_type)
            .field("result_type", &self.result_type)
            .field("calls", &self.calls())
            .finish()
    }
}

/// A named dispatch scope
///
/// Keys of both maps are uppercased names.
#[derive(Debug, Default)]
pub struct ServiceNode {
    name: String,
    methods: HashMap<String, Arc<MethodDescriptor>>,
    services: HashMap<String, ServiceNode>,
}

impl ServiceNode {
    /// An empty tree; every lookup misses
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scope name as registered
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a dotted method path
    pub fn lookup(&self, path: &str) -> Option<Arc<MethodDescriptor>> {
        let mut segments = path.split('.');
        let method = segments.next_back()?;

        let mut node = self;
        for segment in segments {
            node = node.services.get(&fold(segment))?;
        }
        node.methods.get(&fold(method)).cloned()
    }

    /// Method registered directly in this scope
    pub fn method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(&fold(name))
    }

    /// Child scope of this scope
    pub fn service(&self, name: &str) -> Option<&ServiceNode> {
        self.services.get(&fold(name))
    }

    /// Methods registered directly in this scope
    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.methods.values()
    }

    /// Direct child scopes
    pub fn services(&self) -> impl Iterator<Item = &ServiceNode> {
        self.services.values()
    }

    /// True when the scope has neither methods nor children
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.services.is_empty()
    }

    /// Every resolvable dotted path in this tree, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out.sort();
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for method in self.methods.values() {
            out.push(format!("{prefix}{}", method.name));
        }
        for child in self.services.values() {
            child.collect_paths(&format!("{prefix}{}.", child.name), out);
        }
    }

    /// Render the tree, one scope or method per line, sorted by name
    ///
    /// ```text
    /// Calculator
    ///   add(AddArgs) -> i64
    ///   log(String)
    ///   - History
    ///     clear(())
    /// ```
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.name);
        self.describe_into(1, &mut out);
        out
    }

    fn describe_into(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);

        let mut methods: Vec<_> = self.methods.values().collect();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        for method in methods {
            let params = short_type_name(method.params_type);
            let _ = match method.result_type {
                Some(result) => writeln!(
                    out,
                    "{indent}{}({}) -> {}",
                    method.name,
                    params,
                    short_type_name(result)
                ),
                None => writeln!(out, "{indent}{}({})", method.name, params),
            };
        }

        let mut children: Vec<_> = self.services.values().collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        for child in children {
            let _ = writeln!(out, "{indent}- {}", child.name);
            child.describe_into(depth + 1, out);
        }
    }
}

/// Types that expose methods on a link
///
/// Implementations add their methods and child services to the builder.
/// `#[rpclink_macros::service]` generates this for an `impl` block.
pub trait Service: Send + Sync + 'static {
    /// Populate `node` with this service's methods and children
    fn register(self: Arc<Self>, node: &mut ServiceBuilder) -> Result<()>;
}

/// Builder for one [`ServiceNode`]
#[derive(Debug)]
pub struct ServiceBuilder {
    node: ServiceNode,
}

impl ServiceBuilder {
    /// Start an empty scope
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            node: ServiceNode {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Start a scope named after the service type
    pub fn for_service<S: ?Sized>() -> Self {
        Self::new(short_type_name(type_name::<S>()))
    }

    /// Register a typed request method
    ///
    /// The declared parameter and result types are recorded for
    /// [`ServiceNode::describe`].
    pub fn request<P, R, F, Fut>(&mut self, name: &str, func: F) -> Result<&mut Self>
    where
        P: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(Link, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, RpcError>> + Send + 'static,
    {
        self.insert_method(
            name,
            Callable::Request(request_fn(func)),
            type_name::<P>(),
            Some(type_name::<R>()),
        )
    }

    /// Register a typed notify method
    pub fn notify<P, F, Fut>(&mut self, name: &str, func: F) -> Result<&mut Self>
    where
        P: DeserializeOwned + 'static,
        F: Fn(Link, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert_method(name, Callable::Notify(notify_fn(func)), type_name::<P>(), None)
    }

    /// Register a type-erased request handler
    pub fn request_handler(
        &mut self,
        name: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<&mut Self> {
        self.insert_method(
            name,
            Callable::Request(handler),
            type_name::<Value>(),
            Some(type_name::<Value>()),
        )
    }

    /// Register a type-erased notify handler
    pub fn notify_handler(
        &mut self,
        name: &str,
        handler: Arc<dyn NotifyHandler>,
    ) -> Result<&mut Self> {
        self.insert_method(name, Callable::Notify(handler), type_name::<Value>(), None)
    }

    /// Build `service` into a child scope called `name`
    pub fn subservice<S: Service>(&mut self, name: &str, service: Arc<S>) -> Result<&mut Self> {
        let mut child = ServiceBuilder::new(name);
        service.register(&mut child)?;
        self.node(name, child.build())
    }

    /// Attach an already built scope as a child called `name`
    pub fn node(&mut self, name: &str, mut node: ServiceNode) -> Result<&mut Self> {
        let key = self.check_name(name, "service")?;
        if self.node.services.contains_key(&key) {
            return Err(Error::Registration(format!(
                "duplicate service '{}' in '{}'",
                name, self.node.name
            )));
        }
        node.name = name.to_string();
        self.node.services.insert(key, node);
        Ok(self)
    }

    /// Finish the scope
    pub fn build(self) -> ServiceNode {
        self.node
    }

    fn insert_method(
        &mut self,
        name: &str,
        callable: Callable,
        params_type: &'static str,
        result_type: Option<&'static str>,
    ) -> Result<&mut Self> {
        let key = self.check_name(name, "method")?;
        if self.node.methods.contains_key(&key) {
            return Err(Error::Registration(format!(
                "duplicate method '{}' in '{}'",
                name, self.node.name
            )));
        }

        let descriptor = MethodDescriptor {
            name: name.to_string(),
            params_type,
            result_type,
            callable,
            calls: AtomicU64::new(0),
        };
        self.node.methods.insert(key, Arc::new(descriptor));
        Ok(self)
    }

    fn check_name(&self, name: &str, what: &str) -> Result<String> {
        if name.is_empty() {
            return Err(Error::Registration(format!(
                "empty {} name in '{}'",
                what, self.node.name
            )));
        }
        if name.contains('.') {
            return Err(Error::Registration(format!(
                "{} name '{}' must not contain '.'",
                what, name
            )));
        }
        Ok(fold(name))
    }
}

fn fold(name: &str) -> String {
    name.to_uppercase()
}

/// Last path segment of a type name, keeping generic arguments readable
pub(crate) fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment_start = 0;
    for (i, c) in full.char_indices() {
        match c {
            ':' => segment_start = i + 1,
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                out.push_str(&full[segment_start..i]);
                out.push(c);
                segment_start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push_str(&full[segment_start..]);
    out
}
