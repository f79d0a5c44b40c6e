//! rpclink - bidirectional JSON-RPC links
//!
//! This is the convenience crate that re-exports the rpclink sub-crates.
//! Use it when one dependency for the whole toolkit is enough.
//!
//! # Architecture
//!
//! - **rpclink-core**: envelope and error types, codec, message pool,
//!   observability setup
//! - **rpclink-engine**: service registry, `Link` sessions, dispatch,
//!   line and WebSocket transports, metrics
//! - **rpclink-macros**: `#[service]` registration glue
//!
//! # Quick Start
//!
//! Two peers over an in-memory pipe, each calling the other:
//!
//! ```rust
//! use rpclink::{Link, LineTransport, Rpc, RpcError, ServiceBuilder};
//!
//! #[tokio::main]
//! async fn main() -> rpclink::Result<()> {
//!     let server = Rpc::new();
//!     let mut math = ServiceBuilder::new("Math");
//!     math.request("Add", |_link: Link, (a, b): (i64, i64)| async move {
//!         Ok::<_, RpcError>(a + b)
//!     })?;
//!     let mut root = ServiceBuilder::new("Root");
//!     root.node("Math", math.build())?;
//!     server.register_node(root.build());
//!
//!     let (a, b) = tokio::io::duplex(64 * 1024);
//!     let client = Rpc::new().attach(LineTransport::new(a), ());
//!     let service = server.attach(LineTransport::new(b), ());
//!     for link in [client.clone(), service.clone()] {
//!         tokio::spawn(async move { link.run().await });
//!     }
//!
//!     let sum: i64 = client.request("math.add", (2, 3)).await?;
//!     assert_eq!(sum, 5);
//!     Ok(())
//! }
//! ```

pub use rpclink_core as core;
pub use rpclink_engine as engine;

pub use rpclink_core::{
    codec, init_observability, shutdown_observability, Envelope, EnvelopeKind, Error,
    MessagePool, ObservabilityConfig, Result, RpcError,
};
pub use rpclink_engine::{
    LineTransport, Link, LinkBuilder, LinkMetrics, MethodDescriptor, MethodKind, Rpc, Service,
    ServiceBuilder, ServiceNode, Transport, UnknownResponse, WsTransport,
};
pub use rpclink_macros::service;
