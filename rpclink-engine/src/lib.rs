//! Bidirectional RPC sessions over a single connection
//!
//! Both ends of an rpclink connection are peers: each exposes a tree of
//! methods and each can call the other, concurrently, over the same stream.
//!
//! # Core Features
//!
//! - **Service tree**: methods grouped into nested scopes, resolved by
//!   case-insensitive dotted paths (`"Files.Meta.Stat"`)
//! - **Typed handlers**: async functions taking `(Link, P)` and returning
//!   `Result<R, RpcError>`, with params/results converted through serde
//! - **Correlation**: concurrent outgoing requests matched to their responses
//!   by id, in any order
//! - **Transports**: newline-delimited JSON over any tokio stream, or JSON
//!   text frames over WebSocket
//! - **Observability**: `tracing` spans and logs, optional OpenTelemetry
//!   metrics per link
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rpclink_engine::{LineTransport, Link, Rpc, ServiceBuilder};
//! use rpclink_core::RpcError;
//!
//! #[tokio::main]
//! async fn main() -> rpclink_core::Result<()> {
//!     let mut math = ServiceBuilder::new("Math");
//!     math.request("Add", |_link: Link, (a, b): (i64, i64)| async move {
//!         Ok::<_, RpcError>(a + b)
//!     })?;
//!
//!     let rpc = Rpc::new();
//!     rpc.register_node(math.build());
//!
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:9000").await?;
//!     let link = rpc.attach(LineTransport::new(stream), ());
//!
//!     let runner = link.clone();
//!     tokio::spawn(async move { runner.run().await });
//!
//!     let greeting: String = link.request("Greeter.Hello", "rpclink").await?;
//!     println!("{greeting}");
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Connection loop** (`Link::run`): reads envelopes in order, one task
//! - **Dispatch tasks**: one per inbound request or notification, so slow
//!   handlers never block the reader and responses may leave out of order.
//!   Inbound responses are completed on the loop itself, before the next read
//! - **Writer**: a mutex around the transport's sink; every envelope is
//!   written whole
//!
//! Handlers receive the [`Link`] they were called on and may call back into
//! the peer before answering.

pub mod builder;
mod dispatch;
pub mod handler;
pub mod link;
pub mod metrics;
mod pending;
pub mod registry;
pub mod rpc;
pub mod transport;
pub mod ws;

pub use builder::{LinkBuilder, UnknownResponse};
pub use handler::{
    notify_fn, request_fn, HandlerResult, NotifyHandler, NotifyResult, RequestHandler,
};
pub use link::Link;
pub use metrics::LinkMetrics;
pub use registry::{MethodDescriptor, MethodKind, Service, ServiceBuilder, ServiceNode};
pub use rpc::Rpc;
pub use transport::{
    EnvelopeSink, EnvelopeSource, LineTransport, Transport, DEFAULT_MAX_ENVELOPE_SIZE,
};
pub use ws::WsTransport;

pub use rpclink_core::{Error, Result, RpcError};

#[cfg(test)]
pub(crate) mod testing {
    use crate::{LineTransport, Link, Rpc, Transport};

    /// A transport whose peer is already gone
    pub(crate) fn idle_transport() -> impl Transport {
        let (stream, _peer) = tokio::io::duplex(1024);
        LineTransport::new(stream)
    }

    /// A link nobody is listening to, for exercising handlers directly
    pub(crate) fn detached_link() -> Link {
        Rpc::new().attach(idle_transport(), ())
    }
}
