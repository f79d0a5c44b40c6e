//! Core types for rpclink
//!
//! rpclink runs JSON-RPC style traffic in both directions over one
//! connection: either side can call the other, send notifications, and
//! answer calls. This crate holds the pieces every other rpclink crate
//! builds on:
//!
//! - **Types**: the [`Envelope`] wire message and its [`EnvelopeKind`]
//! - **Errors**: the local [`Error`] type and the wire-level [`RpcError`]
//! - **Codec**: envelope and payload encoding/decoding
//! - **Pool**: the [`MessagePool`] free list used for inbound envelopes
//! - **Observability**: tracing/OpenTelemetry initialization
//!
//! Nothing here touches a socket; `rpclink-engine` adds sessions, dispatch
//! and transports.
//!
//! # Example
//!
//! ```rust
//! use rpclink_core::{codec, Envelope, EnvelopeKind};
//!
//! let request = Envelope::request("Math.Add", Some(serde_json::json!({"a": 2, "b": 3})), 0);
//! let json = codec::encode(&request).unwrap();
//!
//! let decoded = codec::decode(&json).unwrap();
//! assert_eq!(decoded.kind(), EnvelopeKind::Request(0));
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod pool;
pub mod types;

pub use error::{Error, Result, RpcError};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use pool::{MessagePool, Pooled, Recycle};
pub use types::{Envelope, EnvelopeKind, JSONRPC_VERSION};
