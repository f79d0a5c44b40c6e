//! Error types for rpclink
//!
//! Two kinds of error travel through the crates:
//!
//! - **Error**: local failures (transport, codec, registration, correlation),
//!   built with `thiserror`
//! - **RpcError**: the wire-format error object carried in the `error` field
//!   of a response, and the error type returned by method handlers
//!
//! # Reserved Codes
//!
//! - `-32700`: Parse error
//! - `-32600`: Invalid Request
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//!
//! Handlers may use any other code; the engine forwards them untouched.
//!
//! # Examples
//!
//! ```rust
//! use rpclink_core::{Error, RpcError};
//!
//! let wire = RpcError::method_not_found("Files.Read");
//! assert_eq!(wire.code(), -32601);
//!
//! let local: Error = wire.into();
//! assert!(matches!(local, Error::Rpc(_)));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parse error code
pub const PARSE_ERROR: i64 = -32700;
/// Invalid Request code
pub const INVALID_REQUEST: i64 = -32600;
/// Method not found code
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid params code
pub const INVALID_PARAMS: i64 = -32602;
/// Internal error code
pub const INTERNAL_ERROR: i64 = -32603;

/// Result type for rpclink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Local error type for rpclink operations
///
/// # Error Categories
///
/// - **Remote errors**: `Rpc` holds an error object returned by the peer
/// - **Protocol errors**: InvalidRequest, MethodNotFound, UnknownResponse
/// - **Transport errors**: Io, WebSocket, Decode, EnvelopeTooLarge, ConnectionClosed
/// - **Setup errors**: Registration, Observability, AlreadyRunning
///
/// The type is `Clone` so one failure can be fanned out to every pending
/// request of a link when it shuts down.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Error object returned by the peer in a response
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(#[from] RpcError),

    /// Serialization or deserialization of a payload failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The inbound byte stream does not hold a valid envelope
    #[error("Decode error: {0}")]
    Decode(String),

    /// An inbound envelope exceeded the configured size limit
    #[error("Envelope too large: limit={limit} bytes")]
    EnvelopeTooLarge {
        /// The configured limit in bytes
        limit: usize,
    },

    /// Input/output error from the underlying stream
    #[error("IO error: {0}")]
    Io(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// A handler value could not be turned into a service tree
    #[error("Registration error: {0}")]
    Registration(String),

    /// No method resolves for the given dotted path
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Envelope shape does not match what the method expects
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A response arrived for an id with no pending request
    #[error("Response for unknown request id {0}")]
    UnknownResponse(u64),

    /// Logging or OpenTelemetry setup failed
    #[error("Observability error: {0}")]
    Observability(String),

    /// `Link::run` was called while the link is already running or finished
    #[error("Link is already running")]
    AlreadyRunning,

    /// The link terminated before the operation could complete
    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Map a local error onto the wire error a peer should see
    ///
    /// Remote errors pass through unchanged; everything else becomes one of
    /// the reserved codes.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Error::Rpc(e) => e.clone(),
            Error::Decode(msg) => RpcError::new(PARSE_ERROR, msg.clone()),
            Error::InvalidRequest(msg) => RpcError::new(INVALID_REQUEST, msg.clone()),
            Error::MethodNotFound(path) => RpcError::method_not_found(path),
            Error::Serialization(msg) => RpcError::invalid_params(msg.clone()),
            other => RpcError::internal_error(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Wire-format RPC error
///
/// Appears in the `error` field of a failure response. Handlers return it to
/// signal business failures; the engine sends it back verbatim.
///
/// ```rust
/// use rpclink_core::RpcError;
/// use serde_json::json;
///
/// let err = RpcError::with_data(1001, "Insufficient funds", json!({"balance": 50}));
/// assert_eq!(err.code(), 1001);
/// assert_eq!(err.message(), "Insufficient funds");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    /// Numeric error code
    pub code: i64,
    /// Human-readable error message
    pub message: String,
    /// Optional structured detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Create an error with a code and message
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error carrying additional structured data
    pub fn with_data(code: i64, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700)
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    /// Invalid Request (-32600)
    ///
    /// Sent for envelopes with neither method nor id, and for calls whose
    /// shape (request vs notify) does not match the registered method.
    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request")
    }

    /// Method not found (-32601)
    ///
    /// ```rust
    /// use rpclink_core::RpcError;
    ///
    /// let err = RpcError::method_not_found("Nope.Foo");
    /// assert_eq!(err.message, "Method not found: Nope.Foo");
    /// ```
    pub fn method_not_found(method: impl AsRef<str>) -> Self {
        Self::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", method.as_ref()),
        )
    }

    /// Invalid params (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    /// Internal error (-32603)
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }

    /// Error code
    pub fn code(&self) -> i64 {
        self.code
    }

    /// Error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for codes in the range reserved by JSON-RPC 2.0
    pub fn is_reserved(&self) -> bool {
        (-32768..=-32000).contains(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_constructors() {
        assert_eq!(RpcError::parse_error().code, -32700);
        assert_eq!(RpcError::invalid_request().code, -32600);
        assert_eq!(RpcError::invalid_request().message, "Invalid Request");
        assert_eq!(RpcError::method_not_found("x").code, -32601);
        assert_eq!(RpcError::invalid_params("bad").code, -32602);
        assert_eq!(RpcError::internal_error("boom").code, -32603);
    }

    #[test]
    fn test_is_reserved() {
        assert!(RpcError::invalid_request().is_reserved());
        assert!(!RpcError::new(42, "app").is_reserved());
        assert!(!RpcError::new(-1, "app").is_reserved());
    }

    #[test]
    fn test_error_serialization_skips_missing_data() {
        let json = serde_json::to_string(&RpcError::new(7, "seven")).unwrap();
        assert_eq!(json, r#"{"code":7,"message":"seven"}"#);

        let with_data = RpcError::with_data(7, "seven", serde_json::json!([1]));
        let json = serde_json::to_string(&with_data).unwrap();
        assert!(json.contains("\"data\":[1]"));
    }

    #[test]
    fn test_error_deserializes_without_data() {
        let err: RpcError = serde_json::from_str(r#"{"code":-32601,"message":"nope"}"#).unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.data, None);
    }

    #[test]
    fn test_to_rpc_error_passes_remote_errors_through() {
        let remote = RpcError::new(1234, "custom");
        assert_eq!(Error::Rpc(remote.clone()).to_rpc_error(), remote);
        assert_eq!(
            Error::MethodNotFound("a.b".into()).to_rpc_error().code,
            METHOD_NOT_FOUND
        );
        assert_eq!(Error::ConnectionClosed.to_rpc_error().code, INTERNAL_ERROR);
    }

    #[test]
    fn test_display() {
        let err = Error::Rpc(RpcError::new(-32601, "Method not found"));
        assert_eq!(err.to_string(), "RPC error -32601: Method not found");
        assert_eq!(Error::UnknownResponse(9).to_string(), "Response for unknown request id 9");
    }
}
