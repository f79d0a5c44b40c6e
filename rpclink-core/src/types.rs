//! Wire envelope shared by requests, notifications and responses
//!
//! Every message on a link is one [`Envelope`]. Which kind it is follows from
//! two fields:
//!
//! | method | id | kind |
//! |---|---|---|
//! | non-empty | present | request |
//! | non-empty | absent | notification |
//! | empty | present | response |
//! | empty | absent | malformed |
//!
//! A single struct (rather than one type per kind) keeps inbound decoding to
//! one pass and lets envelope buffers be recycled through a
//! [`MessagePool`](crate::pool::MessagePool).
//!
//! # Examples
//!
//! ```rust
//! use rpclink_core::{Envelope, EnvelopeKind};
//! use serde_json::json;
//!
//! let req = Envelope::request("Math.Add", Some(json!({"a": 2, "b": 3})), 7);
//! assert_eq!(req.kind(), EnvelopeKind::Request(7));
//!
//! let json = serde_json::to_string(&req).unwrap();
//! assert!(json.contains("\"method\":\"Math.Add\""));
//! ```

use crate::error::RpcError;
use crate::pool::Recycle;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Protocol version stamped on outgoing envelopes
pub const JSONRPC_VERSION: &str = "2.0";

/// Classification of an envelope, derived from `method` and `id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Call expecting exactly one response with this id
    Request(u64),
    /// One-way call; no response is ever produced
    Notification,
    /// Answer to an earlier request with this id
    Response(u64),
    /// Neither method nor id
    Malformed,
}

/// One wire-level message
///
/// Inbound envelopes may omit `jsonrpc`; outgoing envelopes always carry
/// `"jsonrpc": "2.0"`. On a response an absent id is written as `null`, on a
/// request or notification it is left out entirely.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    /// Method path for requests and notifications, empty for responses
    #[serde(default)]
    pub method: String,
    /// Call parameters
    #[serde(default)]
    pub params: Option<Value>,
    /// Correlation id
    #[serde(default)]
    pub id: Option<u64>,
    /// Successful result
    #[serde(default)]
    pub result: Option<Value>,
    /// Failure detail
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Envelope {
    /// Build a request envelope
    pub fn request(method: impl Into<String>, params: Option<Value>, id: u64) -> Self {
        Self {
            method: method.into(),
            params,
            id: Some(id),
            ..Default::default()
        }
    }

    /// Build a notification envelope (no id)
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            ..Default::default()
        }
    }

    /// Build a success response
    ///
    /// A `None` result is written as `"result": null` so the response still
    /// has exactly one of `result`/`error`.
    pub fn success(id: Option<u64>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            ..Default::default()
        }
    }

    /// Build a failure response
    pub fn failure(id: Option<u64>, error: RpcError) -> Self {
        Self {
            id,
            error: Some(error),
            ..Default::default()
        }
    }

    /// Classify this envelope
    pub fn kind(&self) -> EnvelopeKind {
        match (self.method.is_empty(), self.id) {
            (false, Some(id)) => EnvelopeKind::Request(id),
            (false, None) => EnvelopeKind::Notification,
            (true, Some(id)) => EnvelopeKind::Response(id),
            (true, None) => EnvelopeKind::Malformed,
        }
    }

    /// True when `method` is empty
    pub fn is_response(&self) -> bool {
        self.method.is_empty()
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let is_response = self.is_response();
        let mut len = 1;
        len += usize::from(!is_response);
        len += usize::from(self.params.is_some());
        len += usize::from(self.id.is_some() || is_response);
        len += usize::from(is_response && (self.result.is_some() || self.error.is_none()));
        len += usize::from(self.error.is_some());

        let mut state = serializer.serialize_struct("Envelope", len)?;
        state.serialize_field("jsonrpc", JSONRPC_VERSION)?;
        if !is_response {
            state.serialize_field("method", &self.method)?;
        }
        if let Some(params) = &self.params {
            state.serialize_field("params", params)?;
        }
        if self.id.is_some() || is_response {
            state.serialize_field("id", &self.id)?;
        }
        if let Some(error) = &self.error {
            state.serialize_field("error", error)?;
        } else if is_response {
            state.serialize_field("result", self.result.as_ref().unwrap_or(&Value::Null))?;
        }
        state.end()
    }
}

impl Recycle for Envelope {
    fn recycle(&mut self) {
        // Keep the method buffer's capacity, drop everything else.
        self.method.clear();
        self.params = None;
        self.id = None;
        self.result = None;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind() {
        assert_eq!(Envelope::request("a", None, 1).kind(), EnvelopeKind::Request(1));
        assert_eq!(Envelope::notification("a", None).kind(), EnvelopeKind::Notification);
        assert_eq!(Envelope::success(Some(2), json!(1)).kind(), EnvelopeKind::Response(2));
        assert_eq!(Envelope::default().kind(), EnvelopeKind::Malformed);
    }

    #[test]
    fn test_notification_has_no_id() {
        let json = serde_json::to_value(Envelope::notification("ping", None)).unwrap();
        assert_eq!(json, json!({"jsonrpc": "2.0", "method": "ping"}));
    }

    #[test]
    fn test_failure_without_id_writes_null_id() {
        let json = serde_json::to_value(Envelope::failure(None, RpcError::invalid_request())).unwrap();
        assert_eq!(
            json,
            json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32600, "message": "Invalid Request"}
            })
        );
    }

    #[test]
    fn test_success_with_null_result_keeps_result_field() {
        let json = serde_json::to_value(Envelope::success(Some(3), Value::Null)).unwrap();
        assert_eq!(json, json!({"jsonrpc": "2.0", "id": 3, "result": null}));
    }

    #[test]
    fn test_success_with_empty_collections() {
        let json = serde_json::to_string(&Envelope::success(Some(1), json!([]))).unwrap();
        assert!(json.contains("\"result\":[]"));
        let json = serde_json::to_string(&Envelope::success(Some(1), json!({}))).unwrap();
        assert!(json.contains("\"result\":{}"));
    }

    #[test]
    fn test_deserialize_without_jsonrpc_field() {
        let env: Envelope =
            serde_json::from_str(r#"{"method":"Math.Add","params":{"a":1},"id":4}"#).unwrap();
        assert_eq!(env.kind(), EnvelopeKind::Request(4));
        assert_eq!(env.params, Some(json!({"a": 1})));
    }

    #[test]
    fn test_deserialize_null_fields_as_absent() {
        let env: Envelope =
            serde_json::from_str(r#"{"method":"","params":null,"id":null,"result":null}"#).unwrap();
        assert_eq!(env.kind(), EnvelopeKind::Malformed);
        assert!(env.params.is_none());
        assert!(env.result.is_none());
    }

    #[test]
    fn test_recycle_clears_every_field() {
        let mut env = Envelope::request("x", Some(json!(1)), 9);
        env.result = Some(json!(2));
        env.error = Some(RpcError::new(1, "e"));
        env.recycle();
        assert_eq!(env, Envelope::default());
    }
}
