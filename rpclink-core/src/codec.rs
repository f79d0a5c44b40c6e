//! Envelope encoding and decoding
//!
//! The link only ever needs two operations from the codec: turn an
//! [`Envelope`] into bytes and turn bytes back into an envelope. Both are thin
//! wrappers over `serde_json` that map failures onto [`Error`] variants:
//!
//! - encode failures → `Error::Serialization`
//! - decode failures → `Error::Decode` (the peer sent something that is not
//!   an envelope; the link treats this as a broken stream)
//!
//! Payload conversion (`params`/`result` ↔ typed Rust values) lives here too,
//! so every crate reports type mismatches the same way.
//!
//! # Examples
//!
//! ```rust
//! use rpclink_core::{codec, Envelope};
//!
//! let line = codec::encode_line(&Envelope::notification("ping", None)).unwrap();
//! assert_eq!(line.last(), Some(&b'\n'));
//!
//! let decoded = codec::decode(std::str::from_utf8(&line).unwrap()).unwrap();
//! assert_eq!(decoded.method, "ping");
//! ```

use crate::error::{Error, Result};
use crate::types::Envelope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Encode an envelope to a JSON string
pub fn encode(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode an envelope as one newline-terminated JSON line
pub fn encode_line(envelope: &Envelope) -> Result<Vec<u8>> {
    let mut buf =
        serde_json::to_vec(envelope).map_err(|e| Error::Serialization(e.to_string()))?;
    buf.push(b'\n');
    Ok(buf)
}

/// Decode one envelope from JSON text
pub fn decode(data: &str) -> Result<Envelope> {
    if data.trim().is_empty() {
        return Err(Error::Decode("empty message".to_string()));
    }
    serde_json::from_str(data).map_err(|e| Error::Decode(e.to_string()))
}

/// Decode one envelope from JSON bytes
pub fn decode_slice(data: &[u8]) -> Result<Envelope> {
    serde_json::from_slice(data).map_err(|e| Error::Decode(e.to_string()))
}

/// Decode JSON text into an existing (pooled) envelope
///
/// On failure `into` is left cleared rather than half-filled.
pub fn decode_into(data: &str, into: &mut Envelope) -> Result<()> {
    match decode(data) {
        Ok(envelope) => {
            *into = envelope;
            Ok(())
        }
        Err(e) => {
            *into = Envelope::default();
            Err(e)
        }
    }
}

/// Convert a typed value into a payload
pub fn to_payload<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))
}

/// Convert a payload into a typed value
///
/// A missing payload is read as `null`, which suits `()` and `Option<_>`.
pub fn from_payload<T: DeserializeOwned>(value: Option<Value>) -> Result<T> {
    serde_json::from_value(value.unwrap_or(Value::Null))
        .map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnvelopeKind;
    use crate::RpcError;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_encode_request_contains_fields() {
        let json = encode(&Envelope::request("Auth.Login", Some(json!({"u": "a"})), 3)).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"Auth.Login\""));
        assert!(json.contains("\"id\":3"));
        assert!(!json.contains("result"));
    }

    #[test]
    fn test_decode_error_response() {
        let env = decode(r#"{"id":2,"error":{"code":-32601,"message":"Method not found"}}"#).unwrap();
        assert_eq!(env.kind(), EnvelopeKind::Response(2));
        assert_eq!(env.error, Some(RpcError::new(-32601, "Method not found")));
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(matches!(decode("{not json"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_empty_string() {
        assert!(matches!(decode("   "), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_negative_id_is_rejected() {
        assert!(decode(r#"{"method":"a","id":-1}"#).is_err());
    }

    #[test]
    fn test_decode_into_clears_on_failure() {
        let mut env = Envelope::request("stale", None, 1);
        assert!(decode_into("[1,2]", &mut env).is_err());
        assert_eq!(env, Envelope::default());

        decode_into(r#"{"method":"fresh"}"#, &mut env).unwrap();
        assert_eq!(env.method, "fresh");
        assert_eq!(env.id, None);
    }

    #[test]
    fn test_payload_conversion() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct AddArgs {
            a: i64,
            b: i64,
        }

        let args: AddArgs = from_payload(Some(json!({"a": 2, "b": 3}))).unwrap();
        assert_eq!(args, AddArgs { a: 2, b: 3 });

        let unit: () = from_payload(None).unwrap();
        assert_eq!(unit, ());

        let missing: Result<AddArgs> = from_payload(None);
        assert!(matches!(missing, Err(Error::Serialization(_))));

        assert_eq!(to_payload(vec![1, 2]).unwrap(), json!([1, 2]));
    }
}
