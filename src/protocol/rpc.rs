// src/protocol/rpc.rs
//
// JSON-RPC style envelope carried inside RpcCall/RpcResponse PDUs.
//
// Outbound: {"method": "...", "id": N, "params": {...}}
// Inbound:  an object whose "id" must echo the request and whose "result"
//           is an object (or null, treated as an empty object).

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Outbound RPC call envelope.
#[derive(Debug, Serialize)]
pub struct RpcCall<'a> {
    pub method: &'a str,
    pub id: u64,
    pub params: &'a Map<String, Value>,
}

impl RpcCall<'_> {
    /// Serialize to the compact JSON form put on the wire.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::rpc_decode(format!("failed to serialize RPC call: {e}")))
    }
}

/// Decode and validate an RPC response payload against the request id.
///
/// Returns the `result` object; a `null` result becomes an empty map.
pub fn decode_response(payload: &[u8], expected_id: u64) -> Result<Map<String, Value>> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| Error::rpc_decode("response payload is not UTF-8"))?;
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::rpc_decode(format!("response payload is not JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::rpc_decode("response payload is not a JSON object"))?;

    match object.get("id").and_then(Value::as_u64) {
        Some(id) if id == expected_id => {}
        other => {
            return Err(Error::rpc_decode(format!(
                "unexpected response id: {other:?}, expected {expected_id}"
            )))
        }
    }

    match object.get("result") {
        Some(Value::Object(result)) => Ok(result.clone()),
        Some(Value::Null) | None => Ok(Map::new()),
        Some(_) => Err(Error::rpc_decode("result field is not a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_call_serialization() {
        let params = params(json!({"mode": 2}));
        let call = RpcCall {
            method: "app.set_mode",
            id: 7,
            params: &params,
        };
        assert_eq!(
            call.to_json().unwrap(),
            r#"{"method":"app.set_mode","id":7,"params":{"mode":2}}"#
        );
    }

    #[test]
    fn test_decode_response_with_result() {
        let payload = br#"{"id": 3, "result": {"role": 1}}"#;
        let result = decode_response(payload, 3).unwrap();
        assert_eq!(result.get("role"), Some(&json!(1)));
    }

    #[test]
    fn test_decode_response_null_result() {
        assert_eq!(decode_response(br#"{"id": 1, "result": null}"#, 1).unwrap(), Map::new());
        assert_eq!(decode_response(br#"{"id": 1}"#, 1).unwrap(), Map::new());
    }

    #[test]
    fn test_decode_response_id_mismatch() {
        let err = decode_response(br#"{"id": 4, "result": {}}"#, 3).unwrap_err();
        assert!(matches!(err, Error::RpcDecode { .. }));
    }

    #[test]
    fn test_decode_response_scalar_result() {
        let err = decode_response(br#"{"id": 2, "result": 42}"#, 2).unwrap_err();
        assert!(matches!(err, Error::RpcDecode { .. }));
    }

    #[test]
    fn test_decode_response_invalid_json() {
        assert!(decode_response(b"not json", 1).is_err());
        assert!(decode_response(&[0xFF, 0xFE], 1).is_err());
        assert!(decode_response(br#"[1, 2]"#, 1).is_err());
    }
}
