//! JSON-RPC 2.0 envelope types and validation
//!
//! The bridge never interprets JSON-RPC payloads beyond classifying them as
//! request, notification, or response (§3, §5.1 of the specification). These
//! types exist so the Ingress Handler and Message Router share one
//! definition of "valid envelope" instead of each re-deriving it.

use serde::{Deserialize, Serialize};

/// The literal JSON-RPC version string every envelope must carry.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional additional context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Classification of a validated JSON-RPC envelope.
///
/// The bridge only needs to tell these apart for logging and for the
/// `/mcp/streamable` inbound-and-upgrade mode; it never dispatches on method
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Has `method` and a present `id`.
    Request,
    /// Has `method` and no `id`.
    Notification,
    /// Has `id` and exactly one of `result`/`error`.
    Response,
}

/// Validate a single JSON value against the envelope rules in §3.
///
/// Returns the envelope's [`EnvelopeKind`] on success, or a human-readable
/// reason on failure (used verbatim in `IngressBadRequest` / `FrameParseError`
/// messages).
pub fn validate_envelope(value: &serde_json::Value) -> Result<EnvelopeKind, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "envelope must be a JSON object".to_string())?;

    match obj.get("jsonrpc").and_then(|v| v.as_str()) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => return Err(format!("unsupported jsonrpc version: {other}")),
        None => return Err("missing jsonrpc field".to_string()),
    }

    let has_method = matches!(obj.get("method"), Some(serde_json::Value::String(_)));
    // Any present `id` key — including an explicit JSON `null` — counts,
    // per §3: "the bridge treats any present id as a request".
    let has_id = obj.contains_key("id");
    let has_result = obj.contains_key("result");
    let has_error = obj.contains_key("error");

    if has_method && has_id {
        return Ok(EnvelopeKind::Request);
    }
    if has_method && !has_id {
        return Ok(EnvelopeKind::Notification);
    }
    if !has_method && has_id && (has_result ^ has_error) {
        return Ok(EnvelopeKind::Response);
    }

    Err("envelope matches neither request, notification, nor response shape".to_string())
}

/// Validate a full request/response body per §4.5: either a single envelope
/// object, or a non-empty array whose every element is a valid envelope.
///
/// Returns the normalized list of individual envelope values in submission
/// order, or a rejection reason. A batch with any invalid element is
/// rejected wholesale — no partial admission.
pub fn normalize_body(value: serde_json::Value) -> Result<Vec<serde_json::Value>, String> {
    match value {
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return Err("batch body must be non-empty".to_string());
            }
            for item in &items {
                validate_envelope(item)?;
            }
            Ok(items)
        }
        serde_json::Value::Object(_) => {
            validate_envelope(&value)?;
            Ok(vec![value])
        }
        _ => Err("body must be a JSON object or array".to_string()),
    }
}

/// Re-serialize a validated envelope compactly, suffixed with a single
/// newline, ready to be written to child stdin.
pub fn to_frame_line(value: &serde_json::Value) -> Result<String, serde_json::Error> {
    let mut s = serde_json::to_string(value)?;
    s.push('\n');
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_request_with_numeric_id() {
        let v = json!({"jsonrpc":"2.0","id":1,"method":"ping","params":{}});
        assert_eq!(validate_envelope(&v), Ok(EnvelopeKind::Request));
    }

    #[test]
    fn test_valid_request_with_string_id() {
        let v = json!({"jsonrpc":"2.0","id":"abc","method":"ping"});
        assert_eq!(validate_envelope(&v), Ok(EnvelopeKind::Request));
    }

    #[test]
    fn test_valid_request_with_null_id() {
        let v = json!({"jsonrpc":"2.0","id":null,"method":"ping"});
        assert_eq!(validate_envelope(&v), Ok(EnvelopeKind::Request));
    }

    #[test]
    fn test_valid_notification() {
        let v = json!({"jsonrpc":"2.0","method":"notifications/initialized"});
        assert_eq!(validate_envelope(&v), Ok(EnvelopeKind::Notification));
    }

    #[test]
    fn test_valid_response_with_result() {
        let v = json!({"jsonrpc":"2.0","id":1,"result":{}});
        assert_eq!(validate_envelope(&v), Ok(EnvelopeKind::Response));
    }

    #[test]
    fn test_valid_response_with_error() {
        let v = json!({"jsonrpc":"2.0","id":1,"error":{"code":-1,"message":"x"}});
        assert_eq!(validate_envelope(&v), Ok(EnvelopeKind::Response));
    }

    #[test]
    fn test_rejects_wrong_jsonrpc_version() {
        let v = json!({"jsonrpc":"1.0","id":1,"method":"x"});
        assert!(validate_envelope(&v).is_err());
    }

    #[test]
    fn test_rejects_missing_jsonrpc() {
        let v = json!({"id":1,"method":"x"});
        assert!(validate_envelope(&v).is_err());
    }

    #[test]
    fn test_rejects_non_object() {
        let v = json!("just a string");
        assert!(validate_envelope(&v).is_err());
    }

    #[test]
    fn test_rejects_response_with_both_result_and_error() {
        let v = json!({"jsonrpc":"2.0","id":1,"result":{},"error":{"code":1,"message":"x"}});
        assert!(validate_envelope(&v).is_err());
    }

    #[test]
    fn test_rejects_response_missing_result_and_error() {
        let v = json!({"jsonrpc":"2.0","id":1});
        assert!(validate_envelope(&v).is_err());
    }

    #[test]
    fn test_normalize_single_object() {
        let v = json!({"jsonrpc":"2.0","id":1,"method":"a"});
        let out = normalize_body(v.clone()).unwrap();
        assert_eq!(out, vec![v]);
    }

    #[test]
    fn test_normalize_batch_preserves_order() {
        let v = json!([
            {"jsonrpc":"2.0","id":1,"method":"a"},
            {"jsonrpc":"2.0","id":2,"method":"b"}
        ]);
        let out = normalize_body(v).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["id"], json!(1));
        assert_eq!(out[1]["id"], json!(2));
    }

    #[test]
    fn test_normalize_rejects_empty_batch() {
        let v = json!([]);
        assert!(normalize_body(v).is_err());
    }

    #[test]
    fn test_normalize_rejects_batch_with_one_invalid_element() {
        let v = json!([
            {"jsonrpc":"2.0","id":1,"method":"a"},
            {"jsonrpc":"1.0","id":2,"method":"b"}
        ]);
        assert!(normalize_body(v).is_err());
    }

    #[test]
    fn test_to_frame_line_appends_newline() {
        let v = json!({"jsonrpc":"2.0","id":1,"method":"a"});
        let line = to_frame_line(&v).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
