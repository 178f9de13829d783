//! JSON-RPC wire types and inspection of incoming message bodies
//!
//! Incoming bodies are kept as `serde_json::Value` and inspected field by
//! field, so that each shape problem maps onto the right protocol error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::lsp::error::ProtocolError;
use crate::lsp::jsonrpc_utils::JSONRPC_VERSION;

// ============================================================================
// JSON-RPC Types
// ============================================================================

/// JSON-RPC 2.0 success response.
///
/// Failures are never answered on the protocol stream, so there is no error
/// variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier (matches the request)
    pub id: Value,

    /// Result of the request
    pub result: Value,
}

/// Error report written to the diagnostic stream.
///
/// Carries no `id`, which is why it must never reach the protocol stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticError {
    pub jsonrpc: String,
    pub code: i32,
    pub message: String,
}

// ============================================================================
// Incoming message inspection
// ============================================================================

/// Parse a raw body into a JSON value
pub fn parse_body(content: &[u8]) -> Result<Value, ProtocolError> {
    serde_json::from_slice(content).map_err(|e| ProtocolError::parse(e.to_string()))
}

/// Check the top-level shape of a message body.
///
/// The body must be an object. A missing or unexpected `jsonrpc` version is
/// tolerated with a warning.
pub fn check_envelope(body: &Value) -> Result<(), ProtocolError> {
    let Some(object) = body.as_object() else {
        return Err(ProtocolError::invalid_request(
            "message body is not a JSON object",
        ));
    };

    match object.get("jsonrpc") {
        None => warn!("Message does not contain a `jsonrpc` field"),
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        Some(other) => warn!("Unexpected `jsonrpc` version: {}", other),
    }

    Ok(())
}

/// Extract the `method` string of a message
pub fn method_name(body: &Value) -> Result<&str, ProtocolError> {
    match body.get("method") {
        Some(Value::String(method)) => Ok(method),
        Some(_) => Err(ProtocolError::method_not_found("`method` is not a string")),
        None => Err(ProtocolError::method_not_found("`method` field is missing")),
    }
}

/// Extract and validate the `id` of a request that expects a reply.
///
/// The id must be a non-negative JSON number; it is returned untouched so the
/// reply echoes exactly what the client sent.
pub fn request_id(body: &Value) -> Result<Value, ProtocolError> {
    match body.get("id") {
        Some(Value::Number(n)) if n.as_f64().is_some_and(|v| v >= 0.0) => {
            Ok(Value::Number(n.clone()))
        }
        Some(Value::Number(n)) => Err(ProtocolError::invalid_request(format!(
            "`id` must be non-negative, got {n}"
        ))),
        Some(other) => Err(ProtocolError::invalid_request(format!(
            "`id` must be a number, got {other}"
        ))),
        None => Err(ProtocolError::invalid_request("`id` field is missing")),
    }
}

/// Borrow the `params` member of a message, if any
pub fn params(body: &Value) -> Option<&Value> {
    body.get("params")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_parse_body_rejects_malformed_json() {
        let err = parse_body(b"{\"method\": ").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseError);
    }

    #[test]
    fn test_check_envelope_requires_object() {
        let err = check_envelope(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);

        assert!(check_envelope(&json!({"method": "exit"})).is_ok());
        assert!(check_envelope(&json!({"jsonrpc": "1.0", "method": "exit"})).is_ok());
    }

    #[test]
    fn test_method_name() {
        assert_eq!(method_name(&json!({"method": "exit"})).unwrap(), "exit");

        let missing = method_name(&json!({"id": 1})).unwrap_err();
        assert_eq!(missing.code(), ErrorCode::MethodNotFound);

        let wrong_type = method_name(&json!({"method": 5})).unwrap_err();
        assert_eq!(wrong_type.code(), ErrorCode::MethodNotFound);
    }

    #[test]
    fn test_request_id_validation() {
        assert_eq!(request_id(&json!({"id": 3})).unwrap(), json!(3));
        assert_eq!(request_id(&json!({"id": 0})).unwrap(), json!(0));

        for body in [json!({}), json!({"id": "3"}), json!({"id": -1})] {
            let err = request_id(&body).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidRequest, "body: {body}");
        }
    }
}
