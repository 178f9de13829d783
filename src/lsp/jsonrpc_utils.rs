//! JSON-RPC 2.0 protocol utilities
//!
//! Provides constants, helper functions, and utilities for working with
//! JSON-RPC 2.0 protocol as per https://www.jsonrpc.org/specification

use crate::lsp::protocol::{DiagnosticError, JsonRpcResponse};
use serde_json::Value;

// ============================================================================
// JSON-RPC 2.0 Constants
// ============================================================================

/// JSON-RPC 2.0 version identifier
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 Error Codes (as per JSON-RPC specification)
/// https://www.jsonrpc.org/specification#error_object
///
/// The lifecycle pseudo-codes at the end are not part of JSON-RPC; they are
/// only ever written to the diagnostic stream.
pub mod error_codes {
    /// Parse error - Invalid JSON was received by the server.
    pub const PARSE_ERROR: i32 = -32700;

    /// Invalid Request - The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;

    /// Method not found - The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;

    /// Invalid params - Invalid method parameter(s).
    pub const INVALID_PARAMS: i32 = -32602;

    /// Internal error - Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;

    /// LSP: a request or notification arrived before `initialize`.
    pub const SERVER_NOT_INITIALIZED: i32 = -32002;

    /// Something other than `exit` arrived after `shutdown`.
    pub const SHUTDOWN_PENDING: i32 = 998;

    /// `exit` after `shutdown`.
    pub const GRACEFUL_EXIT: i32 = 999;

    /// `exit` without a preceding `shutdown`.
    pub const ABRUPT_EXIT: i32 = 1000;
}

// ============================================================================
// JSON-RPC Response Builders
// ============================================================================

/// Create a successful JSON-RPC response
pub fn success_response(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        result,
    }
}

/// Create the id-less error object written to the diagnostic stream
pub fn diagnostic_error(code: i32, message: impl Into<String>) -> DiagnosticError {
    DiagnosticError {
        jsonrpc: JSONRPC_VERSION.to_string(),
        code,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_response_serialization_order() {
        let response = success_response(json!(7), json!({"ok": true}));
        let text = serde_json::to_string(&response).unwrap();
        assert_eq!(text, r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#);
    }

    #[test]
    fn test_diagnostic_error_shape() {
        let err = diagnostic_error(error_codes::INVALID_PARAMS, "missing rootUri");
        let text = serde_json::to_string(&err).unwrap();
        assert_eq!(
            text,
            r#"{"jsonrpc":"2.0","code":-32602,"message":"missing rootUri"}"#
        );
    }
}
