//! Protocol error taxonomy and diagnostic reporting
//!
//! Every per-message failure becomes a [`ProtocolError`]. Errors are reported
//! on a diagnostic stream that is distinct from the protocol stream: the
//! reports carry no request id, so writing them to the client would corrupt
//! the conversation.

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

use crate::lsp::jsonrpc_utils::{diagnostic_error, error_codes};

// ============================================================================
// Error codes
// ============================================================================

/// Closed set of codes the server can surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerNotInitialized,
    ShutdownPending,
    GracefulExit,
    AbruptExit,
}

impl ErrorCode {
    /// Numeric code as written on the diagnostic stream
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::ParseError => error_codes::PARSE_ERROR,
            ErrorCode::InvalidRequest => error_codes::INVALID_REQUEST,
            ErrorCode::MethodNotFound => error_codes::METHOD_NOT_FOUND,
            ErrorCode::InvalidParams => error_codes::INVALID_PARAMS,
            ErrorCode::InternalError => error_codes::INTERNAL_ERROR,
            ErrorCode::ServerNotInitialized => error_codes::SERVER_NOT_INITIALIZED,
            ErrorCode::ShutdownPending => error_codes::SHUTDOWN_PENDING,
            ErrorCode::GracefulExit => error_codes::GRACEFUL_EXIT,
            ErrorCode::AbruptExit => error_codes::ABRUPT_EXIT,
        }
    }
}

/// Map a code to its human-readable text and whether the server must
/// terminate right after reporting it.
pub fn handle_error(code: ErrorCode) -> (&'static str, bool) {
    match code {
        ErrorCode::ParseError => ("Parse error", false),
        ErrorCode::InvalidRequest => ("Invalid request", false),
        ErrorCode::MethodNotFound => ("Method not found", false),
        ErrorCode::InvalidParams => ("Invalid params", false),
        ErrorCode::InternalError => ("Internal error", false),
        ErrorCode::ServerNotInitialized => ("Server not initialized", false),
        ErrorCode::ShutdownPending => ("Shutdown pending, only exit is accepted", false),
        ErrorCode::GracefulExit => ("Exiting after shutdown", false),
        ErrorCode::AbruptExit => ("Exit requested without shutdown", true),
    }
}

// ============================================================================
// Protocol errors
// ============================================================================

/// A failure to process one message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Server not initialized: `{method}` received before `initialize`")]
    ServerNotInitialized { method: String },

    #[error("Shutdown pending: `{method}` ignored, only `exit` is accepted")]
    ShutdownPending { method: String },
}

impl ProtocolError {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse(reason.into())
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    pub fn method_not_found(reason: impl Into<String>) -> Self {
        Self::MethodNotFound(reason.into())
    }

    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::InvalidParams(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    /// The code this error is reported under
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::Parse(_) => ErrorCode::ParseError,
            ProtocolError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ProtocolError::MethodNotFound(_) => ErrorCode::MethodNotFound,
            ProtocolError::InvalidParams(_) => ErrorCode::InvalidParams,
            ProtocolError::Internal(_) => ErrorCode::InternalError,
            ProtocolError::ServerNotInitialized { .. } => ErrorCode::ServerNotInitialized,
            ProtocolError::ShutdownPending { .. } => ErrorCode::ShutdownPending,
        }
    }
}

// ============================================================================
// Diagnostic reporting
// ============================================================================

/// Writes error reports, one JSON object per line, to a diagnostic sink
pub struct ErrorReporter<W> {
    sink: W,
}

impl<W: AsyncWrite + Unpin> ErrorReporter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    #[cfg(test)]
    pub fn sink(&self) -> &W {
        &self.sink
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Report a protocol error. Returns whether the server must terminate.
    pub async fn report(&mut self, err: &ProtocolError) -> std::io::Result<bool> {
        self.report_code(err.code(), &err.to_string()).await
    }

    /// Report a bare code with a detail message.
    ///
    /// Terminal codes are only logged; everything else is serialized and
    /// written to the sink.
    pub async fn report_code(&mut self, code: ErrorCode, detail: &str) -> std::io::Result<bool> {
        let (text, terminal) = handle_error(code);

        if terminal {
            error!(code = code.code(), "{}: {}", text, detail);
            return Ok(true);
        }

        debug!(code = code.code(), "Reporting error: {}", detail);

        let report = diagnostic_error(code.code(), detail);
        let mut line = serde_json::to_vec(&report).map_err(std::io::Error::other)?;
        line.push(b'\n');

        self.sink.write_all(&line).await?;
        self.sink.flush().await?;

        Ok(false)
    }
}
