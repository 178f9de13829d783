//! Method handlers
//!
//! All handlers share the [`Handler`] signature and are looked up through
//! [`handler_for`]. Lifecycle handlers drive the session phase; document
//! handlers keep the [`DocumentStore`](crate::lsp::document::DocumentStore)
//! up to date.

use lsp_types::{
    CompletionList, CompletionParams, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::lsp::capabilities::{negotiate, server_capabilities};
use crate::lsp::document::Document;
use crate::lsp::error::ProtocolError;
use crate::lsp::jsonrpc_utils::success_response;
use crate::lsp::method::MethodId;
use crate::lsp::protocol::{self, params, request_id};
use crate::lsp::session::{Effect, ExitKind, Handler, LifecyclePhase, Session};

/// Dispatch table
pub fn handler_for(method: MethodId) -> Option<Handler> {
    let handler: Handler = match method {
        MethodId::Initialize => initialize,
        MethodId::Initialized => initialized,
        MethodId::Shutdown => shutdown,
        MethodId::Exit => exit,
        MethodId::DidOpen => did_open,
        MethodId::DidChange => did_change,
        MethodId::DidClose => did_close,
        MethodId::Completion => completion,
        MethodId::Unknown => return None,
    };
    Some(handler)
}

fn typed_params<T: DeserializeOwned>(body: &Value) -> Result<T, ProtocolError> {
    let params = params(body).ok_or_else(|| ProtocolError::invalid_params("`params` is missing"))?;
    T::deserialize(params).map_err(|e| ProtocolError::invalid_params(e.to_string()))
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value)
        .map_err(|e| ProtocolError::internal(format!("failed to build reply: {e}")))
}

// ============================================================================
// Lifecycle
// ============================================================================

pub fn initialize(session: &mut Session, body: &Value) -> Result<Effect, ProtocolError> {
    if session.phase() != LifecyclePhase::AwaitingInitialize {
        return Err(ProtocolError::invalid_request("session is already initialized"));
    }

    let id = request_id(body)?;
    let params = params(body).ok_or_else(|| ProtocolError::invalid_params("`params` is missing"))?;
    let client = negotiate(params)?;
    let result = to_result(&server_capabilities())?;

    info!(
        root_uri = %client.root_uri,
        process_id = ?client.process_id,
        "Client initialized"
    );

    session.install_client(client);
    session.set_phase(LifecyclePhase::Initialized);

    Ok(Effect::Reply(success_response(id, result)))
}

pub fn initialized(session: &mut Session, body: &Value) -> Result<Effect, ProtocolError> {
    if !body.is_object() {
        return Err(ProtocolError::invalid_request("message is not an object"));
    }

    debug!("Received initialized notification from client");
    if session.acknowledge_initialized() {
        warn!("Client already sent `initialized`");
    }

    Ok(Effect::Ack)
}

pub fn shutdown(session: &mut Session, _body: &Value) -> Result<Effect, ProtocolError> {
    if session.phase() == LifecyclePhase::ShuttingDown {
        debug!("Shutdown already requested");
    } else {
        info!("Shutdown requested");
        session.set_phase(LifecyclePhase::ShuttingDown);
    }

    Ok(Effect::ShutdownAck)
}

pub fn exit(session: &mut Session, _body: &Value) -> Result<Effect, ProtocolError> {
    let kind = if session.phase() == LifecyclePhase::ShuttingDown {
        info!("Exit requested");
        ExitKind::Graceful
    } else {
        error!("Exit requested without a preceding shutdown");
        ExitKind::Abrupt
    };

    session.set_phase(LifecyclePhase::Terminated);
    Ok(Effect::Exit(kind))
}

// ============================================================================
// Text documents
// ============================================================================

pub fn did_open(session: &mut Session, body: &Value) -> Result<Effect, ProtocolError> {
    let params: DidOpenTextDocumentParams = typed_params(body)?;
    let item = params.text_document;

    if !session.capabilities().supports_doc_sync() {
        debug!("Client opened a document without declaring synchronization support");
    }
    if session.documents().get(&item.uri).is_some() {
        warn!(uri = %item.uri.as_str(), "Document opened twice, replacing it");
    }

    info!(
        uri = %item.uri.as_str(),
        language_id = %item.language_id,
        version = item.version,
        "Document opened"
    );

    session.documents_mut().open(Document::new(
        item.uri,
        item.language_id,
        item.version,
        item.text,
    ));

    debug!(open = session.documents().open_count(), "Open documents");
    Ok(Effect::Ack)
}

pub fn did_change(session: &mut Session, body: &Value) -> Result<Effect, ProtocolError> {
    let params: DidChangeTextDocumentParams = typed_params(body)?;
    let uri = params.text_document.uri;

    let Some(document) = session.documents_mut().get_open_mut(&uri) else {
        return Err(ProtocolError::invalid_params(format!(
            "document {} is not open",
            uri.as_str()
        )));
    };

    if params.text_document.version <= document.version {
        warn!(
            uri = %uri.as_str(),
            "Document version went from {} to {}",
            document.version,
            params.text_document.version
        );
    }

    document.version = params.text_document.version;
    let count = params.content_changes.len();
    for change in params.content_changes {
        document.apply_change(change);
    }

    debug!(
        uri = %uri.as_str(),
        changes = count,
        version = document.version,
        "Document changed"
    );
    Ok(Effect::Ack)
}

pub fn did_close(session: &mut Session, body: &Value) -> Result<Effect, ProtocolError> {
    let params: DidCloseTextDocumentParams = typed_params(body)?;
    let uri = params.text_document.uri;

    if !session.documents_mut().close(&uri) {
        return Err(ProtocolError::invalid_params(format!(
            "document {} is not open",
            uri.as_str()
        )));
    }

    debug!(
        uri = %uri.as_str(),
        open = session.documents().open_count(),
        "Document closed"
    );
    Ok(Effect::Ack)
}

// ============================================================================
// Language features
// ============================================================================

pub fn completion(session: &mut Session, body: &Value) -> Result<Effect, ProtocolError> {
    let id = request_id(body)?;
    let params: CompletionParams = typed_params(body)?;

    if !session.capabilities().supports_completion() {
        debug!("Completion requested by a client without completion support");
    }

    debug!(
        method = protocol::method_name(body).unwrap_or_default(),
        uri = %params.text_document_position.text_document.uri.as_str(),
        line = params.text_document_position.position.line,
        character = params.text_document_position.position.character,
        "Completion requested"
    );

    let list = CompletionList {
        is_incomplete: false,
        items: Vec::new(),
    };

    Ok(Effect::Reply(success_response(id, to_result(&list)?)))
}
