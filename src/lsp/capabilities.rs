//! Capability negotiation
//!
//! Turns the `params` of an `initialize` request into a compact set of client
//! capability flags, and describes what the server advertises back.
//!
//! `processId` and `rootUri` are validated all-or-nothing: if either check
//! fails the whole negotiation fails. The `synchronization` and `completion`
//! sub-results are best effort and only produce warnings when unusable.

use bitflags::bitflags;
use lsp_types::TextDocumentSyncKind;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::lsp::error::ProtocolError;

bitflags! {
    /// Features the client declared support for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CapabilityFlags: u32 {
        const COMPLETION = 1 << 0;
        const DOC_SYNC = 1 << 1;
        const WILL_SAVE = 1 << 2;
        const DID_SAVE = 1 << 3;
        const WILL_SAVE_WAIT_UNTIL = 1 << 4;
    }
}

/// Document synchronisation kind declared by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncKind {
    #[default]
    None,
    Full,
    Incremental,
}

impl SyncKind {
    /// Parse the wire value of `synchronization.change`.
    ///
    /// Only 0, 1 and 2 are accepted. 3 is reserved and rejected like any
    /// other out-of-range value.
    pub fn from_wire(value: &Value) -> Result<Self, SyncNegotiationError> {
        match value.as_u64() {
            Some(0) => Ok(SyncKind::None),
            Some(1) => Ok(SyncKind::Full),
            Some(2) => Ok(SyncKind::Incremental),
            _ => Err(SyncNegotiationError::InvalidChangeKind(value.clone())),
        }
    }
}

impl From<SyncKind> for TextDocumentSyncKind {
    fn from(kind: SyncKind) -> Self {
        match kind {
            SyncKind::None => TextDocumentSyncKind::NONE,
            SyncKind::Full => TextDocumentSyncKind::FULL,
            SyncKind::Incremental => TextDocumentSyncKind::INCREMENTAL,
        }
    }
}

/// Failure of the synchronisation sub-negotiation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncNegotiationError {
    #[error("`synchronization` is not an object")]
    NotAnObject,

    #[error("`synchronization.change` must be 0, 1 or 2, got {0}")]
    InvalidChangeKind(Value),
}

/// Negotiated client capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientCapabilities {
    pub flags: CapabilityFlags,
    pub sync_kind: SyncKind,
}

impl ClientCapabilities {
    pub fn supports_completion(&self) -> bool {
        self.flags.contains(CapabilityFlags::COMPLETION)
    }

    pub fn supports_doc_sync(&self) -> bool {
        self.flags.contains(CapabilityFlags::DOC_SYNC)
    }
}

/// Everything `initialize` hands over to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedClient {
    /// Client process id; `None` when absent, zero or not a number
    pub process_id: Option<u32>,
    pub root_uri: String,
    pub capabilities: ClientCapabilities,
}

// ============================================================================
// Negotiation
// ============================================================================

/// Negotiate client capabilities from `initialize` params
pub fn negotiate(params: &Value) -> Result<NegotiatedClient, ProtocolError> {
    if !params.is_object() {
        return Err(ProtocolError::invalid_params("`params` is not an object"));
    }

    let process_id = params
        .get("processId")
        .and_then(Value::as_u64)
        .and_then(|pid| u32::try_from(pid).ok())
        .filter(|pid| *pid != 0);

    let root_uri = match params.get("rootUri") {
        Some(Value::String(uri)) if !uri.is_empty() => uri.clone(),
        Some(Value::String(_)) => {
            return Err(ProtocolError::invalid_params("`rootUri` is empty"));
        }
        Some(_) => {
            return Err(ProtocolError::invalid_params("`rootUri` is not a string"));
        }
        None => return Err(ProtocolError::invalid_params("`rootUri` is missing")),
    };

    let capabilities = params
        .get("capabilities")
        .and_then(|caps| caps.get("textDocument"))
        .map(negotiate_text_document)
        .unwrap_or_else(|| {
            warn!("Client has no text document capabilities");
            ClientCapabilities::default()
        });

    debug!(
        ?process_id,
        root_uri = %root_uri,
        flags = ?capabilities.flags,
        sync_kind = ?capabilities.sync_kind,
        "Negotiated client capabilities"
    );

    Ok(NegotiatedClient {
        process_id,
        root_uri,
        capabilities,
    })
}

fn negotiate_text_document(text_document: &Value) -> ClientCapabilities {
    let mut capabilities = ClientCapabilities::default();

    if !text_document.is_object() {
        warn!("Client text document capabilities are not an object");
        return capabilities;
    }

    match text_document.get("synchronization") {
        Some(sync) => match negotiate_sync(sync) {
            Ok((flags, kind)) => {
                capabilities.flags |= flags;
                capabilities.sync_kind = kind;
            }
            Err(e) => warn!("Synchronization negotiation failed: {}", e),
        },
        None => warn!("Client doesn't have any synchronization capabilities"),
    }

    if text_document.get("completion").is_some_and(Value::is_object) {
        capabilities.flags |= CapabilityFlags::COMPLETION;
    } else {
        warn!("Client has no completion capabilities");
    }

    capabilities
}

/// Negotiate the `synchronization` block as a whole; on failure none of its
/// flags apply.
pub fn negotiate_sync(sync: &Value) -> Result<(CapabilityFlags, SyncKind), SyncNegotiationError> {
    if !sync.is_object() {
        return Err(SyncNegotiationError::NotAnObject);
    }

    let mut flags = CapabilityFlags::DOC_SYNC;
    for (field, flag) in [
        ("willSave", CapabilityFlags::WILL_SAVE),
        ("didSave", CapabilityFlags::DID_SAVE),
        ("willSaveWaitUntil", CapabilityFlags::WILL_SAVE_WAIT_UNTIL),
    ] {
        if sync.get(field).and_then(Value::as_bool).unwrap_or(false) {
            flags |= flag;
        }
    }

    let kind = match sync.get("change") {
        Some(change) => SyncKind::from_wire(change)?,
        None => SyncKind::None,
    };

    Ok((flags, kind))
}

// ============================================================================
// Server advertisement
// ============================================================================

/// `result` of a successful `initialize`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitializeResult {
    pub capabilities: ServerCapabilities,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    pub text_document_sync: TextDocumentSyncAdvertisement,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentSyncAdvertisement {
    pub change: TextDocumentSyncKind,
    pub open_close: bool,
    pub did_save: bool,
}

/// What the server advertises in reply to `initialize`
pub fn server_capabilities() -> InitializeResult {
    InitializeResult {
        capabilities: ServerCapabilities {
            text_document_sync: TextDocumentSyncAdvertisement {
                change: SyncKind::Incremental.into(),
                open_close: true,
                did_save: true,
            },
        },
    }
}
