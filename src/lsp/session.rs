//! Session state machine
//!
//! The session owns the lifecycle phase and everything negotiated during
//! `initialize`. Each message is first checked against the current phase and
//! then routed to its handler:
//!
//! ```text
//! AwaitingInitialize --initialize--> Initialized --shutdown--> ShuttingDown
//!         |                               |                        |
//!         +------------exit (abrupt)------+-----exit (graceful)----+--> Terminated
//! ```
//!
//! `initialize` success moves straight to `Initialized`. The `initialized`
//! notification only flips an acknowledgement flag used to detect repeats;
//! it does not gate any other method.

use serde_json::Value;
use tracing::{debug, warn};

use crate::lsp::capabilities::{ClientCapabilities, NegotiatedClient};
use crate::lsp::document::DocumentStore;
use crate::lsp::error::{ErrorCode, ProtocolError};
use crate::lsp::handlers;
use crate::lsp::method::MethodId;
use crate::lsp::protocol::{self, JsonRpcResponse};

/// Coarse lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    AwaitingInitialize,
    Initialized,
    ShuttingDown,
    Terminated,
}

/// How the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// `exit` after `shutdown`
    Graceful,
    /// `exit` without `shutdown`
    Abrupt,
}

impl ExitKind {
    pub fn code(self) -> ErrorCode {
        match self {
            ExitKind::Graceful => ErrorCode::GracefulExit,
            ExitKind::Abrupt => ErrorCode::AbruptExit,
        }
    }
}

/// What a handler did with an accepted message
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// A reply to send on the protocol stream
    Reply(JsonRpcResponse),
    /// Handled, nothing to send
    Ack,
    /// `shutdown` acknowledged; the session is now shutting down
    ShutdownAck,
    /// `exit` received; the read loop must stop
    Exit(ExitKind),
}

impl Effect {
    /// Status code of the effect: 0 for plain success, otherwise the
    /// lifecycle pseudo-code.
    pub fn status_code(&self) -> i32 {
        match self {
            Effect::Reply(_) | Effect::Ack => 0,
            Effect::ShutdownAck => ErrorCode::ShutdownPending.code(),
            Effect::Exit(kind) => kind.code().code(),
        }
    }

    /// What the read loop should do next
    pub fn directive(&self) -> Directive {
        match self {
            Effect::Exit(kind) => Directive::Terminate(*kind),
            _ => Directive::Continue,
        }
    }
}

/// Control instruction for the read loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Continue,
    Terminate(ExitKind),
}

/// Uniform handler signature used by the dispatch table
pub type Handler = fn(&mut Session, &Value) -> Result<Effect, ProtocolError>;

/// State of the single connected client
#[derive(Debug)]
pub struct Session {
    phase: LifecyclePhase,
    client: Option<NegotiatedClient>,
    initialized_ack: bool,
    documents: DocumentStore,
    last_error: Option<ProtocolError>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: LifecyclePhase::AwaitingInitialize,
            client: None,
            initialized_ack: false,
            documents: DocumentStore::new(),
            last_error: None,
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn capabilities(&self) -> ClientCapabilities {
        self.client
            .as_ref()
            .map(|client| client.capabilities)
            .unwrap_or_default()
    }

    pub fn root_uri(&self) -> Option<&str> {
        self.client.as_ref().map(|client| client.root_uri.as_str())
    }

    pub fn process_id(&self) -> Option<u32> {
        self.client.as_ref().and_then(|client| client.process_id)
    }

    pub fn is_initialized_acknowledged(&self) -> bool {
        self.initialized_ack
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub(crate) fn documents_mut(&mut self) -> &mut DocumentStore {
        &mut self.documents
    }

    /// Most recent error raised while processing a message
    pub fn last_error(&self) -> Option<&ProtocolError> {
        self.last_error.as_ref()
    }

    pub(crate) fn set_phase(&mut self, phase: LifecyclePhase) {
        debug!("Session phase: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Install negotiated client data. Only ever happens once per session.
    pub(crate) fn install_client(&mut self, client: NegotiatedClient) {
        debug_assert!(self.client.is_none(), "client data is set once");
        self.client = Some(client);
    }

    /// Record the `initialized` notification. Returns whether it had already
    /// been recorded.
    pub(crate) fn acknowledge_initialized(&mut self) -> bool {
        std::mem::replace(&mut self.initialized_ack, true)
    }

    /// Check `method` against the lifecycle and run its handler
    pub fn dispatch(&mut self, method: MethodId, body: &Value) -> Result<Effect, ProtocolError> {
        let result = self
            .admit(method, body)
            .and_then(|handler| handler(self, body));

        if let Err(e) = &result {
            self.record_error(e.clone());
        }

        result
    }

    /// Attach an error to the session, replacing the previous one
    pub(crate) fn record_error(&mut self, err: ProtocolError) {
        self.last_error = Some(err);
    }

    /// Lifecycle gate: decide whether `method` may run in the current phase
    fn admit(&self, method: MethodId, body: &Value) -> Result<Handler, ProtocolError> {
        let name = || {
            protocol::method_name(body)
                .map(str::to_string)
                .unwrap_or_else(|_| method.to_string())
        };

        match self.phase {
            LifecyclePhase::Terminated => {
                return Err(ProtocolError::invalid_request(format!(
                    "session terminated, `{}` ignored",
                    name()
                )));
            }
            LifecyclePhase::ShuttingDown
                if !matches!(method, MethodId::Exit | MethodId::Shutdown) =>
            {
                warn!("Ignoring `{}` while shutting down", name());
                return Err(ProtocolError::ShutdownPending { method: name() });
            }
            LifecyclePhase::AwaitingInitialize
                if !matches!(
                    method,
                    MethodId::Initialize | MethodId::Shutdown | MethodId::Exit | MethodId::Unknown
                ) =>
            {
                return Err(ProtocolError::ServerNotInitialized { method: name() });
            }
            _ => {}
        }

        handlers::handler_for(method)
            .ok_or_else(|| ProtocolError::method_not_found(format!("`{}`", name())))
    }
}
