//! Method classification
//!
//! Maps a method name onto the closed set of methods the server knows about.

use std::fmt;

/// Known protocol methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodId {
    Initialize,
    Initialized,
    Shutdown,
    Exit,
    DidOpen,
    DidChange,
    DidClose,
    Completion,
    Unknown,
}

impl MethodId {
    /// Every method with a wire name
    pub const KNOWN: [MethodId; 8] = [
        MethodId::Initialize,
        MethodId::Initialized,
        MethodId::Shutdown,
        MethodId::Exit,
        MethodId::DidOpen,
        MethodId::DidChange,
        MethodId::DidClose,
        MethodId::Completion,
    ];

    /// Wire name of the method, `None` for [`MethodId::Unknown`]
    pub fn as_str(self) -> Option<&'static str> {
        let name = match self {
            MethodId::Initialize => "initialize",
            MethodId::Initialized => "initialized",
            MethodId::Shutdown => "shutdown",
            MethodId::Exit => "exit",
            MethodId::DidOpen => "textDocument/didOpen",
            MethodId::DidChange => "textDocument/didChange",
            MethodId::DidClose => "textDocument/didClose",
            MethodId::Completion => "textDocument/completion",
            MethodId::Unknown => return None,
        };
        Some(name)
    }

    /// Whether the method is a request that must be answered with a reply
    pub fn expects_reply(self) -> bool {
        matches!(self, MethodId::Initialize | MethodId::Completion)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("<unknown>"))
    }
}

/// Classify a method name. Unrecognised names, including the empty string,
/// yield [`MethodId::Unknown`].
pub fn classify(method: &str) -> MethodId {
    MethodId::KNOWN
        .into_iter()
        .find(|known| known.as_str() == Some(method))
        .unwrap_or(MethodId::Unknown)
}
