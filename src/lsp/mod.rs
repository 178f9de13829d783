pub mod capabilities;
pub mod document;
pub mod error;
pub mod framing;
pub mod handlers;
pub mod jsonrpc_utils;
pub mod method;
pub mod protocol;
pub mod session;
