//! Test utilities and global setup
//!
//! Provides centralized test logging configuration and frame helpers shared
//! by the server and framing tests.

use crate::lsp::framing::FrameReader;

/// Test logging utilities
#[cfg(all(test, feature = "test-logging"))]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// Respects RUST_LOG, defaulting to debug for this crate. Output goes
    /// through the test writer so it is captured per test.
    ///
    /// ```bash
    /// RUST_LOG=trace cargo test --features test-logging
    /// ```
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug,tokio=info"));

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer()
                .with_target(true)
                .compact()
                .try_init()
                .ok(); // Ignore errors if already initialized by another test
        });
    }
}

/// Wrap `body` in a Content-Length frame
pub fn frame(body: &str) -> String {
    format!("Content-Length: {}\r\n\r\n{}", body.len(), body)
}

/// Split a byte stream of frames back into bodies
pub async fn read_frames(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut reader = FrameReader::new(bytes);
    let mut bodies = Vec::new();

    while let Some(message) = reader
        .read_message()
        .await
        .expect("output stream holds well-formed frames")
    {
        bodies.push(message.content().to_vec());
    }

    bodies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_helpers_agree() {
        let stream = format!("{}{}", frame(r#"{"a":1}"#), frame("{}"));
        let bodies = read_frames(stream.as_bytes()).await;
        assert_eq!(bodies, vec![br#"{"a":1}"#.to_vec(), b"{}".to_vec()]);
    }
}
