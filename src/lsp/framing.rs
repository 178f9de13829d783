//! LSP message framing layer
//!
//! Handles LSP-specific message framing using Content-Length headers
//! as specified in the Language Server Protocol specification.
//!
//! LSP message framing format:
//! Content-Length: <length>\r\n\r\n<content>
//!
//! On read, any number of header lines may precede the blank `\r\n`
//! separator, but only the last non-blank one is looked at and it must be the
//! `Content-Length` header. Other headers are skipped, not rejected.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::lsp::method::MethodId;
use crate::lsp::protocol::JsonRpcResponse;

/// Error types for LSP framing
#[derive(Debug, thiserror::Error)]
pub enum LspFramingError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid content length header: {0:?}")]
    InvalidContentLength(String),

    #[error("Header line longer than {max} bytes")]
    HeaderLineTooLong { max: usize },

    #[error("Stream ended inside a header block")]
    TruncatedHeader,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Cannot allocate {size} bytes for message body")]
    AllocationFailed { size: usize },

    #[error("Incomplete message: expected {expected} bytes, got {actual}")]
    IncompleteMessage { expected: usize, actual: usize },

    #[error("No message arrived within {0:?}")]
    Timeout(Duration),
}

impl LspFramingError {
    /// Whether the stream can no longer be trusted to be in sync.
    ///
    /// Non-fatal errors consumed exactly one frame's worth of input and the
    /// next read may succeed.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            LspFramingError::InvalidContentLength(_)
                | LspFramingError::MessageTooLarge { .. }
                | LspFramingError::AllocationFailed { .. }
                | LspFramingError::Serialization(_)
        )
    }
}

/// Default maximum message size to prevent memory exhaustion
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Default upper bound for a single header line
pub const DEFAULT_MAX_HEADER_LINE: usize = 8 * 1024;

const CONTENT_LENGTH_PREFIX: &[u8] = b"Content-Length:";

const HEADER_BREAK: &[u8] = b"\r\n";

// ============================================================================
// Messages
// ============================================================================

/// One framed message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    content: Vec<u8>,
    method: MethodId,
}

impl Message {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            method: MethodId::Unknown,
        }
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Method resolved for this message; `Unknown` until classified
    pub fn method(&self) -> MethodId {
        self.method
    }

    pub fn set_method(&mut self, method: MethodId) {
        self.method = method;
    }
}

/// An outgoing frame: header and body always travel together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    header: String,
    body: String,
}

impl Reply {
    pub fn new(body: String) -> Self {
        Self {
            header: format!("Content-Length: {}\r\n\r\n", body.len()),
            body,
        }
    }

    /// Serialize a response once and frame it
    pub fn from_response(response: &JsonRpcResponse) -> Result<Self, serde_json::Error> {
        serde_json::to_string(response).map(Self::new)
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

// ============================================================================
// Content-Length parsing
// ============================================================================

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c')
}

fn trim_leading_ws(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !is_space(*b))
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Parse a `Content-Length: <n>` header line.
///
/// Whitespace is allowed between the colon and the number and after the
/// number (which covers the line ending). Anything else, a missing number or
/// a value of zero makes the header invalid.
pub fn parse_content_length(line: &[u8]) -> Option<usize> {
    let rest = line.strip_prefix(CONTENT_LENGTH_PREFIX)?;
    let rest = trim_leading_ws(rest);

    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }

    if !trim_leading_ws(&rest[digits..]).is_empty() {
        return None;
    }

    // Overflowing values are rejected like any other malformed number.
    let length: usize = std::str::from_utf8(&rest[..digits]).ok()?.parse().ok()?;
    (length > 0).then_some(length)
}

// ============================================================================
// Reader
// ============================================================================

/// Reads Content-Length framed messages from a buffered byte stream
pub struct FrameReader<R> {
    reader: R,
    max_message_size: usize,
    max_header_line: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    #[cfg(test)]
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_HEADER_LINE)
    }

    pub fn with_limits(reader: R, max_message_size: usize, max_header_line: usize) -> Self {
        Self {
            reader,
            max_message_size,
            max_header_line,
        }
    }

    /// Read the next message.
    ///
    /// Returns `Ok(None)` when the stream ends before any header line of a
    /// new frame; blank lines between frames are skipped. A body shorter than
    /// its Content-Length is an error, never retried.
    pub async fn read_message(&mut self) -> Result<Option<Message>, LspFramingError> {
        let Some(header) = self.read_header_block().await? else {
            return Ok(None);
        };

        let content_length = parse_content_length(&header).ok_or_else(|| {
            let shown = String::from_utf8_lossy(&header).trim_end().to_string();
            debug!("Rejecting header line {:?}", shown);
            LspFramingError::InvalidContentLength(shown)
        })?;

        if content_length > self.max_message_size {
            self.discard_body(content_length).await?;
            return Err(LspFramingError::MessageTooLarge {
                size: content_length,
                max: self.max_message_size,
            });
        }

        let mut content = Vec::new();
        if content.try_reserve_exact(content_length).is_err() {
            warn!("Cannot allocate {} bytes for message body", content_length);
            self.discard_body(content_length).await?;
            return Err(LspFramingError::AllocationFailed {
                size: content_length,
            });
        }

        (&mut self.reader)
            .take(content_length as u64)
            .read_to_end(&mut content)
            .await?;

        if content.len() != content_length {
            return Err(LspFramingError::IncompleteMessage {
                expected: content_length,
                actual: content.len(),
            });
        }

        trace!("LspFraming: Parsed complete message ({} bytes)", content_length);
        Ok(Some(Message::new(content)))
    }

    /// Read header lines up to and including the `\r\n` separator and return
    /// the last non-blank one.
    ///
    /// Every line, its ending included, must fit in `max_header_line` bytes.
    async fn read_header_block(&mut self) -> Result<Option<Vec<u8>>, LspFramingError> {
        let mut last_header: Option<Vec<u8>> = None;
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = (&mut self.reader)
                .take(self.max_header_line as u64)
                .read_until(b'\n', &mut line)
                .await?;

            if read == 0 {
                return match last_header {
                    Some(_) => Err(LspFramingError::TruncatedHeader),
                    None => Ok(None),
                };
            }

            // A separator with no header before it is just a blank line
            if line == HEADER_BREAK && last_header.is_some() {
                trace!("LspFraming: Found header break");
                break;
            }

            if !line.ends_with(b"\n") {
                return Err(if line.len() >= self.max_header_line {
                    LspFramingError::HeaderLineTooLong {
                        max: self.max_header_line,
                    }
                } else {
                    LspFramingError::TruncatedHeader
                });
            }

            if trim_leading_ws(&line).is_empty() {
                continue;
            }

            last_header = Some(std::mem::take(&mut line));
        }

        Ok(last_header)
    }

    /// Skip `length` body bytes so the stream stays aligned on frames
    async fn discard_body(&mut self, length: usize) -> Result<(), LspFramingError> {
        let discarded =
            tokio::io::copy(&mut (&mut self.reader).take(length as u64), &mut tokio::io::sink())
                .await?;

        if discarded != length as u64 {
            return Err(LspFramingError::IncompleteMessage {
                expected: length,
                actual: discarded as usize,
            });
        }

        debug!("Discarded oversized message body ({} bytes)", length);
        Ok(())
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Writes framed replies to a byte stream
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write header then body, then flush before returning
    pub async fn write_reply(&mut self, reply: &Reply) -> Result<(), LspFramingError> {
        trace!(
            "LspFraming: Sending framed message ({} bytes content)",
            reply.body().len()
        );

        self.writer.write_all(reply.header().as_bytes()).await?;
        self.writer.write_all(reply.body().as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Serialize and write a response
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> Result<(), LspFramingError> {
        let reply = Reply::from_response(response)?;
        self.write_reply(&reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::jsonrpc_utils::success_response;
    use serde_json::json;
    use std::io::{Seek, SeekFrom, Write};

    fn reader(input: &[u8]) -> FrameReader<&[u8]> {
        FrameReader::new(input)
    }

    #[test]
    fn test_parse_content_length_valid() {
        assert_eq!(parse_content_length(b"Content-Length: 123\r\n"), Some(123));
        assert_eq!(parse_content_length(b"Content-Length:123"), Some(123));
        assert_eq!(parse_content_length(b"Content-Length: \t 7  \r\n"), Some(7));
        assert_eq!(parse_content_length(b"Content-Length: 42\n"), Some(42));
    }

    #[test]
    fn test_parse_content_length_invalid() {
        for header in [
            &b"Invalid-Header: 456\r\n"[..],
            b"",
            b"Content-Length: abc\r\n",
            b"Content-Length: 0\r\n",
            b"Content-Length: -5\r\n",
            b"Content-Length: 12abc\r\n",
            b"Content-Length: 12 3\r\n",
            b"Content-Length:\r\n",
            b"content-length: 5\r\n",
            b" Content-Length: 5\r\n",
            b"Content-Length: 99999999999999999999999999\r\n",
        ] {
            assert_eq!(
                parse_content_length(header),
                None,
                "header {:?}",
                String::from_utf8_lossy(header)
            );
        }
    }

    #[tokio::test]
    async fn test_read_hello_world() {
        let mut frames = reader(b"Content-Length: 13\r\n\r\nHello, World!");
        let message = frames.read_message().await.unwrap().unwrap();
        assert_eq!(message.len(), 13);
        assert_eq!(message.content(), b"Hello, World!");
        assert_eq!(message.method(), MethodId::Unknown);

        assert!(frames.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_from_file() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"Content-Length: 13\r\n\r\nHello, World!").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let file = tokio::fs::File::from_std(file);
        let mut frames = FrameReader::new(tokio::io::BufReader::new(file));

        let message = frames.read_message().await.unwrap().unwrap();
        assert_eq!(message.content(), b"Hello, World!");
    }

    #[tokio::test]
    async fn test_read_multiple_messages() {
        let message1 = r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        let message2 = r#"{"jsonrpc":"2.0","id":2,"method":"shutdown"}"#;
        let combined = format!(
            "Content-Length: {}\r\n\r\n{}Content-Length: {}\r\n\r\n{}",
            message1.len(),
            message1,
            message2.len(),
            message2
        );

        let mut frames = reader(combined.as_bytes());
        let received1 = frames.read_message().await.unwrap().unwrap();
        let received2 = frames.read_message().await.unwrap().unwrap();

        assert_eq!(received1.content(), message1.as_bytes());
        assert_eq!(received2.content(), message2.as_bytes());
    }

    #[tokio::test]
    async fn test_only_last_header_line_counts() {
        let input = b"Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: 2\r\n\r\n{}";
        let message = reader(input).read_message().await.unwrap().unwrap();
        assert_eq!(message.content(), b"{}");

        let input = b"Content-Length: 2\r\nContent-Type: application/json\r\n\r\n{}";
        let err = reader(input).read_message().await.unwrap_err();
        assert!(matches!(err, LspFramingError::InvalidContentLength(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_zero_length_is_invalid() {
        let mut frames = reader(b"Content-Length: 0\r\n\r\n");
        let err = frames.read_message().await.unwrap_err();
        assert!(matches!(err, LspFramingError::InvalidContentLength(_)));
        assert!(frames.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_header_is_invalid() {
        let err = reader(b"Content-Type: application/json\r\n\r\n{}")
            .read_message()
            .await
            .unwrap_err();
        assert!(matches!(err, LspFramingError::InvalidContentLength(_)));
    }

    #[tokio::test]
    async fn test_body_is_binary_safe() {
        let body = [b'{', 0, 0xff, b'\r', b'\n', b'}'];
        let mut input = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        input.extend_from_slice(&body);

        let message = reader(&input).read_message().await.unwrap().unwrap();
        assert_eq!(message.content(), body);
    }

    #[tokio::test]
    async fn test_short_body_is_fatal() {
        let err = reader(b"Content-Length: 20\r\n\r\nshort")
            .read_message()
            .await
            .unwrap_err();
        match err {
            LspFramingError::IncompleteMessage { expected, actual } => {
                assert_eq!(expected, 20);
                assert_eq!(actual, 5);
            }
            other => panic!("Expected IncompleteMessage error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_header_block() {
        for input in [&b"Content-Length: 5\r\n"[..], b"Content-Len"] {
            let err = reader(input).read_message().await.unwrap_err();
            assert!(matches!(err, LspFramingError::TruncatedHeader), "{err:?}");
            assert!(err.is_fatal());
        }
    }

    #[tokio::test]
    async fn test_empty_stream_is_end_of_stream() {
        assert!(reader(b"").read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_long_header_line_is_rejected() {
        let mut input = b"X-Padding: ".to_vec();
        input.extend(std::iter::repeat_n(b'a', 64));
        input.extend_from_slice(b"\r\nContent-Length: 2\r\n\r\n{}");

        let mut frames = FrameReader::with_limits(&input[..], 1024, 32);
        let err = frames.read_message().await.unwrap_err();
        assert!(matches!(err, LspFramingError::HeaderLineTooLong { max: 32 }));

        let mut frames = FrameReader::with_limits(&input[..], 1024, 128);
        let message = frames.read_message().await.unwrap().unwrap();
        assert_eq!(message.content(), b"{}");
    }

    #[tokio::test]
    async fn test_header_line_limit_includes_line_ending() {
        // "X-Pad: " + padding + "\r\n"
        let line = |total: usize| {
            let mut line = b"X-Pad: ".to_vec();
            line.extend(std::iter::repeat_n(b'a', total - 9));
            line.extend_from_slice(b"\r\n");
            assert_eq!(line.len(), total);
            line
        };

        let mut input = line(64);
        input.extend_from_slice(b"Content-Length: 2\r\n\r\n{}");
        let mut frames = FrameReader::with_limits(&input[..], 1024, 64);
        let message = frames.read_message().await.unwrap().unwrap();
        assert_eq!(message.content(), b"{}");

        let mut input = line(65);
        input.extend_from_slice(b"Content-Length: 2\r\n\r\n{}");
        let mut frames = FrameReader::with_limits(&input[..], 1024, 64);
        let err = frames.read_message().await.unwrap_err();
        assert!(matches!(err, LspFramingError::HeaderLineTooLong { max: 64 }), "{err:?}");
    }

    #[tokio::test]
    async fn test_trailing_blank_lines_end_the_stream() {
        for trailer in [&b"\n"[..], b"\r\n", b"\n\n  \r\n", b"\r\n\r\n"] {
            let mut input = b"Content-Length: 2\r\n\r\n{}".to_vec();
            input.extend_from_slice(trailer);

            let mut frames = reader(&input);
            assert!(frames.read_message().await.unwrap().is_some());
            assert!(
                frames.read_message().await.unwrap().is_none(),
                "trailer {trailer:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_blank_lines_before_a_frame_are_skipped() {
        let mut frames = reader(b"\n\nContent-Length: 2\r\n\r\n{}");
        let message = frames.read_message().await.unwrap().unwrap();
        assert_eq!(message.content(), b"{}");
    }

    #[tokio::test]
    async fn test_huge_content_length_does_not_abort() {
        let input = b"Content-Length: 18446744073709551615\r\n\r\n{}";
        let mut frames = FrameReader::with_limits(&input[..], usize::MAX, DEFAULT_MAX_HEADER_LINE);

        let err = frames.read_message().await.unwrap_err();
        assert!(
            matches!(err, LspFramingError::IncompleteMessage { actual: 2, .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_oversized_message_is_skipped() {
        let input = b"Content-Length: 10\r\n\r\n0123456789Content-Length: 2\r\n\r\n{}";
        let mut frames = FrameReader::with_limits(&input[..], 4, DEFAULT_MAX_HEADER_LINE);

        let err = frames.read_message().await.unwrap_err();
        match &err {
            LspFramingError::MessageTooLarge { size, max } => {
                assert_eq!(*size, 10);
                assert_eq!(*max, 4);
            }
            other => panic!("Expected MessageTooLarge error, got: {other:?}"),
        }
        assert!(!err.is_fatal());

        let message = frames.read_message().await.unwrap().unwrap();
        assert_eq!(message.content(), b"{}");
    }

    #[test]
    fn test_reply_pairs_header_and_body() {
        let reply = Reply::new("héllo".to_string());
        assert_eq!(reply.header(), "Content-Length: 6\r\n\r\n");
        assert_eq!(reply.body(), "héllo");
    }

    #[tokio::test]
    async fn test_write_reply_frame() {
        let mut writer = FrameWriter::new(Vec::new());
        let response = success_response(json!(1), json!({}));
        writer.write_response(&response).await.unwrap();

        let body = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        let expected = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        assert_eq!(writer.into_inner(), expected.into_bytes());
    }

    #[tokio::test]
    async fn test_written_frame_reads_back() {
        let body = r#"{"jsonrpc":"2.0","id":3,"result":{"text":"ünïcödé"}}"#;
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_reply(&Reply::new(body.to_string())).await.unwrap();

        let wire = writer.into_inner();
        let message = reader(&wire).read_message().await.unwrap().unwrap();
        assert_eq!(message.len(), body.len());
        assert_eq!(message.content(), body.as_bytes());
    }
}
