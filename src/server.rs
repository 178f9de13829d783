//! Server loop
//!
//! One read, one parse, one dispatch, at most one write; strictly in that
//! order and one message at a time. Each message buffer is owned by the loop
//! iteration that read it and dropped once the message is processed, whatever
//! the outcome.

use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{Level, debug, error, info, warn};

use crate::config::ServerConfig;
use crate::log_lsp_message;
use crate::lsp::error::{ErrorCode, ErrorReporter, ProtocolError};
use crate::lsp::framing::{FrameReader, FrameWriter, LspFramingError, Message};
use crate::lsp::method::classify;
use crate::lsp::protocol;
use crate::lsp::session::{Directive, Effect, ExitKind, LifecyclePhase, Session};

/// Why the read loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The client sent `exit`
    Exited(ExitKind),
    /// The input stream closed between messages
    EndOfStream,
    /// The streams can no longer be used
    TransportFailure,
}

impl SessionOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(self) -> u8 {
        match self {
            SessionOutcome::Exited(ExitKind::Graceful) | SessionOutcome::EndOfStream => 0,
            SessionOutcome::Exited(ExitKind::Abrupt) | SessionOutcome::TransportFailure => 1,
        }
    }
}

/// Single-client server over an input stream, an output stream and a
/// diagnostic stream
pub struct LspServer<R, W, D> {
    config: ServerConfig,
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    reporter: ErrorReporter<D>,
    session: Session,
}

impl<R, W, D> LspServer<R, W, D>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    D: AsyncWrite + Unpin,
{
    pub fn new(config: ServerConfig, input: R, output: W, diagnostics: D) -> Self {
        let reader = FrameReader::with_limits(input, config.max_message_size, config.max_header_line);

        Self {
            config,
            reader,
            writer: FrameWriter::new(output),
            reporter: ErrorReporter::new(diagnostics),
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Tear the server down into its session and output streams
    #[cfg(test)]
    pub fn into_parts(self) -> (Session, W, D) {
        (
            self.session,
            self.writer.into_inner(),
            self.reporter.into_inner(),
        )
    }

    /// Serve until `exit`, end of input or an unrecoverable stream failure
    pub async fn run(&mut self) -> SessionOutcome {
        info!("Server ready and listening for messages");

        loop {
            let message = match self.next_message().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!("Input stream closed");
                    return SessionOutcome::EndOfStream;
                }
                Err(e) => {
                    let fatal = e.is_fatal();
                    let err = framing_error(&e);
                    self.session.record_error(err.clone());
                    self.report(err).await;

                    if fatal {
                        error!("Unrecoverable framing error: {}", e);
                        return SessionOutcome::TransportFailure;
                    }
                    warn!("Dropped malformed frame: {}", e);
                    continue;
                }
            };

            match self.process(message).await {
                Ok(Directive::Continue) => {}
                Ok(Directive::Terminate(kind)) => {
                    info!("Session terminated: {:?}", kind);
                    return SessionOutcome::Exited(kind);
                }
                Err(e) => {
                    error!("Failed to write to the output stream: {}", e);
                    return SessionOutcome::TransportFailure;
                }
            }
        }
    }

    async fn next_message(&mut self) -> Result<Option<Message>, LspFramingError> {
        match self.config.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.reader.read_message())
                .await
                .map_err(|_| LspFramingError::Timeout(limit))?,
            None => self.reader.read_message().await,
        }
    }

    /// Process one message.
    ///
    /// Protocol errors are reported and never escape; only a failure to
    /// write on the output stream is returned.
    pub async fn process(&mut self, mut message: Message) -> Result<Directive, LspFramingError> {
        debug!("Processing message ({} bytes)", message.len());

        let effect = match self.handle(&mut message) {
            Ok(effect) => effect,
            Err(err) => {
                warn!(method = %message.method(), "Message rejected: {}", err);
                self.report(err).await;
                return Ok(Directive::Continue);
            }
        };

        debug!(
            method = %message.method(),
            status = effect.status_code(),
            "Message handled"
        );

        if message.method().expects_reply() != matches!(effect, Effect::Reply(_)) {
            warn!(method = %message.method(), "Reply does not match the kind of method");
        }

        let directive = effect.directive();
        match effect {
            Effect::Reply(response) => {
                let method = message.method().as_str().unwrap_or_default();
                log_lsp_message!(Level::DEBUG, "outgoing", method, response);

                // The session change is already committed; a failed write
                // does not undo it.
                if let Err(e) = self.writer.write_response(&response).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    self.report(ProtocolError::internal(e.to_string())).await;
                }
            }
            Effect::Exit(ExitKind::Abrupt) => {
                self.report_code(ErrorCode::AbruptExit, "`exit` received before `shutdown`")
                    .await;
            }
            Effect::Ack | Effect::ShutdownAck | Effect::Exit(ExitKind::Graceful) => {}
        }

        Ok(directive)
    }

    /// Parse, classify and dispatch
    fn handle(&mut self, message: &mut Message) -> Result<Effect, ProtocolError> {
        let body = protocol::parse_body(message.content())
            .and_then(|body| protocol::check_envelope(&body).map(|_| body));

        let body = match body {
            Ok(body) => body,
            Err(err) => {
                self.session.record_error(err.clone());
                return Err(err);
            }
        };

        let method = match protocol::method_name(&body) {
            Ok(name) => {
                log_lsp_message!(Level::DEBUG, "incoming", name, body);
                classify(name)
            }
            Err(_) if self.session.phase() == LifecyclePhase::ShuttingDown => {
                let err = ProtocolError::ShutdownPending {
                    method: "<none>".to_string(),
                };
                self.session.record_error(err.clone());
                return Err(err);
            }
            Err(err) => {
                self.session.record_error(err.clone());
                return Err(err);
            }
        };
        message.set_method(method);

        self.session.dispatch(method, &body)
    }

    async fn report(&mut self, err: ProtocolError) {
        if let Err(e) = self.reporter.report(&err).await {
            error!("Failed to write diagnostic report for {:?}: {}", err.code(), e);
        }
    }

    async fn report_code(&mut self, code: ErrorCode, detail: &str) {
        if let Err(e) = self.reporter.report_code(code, detail).await {
            error!("Failed to write diagnostic report for {:?}: {}", code, e);
        }
    }
}

/// Protocol error reported for a framing failure. Malformed frames are parse
/// errors; a stream that fails or stalls is an internal error.
fn framing_error(e: &LspFramingError) -> ProtocolError {
    match e {
        LspFramingError::Io(_) | LspFramingError::Timeout(_) => {
            ProtocolError::internal(e.to_string())
        }
        _ => ProtocolError::parse(e.to_string()),
    }
}
