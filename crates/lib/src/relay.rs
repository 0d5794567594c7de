//! Streaming response relay: reads the backend's SSE stream line by line and forwards each
//! `ai` chunk to the user as soon as it arrives.
//!
//! Per line: skip anything without the `data:` prefix, decode the rest as JSON (malformed
//! chunks are skipped), then emit content, report an error, or ignore. The stream ends when
//! the backend closes the connection; there is no terminator record.

use crate::backend::{Backend, ByteStream, StreamRequest};
use crate::error::RelayError;
use crate::messenger::{string_or_number, Messenger};
use crate::session::SessionStore;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const DATA_PREFIX: &str = "data:";

/// Sent to the user when the backend refuses or cannot be reached.
pub const UNAVAILABLE_REPLY: &str =
    "Sorry, the assistant is unavailable right now. Please try again in a moment.";

#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "type")]
    typ: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    thread_id: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// What one SSE line asks the relay to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// An `ai` record: forward `content` (unless empty); `thread_id` is a session candidate.
    Emit {
        content: String,
        thread_id: Option<String>,
    },
    /// Forward a formatted error message to the user.
    Error(String),
    /// Nothing to do (comment, keep-alive, non-ai record).
    Ignore,
}

/// Classify one line of the event stream.
pub fn parse_line(line: &str) -> Result<Chunk, RelayError> {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(Chunk::Ignore);
    };
    let data = data.strip_prefix(' ').unwrap_or(data).trim_end();
    let record: StreamRecord = serde_json::from_str(data)
        .map_err(|e| RelayError::MalformedStreamChunk(format!("{}: {}", e, data)))?;
    if let (Some(content), Some("ai")) = (record.content, record.typ.as_deref()) {
        return Ok(Chunk::Emit {
            content,
            thread_id: record.thread_id,
        });
    }
    match record.error {
        Some(Value::Null) | None => Ok(Chunk::Ignore),
        Some(Value::String(s)) => Ok(Chunk::Error(s)),
        Some(other) => Ok(Chunk::Error(other.to_string())),
    }
}

/// User-facing text for an error record.
pub fn error_reply(error: &str) -> String {
    format!("Sorry, something went wrong: {}", error)
}

/// Counters for one relayed stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub emitted: usize,
    pub errors: usize,
    pub skipped: usize,
    /// Thread id stored for the user by this stream, if any.
    pub thread_id: Option<String>,
}

/// Runs session-aware interactions and relays the replies.
#[derive(Clone)]
pub struct StreamRelay {
    backend: Arc<dyn Backend>,
    messenger: Arc<dyn Messenger>,
    sessions: Arc<dyn SessionStore>,
}

impl StreamRelay {
    pub fn new(
        backend: Arc<dyn Backend>,
        messenger: Arc<dyn Messenger>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            backend,
            messenger,
            sessions,
        }
    }

    /// Send user text, continuing the user's thread when one is stored.
    pub async fn converse(&self, user_id: &str, text: &str) -> Result<RelayOutcome, RelayError> {
        let thread_id = self.sessions.get(user_id).await;
        self.run(user_id, StreamRequest::message(user_id, text, thread_id))
            .await
    }

    /// Ask the backend for an introduction (new or restarted conversation).
    pub async fn introduce(&self, user_id: &str) -> Result<RelayOutcome, RelayError> {
        self.run(user_id, StreamRequest::introduce(user_id)).await
    }

    /// Open the stream and relay it. If the call fails before any body is read the user gets
    /// a synthesized apology and the error is returned for logging.
    pub async fn run(&self, user_id: &str, request: StreamRequest) -> Result<RelayOutcome, RelayError> {
        let stream = match self.backend.stream_interaction(&request).await {
            Ok(s) => s,
            Err(e) => {
                self.messenger.send_text(user_id, UNAVAILABLE_REPLY).await;
                return Err(e);
            }
        };
        Ok(self.relay(user_id, stream).await)
    }

    /// Consume `stream` until the connection closes.
    pub async fn relay(&self, user_id: &str, mut stream: ByteStream) -> RelayOutcome {
        let mut outcome = RelayOutcome::default();
        let mut latched = false;
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let chunk = match stream.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    log::warn!("relay: stream for {} broke off: {}", user_id, e);
                    break;
                }
                None => break,
            };
            buffer.extend_from_slice(&chunk);
            while let Some(i) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..i).collect();
                buffer.drain(..1);
                let line = String::from_utf8_lossy(&line_bytes);
                self.handle_line(user_id, line.trim_end_matches('\r'), &mut latched, &mut outcome)
                    .await;
            }
        }
        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).to_string();
            self.handle_line(user_id, line.trim_end_matches('\r'), &mut latched, &mut outcome)
                .await;
        }
        log::info!(
            "relay: stream for {} done ({} emitted, {} errors, {} skipped)",
            user_id,
            outcome.emitted,
            outcome.errors,
            outcome.skipped
        );
        outcome
    }

    async fn handle_line(&self, user_id: &str, line: &str, latched: &mut bool, outcome: &mut RelayOutcome) {
        match parse_line(line) {
            Ok(Chunk::Emit { content, thread_id }) => {
                if !*latched {
                    *latched = true;
                    if let Some(id) = thread_id {
                        self.sessions.set(user_id, id.clone()).await;
                        outcome.thread_id = Some(id);
                    }
                }
                if !content.is_empty() {
                    self.messenger.send_text(user_id, &content).await;
                    outcome.emitted += 1;
                }
            }
            Ok(Chunk::Error(e)) => {
                log::warn!("relay: backend reported error for {}: {}", user_id, e);
                self.messenger.send_text(user_id, &error_reply(&e)).await;
                outcome.errors += 1;
            }
            Ok(Chunk::Ignore) => {}
            Err(e) => {
                log::debug!("relay: {}", e);
                outcome.skipped += 1;
            }
        }
    }
}
