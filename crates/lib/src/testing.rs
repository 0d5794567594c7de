//! In-process fakes for the backend and the Send API.

use crate::backend::{AdminCommand, Backend, ByteStream, StreamRequest};
use crate::error::RelayError;
use crate::messenger::{MessagePayload, Messenger};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Forward { chat_id: String, user_input: String },
    Admin { chat_id: String, command: AdminCommand },
    Cleaned { chat_id: String, text: String },
    Stream(StreamRequest),
}

/// Records every call; streams replay canned chunks.
#[derive(Default)]
pub struct FakeBackend {
    pub calls: Arc<Mutex<Vec<BackendCall>>>,
    chunks: Vec<String>,
    refuse_status: Option<u16>,
}

impl FakeBackend {
    pub fn with_stream(chunks: Vec<&str>) -> Self {
        Self {
            chunks: chunks.into_iter().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    /// Every call fails with `status`.
    pub fn refusing(status: u16) -> Self {
        Self {
            refuse_status: Some(status),
            ..Self::default()
        }
    }

    fn record(&self, call: BackendCall) -> Result<(), RelayError> {
        self.calls.lock().unwrap().push(call);
        match self.refuse_status {
            Some(status) => Err(RelayError::UpstreamHttp {
                status,
                body: String::new(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn forward_plain(&self, chat_id: &str, user_input: &str) -> Result<(), RelayError> {
        self.record(BackendCall::Forward {
            chat_id: chat_id.to_string(),
            user_input: user_input.to_string(),
        })
    }

    async fn send_admin_command(&self, chat_id: &str, command: AdminCommand) -> Result<(), RelayError> {
        self.record(BackendCall::Admin {
            chat_id: chat_id.to_string(),
            command,
        })
    }

    async fn send_cleaned_message(&self, chat_id: &str, text: &str) -> Result<(), RelayError> {
        self.record(BackendCall::Cleaned {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        })
    }

    async fn stream_interaction(&self, request: &StreamRequest) -> Result<ByteStream, RelayError> {
        self.record(BackendCall::Stream(request.clone()))?;
        let chunks: Vec<Result<Bytes, RelayError>> = self
            .chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.clone())))
            .collect();
        Ok(futures_util::stream::iter(chunks).boxed())
    }
}

/// Records every outbound message.
#[derive(Default)]
pub struct FakeMessenger {
    pub sent: Mutex<Vec<(String, MessagePayload)>>,
}

impl FakeMessenger {
    pub fn texts_to(&self, recipient_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == recipient_id)
            .filter_map(|(_, m)| m.as_text().map(str::to_string))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send(&self, recipient_id: &str, message: MessagePayload) {
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), message));
    }
}
