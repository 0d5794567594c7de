//! Inbound webhook payload and messaging-event classification.
//!
//! The payload is decoded into typed structs; each messaging event is decoded on its own so
//! one odd event does not hide the rest of the batch. Missing fields mean "not present".

use crate::error::RelayError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Keys every messaging event carries; the first other key names the event kind in logs.
const ENVELOPE_KEYS: [&str; 3] = ["sender", "recipient", "timestamp"];

/// Top-level webhook notification (`object` + entries).
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

impl WebhookPayload {
    /// Only page subscriptions carry conversation events.
    pub fn is_page(&self) -> bool {
        self.object == "page"
    }
}

/// One entry; `messaging` is kept raw and classified per event.
#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub messaging: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Participant {
    #[serde(default, deserialize_with = "string_or_number")]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    sender: Option<Participant>,
    #[serde(default)]
    recipient: Option<Participant>,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    postback: Option<RawPostback>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    is_echo: bool,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPostback {
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Ids are strings, but accept numbers too. Any other shape (or "") decodes as None.
pub(crate) fn string_or_number<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A classified messaging event. Echo is checked before text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingEvent {
    /// A message sent by the page itself, reported back to the webhook.
    Echo {
        /// The customer the page was talking to.
        recipient_id: Option<String>,
        text: String,
    },
    /// A user message with non-empty text.
    Text { sender_id: String, text: String },
    /// A button click.
    Postback {
        sender_id: String,
        payload: String,
        title: Option<String>,
    },
    /// Anything else; `kind` is the first non-envelope key (e.g. "read", "delivery").
    Other { kind: String },
}

impl MessagingEvent {
    /// Classify one raw messaging event. Shape errors map to `UnrecognizedEvent`.
    pub fn from_value(value: &Value) -> Result<Self, RelayError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RelayError::UnrecognizedEvent("messaging event is not an object".to_string()))?;
        let raw = RawEvent::deserialize(value)
            .map_err(|e| RelayError::UnrecognizedEvent(e.to_string()))?;
        let sender_id = raw.sender.and_then(|p| p.id);

        if let Some(ref msg) = raw.message {
            if msg.is_echo {
                return Ok(MessagingEvent::Echo {
                    recipient_id: raw.recipient.and_then(|p| p.id),
                    text: msg.text.clone().unwrap_or_default(),
                });
            }
            if let Some(text) = msg.text.as_deref().filter(|t| !t.is_empty()) {
                let sender_id = sender_id.ok_or_else(|| {
                    RelayError::UnrecognizedEvent("text message without sender id".to_string())
                })?;
                return Ok(MessagingEvent::Text {
                    sender_id,
                    text: text.to_string(),
                });
            }
        }

        if let Some(postback) = raw.postback {
            if let Some(payload) = postback.payload.filter(|p| !p.is_empty()) {
                let sender_id = sender_id.ok_or_else(|| {
                    RelayError::UnrecognizedEvent("postback without sender id".to_string())
                })?;
                return Ok(MessagingEvent::Postback {
                    sender_id,
                    payload,
                    title: postback.title,
                });
            }
        }

        let kind = obj
            .keys()
            .find(|k| !ENVELOPE_KEYS.contains(&k.as_str()))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        Ok(MessagingEvent::Other { kind })
    }
}
