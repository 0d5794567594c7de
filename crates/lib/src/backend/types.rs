//! Request types for the conversational backend.

use serde::Serialize;

/// Admin command toggling automated replies for one customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminCommand {
    /// Suspend automated replies; a human agent is answering.
    Takeover,
    /// Resume automated replies.
    Release,
}

impl AdminCommand {
    /// Path segment under `/admin/conversations/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminCommand::Takeover => "takeover",
            AdminCommand::Release => "release",
        }
    }

    /// Find a command marker in admin echo text. Takeover is checked first, so text
    /// containing both markers is a takeover. Unset or blank markers never match.
    pub fn detect(text: &str, takeover_marker: Option<&str>, release_marker: Option<&str>) -> Option<Self> {
        let hit = |marker: Option<&str>| matches!(marker, Some(m) if !m.is_empty() && text.contains(m));
        if hit(takeover_marker) {
            Some(AdminCommand::Takeover)
        } else if hit(release_marker) {
            Some(AdminCommand::Release)
        } else {
            None
        }
    }
}

impl std::fmt::Display for AdminCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which streaming endpoint a request goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRoute {
    /// No prior thread: start a new session.
    Start,
    /// Continue the given thread.
    Continue(String),
    /// Greeting for a fresh conversation.
    Introduce,
}

/// One session-aware interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub chat_id: String,
    pub message: String,
    pub route: StreamRoute,
    pub intent: Option<String>,
}

impl StreamRequest {
    /// Text turn; continues the user's thread when one is known.
    pub fn message(chat_id: impl Into<String>, message: impl Into<String>, thread_id: Option<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message: message.into(),
            route: thread_id.map_or(StreamRoute::Start, StreamRoute::Continue),
            intent: None,
        }
    }

    /// Introduction turn for a new or restarted conversation.
    pub fn introduce(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message: String::new(),
            route: StreamRoute::Introduce,
            intent: Some("introduce".to_string()),
        }
    }

    pub(crate) fn body(&self) -> StreamBody<'_> {
        StreamBody {
            thread_id: match &self.route {
                StreamRoute::Continue(id) => id,
                StreamRoute::Start | StreamRoute::Introduce => "",
            },
            message: &self.message,
            additional_data: AdditionalData {
                chat_id: &self.chat_id,
                intent: self.intent.as_deref(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StreamBody<'a> {
    pub thread_id: &'a str,
    pub message: &'a str,
    pub additional_data: AdditionalData<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AdditionalData<'a> {
    pub chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<&'a str>,
}
