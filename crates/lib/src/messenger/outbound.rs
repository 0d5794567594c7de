//! Outbound Send API payloads.

use serde::Serialize;

/// The `message` object of a Send API call: plain text or a structured attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessagePayload {
    Text { text: String },
    Attachment { attachment: Attachment },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub typ: String,
    pub payload: serde_json::Value,
}

/// A postback button for button templates and the persistent menu.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    pub typ: String,
    pub title: String,
    pub payload: String,
}

impl Button {
    pub fn postback(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            typ: "postback".to_string(),
            title: title.into(),
            payload: payload.into(),
        }
    }
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePayload::Text { text: text.into() }
    }

    /// Button template: a short text with up to three buttons.
    pub fn buttons(text: impl Into<String>, buttons: Vec<Button>) -> Self {
        MessagePayload::Attachment {
            attachment: Attachment {
                typ: "template".to_string(),
                payload: serde_json::json!({
                    "template_type": "button",
                    "text": text.into(),
                    "buttons": buttons,
                }),
            },
        }
    }

    /// Text body, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePayload::Text { text } => Some(text),
            MessagePayload::Attachment { .. } => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Recipient<'a> {
    pub id: &'a str,
}

/// Full Send API request body.
#[derive(Debug, Serialize)]
pub(crate) struct SendRequest<'a> {
    pub recipient: Recipient<'a>,
    pub message: &'a MessagePayload,
    pub messaging_type: &'static str,
}

impl<'a> SendRequest<'a> {
    pub fn response(recipient_id: &'a str, message: &'a MessagePayload) -> Self {
        Self {
            recipient: Recipient { id: recipient_id },
            message,
            messaging_type: "RESPONSE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_request_shape() {
        let msg = MessagePayload::text("hi");
        let body = serde_json::to_value(SendRequest::response("U1", &msg)).unwrap();
        assert_eq!(
            body,
            json!({
                "recipient": { "id": "U1" },
                "message": { "text": "hi" },
                "messaging_type": "RESPONSE"
            })
        );
    }

    #[test]
    fn button_template_shape() {
        let msg = MessagePayload::buttons(
            "What next?",
            vec![Button::postback("Restart this conversation", "RESTART_CONVERSATION")],
        );
        assert_eq!(msg.as_text(), None);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "attachment": {
                    "type": "template",
                    "payload": {
                        "template_type": "button",
                        "text": "What next?",
                        "buttons": [{
                            "type": "postback",
                            "title": "Restart this conversation",
                            "payload": "RESTART_CONVERSATION"
                        }]
                    }
                }
            })
        );
    }
}
