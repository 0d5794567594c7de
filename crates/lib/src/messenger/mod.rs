//! Messenger platform: inbound webhook events, the Send API, and page profile setup.

mod client;
mod event;
mod outbound;
mod webhook;

pub use client::{
    Messenger, MessengerClient, GET_STARTED_PAYLOAD, RESTART_PAYLOAD, SHOW_MENU_PAYLOAD,
};
pub use event::{Entry, MessagingEvent, WebhookPayload};
pub(crate) use event::string_or_number;
pub use outbound::{Attachment, Button, MessagePayload};
pub use webhook::{verify_subscription, VerifyQuery};
