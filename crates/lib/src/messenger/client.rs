//! Messenger Send API and page profile setup via the Graph API.

use crate::config::{self, Config};
use crate::error::RelayError;
use crate::messenger::outbound::{Button, MessagePayload, SendRequest};
use async_trait::async_trait;
use std::time::Duration;

/// Postback payload of the "Get Started" button.
pub const GET_STARTED_PAYLOAD: &str = "GET_STARTED";
/// Postback payload of the persistent-menu restart entry.
pub const RESTART_PAYLOAD: &str = "RESTART_CONVERSATION";
/// Postback payload that asks for the button menu.
pub const SHOW_MENU_PAYLOAD: &str = "SHOW_MENU";

/// Outbound side of the platform. Delivery is best-effort: failures are logged, never returned.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a message to a user.
    async fn send(&self, recipient_id: &str, message: MessagePayload);

    async fn send_text(&self, recipient_id: &str, text: &str) {
        self.send(recipient_id, MessagePayload::text(text)).await
    }
}

/// Graph API client for one page.
#[derive(Clone)]
pub struct MessengerClient {
    graph_base: String,
    access_token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl MessengerClient {
    /// `graph_base` includes the API version, e.g. `https://graph.facebook.com/v19.0`.
    pub fn new(graph_base: impl Into<String>, access_token: Option<String>, timeout: Duration) -> Self {
        Self {
            graph_base: graph_base.into().trim_end_matches('/').to_string(),
            access_token,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Build from config with env overrides applied.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config::resolve_graph_api_base(config),
            config::resolve_page_access_token(config),
            config.messenger.send_timeout(),
        )
    }

    fn token(&self) -> Result<&str, RelayError> {
        self.access_token
            .as_deref()
            .ok_or(RelayError::ConfigurationMissing("PAGE_ACCESS_TOKEN"))
    }

    /// POST me/messages. Returns the failure instead of logging it.
    pub async fn try_send(&self, recipient_id: &str, message: &MessagePayload) -> Result<(), RelayError> {
        let token = self.token()?;
        let url = format!("{}/me/messages", self.graph_base);
        let res = self
            .client
            .post(&url)
            .query(&[("access_token", token)])
            .json(&SendRequest::response(recipient_id, message))
            .timeout(self.timeout)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(RelayError::from_response(res).await);
        }
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        log::debug!("send api: {} {}", status, body);
        Ok(())
    }

    /// Register the "Get Started" button (payload GET_STARTED).
    pub async fn setup_get_started_button(&self) -> Result<(), RelayError> {
        let body = serde_json::json!({
            "get_started": { "payload": GET_STARTED_PAYLOAD }
        });
        self.post_profile(&body).await?;
        log::info!("messenger profile: get started button set");
        Ok(())
    }

    /// Register the persistent menu with a single restart entry.
    pub async fn set_persistent_menu(&self) -> Result<(), RelayError> {
        let body = serde_json::json!({
            "persistent_menu": [{
                "locale": "default",
                "composer_input_disabled": false,
                "call_to_actions": [
                    Button::postback("Restart this conversation", RESTART_PAYLOAD)
                ]
            }]
        });
        self.post_profile(&body).await?;
        log::info!("messenger profile: persistent menu set");
        Ok(())
    }

    async fn post_profile(&self, body: &serde_json::Value) -> Result<(), RelayError> {
        let token = self.token()?;
        let url = format!("{}/me/messenger_profile", self.graph_base);
        let res = self
            .client
            .post(&url)
            .query(&[("access_token", token)])
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(RelayError::from_response(res).await);
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for MessengerClient {
    async fn send(&self, recipient_id: &str, message: MessagePayload) {
        match self.try_send(recipient_id, &message).await {
            Ok(()) => log::info!("send api: delivered message to {}", recipient_id),
            Err(e) => log::error!("send api: message to {} dropped: {}", recipient_id, e),
        }
    }
}
