//! Conversational backend client: plain webhook forward, admin conversation endpoints,
//! and the SSE session endpoints.

use crate::backend::types::{AdminCommand, StreamRequest, StreamRoute};
use crate::config::{self, Config};
use crate::error::RelayError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::json;
use std::time::Duration;

/// Response body of a streaming call, chunk by chunk as the connection delivers it.
pub type ByteStream = BoxStream<'static, Result<Bytes, RelayError>>;

/// Outbound calls to the backend. Each call is attempted once; callers log failures.
#[async_trait]
pub trait Backend: Send + Sync {
    /// POST `{chat_id, user_input}` to the fixed webhook URL.
    async fn forward_plain(&self, chat_id: &str, user_input: &str) -> Result<(), RelayError>;

    /// POST `{chat_id}` to `/admin/conversations/{command}`.
    async fn send_admin_command(&self, chat_id: &str, command: AdminCommand) -> Result<(), RelayError>;

    /// POST `{chat_id, text}` to `/admin/conversations/send_message`.
    async fn send_cleaned_message(&self, chat_id: &str, text: &str) -> Result<(), RelayError>;

    /// Open a session stream. Any status other than 200 is an error and the body is not read.
    async fn stream_interaction(&self, request: &StreamRequest) -> Result<ByteStream, RelayError>;
}

/// HTTP implementation of [`Backend`].
#[derive(Clone)]
pub struct BackendClient {
    url_prefix: Option<String>,
    webhook_url: Option<String>,
    admin_api_key: Option<String>,
    start_session_path: String,
    continue_session_path: String,
    introduce_path: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl BackendClient {
    /// Build from config with env overrides applied.
    pub fn from_config(config: &Config) -> Self {
        Self {
            url_prefix: config::resolve_backend_prefix(config),
            webhook_url: config::resolve_backend_webhook_url(config),
            admin_api_key: config::resolve_admin_api_key(config),
            start_session_path: config.backend.start_session_path.clone(),
            continue_session_path: config.backend.continue_session_path.clone(),
            introduce_path: config.backend.introduce_path.clone(),
            timeout: config.backend.timeout(),
            client: reqwest::Client::new(),
        }
    }

    fn prefix(&self) -> Result<&str, RelayError> {
        self.url_prefix
            .as_deref()
            .ok_or(RelayError::ConfigurationMissing("CHATBOT_URL_PREFIX"))
    }

    fn api_key(&self) -> Result<&str, RelayError> {
        self.admin_api_key
            .as_deref()
            .ok_or(RelayError::ConfigurationMissing("ADMIN_API_KEY"))
    }

    fn stream_url(&self, route: &StreamRoute) -> Result<String, RelayError> {
        let path = match route {
            StreamRoute::Start => &self.start_session_path,
            StreamRoute::Continue(_) => &self.continue_session_path,
            StreamRoute::Introduce => &self.introduce_path,
        };
        Ok(format!("{}{}", self.prefix()?, path))
    }

    /// POST to an admin endpoint; only 200 counts as success.
    async fn post_admin(&self, path: &str, body: &serde_json::Value) -> Result<(), RelayError> {
        let url = format!("{}/admin/conversations/{}", self.prefix()?, path);
        let res = self
            .client
            .post(&url)
            .header("api-key", self.api_key()?)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?;
        if res.status() != reqwest::StatusCode::OK {
            return Err(RelayError::from_response(res).await);
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn forward_plain(&self, chat_id: &str, user_input: &str) -> Result<(), RelayError> {
        let url = self
            .webhook_url
            .as_deref()
            .ok_or(RelayError::ConfigurationMissing("CHATBOT_URL_WEBHOOK"))?;
        let body = json!({ "chat_id": chat_id, "user_input": user_input });
        let res = self
            .client
            .post(url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(RelayError::from_response(res).await);
        }
        let text = res.text().await.unwrap_or_default();
        log::info!("backend: chat_id {} forwarded: {}", chat_id, text);
        Ok(())
    }

    async fn send_admin_command(&self, chat_id: &str, command: AdminCommand) -> Result<(), RelayError> {
        self.post_admin(command.as_str(), &json!({ "chat_id": chat_id }))
            .await?;
        log::info!("backend: admin command '{}' sent for chat_id {}", command, chat_id);
        Ok(())
    }

    async fn send_cleaned_message(&self, chat_id: &str, text: &str) -> Result<(), RelayError> {
        self.post_admin("send_message", &json!({ "chat_id": chat_id, "text": text }))
            .await?;
        log::info!("backend: cleaned message sent to chat_id {}", chat_id);
        Ok(())
    }

    async fn stream_interaction(&self, request: &StreamRequest) -> Result<ByteStream, RelayError> {
        let url = self.stream_url(&request.route)?;
        let res = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.body())
            .timeout(self.timeout)
            .send()
            .await?;
        if res.status() != reqwest::StatusCode::OK {
            return Err(RelayError::from_response(res).await);
        }
        log::debug!("backend: stream opened at {} for chat_id {}", url, request.chat_id);
        Ok(res.bytes_stream().map(|r| r.map_err(RelayError::from)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> BackendClient {
        let mut config = Config::default();
        config.backend.url_prefix = Some(server.url());
        config.backend.webhook_url = Some(format!("{}/webhook/chat", server.url()));
        config.backend.admin_api_key = Some("key-1".to_string());
        BackendClient::from_config(&config)
    }

    #[tokio::test]
    async fn forward_plain_posts_chat_id_and_input() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/webhook/chat")
            .match_body(Matcher::Json(json!({ "chat_id": "U1", "user_input": "hello" })))
            .with_status(200)
            .with_body("queued")
            .create_async()
            .await;
        client_for(&server).forward_plain("U1", "hello").await.expect("forward");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn forward_plain_non_2xx_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/webhook/chat")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;
        let err = client_for(&server).forward_plain("U1", "x").await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamHttp { status: 502, .. }));
    }

    #[tokio::test]
    async fn admin_command_uses_api_key_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/admin/conversations/takeover")
            .match_header("api-key", "key-1")
            .match_body(Matcher::Json(json!({ "chat_id": "U2" })))
            .with_status(200)
            .create_async()
            .await;
        client_for(&server)
            .send_admin_command("U2", AdminCommand::Takeover)
            .await
            .expect("admin");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn admin_command_only_200_is_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/admin/conversations/release")
            .with_status(204)
            .create_async()
            .await;
        let err = client_for(&server)
            .send_admin_command("U2", AdminCommand::Release)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UpstreamHttp { status: 204, .. }));
    }

    #[tokio::test]
    async fn cleaned_message_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/admin/conversations/send_message")
            .match_header("api-key", "key-1")
            .match_body(Matcher::Json(json!({ "chat_id": "U2", "text": "please hold" })))
            .with_status(200)
            .create_async()
            .await;
        client_for(&server)
            .send_cleaned_message("U2", "please hold")
            .await
            .expect("send_message");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_settings_are_reported() {
        let client = BackendClient::from_config(&Config::default());
        if std::env::var("CHATBOT_URL_WEBHOOK").is_err() {
            let err = client.forward_plain("U1", "x").await.unwrap_err();
            assert!(matches!(err, RelayError::ConfigurationMissing("CHATBOT_URL_WEBHOOK")));
        }
        if std::env::var("CHATBOT_URL_PREFIX").is_err() {
            let err = client
                .send_admin_command("U1", AdminCommand::Takeover)
                .await
                .unwrap_err();
            assert!(matches!(err, RelayError::ConfigurationMissing("CHATBOT_URL_PREFIX")));
        }
    }

    #[tokio::test]
    async fn stream_routes_by_thread() {
        let mut server = mockito::Server::new_async().await;
        let start = server
            .mock("POST", "/api/v1/start_session")
            .match_header("accept", "text/event-stream")
            .match_body(Matcher::PartialJson(json!({ "thread_id": "", "message": "hi" })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: {\"type\":\"ai\",\"content\":\"a\"}\n\n")
            .create_async()
            .await;
        let cont = server
            .mock("POST", "/api/v1/continue_session")
            .match_body(Matcher::PartialJson(json!({ "thread_id": "T1" })))
            .with_status(200)
            .with_body("data: {}\n\n")
            .create_async()
            .await;

        let client = client_for(&server);
        let mut stream = client
            .stream_interaction(&StreamRequest::message("U1", "hi", None))
            .await
            .expect("start");
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.expect("chunk"));
        }
        assert!(String::from_utf8_lossy(&body).contains("\"content\":\"a\""));

        client
            .stream_interaction(&StreamRequest::message("U1", "again", Some("T1".into())))
            .await
            .expect("continue");
        start.assert_async().await;
        cont.assert_async().await;
    }

    #[tokio::test]
    async fn stream_non_200_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/get_introduce")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let err = match client_for(&server)
            .stream_interaction(&StreamRequest::introduce("U1"))
            .await
        {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, RelayError::UpstreamHttp { status: 500, .. }));
    }
}
