//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.messenger-relay/config.json`) and environment.
//! Environment variables override file values; blank values count as unset.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Messenger page settings (tokens, Graph API base).
    #[serde(default)]
    pub messenger: MessengerConfig,

    /// Conversational backend endpoints and admin key.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Admin echo markers.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Background task limits.
    #[serde(default)]
    pub tasks: TasksConfig,
}

/// Bind address and port for the webhook server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 8020).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the platform must reach the webhook).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8020
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Messenger page config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessengerConfig {
    /// Shared secret for the GET /webhook subscription handshake. Overridden by VERIFY_TOKEN.
    pub verify_token: Option<String>,
    /// Page access token for the Send API. Overridden by PAGE_ACCESS_TOKEN.
    pub page_access_token: Option<String>,
    /// Page id (informational). Overridden by META_PAGE_ID.
    pub page_id: Option<String>,
    /// Graph API base including version. Overridden by GRAPH_API_BASE.
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
    /// Per-call timeout for Send API calls.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

fn default_send_timeout_secs() -> u64 {
    10
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            verify_token: None,
            page_access_token: None,
            page_id: None,
            graph_api_base: default_graph_api_base(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

/// How plain user text is forwarded to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    /// POST to the fixed webhook URL; the backend answers the user out of band.
    #[default]
    Webhook,
    /// Session-aware SSE call; the relay streams the answer back to the user.
    Stream,
}

impl ForwardMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardMode::Webhook => "webhook",
            ForwardMode::Stream => "stream",
        }
    }
}

impl std::str::FromStr for ForwardMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "webhook" => Ok(ForwardMode::Webhook),
            "stream" => Ok(ForwardMode::Stream),
            other => Err(format!("unknown forward mode: {}", other)),
        }
    }
}

/// Conversational backend config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Base URL of the backend (admin and streaming endpoints hang off it). Overridden by CHATBOT_URL_PREFIX.
    pub url_prefix: Option<String>,
    /// Fixed URL for plain forwards. Overridden by CHATBOT_URL_WEBHOOK.
    pub webhook_url: Option<String>,
    /// Value of the `api-key` header on admin calls. Overridden by ADMIN_API_KEY.
    pub admin_api_key: Option<String>,
    /// Per-call timeout for backend calls (streams included).
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
    /// Forward policy for user text. Overridden by RELAY_FORWARD_MODE.
    #[serde(default)]
    pub forward_mode: ForwardMode,
    #[serde(default = "default_start_session_path")]
    pub start_session_path: String,
    #[serde(default = "default_continue_session_path")]
    pub continue_session_path: String,
    #[serde(default = "default_introduce_path")]
    pub introduce_path: String,
}

fn default_backend_timeout_secs() -> u64 {
    60
}

fn default_start_session_path() -> String {
    "/api/v1/start_session".to_string()
}

fn default_continue_session_path() -> String {
    "/api/v1/continue_session".to_string()
}

fn default_introduce_path() -> String {
    "/api/v1/get_introduce".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url_prefix: None,
            webhook_url: None,
            admin_api_key: None,
            timeout_secs: default_backend_timeout_secs(),
            forward_mode: ForwardMode::default(),
            start_session_path: default_start_session_path(),
            continue_session_path: default_continue_session_path(),
            introduce_path: default_introduce_path(),
        }
    }
}

/// Admin echo markers. A page admin typing a marker into the conversation toggles automation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    /// Matched as a raw substring, surrounding whitespace included. Overridden by ADMIN_TAKEOVER_KEY.
    pub takeover_marker: Option<String>,
    /// Matched as a raw substring, surrounding whitespace included. Overridden by ADMIN_RELEASE_KEY.
    pub release_marker: Option<String>,
    /// When true, the echo text minus the marker is also relayed through the backend's send_message endpoint.
    #[serde(default)]
    pub forward_cleaned_message: bool,
}

/// Background task limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksConfig {
    /// Maximum number of background tasks running at once (default 64).
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_max_in_flight() -> usize {
    64
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Non-empty, trimmed value of an environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Env wins over the config value; blank values on either side are ignored.
fn env_or(name: &str, value: Option<&String>) -> Option<String> {
    env_value(name).or_else(|| {
        value
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Like [`env_or`] but keeps the value verbatim; only an all-blank value counts as unset.
fn env_or_verbatim(name: &str, value: Option<&String>) -> Option<String> {
    let present = |s: &String| !s.trim().is_empty();
    std::env::var(name)
        .ok()
        .filter(present)
        .or_else(|| value.filter(|s| present(*s)).cloned())
}

/// Resolve the webhook verify token: env VERIFY_TOKEN overrides config.
pub fn resolve_verify_token(config: &Config) -> Option<String> {
    env_or("VERIFY_TOKEN", config.messenger.verify_token.as_ref())
}

/// Resolve the page access token: env PAGE_ACCESS_TOKEN overrides config.
pub fn resolve_page_access_token(config: &Config) -> Option<String> {
    env_or("PAGE_ACCESS_TOKEN", config.messenger.page_access_token.as_ref())
}

/// Resolve the page id: env META_PAGE_ID overrides config.
pub fn resolve_page_id(config: &Config) -> Option<String> {
    env_or("META_PAGE_ID", config.messenger.page_id.as_ref())
}

/// Resolve the Graph API base (no trailing slash): env GRAPH_API_BASE overrides config.
pub fn resolve_graph_api_base(config: &Config) -> String {
    env_or("GRAPH_API_BASE", Some(&config.messenger.graph_api_base))
        .unwrap_or_else(default_graph_api_base)
        .trim_end_matches('/')
        .to_string()
}

/// Resolve the backend base URL (no trailing slash): env CHATBOT_URL_PREFIX overrides config.
pub fn resolve_backend_prefix(config: &Config) -> Option<String> {
    env_or("CHATBOT_URL_PREFIX", config.backend.url_prefix.as_ref())
        .map(|s| s.trim_end_matches('/').to_string())
}

/// Resolve the plain-forward webhook URL: env CHATBOT_URL_WEBHOOK overrides config.
pub fn resolve_backend_webhook_url(config: &Config) -> Option<String> {
    env_or("CHATBOT_URL_WEBHOOK", config.backend.webhook_url.as_ref())
}

/// Resolve the admin API key: env ADMIN_API_KEY overrides config.
pub fn resolve_admin_api_key(config: &Config) -> Option<String> {
    env_or("ADMIN_API_KEY", config.backend.admin_api_key.as_ref())
}

/// Resolve the forward mode: env RELAY_FORWARD_MODE overrides config. An unparsable env value is ignored.
pub fn resolve_forward_mode(config: &Config) -> ForwardMode {
    match env_value("RELAY_FORWARD_MODE").map(|s| s.parse::<ForwardMode>()) {
        Some(Ok(mode)) => mode,
        Some(Err(e)) => {
            log::warn!("{}; using configured forward mode", e);
            config.backend.forward_mode
        }
        None => config.backend.forward_mode,
    }
}

/// Resolve the takeover marker: env ADMIN_TAKEOVER_KEY overrides config.
pub fn resolve_takeover_marker(config: &Config) -> Option<String> {
    env_or_verbatim("ADMIN_TAKEOVER_KEY", config.admin.takeover_marker.as_ref())
}

/// Resolve the release marker: env ADMIN_RELEASE_KEY overrides config.
pub fn resolve_release_marker(config: &Config) -> Option<String> {
    env_or_verbatim("ADMIN_RELEASE_KEY", config.admin.release_marker.as_ref())
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl MessengerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Names of required values that are unset after env resolution. Empty when fully configured.
pub fn missing_settings(config: &Config) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if resolve_verify_token(config).is_none() {
        missing.push("VERIFY_TOKEN");
    }
    if resolve_page_access_token(config).is_none() {
        missing.push("PAGE_ACCESS_TOKEN");
    }
    if resolve_backend_prefix(config).is_none() {
        missing.push("CHATBOT_URL_PREFIX");
    }
    if resolve_forward_mode(config) == ForwardMode::Webhook
        && resolve_backend_webhook_url(config).is_none()
    {
        missing.push("CHATBOT_URL_WEBHOOK");
    }
    if resolve_admin_api_key(config).is_none() {
        missing.push("ADMIN_API_KEY");
    }
    if resolve_takeover_marker(config).is_none() {
        missing.push("ADMIN_TAKEOVER_KEY");
    }
    if resolve_release_marker(config).is_none() {
        missing.push("ADMIN_RELEASE_KEY");
    }
    missing
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".messenger-relay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, the default path, or RELAY_CONFIG_PATH. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
