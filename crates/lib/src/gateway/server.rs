//! Webhook HTTP server: verification handshake, event intake, liveness.

use crate::backend::{Backend, BackendClient};
use crate::config::{self, Config};
use crate::dispatch::{DispatchSettings, Dispatcher};
use crate::messenger::{verify_subscription, Messenger, MessengerClient, VerifyQuery};
use crate::session::{InMemorySessionStore, SessionStore};
use crate::tasks::TaskRunner;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Liveness text for `GET /`.
pub const RUNNING_TEXT: &str = "Webhook service is running.";

/// Body of every `POST /webhook` response.
pub const ACK_TEXT: &str = "OK";

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Expected `hub.verify_token`; None rejects every verification attempt.
    pub verify_token: Option<String>,
    pub dispatcher: Dispatcher,
}

impl GatewayState {
    /// Wire the HTTP clients, in-memory session store, and task runner from config.
    pub fn from_config(config: Config) -> Self {
        let backend: Arc<dyn Backend> = Arc::new(BackendClient::from_config(&config));
        let messenger: Arc<dyn Messenger> = Arc::new(MessengerClient::from_config(&config));
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        Self::with_parts(config, backend, messenger, sessions)
    }

    /// Same as [`GatewayState::from_config`] with caller-provided collaborators.
    pub fn with_parts(
        config: Config,
        backend: Arc<dyn Backend>,
        messenger: Arc<dyn Messenger>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let tasks = TaskRunner::new(config.tasks.max_in_flight);
        let dispatcher = Dispatcher::new(
            DispatchSettings::from_config(&config),
            backend,
            messenger,
            sessions,
            tasks,
        );
        Self {
            verify_token: config::resolve_verify_token(&config),
            dispatcher,
        }
    }
}

/// Routes: `GET /`, `GET /webhook` (verification), `POST /webhook` (events).
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .with_state(state)
}

/// Run the webhook server on config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (Ctrl+C or SIGTERM), then drains outstanding background work.
pub async fn run_gateway(config: Config) -> Result<()> {
    for name in config::missing_settings(&config) {
        log::warn!("{} is not set; operations that need it will be skipped", name);
    }
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let state = GatewayState::from_config(config);
    let tasks = state.dispatcher.tasks().clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("webhook gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;

    log::info!("draining {} background task(s)", tasks.pending());
    tasks.drain().await;
    log::info!("gateway stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, no longer accepting webhooks");
}

/// GET / returns plain liveness text (for probes).
async fn health_http() -> &'static str {
    RUNNING_TEXT
}

/// GET /webhook: echo `hub.challenge` when mode is `subscribe` and the token matches.
/// Anything else, including a query that does not decode, is 403.
async fn verify_webhook(
    State(state): State<GatewayState>,
    query: Option<Query<VerifyQuery>>,
) -> Response {
    let Some(Query(query)) = query else {
        log::warn!("webhook verification rejected (undecodable query)");
        return StatusCode::FORBIDDEN.into_response();
    };
    match verify_subscription(&query, state.verify_token.as_deref()) {
        Some(challenge) => {
            log::info!("webhook verified");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                challenge,
            )
                .into_response()
        }
        None => {
            log::warn!(
                "webhook verification rejected (mode {:?})",
                query.mode.as_deref().unwrap_or("")
            );
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhook: dispatch every event in the background and acknowledge with 200 `OK`,
/// whatever happens while parsing or dispatching.
async fn receive_webhook(State(state): State<GatewayState>, body: Bytes) -> (StatusCode, &'static str) {
    let request_id = uuid::Uuid::new_v4();
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("[{}] webhook body is not JSON: {}", request_id, e);
            return (StatusCode::OK, ACK_TEXT);
        }
    };
    let dispatcher = &state.dispatcher;
    match std::panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch_json(&value))) {
        Ok(report) => log::info!(
            "[{}] webhook: {} event(s), {} submitted, {} ignored, {} unrecognized",
            request_id,
            report.events,
            report.submitted,
            report.ignored,
            report.unrecognized
        ),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("[{}] webhook dispatch panicked: {}", request_id, msg);
        }
    }
    (StatusCode::OK, ACK_TEXT)
}
