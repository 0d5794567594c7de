//! Event dispatcher: classify every messaging event in a webhook payload and submit the
//! matching background work.
//!
//! Order per event: admin echo (takeover before release, never falls through), user text
//! (plain forward or session stream per forward mode), postback, everything else logged.
//! Dispatch itself never fails and never waits on outbound calls.

use crate::backend::{AdminCommand, Backend};
use crate::config::{self, Config, ForwardMode};
use crate::messenger::{
    Button, MessagePayload, Messenger, MessagingEvent, WebhookPayload, GET_STARTED_PAYLOAD,
    RESTART_PAYLOAD, SHOW_MENU_PAYLOAD,
};
use crate::relay::StreamRelay;
use crate::session::SessionStore;
use crate::tasks::TaskRunner;
use std::sync::Arc;

/// Confirmation sent after a conversation restart, before the new introduction.
pub const RESTART_REPLY: &str = "Conversation restarted. Let's start over.";

const MENU_TEXT: &str = "What would you like to do?";

/// Dispatcher settings resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct DispatchSettings {
    pub takeover_marker: Option<String>,
    pub release_marker: Option<String>,
    pub forward_cleaned_message: bool,
    pub forward_mode: ForwardMode,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            takeover_marker: config::resolve_takeover_marker(config),
            release_marker: config::resolve_release_marker(config),
            forward_cleaned_message: config.admin.forward_cleaned_message,
            forward_mode: config::resolve_forward_mode(config),
        }
    }
}

/// Recognized postback payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostbackAction {
    GetStarted,
    Restart,
    ShowMenu,
}

impl PostbackAction {
    pub fn parse(payload: &str) -> Option<Self> {
        match payload {
            GET_STARTED_PAYLOAD => Some(PostbackAction::GetStarted),
            RESTART_PAYLOAD => Some(PostbackAction::Restart),
            SHOW_MENU_PAYLOAD => Some(PostbackAction::ShowMenu),
            _ => None,
        }
    }
}

/// Counts for one dispatched payload (for logs and tests).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub events: usize,
    pub submitted: usize,
    pub ignored: usize,
    pub unrecognized: usize,
}

#[derive(Clone)]
pub struct Dispatcher {
    settings: Arc<DispatchSettings>,
    backend: Arc<dyn Backend>,
    messenger: Arc<dyn Messenger>,
    sessions: Arc<dyn SessionStore>,
    relay: StreamRelay,
    tasks: TaskRunner,
}

impl Dispatcher {
    pub fn new(
        settings: DispatchSettings,
        backend: Arc<dyn Backend>,
        messenger: Arc<dyn Messenger>,
        sessions: Arc<dyn SessionStore>,
        tasks: TaskRunner,
    ) -> Self {
        let relay = StreamRelay::new(backend.clone(), messenger.clone(), sessions.clone());
        Self {
            settings: Arc::new(settings),
            backend,
            messenger,
            sessions,
            relay,
            tasks,
        }
    }

    pub fn tasks(&self) -> &TaskRunner {
        &self.tasks
    }

    /// Decode a raw request body and dispatch it. Undecodable bodies are logged and dropped.
    pub fn dispatch_json(&self, body: &serde_json::Value) -> DispatchReport {
        match serde_json::from_value::<WebhookPayload>(body.clone()) {
            Ok(payload) => self.dispatch(&payload),
            Err(e) => {
                log::warn!("dispatch: unrecognized webhook payload: {}", e);
                DispatchReport {
                    unrecognized: 1,
                    ..DispatchReport::default()
                }
            }
        }
    }

    /// Classify and route every messaging event of every entry.
    pub fn dispatch(&self, payload: &WebhookPayload) -> DispatchReport {
        let mut report = DispatchReport::default();
        if !payload.is_page() {
            log::debug!("dispatch: ignoring object '{}'", payload.object);
            return report;
        }
        for entry in &payload.entry {
            for raw in &entry.messaging {
                report.events += 1;
                match MessagingEvent::from_value(raw) {
                    Ok(event) => {
                        if self.route(event) {
                            report.submitted += 1;
                        } else {
                            report.ignored += 1;
                        }
                    }
                    Err(e) => {
                        log::warn!("dispatch: {}", e);
                        report.unrecognized += 1;
                    }
                }
            }
        }
        report
    }

    /// Returns true when background work was submitted.
    fn route(&self, event: MessagingEvent) -> bool {
        match event {
            MessagingEvent::Echo { recipient_id, text } => self.on_echo(recipient_id, &text),
            MessagingEvent::Text { sender_id, text } => {
                log::info!("dispatch: message from {}: '{}'", sender_id, text);
                self.forward_text(sender_id, text);
                true
            }
            MessagingEvent::Postback {
                sender_id, payload, ..
            } => self.on_postback(sender_id, &payload),
            MessagingEvent::Other { kind } => {
                log::info!("dispatch: ignoring event of type '{}'", kind);
                false
            }
        }
    }

    fn on_echo(&self, recipient_id: Option<String>, text: &str) -> bool {
        log::debug!("dispatch: echo message");
        let s = &self.settings;
        let Some(command) = AdminCommand::detect(
            text,
            s.takeover_marker.as_deref(),
            s.release_marker.as_deref(),
        ) else {
            return false;
        };
        let Some(customer_id) = recipient_id else {
            log::warn!("dispatch: '{}' echo without recipient id, ignoring", command);
            return false;
        };
        log::info!("dispatch: '{}' command for customer {}", command, customer_id);

        let backend = self.backend.clone();
        let chat_id = customer_id.clone();
        self.tasks
            .submit(format!("admin:{}:{}", command, customer_id), async move {
                backend.send_admin_command(&chat_id, command).await
            });

        if s.forward_cleaned_message {
            let marker = match command {
                AdminCommand::Takeover => s.takeover_marker.as_deref(),
                AdminCommand::Release => s.release_marker.as_deref(),
            }
            .unwrap_or_default();
            let cleaned = text.replace(marker, "").trim().to_string();
            if !cleaned.is_empty() {
                let backend = self.backend.clone();
                self.tasks
                    .submit(format!("admin:send_message:{}", customer_id), async move {
                        backend.send_cleaned_message(&customer_id, &cleaned).await
                    });
            }
        }
        true
    }

    fn forward_text(&self, sender_id: String, text: String) {
        match self.settings.forward_mode {
            ForwardMode::Webhook => {
                let backend = self.backend.clone();
                self.tasks
                    .submit(format!("forward:{}", sender_id), async move {
                        backend.forward_plain(&sender_id, &text).await
                    });
            }
            ForwardMode::Stream => {
                let relay = self.relay.clone();
                self.tasks
                    .submit(format!("stream:{}", sender_id), async move {
                        relay.converse(&sender_id, &text).await.map(|_| ())
                    });
            }
        }
    }

    fn on_postback(&self, sender_id: String, payload: &str) -> bool {
        let Some(action) = PostbackAction::parse(payload) else {
            log::info!("dispatch: ignoring unknown postback '{}' from {}", payload, sender_id);
            return false;
        };
        log::info!("dispatch: postback {:?} from {}", action, sender_id);
        match action {
            PostbackAction::GetStarted => {
                let relay = self.relay.clone();
                self.tasks
                    .submit(format!("introduce:{}", sender_id), async move {
                        relay.introduce(&sender_id).await.map(|_| ())
                    });
            }
            PostbackAction::Restart => {
                let relay = self.relay.clone();
                let sessions = self.sessions.clone();
                let messenger = self.messenger.clone();
                self.tasks
                    .submit(format!("restart:{}", sender_id), async move {
                        if let Some(old) = sessions.delete(&sender_id).await {
                            log::info!("dispatch: dropped thread {} for {}", old, sender_id);
                        }
                        messenger.send_text(&sender_id, RESTART_REPLY).await;
                        relay.introduce(&sender_id).await.map(|_| ())
                    });
            }
            PostbackAction::ShowMenu => {
                let messenger = self.messenger.clone();
                self.tasks
                    .submit(format!("menu:{}", sender_id), async move {
                        let menu = MessagePayload::buttons(
                            MENU_TEXT,
                            vec![Button::postback("Restart this conversation", RESTART_PAYLOAD)],
                        );
                        messenger.send(&sender_id, menu).await;
                        Ok(())
                    });
            }
        }
        true
    }
}
