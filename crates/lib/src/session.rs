//! Conversation sessions: end-user id -> backend thread id.
//!
//! The store is a trait so the dispatcher and relay can be handed a different backing
//! (persistent, shared) without changing call sites. The in-memory store lives for the
//! process lifetime; concurrent writes to the same user are unordered and the last one wins.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// End-user identifier on the platform (page-scoped id).
pub type UserId = String;

/// Opaque conversation id issued by the backend.
pub type ThreadId = String;

/// Session lookup used by the streaming relay and the restart postback.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Thread id for the user, if one has been recorded.
    async fn get(&self, user_id: &str) -> Option<ThreadId>;
    /// Record (or overwrite) the user's thread id.
    async fn set(&self, user_id: &str, thread_id: ThreadId);
    /// Forget the user's thread id; returns the removed value.
    async fn delete(&self, user_id: &str) -> Option<ThreadId>;
}

/// In-memory session map.
#[derive(Clone)]
pub struct InMemorySessionStore {
    inner: Arc<RwLock<HashMap<UserId, ThreadId>>>,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Option<ThreadId> {
        self.inner.read().await.get(user_id).cloned()
    }

    async fn set(&self, user_id: &str, thread_id: ThreadId) {
        let mut g = self.inner.write().await;
        if let Some(old) = g.insert(user_id.to_string(), thread_id.clone()) {
            if old != thread_id {
                log::debug!("session: user {} moved from thread {} to {}", user_id, old, thread_id);
            }
        }
    }

    async fn delete(&self, user_id: &str) -> Option<ThreadId> {
        self.inner.write().await.remove(user_id)
    }
}
