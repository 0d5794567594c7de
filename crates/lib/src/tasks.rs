//! Background work submitted from the webhook handler.
//!
//! `submit` returns immediately; the task waits for a permit inside its own future, so at
//! most `max_in_flight` tasks make outbound calls at once while the handler never blocks.
//! Failures and panics are logged with the task name. `drain` awaits everything outstanding
//! (shutdown, tests).

use crate::error::RelayError;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Clone)]
pub struct TaskRunner {
    permits: Arc<Semaphore>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl TaskRunner {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn `fut` in the background. Must be called from within a tokio runtime.
    pub fn submit<F>(&self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = Result<(), RelayError>> + Send + 'static,
    {
        let name = name.into();
        let permits = self.permits.clone();
        let mut set = self.lock();
        // reap finished tasks so the set does not grow with traffic
        while let Some(res) = set.try_join_next() {
            if let Err(e) = res {
                log::warn!("task: join failed: {}", e);
            }
        }
        set.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    log::debug!("task {}: runner closed, dropping", name);
                    return;
                }
            };
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => log::debug!("task {} finished", name),
                Ok(Err(e)) => log::warn!("task {} failed: {}", name, e),
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    log::error!("task {} panicked: {}", name, msg);
                }
            }
        });
    }

    /// Number of tasks spawned and not yet reaped.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Wait for every submitted task, including tasks submitted while draining.
    pub async fn drain(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.lock());
            if set.is_empty() {
                return;
            }
            while let Some(res) = set.join_next().await {
                if let Err(e) = res {
                    log::warn!("task: join failed: {}", e);
                }
            }
        }
    }
}
