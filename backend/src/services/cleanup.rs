//! Recurring removal of expired and inactive sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::AuthError;
use crate::services::session::SessionManager;
use crate::utils::RetryPolicy;

pub struct SessionCleanupTask {
    manager: Arc<SessionManager>,
    interval: Duration,
    retry: RetryPolicy,
}

impl SessionCleanupTask {
    pub fn new(manager: Arc<SessionManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            retry: RetryPolicy::default(),
        }
    }

    /// One cleanup pass, retried with backoff.
    pub async fn run_once(&self) -> Result<u64, AuthError> {
        self.retry
            .run(|_| self.manager.cleanup_expired())
            .await
    }

    /// Runs on every tick until `shutdown` flips to `true` or its sender is
    /// dropped. The first pass happens immediately.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                "Session cleanup task started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(deleted) => tracing::debug!(deleted, "Session cleanup pass finished"),
                            Err(err) => tracing::error!(error = %err, "Session cleanup failed after retries"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Session cleanup task stopped");
        })
    }
}
