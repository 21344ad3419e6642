// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Periodic cleanup of callbacks whose agent disappeared.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::registry::CallbackRegistry;

/// Default sweep period.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(300);

/// Answers whether an agent is still known to the host.
pub trait AgentDirectory: Send + Sync {
    fn agent_exists(&self, agent_id: &str) -> bool;
}

impl<F> AgentDirectory for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn agent_exists(&self, agent_id: &str) -> bool {
        self(agent_id)
    }
}

/// Runs [`CallbackRegistry::cleanup_orphaned`] on a fixed period, after
/// giving interrupted batch groups a chance to dispatch.
#[derive(Debug, Clone)]
pub struct OrphanReaper {
    registry: Arc<CallbackRegistry>,
    interval: Duration,
}

impl OrphanReaper {
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self {
            registry,
            interval: DEFAULT_REAP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Sweep once now.
    pub async fn reap_now(&self) -> Vec<String> {
        let resumed = self.registry.resume_interrupted().await;
        if !resumed.is_empty() {
            debug!(count = resumed.len(), "Reaper resumed batch callbacks");
        }
        self.registry.cleanup_orphaned().await
    }

    /// Start the background loop. The first sweep happens one period from now.
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = self.interval.as_secs(), "Orphan reaper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let orphaned = self.reap_now().await;
                        if !orphaned.is_empty() {
                            debug!(count = orphaned.len(), "Reaper retired orphaned callbacks");
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Orphan reaper stopping");
                        break;
                    }
                }
            }
        });

        ReaperHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running reaper loop.
pub struct ReaperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the loop and wait for it to finish its current sweep.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}
