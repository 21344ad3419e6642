// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Channel-aware completion notices.
//!
//! Work spawned from a chat message, a phone call or an API request carries a
//! [`ChannelDescriptor`]. When that work finishes the router replies on the
//! same channel: a chat post, a follow-up email for a call that has since
//! ended, or nothing for a synchronous API caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "telemetry")]
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::callback::CompletionInfo;
use crate::error::ChannelError;
use crate::text::{clip, mask_phone};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::capability::{ChatPoster, EmailSender};
use super::descriptor::{ChannelDescriptor, ChannelKind};

/// Longest result text posted to chat.
pub const CHAT_RESULT_MAX_CHARS: usize = 500;

const ROUTE_TIMEOUT: Duration = Duration::from_secs(30);

/// What happened to a completion notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The agent had no descriptor attached.
    NoBinding,
    Delivered(ChannelKind),
    /// A voice requester left no email and cannot be reached.
    Undeliverable,
    /// Nothing to send (synchronous API callers).
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
struct Binding {
    descriptor: ChannelDescriptor,
    task: String,
}

/// Maps running agents to the channel their request came from.
pub struct ChannelRouter {
    bindings: Mutex<HashMap<String, Binding>>,
    chat: Option<Arc<dyn ChatPoster>>,
    email: Option<Arc<dyn EmailSender>>,
    timeout: Duration,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self {
            bindings: Mutex::new(HashMap::new()),
            chat: None,
            email: None,
            timeout: ROUTE_TIMEOUT,
        }
    }

    pub fn with_chat_poster(mut self, chat: Arc<dyn ChatPoster>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_email_sender(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Remember where an agent's request came from. Replaces any earlier binding.
    pub async fn attach(&self, agent_id: impl Into<String>, task: impl Into<String>, descriptor: ChannelDescriptor) {
        let agent_id = agent_id.into();
        debug!(agent_id = %agent_id, channel = %descriptor.kind, "Attached channel");
        self.bindings.lock().await.insert(
            agent_id,
            Binding {
                descriptor,
                task: task.into(),
            },
        );
    }

    pub async fn detach(&self, agent_id: &str) -> Option<ChannelDescriptor> {
        self.bindings.lock().await.remove(agent_id).map(|b| b.descriptor)
    }

    pub async fn descriptor(&self, agent_id: &str) -> Option<ChannelDescriptor> {
        self.bindings.lock().await.get(agent_id).map(|b| b.descriptor.clone())
    }

    pub async fn len(&self) -> usize {
        self.bindings.lock().await.len()
    }

    /// Send the completion notice for an agent. The binding is consumed
    /// whatever the outcome.
    pub async fn notify(&self, info: &CompletionInfo) -> RouteOutcome {
        let Some(binding) = self.bindings.lock().await.remove(&info.agent_id) else {
            return RouteOutcome::NoBinding;
        };
        let Binding { descriptor, task } = binding;

        match descriptor.kind {
            ChannelKind::Chat => self.notify_chat(&descriptor, &task, info).await,
            ChannelKind::Voice => self.notify_voice(&descriptor, info).await,
            ChannelKind::SyncApi => {
                debug!(agent_id = %info.agent_id, "API request completed; caller has the result");
                RouteOutcome::Skipped
            }
        }
    }

    async fn notify_chat(&self, descriptor: &ChannelDescriptor, task: &str, info: &CompletionInfo) -> RouteOutcome {
        let Some(chat) = self.chat.as_ref().filter(|c| c.is_configured()) else {
            warn!(channel_id = %descriptor.routing_id, "Chat client not configured; cannot notify channel");
            return RouteOutcome::Failed("chat client not configured".to_string());
        };

        let text = chat_message(&info.agent_name, task, info);
        let sent = self
            .bounded("chat", chat.send_message(&descriptor.routing_id, &text))
            .await;
        match sent {
            Ok(()) => {
                info!(agent_id = %info.agent_id, channel_id = %descriptor.routing_id, "Posted completion to chat");
                RouteOutcome::Delivered(ChannelKind::Chat)
            }
            Err(e) => RouteOutcome::Failed(e.to_string()),
        }
    }

    async fn notify_voice(&self, descriptor: &ChannelDescriptor, info: &CompletionInfo) -> RouteOutcome {
        let Some(address) = descriptor.fallback_email() else {
            info!(
                caller = %mask_phone(&descriptor.requester_id),
                agent_id = %info.agent_id,
                "Voice request completed with no way to reach the caller"
            );
            return RouteOutcome::Undeliverable;
        };
        let Some(email) = self.email.as_ref().filter(|e| e.is_configured()) else {
            warn!(agent_id = %info.agent_id, "Email client not configured; cannot follow up on voice request");
            return RouteOutcome::Failed("email client not configured".to_string());
        };

        let (subject, body) = voice_followup(info);
        match self.bounded("voice_email", email.send_email(address, &subject, &body)).await {
            Ok(()) => RouteOutcome::Delivered(ChannelKind::Voice),
            Err(e) => RouteOutcome::Failed(e.to_string()),
        }
    }

    async fn bounded<F>(&self, channel: &'static str, request: F) -> Result<(), ChannelError>
    where
        F: std::future::Future<Output = Result<(), ChannelError>>,
    {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let result = match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(self.timeout.as_millis() as u64)),
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_delivery(channel, start.elapsed(), result.is_ok());

        if let Err(e) = &result {
            warn!(channel, error = %e, "Channel notification failed");
        }
        result
    }
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChannelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRouter")
            .field("has_chat", &self.chat.is_some())
            .field("has_email", &self.email.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn chat_message(agent_name: &str, task: &str, info: &CompletionInfo) -> String {
    if info.is_success() {
        format!(
            "*{}* completed: _{}_\n\n{}",
            agent_name,
            task,
            clip(&info.result, CHAT_RESULT_MAX_CHARS)
        )
    } else {
        format!(
            "*{}* failed: _{}_\n\n{}",
            agent_name,
            task,
            clip(&info.error, CHAT_RESULT_MAX_CHARS)
        )
    }
}

fn voice_followup(info: &CompletionInfo) -> (String, String) {
    if info.is_success() {
        (format!("{} completed your request", info.agent_name), info.result.clone())
    } else {
        (
            format!("{} could not complete your request", info.agent_name),
            info.error.clone(),
        )
    }
}
