// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Completion fan-out.
//!
//! The hub is the single place agent completions enter. Each event goes to
//! both the callback registry and the channel router; neither waits on the
//! other, and each event is handled on its own task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::callback::{
    CallbackRegistry, CallbackStore, CompletionInfo, DispatchOutcome, NotificationDispatcher,
    OrphanReaper,
};
use crate::channel::{
    ChannelDescriptor, ChannelRouter, EmailSender, RouteOutcome, SlackClient, SmtpClient, VapiClient,
};
use crate::config::CourierConfig;

/// What an agent reports when it finishes.
pub type CompletionEvent = CompletionInfo;

/// Routes completion events to the registry and the channel router.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    registry: Arc<CallbackRegistry>,
    router: Arc<ChannelRouter>,
}

impl NotificationHub {
    pub fn new(registry: Arc<CallbackRegistry>, router: Arc<ChannelRouter>) -> Self {
        Self { registry, router }
    }

    /// Build the registry and router from configuration.
    ///
    /// Chat, call and SMTP clients come from the config. A host-supplied
    /// `email` sender takes the place of the configured SMTP server.
    pub fn from_config(config: &CourierConfig, email: Option<Arc<dyn EmailSender>>) -> Self {
        let persona = config.persona_name();
        let mut dispatcher = NotificationDispatcher::new(persona).with_timeout(config.dispatch_timeout());
        let mut router = ChannelRouter::new().with_timeout(config.dispatch_timeout());

        if let Some(vapi) = config.vapi() {
            let mut client = VapiClient::new(&vapi.api_key, &vapi.phone_number_id, &vapi.assistant_id)
                .with_caller_name(persona);
            if let Some(base_url) = vapi.base_url.as_deref().filter(|u| !u.is_empty()) {
                client = client.with_base_url(base_url);
            }
            dispatcher = dispatcher.with_call_placer(Arc::new(client));
        }
        if let Some(token) = config.slack_token() {
            router = router.with_chat_poster(Arc::new(SlackClient::new(token)));
        }
        let email = email.or_else(|| {
            config.smtp().map(|smtp| {
                let client = SmtpClient::new(&smtp.host, smtp.sender())
                    .with_port(smtp.port())
                    .with_credentials(&smtp.user, &smtp.password);
                Arc::new(client) as Arc<dyn EmailSender>
            })
        });
        if let Some(email) = email {
            dispatcher = dispatcher.with_email_sender(Arc::clone(&email));
            router = router.with_email_sender(email);
        }

        let store = CallbackStore::in_dir(config.state_dir());
        info!(
            state = %store.path().display(),
            can_call = dispatcher.can_call(),
            can_email = dispatcher.can_email(),
            "Notification hub configured"
        );

        Self::new(
            Arc::new(CallbackRegistry::new(dispatcher, store)),
            Arc::new(router),
        )
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<ChannelRouter> {
        &self.router
    }

    /// Remember the channel an agent's work came from.
    pub async fn track(&self, agent_id: impl Into<String>, task: impl Into<String>, descriptor: ChannelDescriptor) {
        self.router.attach(agent_id, task, descriptor).await;
    }

    /// Handle one completion on both notification paths concurrently.
    pub async fn handle_completion(&self, event: CompletionEvent) -> (DispatchOutcome, RouteOutcome) {
        debug!(agent_id = %event.agent_id, success = event.is_success(), "Agent completed");
        let (dispatched, routed) = tokio::join!(
            self.registry.on_agent_complete(event.clone()),
            self.router.notify(&event)
        );
        (dispatched, routed)
    }

    /// Consume completion events until the sender side closes.
    ///
    /// Batch groups left ready by a previous process are dispatched first.
    pub fn spawn(&self, mut events: mpsc::Receiver<CompletionEvent>) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            hub.registry.resume_interrupted().await;
            while let Some(event) = events.recv().await {
                let hub = hub.clone();
                tokio::spawn(async move {
                    hub.handle_completion(event).await;
                });
            }
            info!("Completion channel closed");
        })
    }

    /// A reaper over this hub's registry.
    pub fn reaper(&self, config: &CourierConfig) -> OrphanReaper {
        OrphanReaper::new(Arc::clone(&self.registry)).with_interval(config.reap_interval())
    }
}
