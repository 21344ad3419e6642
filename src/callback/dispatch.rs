// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-channel delivery of completion notifications.
//!
//! The dispatcher owns the call and email capabilities and knows how to turn
//! a finished callback (or a finished group) into provider requests. It holds
//! no registry state and is always invoked outside the registry lock.
//!
//! | method | call | email | failure text |
//! |--------|------|-------|--------------|
//! | Call   | yes  | no    | call error |
//! | Email  | no   | yes   | email error |
//! | Both   | yes  | yes   | `call: <e>; email: <e>` when both fail, otherwise the single error |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "telemetry")]
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::channel::{CallContext, CallPlacer, EmailSender};
use crate::error::{CallbackError, ChannelError};
use crate::text::{mask_phone, truncate};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::email::{compose_batch_email, compose_task_email, BatchEmail, BatchItem, TaskEmail};
use super::types::{Callback, CallbackGroup, CompletionInfo, Contact, NotifyMethod};

/// Resolves a project name to a URL the requester can open.
pub type ProjectUrlFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Upper bound for a single provider request.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest result text handed to the voice assistant.
const CALL_RESULT_MAX_CHARS: usize = 200;

/// Delivers notifications through the configured call and email capabilities.
#[derive(Clone)]
pub struct NotificationDispatcher {
    call: Option<Arc<dyn CallPlacer>>,
    email: Option<Arc<dyn EmailSender>>,
    project_urls: Option<ProjectUrlFn>,
    persona_name: String,
    timeout: Duration,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("can_call", &self.can_call())
            .field("can_email", &self.can_email())
            .field("persona_name", &self.persona_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl NotificationDispatcher {
    /// Create a dispatcher with no channels; add them with the `with_*` methods.
    pub fn new(persona_name: impl Into<String>) -> Self {
        Self {
            call: None,
            email: None,
            project_urls: None,
            persona_name: persona_name.into(),
            timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    pub fn with_call_placer(mut self, placer: Arc<dyn CallPlacer>) -> Self {
        self.call = Some(placer);
        self
    }

    pub fn with_email_sender(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(sender);
        self
    }

    pub fn with_project_urls<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.project_urls = Some(Arc::new(lookup));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn persona_name(&self) -> &str {
        &self.persona_name
    }

    pub fn can_call(&self) -> bool {
        self.call.as_ref().is_some_and(|c| c.is_configured())
    }

    pub fn can_email(&self) -> bool {
        self.email.as_ref().is_some_and(|e| e.is_configured())
    }

    /// Reject a registration whose method cannot be honoured.
    pub fn validate(&self, method: NotifyMethod, contact: &Contact) -> Result<(), CallbackError> {
        if method.wants_call() {
            if contact.phone.trim().is_empty() {
                return Err(CallbackError::validation("phone number required for call callback"));
            }
            if !self.can_call() {
                return Err(CallbackError::configuration(
                    "call client not configured for call callbacks",
                ));
            }
        }
        if method.wants_email() {
            if contact.email.trim().is_empty() {
                return Err(CallbackError::validation("email address required for email callback"));
            }
            if !self.can_email() {
                return Err(CallbackError::configuration(
                    "email client not configured for email callbacks",
                ));
            }
        }
        Ok(())
    }

    /// Notify the requester of one finished agent.
    pub async fn dispatch_single(
        &self,
        callback: &Callback,
        info: &CompletionInfo,
    ) -> Result<(), CallbackError> {
        let method = callback.method;
        let (call, email) = tokio::join!(
            async {
                if method.wants_call() {
                    Some(self.send_call(callback, info).await.map(|_| ()))
                } else {
                    None
                }
            },
            async {
                if method.wants_email() {
                    Some(self.send_task_email(callback, info).await)
                } else {
                    None
                }
            }
        );
        combine(call, email)
    }

    /// Notify the requester once every member of a group has finished.
    pub async fn dispatch_group(
        &self,
        group: &CallbackGroup,
        members: &[Callback],
    ) -> Result<(), CallbackError> {
        let method = group.method;
        let (call, email) = tokio::join!(
            async {
                if method.wants_call() {
                    Some(self.send_batch_call(group))
                } else {
                    None
                }
            },
            async {
                if method.wants_email() {
                    Some(self.send_batch_email(group, members).await)
                } else {
                    None
                }
            }
        );
        combine(call, email)
    }

    async fn send_call(&self, callback: &Callback, info: &CompletionInfo) -> Result<String, ChannelError> {
        let placer = match &self.call {
            Some(placer) if placer.is_configured() => placer,
            _ => return Err(ChannelError::NotConfigured("call client not configured".to_string())),
        };

        let result = if info.is_success() {
            truncate(&info.result, CALL_RESULT_MAX_CHARS)
        } else {
            truncate(&format!("failed: {}", info.error), CALL_RESULT_MAX_CHARS)
        };
        let context = CallContext {
            agent_name: callback.agent_name.clone(),
            task_summary: callback.task_summary.clone(),
            result,
            project_name: callback.project_name.clone(),
        };

        info!(
            phone = %mask_phone(&callback.customer_phone),
            agent_id = %callback.agent_id,
            "Initiating callback call"
        );

        let call_id = self
            .bounded(
                "call",
                placer.place_call(&callback.customer_phone, &callback.customer_name, &context),
            )
            .await?;
        debug!(call_id = %call_id, agent_id = %callback.agent_id, "Callback call placed");
        Ok(call_id)
    }

    async fn send_task_email(&self, callback: &Callback, info: &CompletionInfo) -> Result<(), ChannelError> {
        let sender = match &self.email {
            Some(sender) if sender.is_configured() => sender,
            _ => return Err(ChannelError::NotConfigured("email client not configured".to_string())),
        };

        let project = if callback.project_name.is_empty() {
            info.project_name.as_str()
        } else {
            callback.project_name.as_str()
        };
        let view_url = self.project_url(project);

        let message = compose_task_email(&TaskEmail {
            recipient_name: &callback.customer_name,
            recipient_email: &callback.customer_email,
            agent_id: &callback.agent_id,
            agent_name: &callback.agent_name,
            task_summary: &callback.task_summary,
            project_name: project,
            result: &info.result,
            error: &info.error,
            view_url: view_url.as_deref(),
            signature: &self.persona_name,
        });

        debug!(agent_id = %callback.agent_id, subject = %message.subject, "Sending callback email");
        self.bounded("email", sender.send_email(&message.to, &message.subject, &message.body))
            .await
    }

    /// One combined voice call across several results is not offered.
    fn send_batch_call(&self, group: &CallbackGroup) -> Result<(), ChannelError> {
        warn!(group_id = %group.id, "Batch call requested; batch calls are not supported");
        Err(ChannelError::Unsupported("batch calls are not supported".to_string()))
    }

    async fn send_batch_email(&self, group: &CallbackGroup, members: &[Callback]) -> Result<(), ChannelError> {
        let sender = match &self.email {
            Some(sender) if sender.is_configured() => sender,
            _ => return Err(ChannelError::NotConfigured("email client not configured".to_string())),
        };

        let results = group.ordered_results();
        let items = results
            .iter()
            .map(|r| BatchItem {
                agent_name: &r.agent_name,
                task_summary: members
                    .iter()
                    .find(|m| m.agent_id == r.agent_id)
                    .map(|m| m.task_summary.as_str())
                    .unwrap_or_default(),
                result: &r.result,
                error: &r.error,
            })
            .collect();

        let view_url = results
            .iter()
            .find(|r| !r.project_name.is_empty())
            .and_then(|r| self.project_url(&r.project_name));

        let message = compose_batch_email(&BatchEmail {
            recipient_name: &group.customer_name,
            recipient_email: &group.customer_email,
            items,
            view_url: view_url.as_deref(),
            signature: &self.persona_name,
        });

        debug!(group_id = %group.id, members = results.len(), "Sending batch email");
        self.bounded("batch_email", sender.send_email(&message.to, &message.subject, &message.body))
            .await
    }

    fn project_url(&self, project: &str) -> Option<String> {
        if project.is_empty() {
            return None;
        }
        self.project_urls.as_ref().and_then(|lookup| lookup(project))
    }

    /// Run one provider request under the dispatch timeout.
    async fn bounded<T, F>(&self, channel: &'static str, request: F) -> Result<T, ChannelError>
    where
        F: Future<Output = Result<T, ChannelError>>,
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
            warn!(channel, error = %e, "Notification delivery failed");
        }
        result
    }
}

/// Fold per-channel outcomes into the entity-level result.
fn combine(
    call: Option<Result<(), ChannelError>>,
    email: Option<Result<(), ChannelError>>,
) -> Result<(), CallbackError> {
    match (call, email) {
        (Some(Err(call_err)), Some(Err(email_err))) => Err(CallbackError::Dispatch(format!(
            "call: {}; email: {}",
            call_err, email_err
        ))),
        (Some(Err(err)), _) | (_, Some(Err(err))) => Err(CallbackError::Dispatch(err.to_string())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::types::AgentInfo;
    use crate::channel::{MockCallPlacer, MockEmailSender};
    use async_trait::async_trait;

    fn email_sender(configured: bool) -> MockEmailSender {
        let mut mock = MockEmailSender::new();
        mock.expect_is_configured().return_const(configured);
        mock
    }

    fn call_placer(configured: bool) -> MockCallPlacer {
        let mut mock = MockCallPlacer::new();
        mock.expect_is_configured().return_const(configured);
        mock
    }

    fn callback(method: NotifyMethod) -> Callback {
        let agent = AgentInfo::new("agent-1", "Builder")
            .with_task("Add OAuth")
            .with_project("web");
        let contact = Contact::new("+15551234567", "ada@example.com", "Ada");
        Callback::new(&agent, method, &contact, "Tony", None)
    }

    #[test]
    fn test_capabilities() {
        let bare = NotificationDispatcher::new("Tony");
        assert!(!bare.can_call());
        assert!(!bare.can_email());

        let dispatcher = NotificationDispatcher::new("Tony")
            .with_call_placer(Arc::new(call_placer(false)))
            .with_email_sender(Arc::new(email_sender(true)));
        assert!(!dispatcher.can_call());
        assert!(dispatcher.can_email());
    }

    #[test]
    fn test_validate_missing_fields() {
        let dispatcher = NotificationDispatcher::new("Tony")
            .with_call_placer(Arc::new(call_placer(true)))
            .with_email_sender(Arc::new(email_sender(true)));

        let err = dispatcher
            .validate(NotifyMethod::Call, &Contact::email("a@b.c", ""))
            .unwrap_err();
        assert_eq!(err, CallbackError::validation("phone number required for call callback"));

        let err = dispatcher
            .validate(NotifyMethod::Both, &Contact::phone("+1555", ""))
            .unwrap_err();
        assert_eq!(err, CallbackError::validation("email address required for email callback"));

        assert!(dispatcher
            .validate(NotifyMethod::Both, &Contact::new("+1555", "a@b.c", ""))
            .is_ok());
    }

    #[test]
    fn test_validate_unconfigured_channel() {
        let dispatcher = NotificationDispatcher::new("Tony");
        let err = dispatcher
            .validate(NotifyMethod::Call, &Contact::phone("+1555", ""))
            .unwrap_err();
        assert!(matches!(err, CallbackError::Configuration(_)));

        let err = dispatcher
            .validate(NotifyMethod::Email, &Contact::email("a@b.c", ""))
            .unwrap_err();
        assert_eq!(err.detail(), "email client not configured for email callbacks");
    }

    #[tokio::test]
    async fn test_single_email_success() {
        let mut sender = email_sender(true);
        sender
            .expect_send_email()
            .withf(|to, subject, body| {
                to == "ada@example.com"
                    && subject == "Builder completed: Add OAuth"
                    && body.contains("View the project: https://web.example.dev")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let dispatcher = NotificationDispatcher::new("Tony")
            .with_email_sender(Arc::new(sender))
            .with_project_urls(|project| Some(format!("https://{}.example.dev", project)));

        let info = CompletionInfo::success("agent-1", "Builder", "Merged");
        dispatcher
            .dispatch_single(&callback(NotifyMethod::Email), &info)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_call_passes_context() {
        let mut placer = call_placer(true);
        placer
            .expect_place_call()
            .withf(|phone, name, ctx| {
                phone == "+15551234567"
                    && name == "Ada"
                    && ctx.agent_name == "Builder"
                    && ctx.project_name == "web"
                    && ctx.result.chars().count() == CALL_RESULT_MAX_CHARS
            })
            .times(1)
            .returning(|_, _, _| Ok("call-1".to_string()));

        let dispatcher = NotificationDispatcher::new("Tony").with_call_placer(Arc::new(placer));
        let info = CompletionInfo::success("agent-1", "Builder", "x".repeat(500));
        dispatcher
            .dispatch_single(&callback(NotifyMethod::Call), &info)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_both_failures_are_joined() {
        let mut placer = call_placer(true);
        placer
            .expect_place_call()
            .returning(|_, _, _| Err(ChannelError::Network("no route".to_string())));
        let mut sender = email_sender(true);
        sender
            .expect_send_email()
            .returning(|_, _, _| Err(ChannelError::api_message("mailbox full")));

        let dispatcher = NotificationDispatcher::new("Tony")
            .with_call_placer(Arc::new(placer))
            .with_email_sender(Arc::new(sender));

        let info = CompletionInfo::success("agent-1", "Builder", "done");
        let err = dispatcher
            .dispatch_single(&callback(NotifyMethod::Both), &info)
            .await
            .unwrap_err();
        assert_eq!(
            err.detail(),
            "call: Network error: no route; email: API error: mailbox full"
        );
    }

    #[tokio::test]
    async fn test_both_partial_failure_keeps_success() {
        let mut placer = call_placer(true);
        placer
            .expect_place_call()
            .returning(|_, _, _| Err(ChannelError::Network("no route".to_string())));
        let mut sender = email_sender(true);
        sender.expect_send_email().times(1).returning(|_, _, _| Ok(()));

        let dispatcher = NotificationDispatcher::new("Tony")
            .with_call_placer(Arc::new(placer))
            .with_email_sender(Arc::new(sender));

        let info = CompletionInfo::success("agent-1", "Builder", "done");
        let err = dispatcher
            .dispatch_single(&callback(NotifyMethod::Both), &info)
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "Network error: no route");
    }

    #[tokio::test]
    async fn test_group_email_lists_members_in_order() {
        let mut sender = email_sender(true);
        sender
            .expect_send_email()
            .withf(|to, subject, body| {
                let a = body.find("✓ **A** - lint").unwrap_or(usize::MAX);
                let b = body.find("✗ **B** - test").unwrap_or(0);
                to == "x@y.com"
                    && subject == "Your tasks are complete (1 finished, 1 failed)"
                    && a < b
                    && body.contains("View the project: https://api.example.dev")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let dispatcher = NotificationDispatcher::new("Tony")
            .with_email_sender(Arc::new(sender))
            .with_project_urls(|project| Some(format!("https://{}.example.dev", project)));

        let contact = Contact::email("x@y.com", "Ada");
        let mut group = CallbackGroup::new(vec!["a".into(), "b".into()], NotifyMethod::Email, &contact, "Tony");
        group.results.insert("b".into(), CompletionInfo::failure("b", "B", "boom"));
        group.results.insert(
            "a".into(),
            CompletionInfo::success("a", "A", "clean").with_project("api"),
        );
        let members = vec![
            Callback::new(&AgentInfo::new("a", "A").with_task("lint"), NotifyMethod::Email, &contact, "Tony", Some(group.id.clone())),
            Callback::new(&AgentInfo::new("b", "B").with_task("test"), NotifyMethod::Email, &contact, "Tony", Some(group.id.clone())),
        ];

        dispatcher.dispatch_group(&group, &members).await.unwrap();
    }

    #[tokio::test]
    async fn test_group_call_is_unsupported() {
        let dispatcher = NotificationDispatcher::new("Tony").with_call_placer(Arc::new(call_placer(true)));
        let group = CallbackGroup::new(
            vec!["a".into()],
            NotifyMethod::Call,
            &Contact::phone("+1555", ""),
            "Tony",
        );
        let err = dispatcher.dispatch_group(&group, &[]).await.unwrap_err();
        assert_eq!(err.detail(), "Unsupported operation: batch calls are not supported");
    }

    struct StalledSender;

    #[async_trait]
    impl EmailSender for StalledSender {
        fn is_configured(&self) -> bool {
            true
        }

        async fn send_email(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), ChannelError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_timeout() {
        let dispatcher = NotificationDispatcher::new("Tony")
            .with_email_sender(Arc::new(StalledSender))
            .with_timeout(Duration::from_millis(20));

        let info = CompletionInfo::success("agent-1", "Builder", "done");
        let err = dispatcher
            .dispatch_single(&callback(NotifyMethod::Email), &info)
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "Timeout after 20ms");
    }

    #[test]
    fn test_combine_no_channels() {
        assert!(combine(None, None).is_ok());
        assert!(combine(Some(Ok(())), None).is_ok());
    }
}
