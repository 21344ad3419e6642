// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The callback registry.
//!
//! Tracks who is waiting on which agent, enforces the batch barrier, and
//! hands finished work to the [`NotificationDispatcher`]. All state sits
//! behind one `tokio::sync::RwLock`. Mutations take the write lock, decide
//! what to dispatch, mark it `Dispatching`, persist and release the lock.
//! Delivery runs unlocked and the terminal transition is committed under a
//! fresh write lock.

use std::collections::HashSet;
use std::sync::Arc;
#[cfg(feature = "telemetry")]
use std::time::Instant;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::CallbackError;
use crate::telemetry::Transition;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::dispatch::NotificationDispatcher;
use super::reaper::AgentDirectory;
use super::store::{
    push_bounded, CallbackStore, StoreSnapshot, CALLBACK_HISTORY_LIMIT, GROUP_HISTORY_LIMIT,
};
use super::types::{
    AgentInfo, Callback, CallbackGroup, CallbackStatus, CompletionInfo, Contact, NotifyMethod,
};

/// What a completion report led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nobody was waiting, or the report was a duplicate.
    Ignored,
    /// Stored in a group that is still waiting on other members.
    Recorded { group_id: String, remaining: usize },
    /// The notification went out.
    Completed,
    /// Delivery failed; the text is what was recorded on the callback.
    Failed(String),
}

/// Work selected under the lock and performed after it is released.
enum DispatchJob {
    Single {
        callback: Callback,
        info: CompletionInfo,
    },
    Group {
        group: CallbackGroup,
        members: Vec<Callback>,
    },
}

/// Registry of pending completion callbacks.
pub struct CallbackRegistry {
    state: RwLock<StoreSnapshot>,
    dispatcher: NotificationDispatcher,
    store: Option<CallbackStore>,
    directory: RwLock<Option<Arc<dyn AgentDirectory>>>,
}

impl CallbackRegistry {
    /// Create a registry backed by `store`, restoring whatever it holds.
    ///
    /// A missing or unreadable file starts the registry empty.
    pub fn new(dispatcher: NotificationDispatcher, store: CallbackStore) -> Self {
        let state = match store.load() {
            Ok(Some(snapshot)) => {
                info!(
                    path = %store.path().display(),
                    pending = snapshot.callbacks.len(),
                    "Restored callback state"
                );
                snapshot
            }
            Ok(None) => StoreSnapshot::default(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable callback state");
                StoreSnapshot::default()
            }
        };
        Self::with_state(dispatcher, Some(store), state)
    }

    /// Create a registry that never touches disk.
    pub fn in_memory(dispatcher: NotificationDispatcher) -> Self {
        Self::with_state(dispatcher, None, StoreSnapshot::default())
    }

    fn with_state(
        dispatcher: NotificationDispatcher,
        store: Option<CallbackStore>,
        state: StoreSnapshot,
    ) -> Self {
        Self {
            state: RwLock::new(state),
            dispatcher,
            store,
            directory: RwLock::new(None),
        }
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn can_call(&self) -> bool {
        self.dispatcher.can_call()
    }

    pub fn can_email(&self) -> bool {
        self.dispatcher.can_email()
    }

    /// Register interest in one agent's completion.
    ///
    /// Replaces any callback already registered for the same agent.
    pub async fn register(
        &self,
        agent: AgentInfo,
        method: NotifyMethod,
        contact: Contact,
    ) -> Result<Callback, CallbackError> {
        self.dispatcher.validate(method, &contact)?;

        let callback = Callback::new(&agent, method, &contact, self.dispatcher.persona_name(), None);
        let job = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let job = install(state, callback.clone());
            self.persist(state);
            job
        };

        count(Transition::Registered);
        info!(
            agent_id = %callback.agent_id,
            callback_id = %callback.id,
            method = %method,
            "Registered callback"
        );

        if let Some(job) = job {
            self.run_job(job).await;
        }
        Ok(callback)
    }

    /// Register one combined notification for several agents.
    ///
    /// Duplicate agent ids are collapsed; the first occurrence sets the order.
    pub async fn register_batch(
        &self,
        members: Vec<AgentInfo>,
        method: NotifyMethod,
        contact: Contact,
    ) -> Result<CallbackGroup, CallbackError> {
        if members.is_empty() {
            return Err(CallbackError::validation("batch requires at least one agent"));
        }
        self.dispatcher.validate(method, &contact)?;

        let mut seen = HashSet::new();
        let members: Vec<AgentInfo> = members
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .collect();

        let persona = self.dispatcher.persona_name();
        let group = CallbackGroup::new(
            members.iter().map(|m| m.id.clone()).collect(),
            method,
            &contact,
            persona,
        );

        let jobs = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let mut jobs = Vec::new();
            for member in &members {
                let callback = Callback::new(member, method, &contact, persona, Some(group.id.clone()));
                jobs.extend(install(state, callback));
            }
            state.groups.insert(group.id.clone(), group.clone());
            self.persist(state);
            jobs
        };

        for _ in &members {
            count(Transition::Registered);
        }
        info!(
            group_id = %group.id,
            members = members.len(),
            method = %method,
            "Registered batch callback"
        );

        for job in jobs {
            self.run_job(job).await;
        }
        Ok(group)
    }

    /// Report that an agent finished.
    ///
    /// Reports for unknown agents, for callbacks already past `Pending`, and
    /// repeated reports from a group member are ignored. A repeated report for
    /// a restored group whose members have all reported dispatches it.
    pub async fn on_agent_complete(&self, info: CompletionInfo) -> DispatchOutcome {
        let job = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let group_id = match state.callbacks.get(&info.agent_id) {
                Some(cb) if cb.is_pending() => cb.group_id.clone().filter(|g| !g.is_empty()),
                Some(cb) => {
                    debug!(agent_id = %info.agent_id, status = %cb.status, "Completion for callback not pending");
                    return DispatchOutcome::Ignored;
                }
                None => {
                    debug!(agent_id = %info.agent_id, "No callback registered for agent");
                    return DispatchOutcome::Ignored;
                }
            };

            let job = match group_id {
                Some(group_id) if state.groups.contains_key(&group_id) => {
                    let Some(group) = state.groups.get_mut(&group_id) else {
                        return DispatchOutcome::Ignored;
                    };
                    if group.status != CallbackStatus::Pending {
                        debug!(agent_id = %info.agent_id, group_id = %group_id, "Group already dispatching");
                        return DispatchOutcome::Ignored;
                    }
                    if group.has_result(&info.agent_id) {
                        // A ready group still pending was interrupted mid-dispatch; any report restarts it.
                        if !group.is_ready() {
                            debug!(agent_id = %info.agent_id, group_id = %group_id, "Duplicate group completion");
                            return DispatchOutcome::Ignored;
                        }
                        info!(group_id = %group_id, "Resuming interrupted batch callback");
                    } else {
                        group.results.insert(info.agent_id.clone(), info);
                    }
                    if !group.is_ready() {
                        let remaining = group.agent_ids.len() - group.results.len();
                        debug!(group_id = %group_id, remaining, "Recorded group result");
                        self.persist(state);
                        return DispatchOutcome::Recorded { group_id, remaining };
                    }
                    begin_group(state, &group_id)
                }
                Some(group_id) => {
                    warn!(agent_id = %info.agent_id, group_id = %group_id, "Callback group missing; notifying alone");
                    begin_single(state, info)
                }
                None => begin_single(state, info),
            };

            let Some(job) = job else {
                return DispatchOutcome::Ignored;
            };
            self.persist(state);
            job
        };

        self.run_job(job).await
    }

    /// Dispatch batch groups whose members had all reported when the previous
    /// process stopped. Returns one outcome per resumed group.
    pub async fn resume_interrupted(&self) -> Vec<DispatchOutcome> {
        let jobs = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let mut ready: Vec<String> = state
                .groups
                .values()
                .filter(|g| g.status == CallbackStatus::Pending && g.is_ready())
                .map(|g| g.id.clone())
                .collect();
            if ready.is_empty() {
                return Vec::new();
            }
            ready.sort();

            let jobs: Vec<DispatchJob> = ready.iter().filter_map(|id| begin_group(state, id)).collect();
            self.persist(state);
            jobs
        };

        info!(count = jobs.len(), "Resuming interrupted batch callbacks");
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            outcomes.push(self.run_job(job).await);
        }
        outcomes
    }

    /// Remove a pending callback without notifying anyone.
    ///
    /// Returns `false` when nothing pending is registered for the agent,
    /// including while its notification is already being delivered.
    pub async fn cancel(&self, agent_id: &str) -> bool {
        let job = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            if !state.callbacks.get(agent_id).is_some_and(|cb| cb.is_pending()) {
                return false;
            }
            let Some(removed) = state.callbacks.remove(agent_id) else {
                return false;
            };
            let job = removed
                .group_id
                .as_deref()
                .and_then(|group_id| detach_members(state, group_id, &[agent_id]));
            self.persist(state);
            job
        };

        count(Transition::Cancelled);
        info!(agent_id, "Cancelled callback");

        if let Some(job) = job {
            self.run_job(job).await;
        }
        true
    }

    /// Active callback for an agent.
    pub async fn get(&self, agent_id: &str) -> Option<Callback> {
        self.state.read().await.callbacks.get(agent_id).cloned()
    }

    /// Active callbacks, oldest first.
    pub async fn list_pending(&self) -> Vec<Callback> {
        let state = self.state.read().await;
        let mut pending: Vec<Callback> = state.callbacks.values().cloned().collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then_with(|| a.agent_id.cmp(&b.agent_id)));
        pending
    }

    /// Finished callbacks, oldest first.
    pub async fn list_history(&self) -> Vec<Callback> {
        self.state.read().await.history.iter().cloned().collect()
    }

    pub async fn list_groups(&self) -> Vec<CallbackGroup> {
        let state = self.state.read().await;
        let mut groups: Vec<CallbackGroup> = state.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        groups
    }

    pub async fn list_group_history(&self) -> Vec<CallbackGroup> {
        self.state.read().await.group_history.iter().cloned().collect()
    }

    /// Look up a group, active or finished.
    pub async fn group(&self, group_id: &str) -> Result<CallbackGroup, CallbackError> {
        let state = self.state.read().await;
        state
            .groups
            .get(group_id)
            .or_else(|| state.group_history.iter().rev().find(|g| g.id == group_id))
            .cloned()
            .ok_or_else(|| CallbackError::NotFound(format!("callback group {}", group_id)))
    }

    /// Install the agent existence check and sweep immediately.
    pub async fn set_agent_directory(&self, directory: Arc<dyn AgentDirectory>) -> Vec<String> {
        *self.directory.write().await = Some(directory);
        self.cleanup_orphaned().await
    }

    /// Retire pending callbacks whose agent no longer exists.
    ///
    /// Returns the orphaned agent ids. Does nothing until a directory is set.
    pub async fn cleanup_orphaned(&self) -> Vec<String> {
        let Some(directory) = self.directory.read().await.clone() else {
            return Vec::new();
        };

        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let (orphaned, jobs) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let mut orphaned: Vec<String> = state
                .callbacks
                .values()
                .filter(|cb| cb.is_pending())
                .filter(|cb| {
                    // A member that already reported is only waiting on its siblings.
                    !cb.group_id
                        .as_deref()
                        .and_then(|g| state.groups.get(g))
                        .is_some_and(|g| g.has_result(&cb.agent_id))
                })
                .filter(|cb| !directory.agent_exists(&cb.agent_id))
                .map(|cb| cb.agent_id.clone())
                .collect();
            orphaned.sort();

            if orphaned.is_empty() {
                return Vec::new();
            }

            let now = Utc::now();
            let mut touched: Vec<String> = Vec::new();
            for agent_id in &orphaned {
                let Some(mut callback) = state.callbacks.remove(agent_id) else {
                    continue;
                };
                callback.finish(CallbackStatus::Orphaned, None, now);
                if let Some(group_id) = callback.group_id.clone() {
                    if !touched.contains(&group_id) {
                        touched.push(group_id);
                    }
                }
                count(Transition::Orphaned);
                warn!(agent_id = %agent_id, callback_id = %callback.id, "Callback orphaned");
                push_bounded(&mut state.history, callback, CALLBACK_HISTORY_LIMIT);
            }

            let mut jobs = Vec::new();
            for group_id in &touched {
                let Some(group) = state.groups.get(group_id) else {
                    continue;
                };
                let gone: Vec<String> = group
                    .agent_ids
                    .iter()
                    .filter(|id| orphaned.contains(*id))
                    .cloned()
                    .collect();

                if gone.len() == group.agent_ids.len() {
                    if let Some(mut group) = state.groups.remove(group_id) {
                        group.finish(CallbackStatus::Orphaned, None, now);
                        warn!(group_id = %group_id, "Callback group orphaned");
                        push_bounded(&mut state.group_history, group, GROUP_HISTORY_LIMIT);
                    }
                } else {
                    let gone: Vec<&str> = gone.iter().map(String::as_str).collect();
                    jobs.extend(detach_members(state, group_id, &gone));
                }
            }

            self.persist(state);
            (orphaned, jobs)
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("registry.cleanup_orphaned", start.elapsed());

        info!(count = orphaned.len(), "Cleaned up orphaned callbacks");
        for job in jobs {
            self.run_job(job).await;
        }
        orphaned
    }

    async fn run_job(&self, job: DispatchJob) -> DispatchOutcome {
        match job {
            DispatchJob::Single { callback, info } => {
                let result = self.dispatcher.dispatch_single(&callback, &info).await;
                let outcome = outcome_of(&result);
                self.commit_single(callback, &outcome).await;
                outcome
            }
            DispatchJob::Group { group, members } => {
                let result = self.dispatcher.dispatch_group(&group, &members).await;
                let outcome = outcome_of(&result);
                self.commit_group(group, members, &outcome).await;
                outcome
            }
        }
    }

    async fn commit_single(&self, callback: Callback, outcome: &DispatchOutcome) {
        let (status, error) = terminal(outcome);
        let now = Utc::now();

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        // A newer registration for the same agent stays active.
        if state
            .callbacks
            .get(&callback.agent_id)
            .is_some_and(|cb| cb.id == callback.id)
        {
            state.callbacks.remove(&callback.agent_id);
        }

        let mut finished = callback;
        finished.finish(status, error, now);
        log_terminal(&finished.agent_id, &finished.id, status, error);
        push_bounded(&mut state.history, finished, CALLBACK_HISTORY_LIMIT);
        self.persist(state);
    }

    async fn commit_group(&self, group: CallbackGroup, members: Vec<Callback>, outcome: &DispatchOutcome) {
        let (status, error) = terminal(outcome);
        let now = Utc::now();

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        for member in members {
            if state
                .callbacks
                .get(&member.agent_id)
                .is_some_and(|cb| cb.id == member.id)
            {
                state.callbacks.remove(&member.agent_id);
            }
            let mut finished = member;
            finished.finish(status, error, now);
            count(transition_for(status));
            push_bounded(&mut state.history, finished, CALLBACK_HISTORY_LIMIT);
        }

        let mut finished = state.groups.remove(&group.id).unwrap_or(group);
        finished.finish(status, error, now);
        match error {
            Some(error) => warn!(group_id = %finished.id, error, "Batch callback failed"),
            None => info!(group_id = %finished.id, members = finished.agent_ids.len(), "Batch callback completed"),
        }
        push_bounded(&mut state.group_history, finished, GROUP_HISTORY_LIMIT);
        self.persist(state);
    }

    fn persist(&self, state: &StoreSnapshot) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(state) {
                warn!(error = %e, path = %store.path().display(), "Failed to persist callbacks");
            }
        }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("dispatcher", &self.dispatcher)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Insert an active callback, detaching the pending group member it replaces.
fn install(state: &mut StoreSnapshot, callback: Callback) -> Option<DispatchJob> {
    let agent_id = callback.agent_id.clone();
    let replaced = state.callbacks.insert(agent_id.clone(), callback)?;
    if !replaced.is_pending() {
        return None;
    }
    let group_id = replaced.group_id?;
    detach_members(state, &group_id, &[agent_id.as_str()])
}

/// Drop members from a group. An emptied group is discarded; a group whose
/// remaining members have all reported starts dispatching.
fn detach_members(state: &mut StoreSnapshot, group_id: &str, agent_ids: &[&str]) -> Option<DispatchJob> {
    let group = state.groups.get_mut(group_id)?;
    group.agent_ids.retain(|id| !agent_ids.contains(&id.as_str()));
    for agent_id in agent_ids {
        group.results.remove(*agent_id);
    }

    if group.agent_ids.is_empty() {
        state.groups.remove(group_id);
        debug!(group_id, "Discarded empty callback group");
        return None;
    }
    if group.status == CallbackStatus::Pending && group.is_ready() {
        return begin_group(state, group_id);
    }
    None
}

fn begin_single(state: &mut StoreSnapshot, info: CompletionInfo) -> Option<DispatchJob> {
    let callback = state.callbacks.get_mut(&info.agent_id)?;
    callback.status = CallbackStatus::Dispatching;
    Some(DispatchJob::Single {
        callback: callback.clone(),
        info,
    })
}

fn begin_group(state: &mut StoreSnapshot, group_id: &str) -> Option<DispatchJob> {
    let group = state.groups.get_mut(group_id)?;
    group.status = CallbackStatus::Dispatching;
    let group = group.clone();

    let members = group
        .agent_ids
        .iter()
        .filter_map(|id| {
            let callback = state.callbacks.get_mut(id)?;
            if callback.group_id.as_deref() != Some(group_id) {
                return None;
            }
            callback.status = CallbackStatus::Dispatching;
            Some(callback.clone())
        })
        .collect();

    Some(DispatchJob::Group { group, members })
}

fn outcome_of(result: &Result<(), CallbackError>) -> DispatchOutcome {
    match result {
        Ok(()) => DispatchOutcome::Completed,
        Err(e) => DispatchOutcome::Failed(e.detail().to_string()),
    }
}

fn terminal(outcome: &DispatchOutcome) -> (CallbackStatus, Option<&str>) {
    match outcome {
        DispatchOutcome::Failed(error) => (CallbackStatus::Failed, Some(error.as_str())),
        _ => (CallbackStatus::Completed, None),
    }
}

fn transition_for(status: CallbackStatus) -> Transition {
    match status {
        CallbackStatus::Failed => Transition::Failed,
        CallbackStatus::Orphaned => Transition::Orphaned,
        _ => Transition::Completed,
    }
}

fn log_terminal(agent_id: &str, callback_id: &str, status: CallbackStatus, error: Option<&str>) {
    count(transition_for(status));
    match error {
        Some(error) => warn!(agent_id, callback_id, error, "Callback failed"),
        None => info!(agent_id, callback_id, "Callback completed"),
    }
}

fn count(transition: Transition) {
    #[cfg(feature = "telemetry")]
    GLOBAL_METRICS.record_transition(transition);
    #[cfg(not(feature = "telemetry"))]
    let _ = transition;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{CallContext, CallPlacer, MockCallPlacer, MockEmailSender};
    use crate::error::ChannelError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn email_sender(times: usize) -> MockEmailSender {
        let mut mock = MockEmailSender::new();
        mock.expect_is_configured().return_const(true);
        mock.expect_send_email().times(times).returning(|_, _, _| Ok(()));
        mock
    }

    fn registry(sender: MockEmailSender) -> CallbackRegistry {
        CallbackRegistry::in_memory(NotificationDispatcher::new("Tony").with_email_sender(Arc::new(sender)))
    }

    fn agent(id: &str) -> AgentInfo {
        AgentInfo::new(id, format!("Agent {}", id)).with_task(format!("task {}", id))
    }

    fn contact() -> Contact {
        Contact::email("ada@example.com", "Ada")
    }

    /// Holds every call open until released.
    struct HeldCalls {
        release: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl CallPlacer for HeldCalls {
        fn is_configured(&self) -> bool {
            true
        }

        async fn place_call(&self, _phone: &str, _name: &str, _context: &CallContext) -> Result<String, ChannelError> {
            self.release.notified().await;
            Ok("call-1".to_string())
        }
    }

    /// Write the state a process leaves behind when it stops while a ready
    /// batch of "a" and "b" is being delivered.
    fn save_interrupted_batch(temp: &TempDir) -> String {
        let contact = contact();
        let mut group = CallbackGroup::new(vec!["a".into(), "b".into()], NotifyMethod::Email, &contact, "Tony");
        group.status = CallbackStatus::Dispatching;

        let mut snapshot = StoreSnapshot::default();
        for member in [agent("a"), agent("b")] {
            let mut cb = Callback::new(&member, NotifyMethod::Email, &contact, "Tony", Some(group.id.clone()));
            cb.status = CallbackStatus::Dispatching;
            group
                .results
                .insert(member.id.clone(), CompletionInfo::success(member.id.clone(), member.name.clone(), "ok"));
            snapshot.callbacks.insert(member.id.clone(), cb);
        }
        let group_id = group.id.clone();
        snapshot.groups.insert(group_id.clone(), group);
        CallbackStore::in_dir(temp.path()).save(&snapshot).unwrap();
        group_id
    }

    #[tokio::test]
    async fn test_register_rejects_missing_phone() {
        let mut placer = MockCallPlacer::new();
        placer.expect_is_configured().return_const(true);
        let registry = CallbackRegistry::in_memory(
            NotificationDispatcher::new("Tony").with_call_placer(Arc::new(placer)),
        );

        let err = registry
            .register(agent("a"), NotifyMethod::Call, Contact::email("x@y.com", ""))
            .await
            .unwrap_err();
        assert_eq!(err, CallbackError::validation("phone number required for call callback"));
        assert!(registry.list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_unconfigured_email() {
        let registry = CallbackRegistry::in_memory(NotificationDispatcher::new("Tony"));
        let err = registry
            .register(agent("a"), NotifyMethod::Email, contact())
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::Configuration(_)));
        assert!(!registry.can_email());
    }

    #[tokio::test]
    async fn test_complete_single_once() {
        let registry = registry(email_sender(1));
        let cb = registry.register(agent("a"), NotifyMethod::Email, contact()).await.unwrap();
        assert_eq!(registry.get("a").await.unwrap().id, cb.id);

        let first = registry.on_agent_complete(CompletionInfo::success("a", "Agent a", "done")).await;
        assert_eq!(first, DispatchOutcome::Completed);
        let second = registry.on_agent_complete(CompletionInfo::success("a", "Agent a", "done")).await;
        assert_eq!(second, DispatchOutcome::Ignored);

        assert!(registry.get("a").await.is_none());
        let history = registry.list_history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CallbackStatus::Completed);
        assert!(history[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_agent_ignored() {
        let registry = registry(email_sender(0));
        let outcome = registry.on_agent_complete(CompletionInfo::success("ghost", "Ghost", "")).await;
        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert!(registry.list_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_recorded() {
        let mut sender = MockEmailSender::new();
        sender.expect_is_configured().return_const(true);
        sender
            .expect_send_email()
            .returning(|_, _, _| Err(ChannelError::api("rejected", 550)));
        let registry = registry(sender);

        registry.register(agent("a"), NotifyMethod::Email, contact()).await.unwrap();
        let outcome = registry.on_agent_complete(CompletionInfo::success("a", "Agent a", "done")).await;
        assert_eq!(outcome, DispatchOutcome::Failed("API error: rejected".to_string()));

        let history = registry.list_history().await;
        assert_eq!(history[0].status, CallbackStatus::Failed);
        assert_eq!(history[0].error, "API error: rejected");
    }

    #[tokio::test]
    async fn test_batch_dispatches_after_last_member() {
        let registry = registry(email_sender(1));
        let group = registry
            .register_batch(vec![agent("a"), agent("b"), agent("c")], NotifyMethod::Email, contact())
            .await
            .unwrap();
        assert_eq!(registry.list_pending().await.len(), 3);

        let outcome = registry.on_agent_complete(CompletionInfo::success("b", "B", "ok")).await;
        assert_eq!(outcome, DispatchOutcome::Recorded { group_id: group.id.clone(), remaining: 2 });
        // A second report from the same member does not count twice.
        let dup = registry.on_agent_complete(CompletionInfo::success("b", "B", "ok")).await;
        assert_eq!(dup, DispatchOutcome::Ignored);
        registry.on_agent_complete(CompletionInfo::failure("a", "A", "boom")).await;
        let last = registry.on_agent_complete(CompletionInfo::success("c", "C", "ok")).await;
        assert_eq!(last, DispatchOutcome::Completed);

        assert!(registry.list_pending().await.is_empty());
        assert!(registry.list_groups().await.is_empty());
        let finished = registry.group(&group.id).await.unwrap();
        assert_eq!(finished.status, CallbackStatus::Completed);
        assert_eq!(finished.results.len(), 3);
        let history = registry.list_history().await;
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|cb| cb.status == CallbackStatus::Completed));
    }

    #[tokio::test]
    async fn test_batch_barrier_under_concurrency() {
        let registry = Arc::new(registry(email_sender(1)));
        let ids: Vec<String> = (0..8).map(|i| format!("agent-{}", i)).collect();
        registry
            .register_batch(ids.iter().map(|id| agent(id)).collect(), NotifyMethod::Email, contact())
            .await
            .unwrap();

        let dispatched = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let registry = Arc::clone(&registry);
                let dispatched = Arc::clone(&dispatched);
                tokio::spawn(async move {
                    let outcome = registry
                        .on_agent_complete(CompletionInfo::success(id.clone(), id, "ok"))
                        .await;
                    if outcome == DispatchOutcome::Completed {
                        dispatched.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(registry.list_group_history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let registry = registry(email_sender(0));
        let err = registry
            .register_batch(Vec::new(), NotifyMethod::Email, contact())
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "batch requires at least one agent");
    }

    #[tokio::test]
    async fn test_cancel_leaves_no_history() {
        let registry = registry(email_sender(0));
        registry.register(agent("a"), NotifyMethod::Email, contact()).await.unwrap();

        assert!(registry.cancel("a").await);
        assert!(!registry.cancel("a").await);
        assert!(registry.get("a").await.is_none());
        assert!(registry.list_history().await.is_empty());

        let outcome = registry.on_agent_complete(CompletionInfo::success("a", "A", "ok")).await;
        assert_eq!(outcome, DispatchOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_cancel_member_releases_group() {
        let registry = registry(email_sender(1));
        let group = registry
            .register_batch(vec![agent("a"), agent("b")], NotifyMethod::Email, contact())
            .await
            .unwrap();

        registry.on_agent_complete(CompletionInfo::success("a", "A", "ok")).await;
        assert!(registry.cancel("b").await);

        let finished = registry.group(&group.id).await.unwrap();
        assert_eq!(finished.status, CallbackStatus::Completed);
        assert_eq!(finished.agent_ids, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_all_members_discards_group() {
        let registry = registry(email_sender(0));
        let group = registry
            .register_batch(vec![agent("a"), agent("b")], NotifyMethod::Email, contact())
            .await
            .unwrap();

        assert!(registry.cancel("a").await);
        assert!(registry.cancel("b").await);
        assert!(registry.list_groups().await.is_empty());
        assert!(matches!(
            registry.group(&group.id).await,
            Err(CallbackError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reregister_replaces_callback() {
        let registry = registry(email_sender(1));
        let first = registry.register(agent("a"), NotifyMethod::Email, contact()).await.unwrap();
        let second = registry
            .register(agent("a"), NotifyMethod::Email, Contact::email("bob@example.com", "Bob"))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(registry.list_pending().await.len(), 1);
        assert_eq!(registry.get("a").await.unwrap().customer_email, "bob@example.com");
    }

    #[tokio::test]
    async fn test_cleanup_orphaned() {
        let registry = registry(email_sender(0));
        registry.register(agent("alive"), NotifyMethod::Email, contact()).await.unwrap();
        registry.register(agent("gone"), NotifyMethod::Email, contact()).await.unwrap();

        // Nothing happens without a directory.
        assert!(registry.cleanup_orphaned().await.is_empty());

        let orphaned = registry
            .set_agent_directory(Arc::new(|id: &str| id == "alive"))
            .await;
        assert_eq!(orphaned, vec!["gone".to_string()]);

        assert!(registry.get("alive").await.is_some());
        let history = registry.list_history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CallbackStatus::Orphaned);
        assert!(history[0].error.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_skips_reported_members_and_releases_group() {
        let registry = registry(email_sender(1));
        let group = registry
            .register_batch(vec![agent("a"), agent("b")], NotifyMethod::Email, contact())
            .await
            .unwrap();
        registry.on_agent_complete(CompletionInfo::success("a", "A", "ok")).await;

        // "a" already reported, so only "b" is orphaned; the group then fires.
        let orphaned = registry.set_agent_directory(Arc::new(|_: &str| false)).await;
        assert_eq!(orphaned, vec!["b".to_string()]);

        let finished = registry.group(&group.id).await.unwrap();
        assert_eq!(finished.status, CallbackStatus::Completed);
    }

    #[tokio::test]
    async fn test_cleanup_retires_fully_orphaned_group() {
        let registry = registry(email_sender(0));
        let group = registry
            .register_batch(vec![agent("a"), agent("b")], NotifyMethod::Email, contact())
            .await
            .unwrap();

        let orphaned = registry.set_agent_directory(Arc::new(|_: &str| false)).await;
        assert_eq!(orphaned.len(), 2);

        let retired = registry.group(&group.id).await.unwrap();
        assert_eq!(retired.status, CallbackStatus::Orphaned);
        assert_eq!(retired.agent_ids.len(), 2);
        assert!(registry.list_groups().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let mut sender = MockEmailSender::new();
        sender.expect_is_configured().return_const(true);
        sender.expect_send_email().returning(|_, _, _| Ok(()));
        let registry = registry(sender);

        for i in 0..(CALLBACK_HISTORY_LIMIT + 5) {
            let id = format!("agent-{}", i);
            registry.register(agent(&id), NotifyMethod::Email, contact()).await.unwrap();
            registry.on_agent_complete(CompletionInfo::success(id.clone(), id, "ok")).await;
        }

        let history = registry.list_history().await;
        assert_eq!(history.len(), CALLBACK_HISTORY_LIMIT);
        assert_eq!(history[0].agent_id, "agent-5");
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let temp = TempDir::new().unwrap();
        let dispatcher = || NotificationDispatcher::new("Tony").with_email_sender(Arc::new(email_sender(1)));

        let (before_pending, before_history) = {
            let registry = CallbackRegistry::new(dispatcher(), CallbackStore::in_dir(temp.path()));
            registry.register(agent("a"), NotifyMethod::Email, contact()).await.unwrap();
            registry.register(agent("b"), NotifyMethod::Email, contact()).await.unwrap();
            registry.on_agent_complete(CompletionInfo::success("a", "A", "ok")).await;
            (registry.list_pending().await, registry.list_history().await)
        };
        assert_eq!(before_history.len(), 1);

        let reloaded = CallbackRegistry::new(dispatcher(), CallbackStore::in_dir(temp.path()));
        let pending = reloaded.list_pending().await;
        assert_eq!(pending, before_pending);
        assert_eq!(pending[0].agent_id, "b");
        assert_eq!(reloaded.list_history().await, before_history);

        let outcome = reloaded.on_agent_complete(CompletionInfo::success("b", "B", "ok")).await;
        assert_eq!(outcome, DispatchOutcome::Completed);
    }

    #[tokio::test]
    async fn test_group_history_is_bounded() {
        let mut sender = MockEmailSender::new();
        sender.expect_is_configured().return_const(true);
        sender.expect_send_email().returning(|_, _, _| Ok(()));
        let registry = registry(sender);

        let mut group_ids = Vec::new();
        for i in 0..(GROUP_HISTORY_LIMIT + 2) {
            let id = format!("agent-{}", i);
            let group = registry
                .register_batch(vec![agent(&id)], NotifyMethod::Email, contact())
                .await
                .unwrap();
            registry.on_agent_complete(CompletionInfo::success(id.clone(), id, "ok")).await;
            group_ids.push(group.id);
        }

        let history = registry.list_group_history().await;
        assert_eq!(history.len(), GROUP_HISTORY_LIMIT);
        assert_eq!(history[0].id, group_ids[2]);
        assert_eq!(history[GROUP_HISTORY_LIMIT - 1].id, group_ids[GROUP_HISTORY_LIMIT + 1]);
        assert!(matches!(
            registry.group(&group_ids[0]).await,
            Err(CallbackError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_call_does_not_block_other_agents() {
        let release = Arc::new(Notify::new());
        let dispatcher = NotificationDispatcher::new("Tony")
            .with_call_placer(Arc::new(HeldCalls { release: Arc::clone(&release) }))
            .with_email_sender(Arc::new(email_sender(1)));
        let registry = Arc::new(CallbackRegistry::in_memory(dispatcher));

        registry
            .register(agent("a"), NotifyMethod::Call, Contact::new("+15551234567", "", "Ada"))
            .await
            .unwrap();
        registry.register(agent("b"), NotifyMethod::Email, contact()).await.unwrap();

        let slow = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.on_agent_complete(CompletionInfo::success("a", "A", "ok")).await })
        };
        while registry.get("a").await.map(|cb| cb.status) != Some(CallbackStatus::Dispatching) {
            tokio::task::yield_now().await;
        }

        let fast = tokio::time::timeout(
            Duration::from_secs(1),
            registry.on_agent_complete(CompletionInfo::success("b", "B", "ok")),
        )
        .await
        .expect("email completion waited on the held call");
        assert_eq!(fast, DispatchOutcome::Completed);
        assert!(!slow.is_finished());
        assert_eq!(registry.get("a").await.unwrap().status, CallbackStatus::Dispatching);

        release.notify_one();
        assert_eq!(slow.await.unwrap(), DispatchOutcome::Completed);
        assert_eq!(registry.list_history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_interrupted_batch_dispatches_on_next_report() {
        let temp = TempDir::new().unwrap();
        let group_id = save_interrupted_batch(&temp);
        let registry = CallbackRegistry::new(
            NotificationDispatcher::new("Tony").with_email_sender(Arc::new(email_sender(1))),
            CallbackStore::in_dir(temp.path()),
        );
        assert_eq!(registry.group(&group_id).await.unwrap().status, CallbackStatus::Pending);

        let first = registry.on_agent_complete(CompletionInfo::success("a", "A", "ok")).await;
        assert_eq!(first, DispatchOutcome::Completed);
        let second = registry.on_agent_complete(CompletionInfo::success("b", "B", "ok")).await;
        assert_eq!(second, DispatchOutcome::Ignored);

        assert!(registry.list_pending().await.is_empty());
        assert!(registry.list_groups().await.is_empty());
        let history = registry.list_group_history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, group_id);
        assert_eq!(history[0].status, CallbackStatus::Completed);
        assert!(registry.set_agent_directory(Arc::new(|_: &str| false)).await.is_empty());
    }

    #[tokio::test]
    async fn test_resume_interrupted_batch() {
        let temp = TempDir::new().unwrap();
        let group_id = save_interrupted_batch(&temp);
        let registry = CallbackRegistry::new(
            NotificationDispatcher::new("Tony").with_email_sender(Arc::new(email_sender(1))),
            CallbackStore::in_dir(temp.path()),
        );

        assert_eq!(registry.resume_interrupted().await, vec![DispatchOutcome::Completed]);
        assert!(registry.resume_interrupted().await.is_empty());
        assert_eq!(registry.group(&group_id).await.unwrap().status, CallbackStatus::Completed);
        assert_eq!(registry.list_history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_resume_skips_groups_still_waiting() {
        let registry = registry(email_sender(0));
        registry
            .register_batch(vec![agent("a"), agent("b")], NotifyMethod::Email, contact())
            .await
            .unwrap();
        registry.on_agent_complete(CompletionInfo::success("a", "A", "ok")).await;

        assert!(registry.resume_interrupted().await.is_empty());
        assert_eq!(registry.list_groups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_state_starts_empty() {
        let temp = TempDir::new().unwrap();
        let store = CallbackStore::in_dir(temp.path());
        std::fs::write(store.path(), "not json").unwrap();

        let registry = CallbackRegistry::new(NotificationDispatcher::new("Tony"), store);
        assert!(registry.list_pending().await.is_empty());
    }
}
