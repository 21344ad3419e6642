// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Completion callbacks.
//!
//! A requester registers interest in one agent (a [`Callback`]) or in a
//! batch of agents (a [`CallbackGroup`]). When the agent reports completion
//! the [`CallbackRegistry`] dispatches exactly one notification by call,
//! email or both, then moves the entry to bounded history.
//!
//! ```rust,ignore
//! let dispatcher = NotificationDispatcher::new("Tony").with_email_sender(sender);
//! let registry = CallbackRegistry::new(dispatcher, CallbackStore::in_dir(state_dir));
//!
//! registry.register(agent, NotifyMethod::Email, Contact::email("ada@example.com", "Ada")).await?;
//! registry.on_agent_complete(CompletionInfo::success(agent_id, name, "done")).await;
//! ```

pub mod dispatch;
pub mod email;
pub mod reaper;
pub mod registry;
pub mod store;
pub mod types;

pub use dispatch::{NotificationDispatcher, ProjectUrlFn, DEFAULT_DISPATCH_TIMEOUT};
pub use reaper::{AgentDirectory, OrphanReaper, ReaperHandle, DEFAULT_REAP_INTERVAL};
pub use registry::{CallbackRegistry, DispatchOutcome};
pub use store::{CallbackStore, StoreSnapshot, CALLBACK_HISTORY_LIMIT, GROUP_HISTORY_LIMIT};
pub use types::{
    AgentInfo, Callback, CallbackGroup, CallbackStatus, CompletionInfo, Contact, NotifyMethod,
};
