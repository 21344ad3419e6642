// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Callback data model.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CallbackError;

/// How the requester wants to be told about a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMethod {
    Call,
    Email,
    Both,
}

impl NotifyMethod {
    pub fn wants_call(self) -> bool {
        matches!(self, Self::Call | Self::Both)
    }

    pub fn wants_email(self) -> bool {
        matches!(self, Self::Email | Self::Both)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Email => "email",
            Self::Both => "both",
        }
    }
}

impl std::fmt::Display for NotifyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotifyMethod {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "call" => Ok(Self::Call),
            "email" => Ok(Self::Email),
            "both" => Ok(Self::Both),
            other => Err(CallbackError::validation(format!(
                "unknown callback method '{}' (expected call, email or both)",
                other
            ))),
        }
    }
}

/// Lifecycle state of a callback or group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    /// Waiting for the agent (or every group member) to finish.
    Pending,
    /// Notification in flight; no longer cancellable.
    Dispatching,
    Completed,
    Failed,
    /// The agent disappeared before reporting.
    Orphaned,
}

impl CallbackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Orphaned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatching => "dispatching",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Orphaned => "orphaned",
        }
    }
}

impl std::fmt::Display for CallbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who to contact and how to address them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl Contact {
    pub fn new(
        phone: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            phone: phone.into(),
            email: email.into(),
            name: name.into(),
        }
    }

    pub fn phone(phone: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(phone, "", name)
    }

    pub fn email(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new("", email, name)
    }
}

/// An agent whose completion someone is waiting on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub task_summary: String,
    pub project_name: String,
}

impl AgentInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_task(mut self, task_summary: impl Into<String>) -> Self {
        self.task_summary = task_summary.into();
        self
    }

    pub fn with_project(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = project_name.into();
        self
    }
}

/// Result snapshot for one finished agent. An empty `error` means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionInfo {
    pub agent_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl CompletionInfo {
    pub fn success(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            result: result.into(),
            ..Default::default()
        }
    }

    pub fn failure(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            error: error.into(),
            ..Default::default()
        }
    }

    pub fn with_project(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = project_name.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

/// One requester's registered interest in one agent's completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callback {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub task_summary: String,
    #[serde(default)]
    pub project_name: String,
    pub method: NotifyMethod,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customer_phone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customer_email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customer_name: String,
    #[serde(default)]
    pub persona_name: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: CallbackStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl Callback {
    pub(crate) fn new(
        agent: &AgentInfo,
        method: NotifyMethod,
        contact: &Contact,
        persona_name: &str,
        group_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!(
                "cb-{}-{}",
                agent.id,
                now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros() * 1_000)
            ),
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            task_summary: agent.task_summary.clone(),
            project_name: agent.project_name.clone(),
            method,
            customer_phone: contact.phone.clone(),
            customer_email: contact.email.clone(),
            customer_name: contact.name.clone(),
            persona_name: persona_name.to_string(),
            requested_at: now,
            completed_at: None,
            status: CallbackStatus::Pending,
            error: String::new(),
            group_id,
        }
    }

    pub fn is_grouped(&self) -> bool {
        self.group_id.as_deref().is_some_and(|g| !g.is_empty())
    }

    pub fn is_pending(&self) -> bool {
        self.status == CallbackStatus::Pending
    }

    /// Record a terminal transition.
    pub(crate) fn finish(&mut self, status: CallbackStatus, error: Option<&str>, at: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(at);
        self.error = error.unwrap_or_default().to_string();
    }
}

/// A batch of callbacks that produces one combined notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackGroup {
    pub id: String,
    /// Member agent ids in registration order.
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub results: HashMap<String, CompletionInfo>,
    pub method: NotifyMethod,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customer_phone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customer_email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customer_name: String,
    #[serde(default)]
    pub persona_name: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: CallbackStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl CallbackGroup {
    pub(crate) fn new(
        agent_ids: Vec<String>,
        method: NotifyMethod,
        contact: &Contact,
        persona_name: &str,
    ) -> Self {
        Self {
            id: format!("grp-{}", uuid::Uuid::new_v4()),
            agent_ids,
            results: HashMap::new(),
            method,
            customer_phone: contact.phone.clone(),
            customer_email: contact.email.clone(),
            customer_name: contact.name.clone(),
            persona_name: persona_name.to_string(),
            requested_at: Utc::now(),
            completed_at: None,
            status: CallbackStatus::Pending,
            error: String::new(),
        }
    }

    /// Barrier test: every member has reported.
    pub fn is_ready(&self) -> bool {
        !self.agent_ids.is_empty() && self.results.len() == self.agent_ids.len()
    }

    pub fn has_result(&self, agent_id: &str) -> bool {
        self.results.contains_key(agent_id)
    }

    /// Results in member registration order.
    pub fn ordered_results(&self) -> Vec<&CompletionInfo> {
        self.agent_ids
            .iter()
            .filter_map(|id| self.results.get(id))
            .collect()
    }

    pub(crate) fn finish(&mut self, status: CallbackStatus, error: Option<&str>, at: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(at);
        self.error = error.unwrap_or_default().to_string();
    }
}
