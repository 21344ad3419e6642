// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Channel descriptors: how a requester arrived and how to reach them back.

use serde::{Deserialize, Serialize};

/// The channel a request originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Chat workspace message (Slack and friends).
    Chat,
    /// Inbound voice call.
    Voice,
    /// Synchronous API request; the caller gets the result on its own return path.
    SyncApi,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Voice => "voice",
            Self::SyncApi => "sync_api",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable metadata attached to a unit of work when it is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub kind: ChannelKind,
    /// Chat channel id for `Chat`; unused otherwise.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub routing_id: String,
    /// Chat user id, or the caller's phone number for `Voice`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub requester_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub requester_name: String,
    /// Email captured during a voice call, used as the fallback route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ChannelDescriptor {
    pub fn chat(
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: ChannelKind::Chat,
            routing_id: channel_id.into(),
            requester_id: user_id.into(),
            requester_name: user_name.into(),
            email: None,
        }
    }

    pub fn voice(phone: impl Into<String>, caller_name: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::Voice,
            routing_id: String::new(),
            requester_id: phone.into(),
            requester_name: caller_name.into(),
            email: None,
        }
    }

    pub fn sync_api(requester_id: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::SyncApi,
            routing_id: String::new(),
            requester_id: requester_id.into(),
            requester_name: String::new(),
            email: None,
        }
    }

    /// Attach an email address (blank addresses are ignored).
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        let email = email.into();
        self.email = if email.trim().is_empty() { None } else { Some(email) };
        self
    }

    /// Email fallback address, if one was captured.
    pub fn fallback_email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.is_empty())
    }
}
