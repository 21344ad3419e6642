// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Capability traits for the outbound channels.
//!
//! The registry and router never talk to a wire protocol directly; they are
//! handed implementations of these traits when they are built.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Context handed to the call provider so the voice assistant can brief the customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub agent_name: String,
    pub task_summary: String,
    pub result: String,
    pub project_name: String,
}

/// Posts a message into a chat channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatPoster: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), ChannelError>;
}

/// Places an outbound phone call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallPlacer: Send + Sync {
    fn is_configured(&self) -> bool;

    /// Returns the provider's call id.
    async fn place_call(
        &self,
        phone: &str,
        customer_name: &str,
        context: &CallContext,
    ) -> Result<String, ChannelError>;
}

/// Sends a plain-text email.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), ChannelError>;
}
