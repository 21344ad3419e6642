// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Slack Web API client implementing [`ChatPoster`].
//!
//! Only `chat.postMessage` is used. Slack answers HTTP 200 for most failures
//! and reports them in an `{ "ok": false, "error": "..." }` envelope, so the
//! envelope is checked on every response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChannelError;

use super::capability::ChatPoster;

/// Default Slack Web API base URL.
pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Slack bot client.
pub struct SlackClient {
    client: Client,
    bot_token: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SlackEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_base_url(bot_token, SLACK_API_BASE)
    }

    /// Create a client against a custom API base (useful for proxies and tests).
    pub fn with_base_url(bot_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            bot_token: bot_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatPoster for SlackClient {
    fn is_configured(&self) -> bool {
        !self.bot_token.is_empty()
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), ChannelError> {
        if !self.is_configured() {
            return Err(ChannelError::NotConfigured("Slack client not configured".to_string()));
        }

        debug!(channel = %channel_id, len = text.len(), "Posting Slack message");

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.bot_token)
            .json(&PostMessageRequest { channel: channel_id, text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::api(
                format!("Slack API error (status {}): {}", status.as_u16(), body),
                status.as_u16(),
            ));
        }

        let envelope: SlackEnvelope = response
            .json()
            .await
            .map_err(|e| ChannelError::Parse(e.to_string()))?;

        if !envelope.ok {
            return Err(ChannelError::api_message(format!(
                "Slack API error: {}",
                envelope.error.unwrap_or_else(|| "unknown_error".to_string())
            )));
        }

        Ok(())
    }
}
