// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Every field is optional in the file; accessors fall back to defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::callback::{DEFAULT_DISPATCH_TIMEOUT, DEFAULT_REAP_INTERVAL};
use crate::channel::smtp::DEFAULT_SMTP_PORT;

/// Persona name used when none is configured.
pub const DEFAULT_PERSONA_NAME: &str = "Courier";

/// Directory (under the home directory) holding global config and state.
pub const COURIER_DIR: &str = ".courier";

/// Courier configuration, loaded from `courier.json`, `courier.yaml`,
/// `.courier/config.json` or `~/.courier/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierConfig {
    /// Directory holding `callbacks.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    pub persona: PersonaConfig,

    /// Upper bound for each provider request, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_timeout_secs: Option<u64>,

    /// Period of the orphan sweep, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reap_interval_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vapi: Option<VapiConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpConfig>,
}

/// The identity notifications are signed with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Reply-to address for outgoing email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VapiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default)]
    pub assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Outgoing mail server. `from` falls back to `user`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
}

impl SmtpConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SMTP_PORT)
    }

    /// Sender address, or the login user when none is set.
    pub fn sender(&self) -> &str {
        if self.from.is_empty() {
            &self.user
        } else {
            &self.from
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.sender().is_empty()
    }
}

impl VapiConfig {
    /// All three credentials are present.
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.phone_number_id.is_empty() && !self.assistant_id.is_empty()
    }
}

impl CourierConfig {
    /// Configured state directory, or `~/.courier` (`.courier` without a home).
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(COURIER_DIR))
                .unwrap_or_else(|| PathBuf::from(COURIER_DIR))
        })
    }

    pub fn persona_name(&self) -> &str {
        self.persona
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(DEFAULT_PERSONA_NAME)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        self.dispatch_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DISPATCH_TIMEOUT)
    }

    pub fn reap_interval(&self) -> Duration {
        self.reap_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REAP_INTERVAL)
    }

    /// Slack token, if one is set.
    pub fn slack_token(&self) -> Option<&str> {
        self.slack
            .as_ref()
            .map(|s| s.bot_token.as_str())
            .filter(|t| !t.is_empty())
    }

    /// VAPI settings, if every credential is set.
    pub fn vapi(&self) -> Option<&VapiConfig> {
        self.vapi.as_ref().filter(|v| v.is_complete())
    }

    /// SMTP settings, if a host and a sender are set.
    pub fn smtp(&self) -> Option<&SmtpConfig> {
        self.smtp.as_ref().filter(|s| s.is_complete())
    }
}
