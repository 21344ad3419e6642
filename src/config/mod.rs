// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for courier.
//!
//! Sources, first match wins for the file:
//! - Working directory: `courier.json`, `courier.yaml`, `.courier/config.json`
//! - Global: `~/.courier/config.json`
//!
//! Environment variables (`COURIER_STATE_DIR`, `COURIER_PERSONA_NAME`,
//! `SLACK_BOT_TOKEN`, `VAPI_*`, `SMTP_*`) are applied on top.

mod loader;
mod types;

pub use loader::{
    apply_env_overrides, apply_overrides_from, find_config_file, get_global_config_path,
    load_config_file, load_global_config, load_workspace_config, save_config, CONFIG_FILES,
    ENV_PERSONA_NAME, ENV_SLACK_BOT_TOKEN, ENV_STATE_DIR, ENV_VAPI_API_KEY,
    ENV_SMTP_FROM, ENV_SMTP_HOST, ENV_SMTP_PASS, ENV_SMTP_PORT, ENV_SMTP_USER,
    ENV_VAPI_ASSISTANT_ID, ENV_VAPI_PHONE_NUMBER_ID, GLOBAL_CONFIG_FILE,
};

pub use types::{
    CourierConfig, PersonaConfig, SlackConfig, SmtpConfig, VapiConfig, COURIER_DIR,
    DEFAULT_PERSONA_NAME,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load the configuration for a working directory.
///
/// The working-directory file is preferred over the global one; with neither
/// present the defaults are used. Environment overrides are applied last.
pub fn load_config(workspace_root: &Path) -> Result<CourierConfig, ConfigError> {
    let mut config = match load_workspace_config(workspace_root)? {
        Some(config) => config,
        None => load_global_config()?.unwrap_or_default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}
