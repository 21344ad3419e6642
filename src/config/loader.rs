// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files and the environment.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::{CourierConfig, SlackConfig, SmtpConfig, VapiConfig, COURIER_DIR};

/// Config file names to search for in the working directory (in order).
pub const CONFIG_FILES: &[&str] = &["courier.json", "courier.yaml", ".courier/config.json"];

/// Global config file name inside `~/.courier`.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Environment variables that override file settings.
pub const ENV_STATE_DIR: &str = "COURIER_STATE_DIR";
pub const ENV_PERSONA_NAME: &str = "COURIER_PERSONA_NAME";
pub const ENV_SLACK_BOT_TOKEN: &str = "SLACK_BOT_TOKEN";
pub const ENV_VAPI_API_KEY: &str = "VAPI_API_KEY";
pub const ENV_VAPI_PHONE_NUMBER_ID: &str = "VAPI_PHONE_NUMBER_ID";
pub const ENV_VAPI_ASSISTANT_ID: &str = "VAPI_ASSISTANT_ID";
pub const ENV_SMTP_HOST: &str = "SMTP_HOST";
pub const ENV_SMTP_PORT: &str = "SMTP_PORT";
pub const ENV_SMTP_USER: &str = "SMTP_USER";
pub const ENV_SMTP_PASS: &str = "SMTP_PASS";
pub const ENV_SMTP_FROM: &str = "SMTP_FROM";

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(COURIER_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.courier/config.json.
pub fn load_global_config() -> Result<Option<CourierConfig>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// First config file present in `dir`, if any.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Load the working-directory configuration.
pub fn load_workspace_config(dir: &Path) -> Result<Option<CourierConfig>, ConfigError> {
    match find_config_file(dir) {
        Some(path) => load_config_file(&path).map(Some),
        None => Ok(None),
    }
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<CourierConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Apply environment overrides from the process environment.
pub fn apply_env_overrides(config: &mut CourierConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides from any key lookup. Blank values are ignored.
pub fn apply_overrides_from<F>(config: &mut CourierConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(dir) = get(ENV_STATE_DIR) {
        config.state_dir = Some(PathBuf::from(dir));
    }
    if let Some(name) = get(ENV_PERSONA_NAME) {
        config.persona.name = Some(name);
    }
    if let Some(token) = get(ENV_SLACK_BOT_TOKEN) {
        config.slack.get_or_insert_with(SlackConfig::default).bot_token = token;
    }

    let key = get(ENV_VAPI_API_KEY);
    let phone = get(ENV_VAPI_PHONE_NUMBER_ID);
    let assistant = get(ENV_VAPI_ASSISTANT_ID);
    if key.is_some() || phone.is_some() || assistant.is_some() {
        let vapi = config.vapi.get_or_insert_with(VapiConfig::default);
        if let Some(key) = key {
            vapi.api_key = key;
        }
        if let Some(phone) = phone {
            vapi.phone_number_id = phone;
        }
        if let Some(assistant) = assistant {
            vapi.assistant_id = assistant;
        }
    }

    let host = get(ENV_SMTP_HOST);
    // An unparseable port is ignored.
    let port = get(ENV_SMTP_PORT).and_then(|p| p.trim().parse::<u16>().ok());
    let user = get(ENV_SMTP_USER);
    let password = get(ENV_SMTP_PASS);
    let from = get(ENV_SMTP_FROM);
    if host.is_some() || port.is_some() || user.is_some() || password.is_some() || from.is_some() {
        let smtp = config.smtp.get_or_insert_with(SmtpConfig::default);
        if let Some(host) = host {
            smtp.host = host;
        }
        if port.is_some() {
            smtp.port = port;
        }
        if let Some(user) = user {
            smtp.user = user;
        }
        if let Some(password) = password {
            smtp.password = password;
        }
        if let Some(from) = from {
            smtp.from = from;
        }
    }
}

/// Write a configuration file as pretty JSON.
pub fn save_config(path: &Path, config: &CourierConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
