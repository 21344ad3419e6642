// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for courier.
//!
//! This module provides strongly-typed errors for the registry, the channel
//! clients, configuration and persistence, using `thiserror` for the
//! definitions and `anyhow` for propagation in glue code.

use thiserror::Error;

/// Errors returned by callback registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// A contact field required by the chosen method is missing.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The dispatch capability for the chosen method is not configured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Delivery through a provider failed.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CallbackError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// The message without the category prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::Validation(m) | Self::Configuration(m) | Self::Dispatch(m) | Self::NotFound(m) => m,
        }
    }

    /// Check if this error was raised before any state change.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Configuration(_))
    }
}

/// Errors raised by the chat, call and email capabilities.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Response parsing error: {0}")]
    Parse(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl ChannelError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::Api {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            status_code: None,
        }
    }

    /// Check if a later attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ChannelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {}", err))
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors that can occur while reading or writing the callback store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to save callbacks: {0}")]
    SaveFailed(String),

    #[error("Failed to load callbacks: {0}")]
    LoadFailed(String),

    #[error("Callback store corrupted: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_error_rejection() {
        assert!(CallbackError::validation("phone number required").is_rejection());
        assert!(CallbackError::configuration("call client not configured").is_rejection());
        assert!(!CallbackError::Dispatch("boom".to_string()).is_rejection());
        assert!(!CallbackError::NotFound("agent-1".to_string()).is_rejection());
    }

    #[test]
    fn test_callback_error_display() {
        let err = CallbackError::validation("phone number required for call callback");
        assert_eq!(
            err.to_string(),
            "Validation error: phone number required for call callback"
        );
        assert_eq!(err.detail(), "phone number required for call callback");
    }

    #[test]
    fn test_channel_error_api() {
        let err = ChannelError::api("Bad request", 400);
        match err {
            ChannelError::Api { message, status_code } => {
                assert_eq!(message, "Bad request");
                assert_eq!(status_code, Some(400));
            }
            _ => panic!("Expected Api"),
        }
    }

    #[test]
    fn test_channel_error_transient() {
        assert!(ChannelError::Network("reset".to_string()).is_transient());
        assert!(ChannelError::Timeout(30_000).is_transient());
        assert!(!ChannelError::NotConfigured("slack".to_string()).is_transient());
        assert!(!ChannelError::Unsupported("batch".to_string()).is_transient());
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::NotFound(_)));
    }
}
