// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Courier - completion notifications for long-running agents.
//!
//! A requester asks to be told when an agent (or a batch of agents) finishes.
//! Courier remembers the request, waits for the completion report, and calls,
//! emails or posts back exactly once.
//!
//! # Architecture
//!
//! - [`callback`] - Callback registry, batch barrier, dispatcher, persistence and the orphan reaper
//! - [`channel`] - Capability traits, Slack and VAPI clients, and the channel router
//! - [`hub`] - Fans each completion event out to the registry and the router
//! - [`config`] - Configuration loading (JSON/YAML files plus environment)
//! - [`error`] - Error types and result aliases
//! - [`telemetry`] - Tracing setup and delivery metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use courier::config::load_config;
//! use courier::hub::NotificationHub;
//!
//! let config = load_config(&std::env::current_dir()?)?;
//! let hub = NotificationHub::from_config(&config, Some(email_sender));
//! let listener = hub.spawn(completion_rx);
//! ```

pub mod callback;
pub mod channel;
pub mod config;
pub mod error;
pub mod hub;
pub mod telemetry;
pub mod text;

// Re-export commonly used types at crate root
pub use callback::{
    AgentDirectory, AgentInfo, Callback, CallbackGroup, CallbackRegistry, CallbackStatus,
    CallbackStore, CompletionInfo, Contact, DispatchOutcome, NotificationDispatcher, NotifyMethod,
    OrphanReaper,
};
pub use channel::{
    CallContext, CallPlacer, ChannelDescriptor, ChannelKind, ChannelRouter, ChatPoster,
    EmailSender, RouteOutcome,
};
pub use config::CourierConfig;
pub use error::{CallbackError, ChannelError, ConfigError, Result, StoreError};
pub use hub::{CompletionEvent, NotificationHub};

/// Courier version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let _method: NotifyMethod = "both".parse().unwrap();
        let _descriptor = ChannelDescriptor::sync_api("req-1");
        let _config = CourierConfig::default();
    }
}
