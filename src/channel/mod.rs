// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Outbound channels.
//!
//! Capability traits for chat, call and email delivery, the Slack, VAPI and
//! SMTP clients that implement them, and the router that replies on the
//! channel a request originally came from.

pub mod capability;
pub mod descriptor;
pub mod router;
pub mod slack;
pub mod smtp;
pub mod vapi;

pub use capability::{CallContext, CallPlacer, ChatPoster, EmailSender};
#[cfg(test)]
pub use capability::{MockCallPlacer, MockChatPoster, MockEmailSender};
pub use descriptor::{ChannelDescriptor, ChannelKind};
pub use router::{ChannelRouter, RouteOutcome, CHAT_RESULT_MAX_CHARS};
pub use slack::SlackClient;
pub use smtp::SmtpClient;
pub use vapi::VapiClient;
