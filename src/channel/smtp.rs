// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SMTP client implementing [`EmailSender`].
//!
//! Port 465 speaks TLS from the first byte; every other port upgrades with
//! STARTTLS when the server offers it. Credentials are only sent when both a
//! user and a password are set.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::error::ChannelError;

use super::capability::EmailSender;

/// Submission port used when none is configured.
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Implicit-TLS port.
const SMTPS_PORT: u16 = 465;

/// Plain-text mail over SMTP.
pub struct SmtpClient {
    host: String,
    port: u16,
    user: String,
    password: String,
    from: String,
}

impl SmtpClient {
    pub fn new(host: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SMTP_PORT,
            user: String::new(),
            password: String::new(),
            from: from.into(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    fn message(&self, to: &str, subject: &str, body: &str) -> Result<Message, ChannelError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| ChannelError::NotConfigured(format!("invalid sender address {}: {}", self.from, e)))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| ChannelError::api_message(format!("invalid recipient address {}: {}", to, e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .date_now()
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| ChannelError::api_message(format!("failed to build email: {}", e)))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, ChannelError> {
        let params = TlsParameters::new(self.host.clone()).map_err(|e| ChannelError::Network(e.to_string()))?;
        let tls = if self.port == SMTPS_PORT {
            Tls::Wrapper(params)
        } else {
            Tls::Opportunistic(params)
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.host.as_str())
            .port(self.port)
            .tls(tls);
        if !self.user.is_empty() && !self.password.is_empty() {
            builder = builder.credentials(Credentials::new(self.user.clone(), self.password.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl EmailSender for SmtpClient {
    fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.from.is_empty()
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), ChannelError> {
        if !self.is_configured() {
            return Err(ChannelError::NotConfigured("SMTP client not configured".to_string()));
        }

        let message = self.message(to, subject, body)?;
        debug!(host = %self.host, port = self.port, to, "Sending email");

        self.transport()?.send(message).await.map_err(|e| {
            if e.is_permanent() || e.is_transient() {
                ChannelError::api_message(format!("SMTP error: {}", e))
            } else {
                ChannelError::Network(e.to_string())
            }
        })?;
        Ok(())
    }
}
