// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Plain-text email composition for completion notifications.

use std::fmt::Write as _;

use crate::text::truncate;

/// Maximum subject length for single-task emails.
pub const SUBJECT_MAX_CHARS: usize = 50;

/// Maximum length of each result/error line in batch emails.
pub const BATCH_FIELD_MAX_CHARS: usize = 100;

/// A composed message ready for an [`EmailSender`](crate::channel::EmailSender).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Inputs for a single-task email.
#[derive(Debug, Clone, Default)]
pub struct TaskEmail<'a> {
    pub recipient_name: &'a str,
    pub recipient_email: &'a str,
    pub agent_id: &'a str,
    pub agent_name: &'a str,
    pub task_summary: &'a str,
    pub project_name: &'a str,
    pub result: &'a str,
    pub error: &'a str,
    pub view_url: Option<&'a str>,
    pub signature: &'a str,
}

impl TaskEmail<'_> {
    fn succeeded(&self) -> bool {
        self.error.is_empty()
    }
}

/// One line item of a batch email.
#[derive(Debug, Clone, Default)]
pub struct BatchItem<'a> {
    pub agent_name: &'a str,
    pub task_summary: &'a str,
    pub result: &'a str,
    pub error: &'a str,
}

impl BatchItem<'_> {
    fn succeeded(&self) -> bool {
        self.error.is_empty()
    }
}

/// Inputs for a batch email.
#[derive(Debug, Clone, Default)]
pub struct BatchEmail<'a> {
    pub recipient_name: &'a str,
    pub recipient_email: &'a str,
    pub items: Vec<BatchItem<'a>>,
    pub view_url: Option<&'a str>,
    pub signature: &'a str,
}

fn greeting(out: &mut String, name: &str) {
    if name.is_empty() {
        out.push_str("Hey,\n\n");
    } else {
        let _ = write!(out, "Hey {},\n\n", name);
    }
}

fn footer_line(signature: &str) -> String {
    if signature.is_empty() {
        "This is an automated notification.".to_string()
    } else {
        format!("This is an automated notification from {}.", signature)
    }
}

pub fn task_subject(email: &TaskEmail<'_>) -> String {
    let verb = if email.succeeded() { "completed" } else { "failed" };
    truncate(
        &format!("{} {}: {}", email.agent_name, verb, email.task_summary),
        SUBJECT_MAX_CHARS,
    )
}

pub fn task_body(email: &TaskEmail<'_>) -> String {
    let mut out = String::new();
    greeting(&mut out, email.recipient_name);

    if email.succeeded() {
        let _ = write!(out, "{} has finished working on your task.\n\n", email.agent_name);
    } else {
        let _ = write!(out, "{} encountered an issue with your task.\n\n", email.agent_name);
    }

    let _ = writeln!(out, "**Task:** {}", email.task_summary);
    if !email.project_name.is_empty() {
        let _ = writeln!(out, "**Project:** {}", email.project_name);
    }

    if email.succeeded() && !email.result.is_empty() {
        let _ = write!(out, "\n**Result:**\n{}\n", email.result);
    } else if !email.succeeded() {
        let _ = write!(out, "\n**Error:**\n{}\n", email.error);
    }

    if let Some(url) = email.view_url.filter(|u| !u.is_empty()) {
        let _ = write!(out, "\nView the project: {}\n", url);
    }

    let _ = write!(
        out,
        "\n---\nAgent ID: {}\n{}\n",
        email.agent_id,
        footer_line(email.signature)
    );
    out
}

pub fn compose_task_email(email: &TaskEmail<'_>) -> EmailMessage {
    EmailMessage {
        to: email.recipient_email.to_string(),
        subject: task_subject(email),
        body: task_body(email),
    }
}

pub fn batch_subject(email: &BatchEmail<'_>) -> String {
    let failed = email.items.iter().filter(|i| !i.succeeded()).count();
    let finished = email.items.len() - failed;
    if failed == 0 {
        format!("Your tasks are complete ({} finished)", finished)
    } else {
        format!("Your tasks are complete ({} finished, {} failed)", finished, failed)
    }
}

pub fn batch_body(email: &BatchEmail<'_>) -> String {
    let mut out = String::new();
    greeting(&mut out, email.recipient_name);
    out.push_str("Your tasks have been completed. Here's a summary:\n\n");

    for item in &email.items {
        let marker = if item.succeeded() { '✓' } else { '✗' };
        if item.task_summary.is_empty() {
            let _ = writeln!(out, "{} **{}**", marker, item.agent_name);
        } else {
            let _ = writeln!(out, "{} **{}** - {}", marker, item.agent_name, item.task_summary);
        }

        if item.succeeded() && !item.result.is_empty() {
            let _ = writeln!(out, "  Result: {}", truncate(item.result, BATCH_FIELD_MAX_CHARS));
        } else if !item.succeeded() {
            let _ = writeln!(out, "  Error: {}", truncate(item.error, BATCH_FIELD_MAX_CHARS));
        }
        out.push('\n');
    }

    if let Some(url) = email.view_url.filter(|u| !u.is_empty()) {
        let _ = writeln!(out, "View the project: {}", url);
    }

    let _ = write!(out, "\n---\n{}\n", footer_line(email.signature));
    out
}

pub fn compose_batch_email(email: &BatchEmail<'_>) -> EmailMessage {
    EmailMessage {
        to: email.recipient_email.to_string(),
        subject: batch_subject(email),
        body: batch_body(email),
    }
}
