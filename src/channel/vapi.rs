// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! VAPI outbound call client implementing [`CallPlacer`].
//!
//! A call is created with `POST /call`. The assistant receives the task
//! context through `assistantOverrides.variableValues` and opens the call with
//! a short first message naming the agent and the task.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChannelError;
use crate::text::truncate;

use super::capability::{CallContext, CallPlacer};

/// Default VAPI API base URL.
pub const VAPI_API_BASE: &str = "https://api.vapi.ai";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// VAPI client.
pub struct VapiClient {
    client: Client,
    api_key: String,
    phone_number_id: String,
    assistant_id: String,
    base_url: String,
    caller_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallRequest {
    phone_number_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    assistant_id: String,
    customer: Customer,
    #[serde(skip_serializing_if = "Option::is_none")]
    assistant_overrides: Option<AssistantOverrides>,
}

#[derive(Debug, Serialize)]
struct Customer {
    number: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssistantOverrides {
    variable_values: HashMap<String, String>,
    first_message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

impl VapiClient {
    pub fn new(
        api_key: impl Into<String>,
        phone_number_id: impl Into<String>,
        assistant_id: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.into(),
            phone_number_id: phone_number_id.into(),
            assistant_id: assistant_id.into(),
            base_url: VAPI_API_BASE.to_string(),
            caller_name: "your assistant".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Name the assistant introduces itself with.
    pub fn with_caller_name(mut self, name: impl Into<String>) -> Self {
        self.caller_name = name.into();
        self
    }

    fn build_request(&self, phone: &str, customer_name: &str, context: &CallContext) -> CallRequest {
        let variable_values = HashMap::from([
            ("agentName".to_string(), context.agent_name.clone()),
            ("taskSummary".to_string(), truncate(&context.task_summary, 100)),
            ("result".to_string(), truncate(&context.result, 200)),
            ("projectName".to_string(), context.project_name.clone()),
        ]);

        CallRequest {
            phone_number_id: self.phone_number_id.clone(),
            assistant_id: self.assistant_id.clone(),
            customer: Customer {
                number: phone.to_string(),
                name: customer_name.to_string(),
            },
            assistant_overrides: Some(AssistantOverrides {
                variable_values,
                first_message: self.first_message(context),
            }),
        }
    }

    fn first_message(&self, context: &CallContext) -> String {
        format!(
            "Hey, this is {}. I'm calling to let you know that {} has finished working on {}.",
            self.caller_name,
            context.agent_name,
            truncate(&context.task_summary, 50)
        )
    }
}

#[async_trait]
impl CallPlacer for VapiClient {
    fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.phone_number_id.is_empty() && !self.assistant_id.is_empty()
    }

    async fn place_call(
        &self,
        phone: &str,
        customer_name: &str,
        context: &CallContext,
    ) -> Result<String, ChannelError> {
        if !self.is_configured() {
            return Err(ChannelError::NotConfigured("VAPI client not configured".to_string()));
        }

        let request = self.build_request(phone, customer_name, context);

        let response = self
            .client
            .post(format!("{}/call", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::api(
                format!("VAPI API error (status {}): {}", status.as_u16(), body),
                status.as_u16(),
            ));
        }

        let call: CallResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Parse(e.to_string()))?;

        debug!(call_id = %call.id, status = ?call.status, "VAPI call created");
        Ok(call.id)
    }
}
