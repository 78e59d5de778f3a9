//! Anthropic Claude on Vertex AI (`rawPredict`).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vertex_core::config::VertexConfig;
use vertex_core::error::Result;
use vertex_core::message::{ChatMessage, Role, UsageSummary};
use vertex_core::model::{CallOptions, ChatModel, ChatResult};

use crate::auth::TokenProvider;
use crate::endpoint::anthropic_raw_predict_url;
use crate::http::{build_http_client, post_json, read_json};

pub const ANTHROPIC_VERSION: &str = "vertex-2023-10-16";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-haiku@20240307";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

// ---------------------------------------------------------------------------
// Anthropic Messages API request/response types
// ---------------------------------------------------------------------------

/// Request body for `rawPredict`. The model is part of the URL, not the body.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    pub anthropic_version: String,
    pub messages: Vec<AnthropicMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub content: Vec<AnthropicResponseContent>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    pub usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicResponseContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl AnthropicResponse {
    /// Concatenated text of every `text` block.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                AnthropicResponseContent::Text { text } => Some(text.as_str()),
                AnthropicResponseContent::Other => None,
            })
            .collect()
    }

    pub fn usage_summary(&self) -> UsageSummary {
        UsageSummary::new(
            self.usage.input_tokens,
            self.usage.output_tokens,
            self.usage.input_tokens + self.usage.output_tokens,
        )
    }
}

// ---------------------------------------------------------------------------
// ClaudeChatModel
// ---------------------------------------------------------------------------

pub struct ClaudeChatModel {
    model_id: String,
    url: String,
    tokens: Arc<dyn TokenProvider>,
    client: reqwest::Client,
}

impl ClaudeChatModel {
    pub fn new(
        config: &VertexConfig,
        tokens: Arc<dyn TokenProvider>,
        model_id: impl Into<String>,
    ) -> Result<Self> {
        let model_id = model_id.into();
        Ok(Self {
            url: anthropic_raw_predict_url(config, &model_id),
            model_id,
            tokens,
            client: build_http_client(config)?,
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.url
    }

    pub fn build_request(&self, messages: &[ChatMessage], options: &CallOptions) -> AnthropicRequest {
        let mut system: Option<String> = None;
        let mut api_messages: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    system = Some(msg.content.clone());
                }
                Role::User | Role::Assistant => {
                    api_messages.push(AnthropicMessage {
                        role: msg.role.as_str().into(),
                        content: msg.content.clone(),
                    });
                }
            }
        }

        AnthropicRequest {
            anthropic_version: ANTHROPIC_VERSION.into(),
            messages: api_messages,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            temperature: options.temperature,
            stop_sequences: if options.stop.is_empty() {
                None
            } else {
                Some(options.stop.clone())
            },
        }
    }

    /// Send a prepared request and decode the response.
    pub async fn raw_predict(&self, request: &AnthropicRequest) -> Result<AnthropicResponse> {
        let response = post_json(&self.client, self.tokens.as_ref(), &self.url, request).await?;
        read_json(response).await
    }
}

#[async_trait]
impl ChatModel for ClaudeChatModel {
    async fn generate(&self, messages: &[ChatMessage], options: &CallOptions) -> Result<ChatResult> {
        let request_body = self.build_request(messages, options);
        let api_response = self.raw_predict(&request_body).await?;

        Ok(ChatResult {
            message: ChatMessage::assistant(api_response.text()),
            usage: Some(api_response.usage_summary()),
            finish_reason: api_response.stop_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
