use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vertex_core::config::VertexConfig;
use vertex_core::error::Result;
use vertex_core::message::{ChatMessage, Role, UsageSummary};
use vertex_core::model::{CallOptions, ChatModel, ChatResult};

use crate::auth::TokenProvider;
use crate::endpoint::gemini_generate_content_url;
use crate::http::{build_http_client, post_json, read_json};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-lite";

// ---------------------------------------------------------------------------
// Gemini API request types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Gemini API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    pub candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "usageMetadata")]
    pub usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(rename = "finishReason", default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u64,
    #[serde(rename = "totalTokenCount", default)]
    pub total_token_count: u64,
}

impl GeminiResponse {
    fn first_candidate(&self) -> Option<&GeminiCandidate> {
        self.candidates.as_ref().and_then(|c| c.first())
    }

    /// Concatenated text of the first candidate's parts.
    pub fn text(&self) -> String {
        self.first_candidate()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn finish_reason(&self) -> Option<String> {
        self.first_candidate().and_then(|c| c.finish_reason.clone())
    }

    pub fn usage_summary(&self) -> Option<UsageSummary> {
        self.usage_metadata.as_ref().map(|u| {
            UsageSummary::new(
                u.prompt_token_count,
                u.candidates_token_count,
                u.total_token_count,
            )
        })
    }
}

fn text_content(role: Option<&str>, text: &str) -> GeminiContent {
    GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart {
            text: Some(text.to_string()),
        }],
    }
}

// ---------------------------------------------------------------------------
// GeminiChatModel
// ---------------------------------------------------------------------------

pub struct GeminiChatModel {
    model_id: String,
    url: String,
    tokens: Arc<dyn TokenProvider>,
    client: reqwest::Client,
}

impl GeminiChatModel {
    pub fn new(
        config: &VertexConfig,
        tokens: Arc<dyn TokenProvider>,
        model_id: impl Into<String>,
    ) -> Result<Self> {
        let model_id = model_id.into();
        Ok(Self {
            url: gemini_generate_content_url(config, &model_id),
            model_id,
            tokens,
            client: build_http_client(config)?,
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.url
    }

    pub fn build_request(&self, messages: &[ChatMessage], options: &CallOptions) -> GeminiRequest {
        let mut system_instruction = None;
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    system_instruction = Some(text_content(None, &msg.content));
                }
                Role::User => contents.push(text_content(Some("user"), &msg.content)),
                // Gemini calls the assistant side "model".
                Role::Assistant => contents.push(text_content(Some("model"), &msg.content)),
            }
        }

        let has_config =
            options.max_tokens.is_some() || options.temperature.is_some() || !options.stop.is_empty();
        let generation_config = has_config.then(|| GenerationConfig {
            max_output_tokens: options.max_tokens,
            temperature: options.temperature,
            stop_sequences: if options.stop.is_empty() {
                None
            } else {
                Some(options.stop.clone())
            },
        });

        GeminiRequest {
            contents,
            system_instruction,
            generation_config,
        }
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn generate(&self, messages: &[ChatMessage], options: &CallOptions) -> Result<ChatResult> {
        let request_body = self.build_request(messages, options);
        let response = post_json(&self.client, self.tokens.as_ref(), &self.url, &request_body).await?;
        let gemini_response: GeminiResponse = read_json(response).await?;

        Ok(ChatResult {
            message: ChatMessage::assistant(gemini_response.text()),
            usage: gemini_response.usage_summary(),
            finish_reason: gemini_response.finish_reason(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
