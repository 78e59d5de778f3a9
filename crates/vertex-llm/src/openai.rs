//! OpenAI-compatible Chat Completions on Vertex AI.
//!
//! Vertex serves Llama and other model-as-a-service models behind
//! `endpoints/openapi/chat/completions`, speaking the OpenAI wire format.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use vertex_core::config::VertexConfig;
use vertex_core::error::Result;
use vertex_core::message::{ChatMessage, UsageSummary};
use vertex_core::model::{
    CallOptions, ChatDelta, ChatModel, ChatResult, ChatStream, ChatStreamEvent,
};

use crate::auth::TokenProvider;
use crate::endpoint::openapi_chat_completions_url;
use crate::http::{build_http_client, post_json, read_json};
use crate::sse::{DONE_SENTINEL, sse_data_stream};

pub const DEFAULT_LLAMA_MODEL: &str = "meta/llama-4-maverick-17b-128e-instruct-maas";

// ---------------------------------------------------------------------------
// Chat Completions request/response types
// ---------------------------------------------------------------------------

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(skip_serializing_if = "is_false")]
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Option<UsageSummary>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionMessage {
    pub content: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenAIChatModel
// ---------------------------------------------------------------------------

pub struct OpenAIChatModel {
    model_id: String,
    url: String,
    tokens: Arc<dyn TokenProvider>,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    pub fn new(
        config: &VertexConfig,
        tokens: Arc<dyn TokenProvider>,
        model_id: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            model_id: model_id.into(),
            url: openapi_chat_completions_url(config),
            tokens,
            client: build_http_client(config)?,
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.url
    }

    pub fn build_request(&self, messages: &[ChatMessage], options: &CallOptions) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model_id.clone(),
            stream: false,
            messages: messages.to_vec(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: if options.stop.is_empty() {
                None
            } else {
                Some(options.stop.clone())
            },
        }
    }

    /// Send a streaming request and return the response once its status is
    /// known to be a success. Nothing of the body has been read yet.
    pub async fn send_streaming(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response> {
        let mut request = request.clone();
        request.stream = true;
        post_json(&self.client, self.tokens.as_ref(), &self.url, &request).await
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    async fn generate(&self, messages: &[ChatMessage], options: &CallOptions) -> Result<ChatResult> {
        let request_body = self.build_request(messages, options);
        let response = post_json(&self.client, self.tokens.as_ref(), &self.url, &request_body).await?;
        let api_response: ChatCompletionResponse = read_json(response).await?;

        let choice = api_response.choices.into_iter().next();
        let finish_reason = choice.as_ref().and_then(|c| c.finish_reason.clone());
        let text = choice.and_then(|c| c.message.content).unwrap_or_default();

        Ok(ChatResult {
            message: ChatMessage::assistant(text),
            usage: api_response.usage,
            finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }

    async fn stream(&self, messages: &[ChatMessage], options: &CallOptions) -> Result<ChatStream> {
        let request_body = self.build_request(messages, options);
        let response = self.send_streaming(&request_body).await?;
        Ok(Box::pin(chat_completion_events(sse_data_stream(response))))
    }
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// Turn SSE `data:` payloads into chat stream events.
///
/// Ends after `[DONE]` (yielding `Done`) or when the payloads run out.
/// A payload that fails to parse becomes a `Malformed` event and the
/// stream keeps going. A transport error is passed through and ends it.
pub fn chat_completion_events<S>(data_stream: S) -> impl Stream<Item = Result<ChatStreamEvent>> + Send
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    async_stream::stream! {
        let mut data_stream = Box::pin(data_stream);
        let mut usage_emitted = false;

        while let Some(item) = data_stream.next().await {
            let data = match item {
                Ok(data) => data,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            };

            if data == DONE_SENTINEL {
                debug!("Stream finished with [DONE]");
                yield Ok(ChatStreamEvent::Done);
                break;
            }

            match parse_chat_chunk(&data) {
                Ok(delta) => {
                    for event in delta_events(delta, &mut usage_emitted) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    warn!(payload = %data, error = %e, "Malformed SSE payload");
                    yield Ok(ChatStreamEvent::Malformed {
                        payload: data,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Parse one chat-completion chunk.
///
/// Only `choices[0]` is inspected. Missing `choices` or `delta` simply
/// means no content. `usage` is read only alongside a `finish_reason`.
pub fn parse_chat_chunk(data: &str) -> std::result::Result<ChatDelta, serde_json::Error> {
    let json: Value = serde_json::from_str(data)?;
    if !json.is_object() {
        return Err(<serde_json::Error as serde::de::Error>::custom(
            "expected a JSON object",
        ));
    }

    let choice = &json["choices"][0];
    let content = choice["delta"]["content"].as_str().map(str::to_string);
    let finish_reason = choice["finish_reason"].as_str().map(str::to_string);
    let usage = if finish_reason.is_some() {
        json.get("usage").and_then(usage_from_value)
    } else {
        None
    };

    Ok(ChatDelta {
        content,
        finish_reason,
        usage,
    })
}

fn usage_from_value(usage: &Value) -> Option<UsageSummary> {
    if !usage.is_object() {
        return None;
    }
    let prompt = usage["prompt_tokens"].as_u64().unwrap_or(0);
    let completion = usage["completion_tokens"].as_u64().unwrap_or(0);
    let total = usage["total_tokens"].as_u64().unwrap_or(prompt + completion);
    Some(UsageSummary::new(prompt, completion, total))
}

fn delta_events(delta: ChatDelta, usage_emitted: &mut bool) -> Vec<ChatStreamEvent> {
    let mut events = Vec::new();
    if let Some(text) = delta.content {
        if !text.is_empty() {
            events.push(ChatStreamEvent::Token(text));
        }
    }
    if let Some(reason) = delta.finish_reason {
        events.push(ChatStreamEvent::Finish(reason));
    }
    if let Some(usage) = delta.usage {
        if !*usage_emitted {
            *usage_emitted = true;
            events.push(ChatStreamEvent::Usage(usage));
        }
    }
    events
}
