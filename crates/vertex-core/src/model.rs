use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{ChatMessage, UsageSummary};

/// Options controlling a ChatModel invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallOptions {
    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// Result of a non-streaming chat call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    /// The assistant message.
    pub message: ChatMessage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSummary>,

    /// Why generation stopped, as reported by the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl ChatResult {
    pub fn text(&self) -> &str {
        &self.message.content
    }
}

/// Parsed view of one chat-completion chunk.
///
/// `usage` is only populated on the chunk that also carries a `finish_reason`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatDelta {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageSummary>,
}

/// Events emitted while consuming a streamed chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// A non-empty text fragment.
    Token(String),
    /// The model reported why it stopped. More events may follow.
    Finish(String),
    /// Token usage. Emitted at most once per stream.
    Usage(UsageSummary),
    /// A `data:` payload that could not be parsed. Consumption continues.
    Malformed { payload: String, error: String },
    /// The `[DONE]` sentinel was received.
    Done,
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatStreamEvent>> + Send>>;

/// Trait for chat models served from a Vertex AI endpoint.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a full response for the given messages.
    async fn generate(&self, messages: &[ChatMessage], options: &CallOptions) -> Result<ChatResult>;

    /// Return the model name/identifier.
    fn model_name(&self) -> &str;

    /// Stream a response fragment by fragment.
    ///
    /// Default implementation calls `generate` and replays the result as events.
    async fn stream(&self, messages: &[ChatMessage], options: &CallOptions) -> Result<ChatStream> {
        let result = self.generate(messages, options).await?;
        let mut events: Vec<Result<ChatStreamEvent>> = Vec::new();
        if !result.message.content.is_empty() {
            events.push(Ok(ChatStreamEvent::Token(result.message.content)));
        }
        if let Some(reason) = result.finish_reason {
            events.push(Ok(ChatStreamEvent::Finish(reason)));
        }
        if let Some(usage) = result.usage {
            events.push(Ok(ChatStreamEvent::Usage(usage)));
        }
        events.push(Ok(ChatStreamEvent::Done));
        Ok(Box::pin(futures::stream::iter(events)))
    }
}
