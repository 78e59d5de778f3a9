//! Draining a chat event stream into a sink and an accumulated response.

use std::io::Write;

use futures::StreamExt;
use serde::Serialize;

use vertex_core::error::Result;
use vertex_core::message::UsageSummary;
use vertex_core::model::{ChatStream, ChatStreamEvent};

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The `[DONE]` sentinel was received.
    Done,
    /// The body ended without a sentinel.
    EndOfBody,
}

/// A payload that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub payload: String,
    pub error: String,
}

/// Everything a consumer saw over one streaming call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccumulatedResponse {
    pub text: String,
    pub usage: Option<UsageSummary>,
    pub finish_reason: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub termination: Termination,
}

impl Default for AccumulatedResponse {
    fn default() -> Self {
        Self {
            text: String::new(),
            usage: None,
            finish_reason: None,
            diagnostics: Vec::new(),
            termination: Termination::EndOfBody,
        }
    }
}

/// Consume `stream` to the end.
///
/// Each token is written to `out` and flushed as soon as it arrives.
/// Malformed payloads are reported on `err` and consumption continues.
/// A transport error aborts with that error; whatever was already
/// written to `out` stays there.
pub async fn drain_stream<O, E>(mut stream: ChatStream, out: &mut O, err: &mut E) -> Result<AccumulatedResponse>
where
    O: Write + ?Sized,
    E: Write + ?Sized,
{
    let mut response = AccumulatedResponse::default();

    while let Some(event) = stream.next().await {
        match event? {
            ChatStreamEvent::Token(text) => {
                out.write_all(text.as_bytes())?;
                out.flush()?;
                response.text.push_str(&text);
            }
            ChatStreamEvent::Finish(reason) => {
                response.finish_reason = Some(reason);
            }
            ChatStreamEvent::Usage(usage) => {
                if response.usage.is_none() {
                    response.usage = Some(usage);
                }
            }
            ChatStreamEvent::Malformed { payload, error } => {
                writeln!(err, "Failed to parse event: {payload} ({error})")?;
                response.diagnostics.push(Diagnostic { payload, error });
            }
            ChatStreamEvent::Done => {
                response.termination = Termination::Done;
                break;
            }
        }
    }

    Ok(response)
}

/// Like [`drain_stream`], discarding sink output.
pub async fn collect_stream(stream: ChatStream) -> Result<AccumulatedResponse> {
    drain_stream(stream, &mut std::io::sink(), &mut std::io::sink()).await
}
