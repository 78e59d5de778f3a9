//! Gemini on Vertex AI: one `generateContent` call.
//!
//! ```bash
//! GOOGLE_CLOUD_PROJECT=my-project cargo run --example gemini_generate -- "What is RAG?"
//! ```

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vertex_core::prelude::*;
use vertex_llm::auth::default_token_provider;
use vertex_llm::gemini::{DEFAULT_GEMINI_MODEL, GeminiChatModel};

const DEFAULT_PROMPT: &str = "AI agent와 RAG 차이 설명해 줘";

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vertex_llm=info,gemini_generate=info".into()),
        )
        .init();

    let prompt = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_PROMPT.into());

    let config = VertexConfig::from_env()?;
    let tokens = default_token_provider(&config)?;
    let model = GeminiChatModel::new(&config, tokens, DEFAULT_GEMINI_MODEL)?;
    info!(project = %config.project_id, location = %config.location, model = model.model_name(), "Calling generateContent");

    let result = model
        .generate(&[ChatMessage::user(prompt)], &CallOptions::default())
        .await?;

    println!("Response: {}", result.text());
    if let Some(usage) = result.usage {
        println!(
            "  (tokens: input={}, output={}, total={})",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        );
    }

    Ok(())
}
