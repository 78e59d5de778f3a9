//! Claude on Vertex AI through `rawPredict`.
//!
//! ```bash
//! GOOGLE_CLOUD_PROJECT=my-project cargo run --example claude_haiku
//! ```

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vertex_core::config::VertexConfig;
use vertex_core::message::ChatMessage;
use vertex_core::model::CallOptions;
use vertex_llm::auth::default_token_provider;
use vertex_llm::claude::{ClaudeChatModel, DEFAULT_CLAUDE_MODEL};

const DEFAULT_PROMPT: &str = "Tell me a story about building the best SDK!";

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vertex_llm=info,claude_haiku=info".into()),
        )
        .init();

    let prompt = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_PROMPT.into());

    let config = VertexConfig::from_env()?;
    let tokens = default_token_provider(&config)?;
    let model = ClaudeChatModel::new(&config, tokens, DEFAULT_CLAUDE_MODEL)?;

    let request = model.build_request(&[ChatMessage::user(prompt)], &CallOptions::default());
    println!("URL: {}", model.endpoint_url());
    println!("Request Body: {}", serde_json::to_string_pretty(&request)?);

    info!(project = %config.project_id, location = %config.location, model = DEFAULT_CLAUDE_MODEL, "Calling rawPredict");
    let response = model.raw_predict(&request).await?;

    println!("\nResponse:\n{}", response.text());
    let usage = response.usage_summary();
    println!(
        "\n(stop_reason: {}, tokens: input={}, output={}, total={})",
        response.stop_reason.as_deref().unwrap_or("none"),
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.total_tokens
    );

    Ok(())
}
