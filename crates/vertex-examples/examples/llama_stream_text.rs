//! Llama on Vertex AI: render streamed text as it arrives, then token usage.
//!
//! ```bash
//! GOOGLE_CLOUD_PROJECT=my-project cargo run --example llama_stream_text -- "Plan a weekend in Lyon"
//! ```

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vertex_core::config::VertexConfig;
use vertex_core::message::ChatMessage;
use vertex_core::model::{CallOptions, ChatModel};
use vertex_llm::auth::default_token_provider;
use vertex_llm::openai::{DEFAULT_LLAMA_MODEL, OpenAIChatModel};
use vertex_llm::stream::drain_stream;

const DEFAULT_PROMPT: &str = "Summer travel plan to Paris";
const DEFAULT_LOCATION: &str = "us-east5";

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vertex_llm=info,llama_stream_text=info".into()),
        )
        .init();

    let prompt = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_PROMPT.into());

    let config = VertexConfig::from_env_with_default_location(DEFAULT_LOCATION)?;
    let tokens = default_token_provider(&config)?;
    let model = OpenAIChatModel::new(&config, tokens, DEFAULT_LLAMA_MODEL)?;

    println!("=== Streaming response ===\n");
    let stream = model
        .stream(&[ChatMessage::user(prompt)], &CallOptions::default())
        .await?;
    let response = drain_stream(stream, &mut std::io::stdout(), &mut std::io::stderr()).await?;
    println!();
    info!(
        termination = ?response.termination,
        malformed = response.diagnostics.len(),
        "Stream finished"
    );

    if let Some(usage) = response.usage {
        println!("\n=== Token usage ===");
        println!("Prompt tokens:     {}", usage.prompt_tokens);
        println!("Completion tokens: {}", usage.completion_tokens);
        println!("Total tokens:      {}", usage.total_tokens);
    }

    println!("\n=== Streaming completed ===");
    Ok(())
}
