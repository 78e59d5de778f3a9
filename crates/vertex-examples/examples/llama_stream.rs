//! Llama on Vertex AI: echo every raw SSE `data:` payload.
//!
//! ```bash
//! GOOGLE_CLOUD_PROJECT=my-project cargo run --example llama_stream
//! ```

use futures::StreamExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vertex_core::config::VertexConfig;
use vertex_core::message::ChatMessage;
use vertex_core::model::CallOptions;
use vertex_llm::auth::default_token_provider;
use vertex_llm::openai::{DEFAULT_LLAMA_MODEL, OpenAIChatModel};
use vertex_llm::sse::{DONE_SENTINEL, sse_data_stream};

const DEFAULT_PROMPT: &str = "Summer travel plan to Paris";
const DEFAULT_LOCATION: &str = "us-east5";

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vertex_llm=info,llama_stream=info".into()),
        )
        .init();

    let prompt = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_PROMPT.into());

    let config = VertexConfig::from_env_with_default_location(DEFAULT_LOCATION)?;
    let tokens = default_token_provider(&config)?;
    let model = OpenAIChatModel::new(&config, tokens, DEFAULT_LLAMA_MODEL)?;

    let mut request = model.build_request(&[ChatMessage::user(prompt)], &CallOptions::default());
    request.stream = true;
    println!("URL: {}", model.endpoint_url());
    println!("Request Body: {}", serde_json::to_string(&request)?);

    let response = model.send_streaming(&request).await?;
    let mut data_lines = Box::pin(sse_data_stream(response));
    while let Some(data) = data_lines.next().await {
        let data = data?;
        if data == DONE_SENTINEL {
            break;
        }
        println!("Received: {data}");
    }
    info!("Stream finished");

    Ok(())
}
