//! Vertex AI endpoint URLs.

use vertex_core::config::VertexConfig;

/// OpenAI-compatible chat completions endpoint (Llama and other MaaS models).
pub fn openapi_chat_completions_url(config: &VertexConfig) -> String {
    format!(
        "{}/{}/endpoints/openapi/chat/completions",
        config.api_base_url(),
        config.location_path()
    )
}

/// `…/publishers/{publisher}/models/{model}:{method}`
pub fn publisher_model_url(config: &VertexConfig, publisher: &str, model: &str, method: &str) -> String {
    format!(
        "{}/{}/publishers/{}/models/{}:{}",
        config.api_base_url(),
        config.location_path(),
        publisher,
        model,
        method
    )
}

pub fn anthropic_raw_predict_url(config: &VertexConfig, model: &str) -> String {
    publisher_model_url(config, "anthropic", model, "rawPredict")
}

pub fn gemini_generate_content_url(config: &VertexConfig, model: &str) -> String {
    publisher_model_url(config, "google", model, "generateContent")
}
