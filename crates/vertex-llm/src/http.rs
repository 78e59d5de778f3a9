//! Request plumbing shared by every model client.

use serde::Serialize;
use tracing::{debug, info, warn};

use vertex_core::config::VertexConfig;
use vertex_core::error::{ModelError, Result, VertexError};

use crate::auth::TokenProvider;

/// Build a reqwest client with the configured connect and read timeouts.
pub fn build_http_client(config: &VertexConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .read_timeout(config.read_timeout())
        .build()
        .map_err(|e| VertexError::Other(format!("failed to build HTTP client: {e}")))
}

/// POST `body` as JSON with a bearer token and return the response once
/// its status is known to be a success.
pub async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    tokens: &dyn TokenProvider,
    url: &str,
    body: &T,
) -> Result<reqwest::Response> {
    let token = tokens.access_token().await?;

    if tracing::enabled!(tracing::Level::DEBUG) {
        if let Ok(json) = serde_json::to_string(body) {
            debug!(%url, body = %json, "Request body");
        }
    }
    info!(%url, "Sending POST");

    let response = client
        .post(url)
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .map_err(|e| {
            warn!(%url, error = %e, "POST failed");
            VertexError::Model(ModelError::ApiRequest(e.to_string()))
        })?;

    ensure_success(response).await
}

/// Turn a non-success response into `ModelError::Status` carrying the body verbatim.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    info!(%status, "Response received");
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "failed to read response body".into());
    warn!(%status, body = %body, "API error");
    Err(VertexError::Model(ModelError::Status {
        status: status.as_u16(),
        body,
    }))
}

/// Read a success response as JSON.
pub async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| VertexError::Model(ModelError::InvalidResponse(e.to_string())))
}
