use thiserror::Error;

/// Top-level error type for the Vertex AI clients.
#[derive(Debug, Error)]
pub enum VertexError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    /// The request never produced a response (DNS, connect, TLS, send).
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The endpoint answered with a non-success status. The body is kept verbatim.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Reading the response body failed after streaming had started.
    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
}

impl ModelError {
    /// HTTP status code for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ModelError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, VertexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_display() {
        let err = ModelError::ApiRequest("timeout".into());
        assert_eq!(err.to_string(), "API request failed: timeout");
    }

    #[test]
    fn status_error_keeps_body_verbatim() {
        let err = ModelError::Status {
            status: 403,
            body: r#"{"error":{"code":403,"message":"Permission denied"}}"#.into(),
        };
        assert_eq!(
            err.to_string(),
            r#"HTTP 403: {"error":{"code":403,"message":"Permission denied"}}"#
        );
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn transport_error_has_no_status() {
        let err = ModelError::Transport("connection reset".into());
        assert_eq!(err.to_string(), "Transport error: connection reset");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn auth_error_display() {
        let err = AuthError::MissingCredentials("GOOGLE_APPLICATION_CREDENTIALS is not set".into());
        assert_eq!(
            err.to_string(),
            "Missing credentials: GOOGLE_APPLICATION_CREDENTIALS is not set"
        );
    }

    #[test]
    fn vertex_error_from_model_error() {
        let model_err = ModelError::Status {
            status: 401,
            body: "bad token".into(),
        };
        let err: VertexError = model_err.into();
        assert!(matches!(err, VertexError::Model(ModelError::Status { status: 401, .. })));
        assert!(err.to_string().contains("bad token"));
    }

    #[test]
    fn vertex_error_from_auth_error() {
        let auth_err = AuthError::TokenExchange("HTTP 400: invalid_grant".into());
        let err: VertexError = auth_err.into();
        assert!(matches!(err, VertexError::Auth(AuthError::TokenExchange(_))));
    }

    #[test]
    fn vertex_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        let err: VertexError = io_err.into();
        assert!(matches!(err, VertexError::Io(_)));
    }

    #[test]
    fn vertex_error_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not-json").unwrap_err();
        let err: VertexError = serde_err.into();
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
