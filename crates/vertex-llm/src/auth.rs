//! Google OAuth2 access tokens for Vertex AI.
//!
//! Credentials come from a Google credentials JSON file, the same file
//! `GOOGLE_APPLICATION_CREDENTIALS` points at. Two kinds are supported:
//! `service_account` keys (signed JWT bearer grant) and `authorized_user`
//! files written by `gcloud auth application-default login` (refresh-token
//! grant). The current token is cached and refreshed only once it expires.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vertex_core::config::{ENV_CREDENTIALS, VertexConfig};
use vertex_core::error::{AuthError, Result, VertexError};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const ENV_ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ADC_FILE_NAME: &str = "application_default_credentials.json";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Tokens are treated as expired this long before their real expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Source of bearer tokens for outgoing requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token, e.g. from `gcloud auth print-access-token`.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &REDACTED)
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

// ---------------------------------------------------------------------------
// Credentials file
// ---------------------------------------------------------------------------

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GoogleCredentials {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserCredentials),
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Clone, Deserialize)]
pub struct AuthorizedUserCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub quota_project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

const REDACTED: &str = "<redacted>";

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &REDACTED)
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl std::fmt::Debug for AuthorizedUserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUserCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("refresh_token", &REDACTED)
            .field("quota_project_id", &self.quota_project_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl GoogleCredentials {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VertexError::Auth(AuthError::InvalidCredentials(e.to_string())))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VertexError::Auth(AuthError::MissingCredentials(format!(
                "cannot read {}: {e}",
                path.display()
            )))
        })?;
        Self::from_json(&contents)
    }

    pub fn token_uri(&self) -> &str {
        match self {
            GoogleCredentials::ServiceAccount(key) => &key.token_uri,
            GoogleCredentials::AuthorizedUser(user) => &user.token_uri,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GoogleCredentials::ServiceAccount(_) => "service_account",
            GoogleCredentials::AuthorizedUser(_) => "authorized_user",
        }
    }
}

/// Path gcloud writes application default credentials to.
pub fn well_known_credentials_path() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        dirs::config_dir().map(|dir| dir.join("gcloud").join(ADC_FILE_NAME))
    }
    #[cfg(not(windows))]
    {
        dirs::home_dir().map(|home| home.join(".config").join("gcloud").join(ADC_FILE_NAME))
    }
}

// ---------------------------------------------------------------------------
// Token exchange
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Token provider backed by a Google credentials file.
pub struct GoogleTokenProvider {
    credentials: GoogleCredentials,
    scopes: Vec<String>,
    token_uri: String,
    client: reqwest::Client,
    cached: Mutex<Option<AccessToken>>,
}

impl GoogleTokenProvider {
    pub fn new(credentials: GoogleCredentials) -> Self {
        let token_uri = credentials.token_uri().to_string();
        Self {
            credentials,
            scopes: vec![CLOUD_PLATFORM_SCOPE.into()],
            token_uri,
            client: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(GoogleCredentials::from_file(path.as_ref())?))
    }

    /// Use the configured credentials path, else the gcloud well-known file.
    pub fn from_config(config: &VertexConfig) -> Result<Self> {
        if let Some(path) = &config.credentials_path {
            return Self::from_file(path);
        }
        match well_known_credentials_path() {
            Some(path) if path.exists() => Self::from_file(path),
            other => Err(VertexError::Auth(AuthError::MissingCredentials(format!(
                "{ENV_CREDENTIALS} is not set and no application default credentials were found{}",
                other
                    .map(|p| format!(" at {}", p.display()))
                    .unwrap_or_default()
            )))),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Send token requests somewhere other than the credentials' `token_uri`.
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    pub fn credentials(&self) -> &GoogleCredentials {
        &self.credentials
    }

    fn signed_assertion(&self, key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String> {
        let claims = JwtClaims {
            iss: &key.client_email,
            scope: self.scopes.join(" "),
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = key.private_key_id.clone();

        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| {
                VertexError::Auth(AuthError::InvalidCredentials(format!("private key: {e}")))
            })?;
        jsonwebtoken::encode(&header, &claims, &encoding_key)
            .map_err(|e| VertexError::Auth(AuthError::InvalidCredentials(format!("JWT signing: {e}"))))
    }

    async fn fetch_token(&self) -> Result<AccessToken> {
        let now = Utc::now();
        let form: Vec<(&str, String)> = match &self.credentials {
            GoogleCredentials::ServiceAccount(key) => vec![
                ("grant_type", JWT_BEARER_GRANT.into()),
                ("assertion", self.signed_assertion(key, now)?),
            ],
            GoogleCredentials::AuthorizedUser(user) => vec![
                ("grant_type", "refresh_token".into()),
                ("client_id", user.client_id.clone()),
                ("client_secret", user.client_secret.clone()),
                ("refresh_token", user.refresh_token.clone()),
            ],
        };

        info!(kind = self.credentials.kind(), token_uri = %self.token_uri, "Requesting access token");
        let response = self
            .client
            .post(&self.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| VertexError::Auth(AuthError::TokenExchange(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            warn!(%status, body = %body, "Token exchange failed");
            return Err(VertexError::Auth(AuthError::TokenExchange(format!(
                "HTTP {status}: {body}"
            ))));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| VertexError::Auth(AuthError::TokenExchange(e.to_string())))?;
        let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        debug!(expires_in, "Access token issued");

        Ok(AccessToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(expires_in),
        })
    }
}

#[async_trait]
impl TokenProvider for GoogleTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired(Utc::now()) {
                return Ok(token.value.clone());
            }
            debug!("Cached access token expired");
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}

/// Token provider for the example programs.
///
/// `GOOGLE_OAUTH_ACCESS_TOKEN` wins when set; otherwise the credentials file
/// from `config` (or the gcloud default) is used.
pub fn default_token_provider(config: &VertexConfig) -> Result<Arc<dyn TokenProvider>> {
    match std::env::var(ENV_ACCESS_TOKEN) {
        Ok(token) if !token.trim().is_empty() => {
            Ok(Arc::new(StaticTokenProvider::new(token.trim())))
        }
        _ => Ok(Arc::new(GoogleTokenProvider::from_config(config)?)),
    }
}
