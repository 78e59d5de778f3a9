use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VertexError};

pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;

pub const ENV_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const ENV_LOCATION: &str = "GOOGLE_CLOUD_LOCATION";
pub const ENV_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const ENV_CONNECT_TIMEOUT: &str = "VERTEX_CONNECT_TIMEOUT_SECS";
pub const ENV_READ_TIMEOUT: &str = "VERTEX_READ_TIMEOUT_SECS";
pub const ENV_BASE_URL: &str = "VERTEX_BASE_URL";

fn default_location() -> String {
    DEFAULT_LOCATION.into()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

/// Where and how to reach Vertex AI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexConfig {
    /// Google Cloud project id.
    pub project_id: String,

    /// Region, e.g. `us-central1`, or `global`.
    #[serde(default = "default_location")]
    pub location: String,

    /// Path to a Google credentials JSON file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Per-read timeout on the response body.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Overrides `https://{host}/v1`. Used for tests and private endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl VertexConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: default_location(),
            credentials_path: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            base_url: None,
        }
    }

    /// Build from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_default_location(DEFAULT_LOCATION)
    }

    /// Like [`from_env`](Self::from_env), with a different fallback region.
    pub fn from_env_with_default_location(location: &str) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), location)
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F, default_location: &str) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let project_id = get(ENV_PROJECT)
            .ok_or_else(|| VertexError::Config(format!("{ENV_PROJECT} is not set")))?;

        let mut config = Self::new(project_id)
            .with_location(get(ENV_LOCATION).unwrap_or_else(|| default_location.to_string()));

        if let Some(path) = get(ENV_CREDENTIALS) {
            config = config.with_credentials_path(path);
        }
        if let Some(secs) = get(ENV_CONNECT_TIMEOUT) {
            config.connect_timeout_secs = parse_secs(ENV_CONNECT_TIMEOUT, &secs)?;
        }
        if let Some(secs) = get(ENV_READ_TIMEOUT) {
            config.read_timeout_secs = parse_secs(ENV_READ_TIMEOUT, &secs)?;
        }
        if let Some(url) = get(ENV_BASE_URL) {
            config = config.with_base_url(url);
        }
        Ok(config)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    pub fn with_read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Regional API host, e.g. `us-east5-aiplatform.googleapis.com`.
    pub fn api_host(&self) -> String {
        if self.location == "global" {
            "aiplatform.googleapis.com".into()
        } else {
            format!("{}-aiplatform.googleapis.com", self.location)
        }
    }

    /// API root including the version segment, without a trailing slash.
    pub fn api_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}/v1", self.api_host()),
        }
    }

    /// `projects/{project}/locations/{location}`
    pub fn location_path(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.location)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| VertexError::Config(format!("{key} must be a whole number of seconds, got '{value}'")))
}
