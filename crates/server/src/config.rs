use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::rate_limit::DEFAULT_REQUESTS_PER_MINUTE;

pub const DEFAULT_CONFIG_FILE: &str = "appforge.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Service settings. Every field has a default except the two credentials.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shared secret callers and the evaluator must present.
    pub secret_key: String,
    pub github_token: String,
    /// Organization owning generated repositories; the token's user otherwise.
    pub github_org: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub llm_model: String,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub database_url: String,
    /// Answer dispatcher requests immediately and build in the background.
    pub async_builds: bool,
    pub rate_limit_per_minute: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            github_token: String::new(),
            github_org: None,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: false,
            database_url: "sqlite:appforge.db".to_string(),
            async_builds: false,
            rate_limit_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("github_org", &self.github_org)
            .field("openai_configured", &self.openai_api_key.is_some())
            .field("openai_base_url", &self.openai_base_url)
            .field("llm_model", &self.llm_model)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("debug", &self.debug)
            .field("database_url", &self.database_url)
            .field("async_builds", &self.async_builds)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Reads settings from a TOML file; a missing file yields the defaults.
    pub async fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;

        let settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Config loaded");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.is_empty() {
            return Err(ConfigError::Missing("secret_key (SECRET_KEY)"));
        }
        if self.github_token.is_empty() {
            return Err(ConfigError::Missing("github_token (GITHUB_TOKEN)"));
        }
        Ok(())
    }

    pub fn environment(&self) -> &'static str {
        if self.debug {
            "development"
        } else {
            "production"
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
