//! Configuration parsing and validation for kopek.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

/// Environment variable consulted when no API key is present in the config file.
pub const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8080")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// OpenRouter gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Chat completion endpoint.
    #[serde(default = "default_chat_url")]
    pub chat_url: String,
    /// Model catalog endpoint (per-model pricing source).
    #[serde(default = "default_models_url")]
    pub models_url: String,
    /// API key; falls back to OPENROUTER_API_KEY when absent.
    pub api_key: Option<ApiKey>,
    /// Optional HTTP-Referer header forwarded to OpenRouter.
    pub referer: Option<String>,
}

fn default_chat_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}

fn default_models_url() -> String {
    "https://openrouter.ai/api/v1/models".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            chat_url: default_chat_url(),
            models_url: default_models_url(),
            api_key: None,
            referer: None,
        }
    }
}

/// Cost accounting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// Fixed USD to RUB exchange rate applied to all cost figures.
    #[serde(default = "default_usd_to_rub")]
    pub usd_to_rub: f64,
}

fn default_usd_to_rub() -> f64 {
    110.0
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            usd_to_rub: default_usd_to_rub(),
        }
    }
}

/// System prompt configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptConfig {
    /// Path to a system prompt file. SYSTEM_PROMPT env var takes priority.
    pub system_prompt_file: Option<String>,
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// The inner `SecretString` ensures the key value is:
/// - Zeroized in memory when dropped
/// - Never exposed via Debug or Display
/// - Only accessible via `.expose_secret()` (grep-auditable)
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.resolve_api_key();
        config.validate()?;
        Ok(config)
    }

    /// Fill in the API key from the environment when the file did not set it.
    fn resolve_api_key(&mut self) {
        if self.upstream.api_key.is_none() {
            if let Ok(key) = std::env::var(API_KEY_ENV_VAR) {
                if !key.is_empty() {
                    self.upstream.api_key = Some(ApiKey::from(key));
                }
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.chat_url.is_empty() {
            return Err(ConfigError::Validation(
                "upstream.chat_url must not be empty".to_string(),
            ));
        }

        if self.upstream.models_url.is_empty() {
            return Err(ConfigError::Validation(
                "upstream.models_url must not be empty".to_string(),
            ));
        }

        if !self.pricing.usd_to_rub.is_finite() || self.pricing.usd_to_rub <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "pricing.usd_to_rub must be a positive number, got {}",
                self.pricing.usd_to_rub
            )));
        }

        if self.upstream.api_key.is_none() {
            tracing::warn!(
                "No API key configured - set upstream.api_key or {}",
                API_KEY_ENV_VAR
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            pricing: PricingConfig::default(),
            prompt: PromptConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
