//! Model client abstraction over heterogeneous text-generation backends
//!
//! Supports OpenAI-compatible, Claude (Anthropic), and Gemini APIs behind a
//! single trait. Callers decide on retries; the clients only classify errors.

mod claude;
mod gemini;
pub mod json;
mod openai;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during model operations
#[derive(Debug, Error, Clone)]
pub enum ModelError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("unusable response: {0}")]
    Response(String),

    #[error("HTTP request failed: {0}")]
    Request(Arc<reqwest::Error>),

    #[error("model request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::Request(Arc::new(err))
    }
}

impl ModelError {
    /// Map an error-status HTTP reply onto the shared taxonomy
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => ModelError::Auth(format!("{}: {}", status, truncate(body, 200))),
            429 => ModelError::RateLimit(format!("{}: {}", status, truncate(body, 200))),
            _ => ModelError::Other(format!("{}: {}", status, truncate(body, 200))),
        }
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max_chars).collect();
        format!("{}…", prefix)
    }
}

/// Supported model backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    OpenAi,
    Claude,
    Gemini,
}

impl ModelProvider {
    pub fn parse(raw: &str) -> Option<ModelProvider> {
        match raw.trim().to_lowercase().as_str() {
            "openai" => Some(ModelProvider::OpenAi),
            "claude" | "anthropic" => Some(ModelProvider::Claude),
            "gemini" | "google" => Some(ModelProvider::Gemini),
            _ => None,
        }
    }
}

/// Connection and generation parameters shared by all backends
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub api_key: String,
    /// Override for OpenAI-compatible gateways
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            provider: ModelProvider::OpenAi,
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            request_timeout_secs: 120,
        }
    }
}

/// Uniform contract over text-generation backends
///
/// `complete` returns the raw text (empty string on an empty reply);
/// `complete_json` returns a parsed JSON object, with the schema passed as a
/// hint the backend may or may not honor.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str)
        -> Result<String, ModelError>;

    async fn complete_json(
        &self,
        system_prompt: &str,
        user_message: &str,
        schema: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, ModelError>;
}

/// Build the configured backend
pub fn build_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>, ModelError> {
    if config.api_key.is_empty() {
        return Err(ModelError::Auth("no model API key configured".to_string()));
    }
    let client: Arc<dyn ModelClient> = match config.provider {
        ModelProvider::OpenAi => Arc::new(OpenAiClient::new(config)?),
        ModelProvider::Claude => Arc::new(ClaudeClient::new(config)?),
        ModelProvider::Gemini => Arc::new(GeminiClient::new(config)?),
    };
    Ok(client)
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ModelError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(ModelError::from)
}
