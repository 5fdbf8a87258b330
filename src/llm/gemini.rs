//! Gemini backend
//!
//! JSON is requested through `generationConfig.responseMimeType`, with the
//! caller's schema forwarded as a hint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::json::extract_json;
use super::{http_client, ModelClient, ModelConfig, ModelError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: TextContent,
    contents: Vec<RoleContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct TextContent {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct RoleContent {
    role: &'static str,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        Ok(GeminiClient {
            client: http_client(config.request_timeout_secs)?,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn send(
        &self,
        system_prompt: &str,
        user_message: &str,
        schema: Option<&Value>,
        json_mode: bool,
    ) -> Result<String, ModelError> {
        let request = GenerateRequest {
            system_instruction: TextContent {
                parts: vec![TextPart {
                    text: system_prompt.to_string(),
                }],
            },
            contents: vec![RoleContent {
                role: "user",
                parts: vec![TextPart {
                    text: user_message.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
                response_mime_type: json_mode.then_some("application/json"),
                response_schema: schema.cloned(),
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            urlencoding::encode(&self.api_key)
        );

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status, &body));
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .map(|part| part.text)
            .unwrap_or_default())
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, ModelError> {
        self.send(system_prompt, user_message, None, false).await
    }

    async fn complete_json(
        &self,
        system_prompt: &str,
        user_message: &str,
        schema: Option<&Value>,
    ) -> Result<Value, ModelError> {
        let text = self.send(system_prompt, user_message, schema, true).await?;
        extract_json(&text)
    }
}
