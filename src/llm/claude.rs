//! Claude (Anthropic) backend
//!
//! No native JSON mode: `complete_json` appends a JSON-only instruction to
//! the system prompt and relies on the tolerant extractor.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::json::extract_json;
use super::{http_client, ModelClient, ModelConfig, ModelError};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

const JSON_ONLY_INSTRUCTION: &str = "\n\nRespond ONLY with a single valid JSON object. \
No markdown, no code fences, no prose before or after the JSON.";

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    system: String,
    messages: Vec<UserMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct UserMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ClaudeClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        Ok(ClaudeClient {
            client: http_client(config.request_timeout_secs)?,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn send(&self, system_prompt: &str, user_message: &str) -> Result<String, ModelError> {
        let request = MessageRequest {
            model: self.model.clone(),
            system: system_prompt.to_string(),
            messages: vec![UserMessage {
                role: "user",
                content: user_message.to_string(),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status, &body));
        }

        let parsed: MessageResponse = response.json().await?;
        Ok(parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .unwrap_or_default())
    }
}

#[async_trait]
impl ModelClient for ClaudeClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, ModelError> {
        self.send(system_prompt, user_message).await
    }

    async fn complete_json(
        &self,
        system_prompt: &str,
        user_message: &str,
        _schema: Option<&Value>,
    ) -> Result<Value, ModelError> {
        let system = format!("{}{}", system_prompt, JSON_ONLY_INSTRUCTION);
        let text = self.send(&system, user_message).await?;
        extract_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_system_field() {
        let request = MessageRequest {
            model: "claude-3-5-haiku-20241022".to_string(),
            system: "be brief".to_string(),
            messages: vec![UserMessage {
                role: "user",
                content: "hi".to_string(),
            }],
            max_tokens: 256,
            temperature: 0.0,
        };
        let body = serde_json::to_string(&request).unwrap();
        assert!(body.contains(r#""system":"be brief""#));
        assert!(body.contains(r#""role":"user""#));
    }

    #[test]
    fn test_parse_message_response() {
        let json = r#"{"content": [{"type": "text", "text": "{\"ok\": true}"}]}"#;
        let parsed: MessageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.content[0].text, r#"{"ok": true}"#);
    }

    #[test]
    fn test_empty_content_yields_empty_string() {
        let json = r#"{"content": []}"#;
        let parsed: MessageResponse = serde_json::from_str(json).unwrap();
        let text = parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .unwrap_or_default();
        assert_eq!(text, "");
    }
}
