//! Text-generation backend clients
//!
//! The orchestrator only sees `GenerationClient`. A concrete client is picked
//! once at startup: the OpenAI-compatible client when an API key is
//! configured, otherwise `UnavailableClient`, which fails every call with
//! `GenerationError::Unavailable`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Capability interface over the generation backend.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Model identifier recorded in the audit trail.
    fn model(&self) -> &str;

    /// Whether calls can succeed at all (credential present).
    fn is_available(&self) -> bool {
        true
    }

    /// Send `messages` and return the assistant text.
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, GenerationError>;
}

/// Pick the client implied by `config`.
pub fn client_from_config(config: &GenerationConfig) -> Arc<dyn GenerationClient> {
    let api_key = match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => {
            warn!("OPENAI_API_KEY not configured; analysis requests will fail");
            return Arc::new(UnavailableClient::new(
                &config.model,
                "OPENAI_API_KEY not configured",
            ));
        }
    };

    match OpenAiClient::new(api_key, &config.model, &config.base_url, config.timeout())
        .map(|client| client.with_temperature(config.temperature))
    {
        Ok(client) => {
            info!("Generation backend: {} ({})", config.base_url, config.model);
            Arc::new(client)
        }
        Err(e) => {
            warn!("Failed to build generation client: {}", e);
            Arc::new(UnavailableClient::new(&config.model, e.to_string()))
        }
    }
}

/// Client used when no backend is configured.
#[derive(Debug, Clone)]
pub struct UnavailableClient {
    model: String,
    reason: String,
}

impl UnavailableClient {
    pub fn new(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl GenerationClient for UnavailableClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn invoke(&self, _messages: &[ChatMessage]) -> Result<String, GenerationError> {
        Err(GenerationError::Unavailable(self.reason.clone()))
    }
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.2,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        debug!("Calling {} with {} messages", self.chat_url(), messages.len());

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let snippet: String = detail.chars().take(200).collect();
            warn!("Generation backend returned {}: {}", status, snippet);
            return Err(GenerationError::CallFailed(format!(
                "backend returned status {}",
                status
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::CallFailed("response contained no choices".into()))?;

        Ok(choice.message.and_then(|m| m.content).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_selects_unavailable_client() {
        let client = client_from_config(&GenerationConfig::default());
        assert!(!client.is_available());
        assert_eq!(client.model(), "gpt-3.5-turbo");

        let err = client
            .invoke(&[ChatMessage::user("hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }

    #[test]
    fn test_blank_key_is_unavailable() {
        let config = GenerationConfig {
            api_key: Some("   ".to_string()),
            ..GenerationConfig::default()
        };
        assert!(!client_from_config(&config).is_available());
    }

    #[test]
    fn test_configured_key_selects_openai_client() {
        let config = GenerationConfig {
            api_key: Some("sk-test".to_string()),
            ..GenerationConfig::default()
        };
        assert!(client_from_config(&config).is_available());
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(ChatMessage::system("rules")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "rules"}));
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = OpenAiClient::new(
            "sk-secret",
            "gpt-3.5-turbo",
            "http://localhost",
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(!format!("{:?}", client).contains("sk-secret"));
    }
}
