//! AI delegate used by the semantic strategy and AI response generation.
//!
//! The core only needs "prompt in, text out". Failures are values, and every
//! caller has a non-AI fallback.

use crate::config::AiConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI delegate is not configured")]
    NotConfigured,

    #[error("AI call timed out after {0:?}")]
    Timeout(Duration),

    #[error("AI transport error: {0}")]
    Transport(String),

    #[error("malformed AI response: {0}")]
    MalformedResponse(String),
}

/// Text completion capability.
#[async_trait]
pub trait AiDelegate: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AiError>;
}

/// Await an AI future, turning an elapsed deadline into [`AiError::Timeout`].
pub async fn with_timeout<F>(limit: Duration, call: F) -> Result<String, AiError>
where
    F: Future<Output = Result<String, AiError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AiError::Timeout(limit)),
    }
}

/// Messages API client.
pub struct AnthropicDelegate {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicDelegate {
    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or(AiError::NotConfigured)?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AiError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
        })
    }
}

#[async_trait]
impl AiDelegate for AnthropicDelegate {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        debug!("Calling AI delegate model={} prompt_len={}", self.model, prompt.len());

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AiError::Transport(format!("status {status}: {detail}")));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        body.content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| AiError::MalformedResponse("no text content block".to_string()))
    }
}
