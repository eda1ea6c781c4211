//! Language-model client for answer generation.
//!
//! [`LanguageModel`] is the seam the query engine calls through;
//! [`ChatClient`] implements it against any OpenAI-compatible
//! `/chat/completions` endpoint (Groq by default).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use sentinel_core::error::Transient;

use crate::config::LlmConfig;

/// A completion request failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("language model error: {message}")]
    Backend { message: String, transient: bool },

    #[error("language model request timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl Transient for ModelError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Backend {
                transient: true,
                ..
            } | ModelError::Timeout { .. }
        )
    }

    fn timed_out(secs: u64) -> Self {
        ModelError::Timeout { secs }
    }
}

/// Generates an answer from a system instruction and a user prompt.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ModelError>;
}

/// OpenAI-compatible chat-completions client.
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    timeout_secs: u64,
}

impl ChatClient {
    /// Build a client; the API key is read from `config.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ModelError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    ModelError::Backend {
                        transient: e.is_connect() || e.is_request(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Backend {
                transient: status.as_u16() == 429 || status.is_server_error(),
                message: format!("chat API error {}: {}", status, text),
            });
        }

        let json: serde_json::Value = response.json().await.map_err(|e| ModelError::Backend {
            message: e.to_string(),
            transient: false,
        })?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String, ModelError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| ModelError::Backend {
            message: "Invalid chat response: missing choices[0].message.content".to_string(),
            transient: false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": " NVDA fell on export curbs.\n"}}]
        });
        assert_eq!(
            parse_chat_response(&json).unwrap(),
            "NVDA fell on export curbs."
        );
        assert!(parse_chat_response(&serde_json::json!({"choices": []})).is_err());
    }

    #[test]
    fn test_missing_api_key_is_reported() {
        let config = LlmConfig {
            base_url: "http://localhost".to_string(),
            model: "m".to_string(),
            api_key_env: "SENTINEL_TEST_UNSET_KEY".to_string(),
            temperature: 0.5,
            timeout_secs: 5,
        };
        let err = ChatClient::new(&config).err().unwrap();
        assert!(err.to_string().contains("SENTINEL_TEST_UNSET_KEY"));
    }
}
