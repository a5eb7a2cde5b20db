use super::{strip_reasoning, ChatMessage, CloudGenerator, LlmError};
use crate::config::CloudLlmConfig;
use crate::shared::utils::http_client;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::sync::RwLock;

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAICloudClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: RwLock<String>,
    available_models: Vec<String>,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAICloudClient {
    pub fn new(config: &CloudLlmConfig) -> Self {
        let client = http_client(config.timeout_secs, "cloud model");
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: RwLock::new(config.model.clone()),
            available_models: config.available_models.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl CloudGenerator for OpenAICloudClient {
    async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<String, LlmError> {
        let use_model = self.resolve_model(model);
        debug!("Cloud chat completion with model {use_model}");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": use_model,
                "messages": messages,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: Value = response.json().await?;
        let raw_content = result["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                LlmError::InvalidResponse(format!("no message content (model: {use_model})"))
            })?;

        Ok(strip_reasoning(raw_content))
    }

    fn current_model(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn available_models(&self) -> Vec<String> {
        self.available_models.clone()
    }

    fn set_model(&self, model: &str) -> bool {
        if !self.available_models.iter().any(|m| m == model) {
            return false;
        }
        *self
            .model
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = model.to_string();
        true
    }
}
