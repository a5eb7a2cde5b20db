use super::prompts::{narration_prompt, render_transcript, sql_prompt};
use super::{ChatMessage, LlmError, LocalGenerator, LocalModelInfo};
use crate::config::LocalLlmConfig;
use crate::shared::utils::http_client;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Local GGUF model served by a llama.cpp `llama-server` process.
///
/// The backend counts as available only when the model file is present and plausibly complete
/// and the server answers its health check. Availability is probed at startup and on
/// [`LocalGenerator::reload`]; generation never re-probes on its own.
pub struct LlamaServerClient {
    client: Client,
    config: LocalLlmConfig,
    loaded: AtomicBool,
    error_message: Mutex<String>,
}

impl LlamaServerClient {
    pub fn new(config: LocalLlmConfig) -> Self {
        let client = http_client(config.timeout_secs, "local model");
        Self {
            client,
            config,
            loaded: AtomicBool::new(false),
            error_message: Mutex::new("local model has not been probed yet".to_string()),
        }
    }

    /// Builds the client and probes it once.
    pub async fn connect(config: LocalLlmConfig) -> Self {
        let client = Self::new(config);
        client.probe().await;
        client
    }

    fn set_state(&self, loaded: bool, message: String) {
        self.loaded.store(loaded, Ordering::SeqCst);
        *self
            .error_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = message;
    }

    async fn probe(&self) -> bool {
        match self.check_model_file() {
            Ok(size) => {
                info!(
                    "Local model file {} ({:.1}MB)",
                    self.config.model_path,
                    size as f64 / (1024.0 * 1024.0)
                );
            }
            Err(reason) => {
                warn!("Local model unavailable: {reason}");
                self.set_state(false, reason);
                return false;
            }
        }

        if !is_server_running(&self.client, &self.config.server_url).await {
            let reason = format!(
                "local inference server not reachable at {}",
                self.config.server_url
            );
            warn!("Local model unavailable: {reason}");
            self.set_state(false, reason);
            return false;
        }

        info!("Local model ready at {}", self.config.server_url);
        self.set_state(true, String::new());
        true
    }

    fn check_model_file(&self) -> Result<u64, String> {
        let path = Path::new(&self.config.model_path);
        let metadata = std::fs::metadata(path)
            .map_err(|_| format!("model file not found: {}", self.config.model_path))?;
        let size = metadata.len();
        if size < self.config.min_model_bytes {
            return Err(format!(
                "model file too small, possibly corrupt: {:.1}MB",
                size as f64 / (1024.0 * 1024.0)
            ));
        }
        Ok(size)
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        if !self.available() {
            return Err(LlmError::Unavailable(self.unavailable_reason()));
        }

        let response = self
            .client
            .post(format!(
                "{}/completion",
                self.config.server_url.trim_end_matches('/')
            ))
            .json(&serde_json::json!({
                "prompt": prompt,
                "n_predict": self.config.n_predict,
                "temperature": self.config.temperature,
                "stop": ["<|im_end|>"],
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
        result["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("missing `content` field".to_string()))
    }
}

pub async fn is_server_running(client: &Client, url: &str) -> bool {
    let base = url.trim_end_matches('/');
    match client.get(format!("{base}/health")).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            if !e.is_connect() {
                warn!("Health check error for {url}: {e}");
            }
            false
        }
    }
}

/// Drops a surrounding markdown code fence.
fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim().to_string()
}

#[async_trait]
impl LocalGenerator for LlamaServerClient {
    fn available(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn unavailable_reason(&self) -> String {
        self.error_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, LlmError> {
        let prompt = render_transcript(&[ChatMessage::user(sql_prompt(question, schema))]);
        let sql = self.complete(&prompt).await?;
        Ok(strip_fences(&sql))
    }

    async fn narrate(&self, question: &str, result_text: &str) -> Result<String, LlmError> {
        let prompt =
            render_transcript(&[ChatMessage::user(narration_prompt(question, result_text))]);
        self.complete(&prompt).await
    }

    fn model_info(&self) -> LocalModelInfo {
        let available = self.available();
        LocalModelInfo {
            name: self.config.model_name.clone(),
            path: self.config.model_path.clone(),
            status: if available { "loaded" } else { "failed" }.to_string(),
            available,
            error: if available {
                String::new()
            } else {
                self.unavailable_reason()
            },
        }
    }

    async fn reload(&self) -> bool {
        self.probe().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_for(server_url: String, model_path: String) -> LocalLlmConfig {
        LocalLlmConfig {
            server_url,
            model_path,
            min_model_bytes: 8,
            timeout_secs: 5,
            ..LocalLlmConfig::default()
        }
    }

    fn model_file(bytes: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; bytes]).unwrap();
        file
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```sql\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(strip_fences("```\nSELECT 2;```"), "SELECT 2;");
        assert_eq!(strip_fences("SELECT 3;"), "SELECT 3;");
    }

    #[tokio::test]
    async fn test_missing_model_file_is_unavailable() {
        let client = LlamaServerClient::connect(config_for(
            "http://127.0.0.1:9".to_string(),
            "/nonexistent/model.gguf".to_string(),
        ))
        .await;
        assert!(!client.available());
        assert!(client.unavailable_reason().contains("model file not found"));
        let err = client.generate_sql("q", "s").await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_small_model_file_is_unavailable() {
        let file = model_file(2);
        let client = LlamaServerClient::connect(config_for(
            "http://127.0.0.1:9".to_string(),
            file.path().display().to_string(),
        ))
        .await;
        assert!(!client.available());
        assert!(client.model_info().error.contains("too small"));
    }

    #[tokio::test]
    async fn test_generate_sql_against_server() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;
        let _completion = server
            .mock("POST", "/completion")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":"```sql\nSELECT * FROM doctors;\n```"}"#)
            .create_async()
            .await;

        let file = model_file(16);
        let client =
            LlamaServerClient::connect(config_for(server.url(), file.path().display().to_string()))
                .await;
        assert!(client.available());
        assert_eq!(client.model_info().status, "loaded");

        let sql = client.generate_sql("list doctors", "doctors").await.unwrap();
        assert_eq!(sql, "SELECT * FROM doctors;");
    }

    #[tokio::test]
    async fn test_server_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _health = server.mock("GET", "/health").with_status(200).create_async().await;
        let _completion = server
            .mock("POST", "/completion")
            .with_status(503)
            .with_body("loading model")
            .create_async()
            .await;

        let file = model_file(16);
        let client =
            LlamaServerClient::connect(config_for(server.url(), file.path().display().to_string()))
                .await;
        let err = client.narrate("q", "rows").await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 503, .. }));
    }
}
