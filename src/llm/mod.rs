use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod cloud;
pub mod local;
pub mod orchestrator;
pub mod prompts;

pub use cloud::OpenAICloudClient;
pub use local::LlamaServerClient;
pub use orchestrator::{GenerationError, GenerationOrchestrator, Generated};

/// Which generator served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Local,
    Cloud,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    #[default]
    Auto,
    Local,
    Cloud,
}

impl GenerationMode {
    /// Unknown or missing values fall back to `Auto`.
    pub fn from_request(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("local") => Self::Local,
            Some("cloud") => Self::Cloud,
            _ => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model backend unavailable: {0}")]
    Unavailable(String),
    #[error("request to model backend failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected model response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct LocalModelInfo {
    pub name: String,
    pub path: String,
    pub status: String,
    pub available: bool,
    pub error: String,
}

/// Local inference backend. May be permanently unavailable (missing model asset).
#[async_trait]
pub trait LocalGenerator: Send + Sync {
    fn available(&self) -> bool;

    /// Why the backend is unavailable; empty when it is available.
    fn unavailable_reason(&self) -> String;

    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, LlmError>;

    async fn narrate(&self, question: &str, result_text: &str) -> Result<String, LlmError>;

    fn model_info(&self) -> LocalModelInfo;

    /// Re-probe the model asset and server; returns the new availability.
    async fn reload(&self) -> bool;
}

/// Hosted chat-completion backend; reachable but may fail transiently.
#[async_trait]
pub trait CloudGenerator: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<String, LlmError>;

    fn current_model(&self) -> String;

    fn available_models(&self) -> Vec<String>;

    /// Selects the default model; `false` if the name is not in the allowed list.
    fn set_model(&self, model: &str) -> bool;

    /// Model a call with `requested` actually runs on. Names outside the allowed list fall
    /// back to the current model.
    fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested {
            Some(name) if self.available_models().iter().any(|m| m == name) => name.to_string(),
            _ => self.current_model(),
        }
    }
}

/// Removes reasoning preambles some chat models emit before the answer.
pub fn strip_reasoning(raw: &str) -> String {
    let end_token = "final<|message|>";
    let content = match raw.find(end_token) {
        Some(pos) => &raw[pos + end_token.len()..],
        None => raw,
    };
    let content = match content.rfind("</think>") {
        Some(pos) => &content[pos + "</think>".len()..],
        None => content,
    };
    content.trim().to_string()
}
