use crate::db::DatabaseId;
use crate::llm::{Backend, GenerationMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(default)]
    pub role: Option<String>,
    pub question: String,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub cloud_model: Option<String>,
    #[serde(default)]
    pub enable_cross_db: Option<bool>,
}

impl ChatRequest {
    pub fn new(user_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: None,
            question: question.into(),
            model_type: None,
            cloud_model: None,
            enable_cross_db: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = Some(model_type.into());
        self
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            mode: GenerationMode::from_request(self.model_type.as_deref()),
            cloud_model: self.cloud_model.clone(),
        }
    }
}

/// Per-request backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOptions {
    pub mode: GenerationMode,
    pub cloud_model: Option<String>,
}

impl GenerationOptions {
    pub fn new(mode: GenerationMode) -> Self {
        Self {
            mode,
            cloud_model: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_model: Option<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_model: Option<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_db: Option<DatabaseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_db: Option<DatabaseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub meta: ResponseMeta,
}

impl ChatResponse {
    pub fn new(answer: impl Into<String>, meta: ResponseMeta) -> Self {
        Self {
            answer: answer.into(),
            meta,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossDbRequest {
    pub user_id: String,
    #[serde(default)]
    pub role: Option<String>,
    pub question: String,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub cloud_model: Option<String>,
}

impl From<&ChatRequest> for CrossDbRequest {
    fn from(req: &ChatRequest) -> Self {
        Self {
            user_id: req.user_id.clone(),
            role: req.role.clone(),
            question: req.question.clone(),
            model_type: req.model_type.clone(),
            cloud_model: req.cloud_model.clone(),
        }
    }
}

impl CrossDbRequest {
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            mode: GenerationMode::from_request(self.model_type.as_deref()),
            cloud_model: self.cloud_model.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertToolResult {
    pub tool_name: String,
    pub database: String,
    pub query: String,
    pub result: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossDbResponse {
    pub answer: String,
    pub reasoning: String,
    pub tool_results: Vec<ExpertToolResult>,
    pub meta: ResponseMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchDbRequest {
    #[serde(alias = "database")]
    pub target: String,
}
