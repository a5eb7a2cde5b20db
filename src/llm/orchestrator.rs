use super::prompts::{
    expert_sql_prompt, general_qa_messages, narration_messages, sql_messages, weather_messages,
};
use super::{Backend, ChatMessage, CloudGenerator, GenerationMode, LlmError, LocalGenerator};
use crate::shared::models::GenerationOptions;
use log::{debug, warn};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub backend: Backend,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("{backend} model unavailable: {reason}")]
    BackendUnavailable { backend: Backend, reason: String },
    #[error("{backend} model call failed: {reason}")]
    Failed { backend: Backend, reason: String },
}

impl GenerationError {
    pub fn backend(&self) -> Backend {
        match self {
            Self::BackendUnavailable { backend, .. } | Self::Failed { backend, .. } => *backend,
        }
    }
}

/// Outcome of asking one backend once.
#[derive(Debug)]
enum Attempt {
    Served(String),
    Unavailable(String),
    Failed(String),
}

impl Attempt {
    fn from_result(result: Result<String, LlmError>) -> Self {
        match result {
            Ok(text) => Self::Served(text),
            Err(LlmError::Unavailable(reason)) => Self::Unavailable(reason),
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    fn finish(self, backend: Backend) -> Result<Generated, GenerationError> {
        match self {
            Self::Served(text) => Ok(Generated { text, backend }),
            Self::Unavailable(reason) => Err(GenerationError::BackendUnavailable { backend, reason }),
            Self::Failed(reason) => Err(GenerationError::Failed { backend, reason }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Task<'a> {
    Sql {
        question: &'a str,
        schema: &'a str,
    },
    ExpertSql {
        database_name: &'a str,
        question: &'a str,
        schema: &'a str,
    },
    Narrate {
        question: &'a str,
        result_text: &'a str,
    },
}

impl Task<'_> {
    fn cloud_messages(&self) -> Vec<ChatMessage> {
        match *self {
            Task::Sql { question, schema } => sql_messages(question, schema),
            Task::ExpertSql {
                database_name,
                question,
                schema,
            } => vec![
                ChatMessage::system(format!(
                    "You are a SQL generation assistant dedicated to the {database_name} database. \
Return only the SQL statement, make sure it is syntactically correct and only query tables of {database_name}."
                )),
                ChatMessage::user(expert_sql_prompt(database_name, question, schema)),
            ],
            Task::Narrate {
                question,
                result_text,
            } => narration_messages(question, result_text),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Task::Sql { .. } | Task::ExpertSql { .. } => "SQL generation",
            Task::Narrate { .. } => "answer narration",
        }
    }
}

/// Drives the local generator first and the cloud generator as fallback.
///
/// `Auto` tries local, then cloud, strictly one after the other. `Local` and `Cloud` use only
/// the named backend and report its failure without trying the other one.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    local: Arc<dyn LocalGenerator>,
    cloud: Arc<dyn CloudGenerator>,
}

impl GenerationOrchestrator {
    pub fn new(local: Arc<dyn LocalGenerator>, cloud: Arc<dyn CloudGenerator>) -> Self {
        Self { local, cloud }
    }

    pub fn local(&self) -> &Arc<dyn LocalGenerator> {
        &self.local
    }

    pub fn cloud(&self) -> &Arc<dyn CloudGenerator> {
        &self.cloud
    }

    pub async fn generate_sql(
        &self,
        question: &str,
        schema: &str,
        options: &GenerationOptions,
    ) -> Result<Generated, GenerationError> {
        self.run(Task::Sql { question, schema }, options).await
    }

    pub async fn generate_expert_sql(
        &self,
        database_name: &str,
        question: &str,
        schema: &str,
        options: &GenerationOptions,
    ) -> Result<Generated, GenerationError> {
        self.run(
            Task::ExpertSql {
                database_name,
                question,
                schema,
            },
            options,
        )
        .await
    }

    pub async fn narrate(
        &self,
        question: &str,
        result_text: &str,
        options: &GenerationOptions,
    ) -> Result<Generated, GenerationError> {
        self.run(
            Task::Narrate {
                question,
                result_text,
            },
            options,
        )
        .await
    }

    /// Open-domain questions always go to the cloud backend.
    pub async fn general_answer(
        &self,
        question: &str,
        cloud_model: Option<&str>,
    ) -> Result<String, GenerationError> {
        let messages = general_qa_messages(question);
        Attempt::from_result(self.cloud.chat(&messages, cloud_model).await)
            .finish(Backend::Cloud)
            .map(|g| g.text)
    }

    pub async fn weather_answer(
        &self,
        question: &str,
        weather_summary: &str,
        cloud_model: Option<&str>,
    ) -> Result<String, GenerationError> {
        let messages = weather_messages(question, weather_summary);
        Attempt::from_result(self.cloud.chat(&messages, cloud_model).await)
            .finish(Backend::Cloud)
            .map(|g| g.text)
    }

    async fn attempt_local(&self, task: Task<'_>) -> Attempt {
        if !self.local.available() {
            return Attempt::Unavailable(self.local.unavailable_reason());
        }
        let result = match task {
            Task::Sql { question, schema } | Task::ExpertSql {
                question, schema, ..
            } => self.local.generate_sql(question, schema).await,
            Task::Narrate {
                question,
                result_text,
            } => self.local.narrate(question, result_text).await,
        };
        Attempt::from_result(result)
    }

    async fn attempt_cloud(&self, task: Task<'_>, cloud_model: Option<&str>) -> Attempt {
        let messages = task.cloud_messages();
        Attempt::from_result(self.cloud.chat(&messages, cloud_model).await)
    }

    async fn run(
        &self,
        task: Task<'_>,
        options: &GenerationOptions,
    ) -> Result<Generated, GenerationError> {
        let cloud_model = options.cloud_model.as_deref();
        match options.mode {
            GenerationMode::Local => self.attempt_local(task).await.finish(Backend::Local),
            GenerationMode::Cloud => self
                .attempt_cloud(task, cloud_model)
                .await
                .finish(Backend::Cloud),
            GenerationMode::Auto => match self.attempt_local(task).await {
                Attempt::Served(text) => {
                    debug!("{} served by local model", task.label());
                    Ok(Generated {
                        text,
                        backend: Backend::Local,
                    })
                }
                Attempt::Unavailable(reason) | Attempt::Failed(reason) => {
                    warn!(
                        "Local model failed for {}, falling back to cloud: {}",
                        task.label(),
                        reason
                    );
                    self.attempt_cloud(task, cloud_model)
                        .await
                        .finish(Backend::Cloud)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_util::{FakeCloud, FakeLocal};

    fn orchestrator(local: FakeLocal, cloud: FakeCloud) -> (GenerationOrchestrator, Arc<FakeLocal>, Arc<FakeCloud>) {
        let local = Arc::new(local);
        let cloud = Arc::new(cloud);
        (
            GenerationOrchestrator::new(local.clone(), cloud.clone()),
            local,
            cloud,
        )
    }

    #[tokio::test]
    async fn test_auto_prefers_local() {
        let (orch, local, cloud) =
            orchestrator(FakeLocal::serving("SELECT 1;"), FakeCloud::replying("SELECT 2;"));
        let out = orch
            .generate_sql("q", "schema", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(out.backend, Backend::Local);
        assert_eq!(out.text, "SELECT 1;");
        assert_eq!(local.calls(), 1);
        assert_eq!(cloud.calls(), 0);
    }

    #[tokio::test]
    async fn test_auto_falls_back_when_local_unavailable() {
        let (orch, _local, cloud) =
            orchestrator(FakeLocal::unavailable("no model"), FakeCloud::replying("SELECT 2;"));
        let out = orch
            .generate_sql("q", "schema", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(out.backend, Backend::Cloud);
        assert_eq!(out.text, "SELECT 2;");
        assert_eq!(cloud.calls(), 1);
    }

    #[tokio::test]
    async fn test_auto_falls_back_when_local_errors() {
        let (orch, local, cloud) =
            orchestrator(FakeLocal::failing("boom"), FakeCloud::replying("fine"));
        let out = orch
            .narrate("q", "rows", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(out.backend, Backend::Cloud);
        assert_eq!(local.calls(), 1);
        assert_eq!(cloud.calls(), 1);
    }

    #[tokio::test]
    async fn test_forced_local_never_touches_cloud() {
        let (orch, _local, cloud) =
            orchestrator(FakeLocal::unavailable("no model"), FakeCloud::replying("SELECT 2;"));
        let err = orch
            .generate_sql("q", "schema", &GenerationOptions::new(GenerationMode::Local))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::BackendUnavailable {
                backend: Backend::Local,
                ..
            }
        ));
        assert_eq!(cloud.calls(), 0);
    }

    #[tokio::test]
    async fn test_forced_cloud_skips_local() {
        let (orch, local, _cloud) =
            orchestrator(FakeLocal::serving("SELECT 1;"), FakeCloud::replying("SELECT 2;"));
        let out = orch
            .generate_sql("q", "schema", &GenerationOptions::new(GenerationMode::Cloud))
            .await
            .unwrap();
        assert_eq!(out.backend, Backend::Cloud);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn test_cloud_failure_after_fallback_is_reported() {
        let (orch, _local, _cloud) =
            orchestrator(FakeLocal::unavailable("no model"), FakeCloud::failing("timeout"));
        let err = orch
            .generate_sql("q", "schema", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.backend(), Backend::Cloud);
        assert!(err.to_string().contains("timeout"));
    }
}
