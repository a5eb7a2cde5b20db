//! End-to-end request handling: route the question, then answer it from a database, the
//! weather tool or the general-purpose model.
//!
//! Every failure after routing becomes an answer that describes it. Only malformed requests
//! are returned as [`PipelineError`].

pub mod experts;

use crate::db::schema::{SchemaProvider, StaticSchemaProvider};
use crate::db::{ActiveDatabase, DatabaseId, SqlExecutor};
use crate::llm::GenerationOrchestrator;
use crate::router::{Intent, IntentRouter};
use crate::security::identity::{IdentityResolver, PrefixIdentityResolver};
use crate::security::rbac::{authorize, PolicyTable};
use crate::security::sql_sanitizer::sanitize;
use crate::shared::models::{
    ChatRequest, ChatResponse, CrossDbRequest, GenerationOptions, ResponseMeta,
};
use crate::shared::utils::truncate_chars;
use crate::tools::weather::{WeatherSource, DATA_SOURCE};
use log::{error, info, warn};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub struct QueryPipeline {
    router: IntentRouter,
    policies: Arc<PolicyTable>,
    identity: Arc<dyn IdentityResolver>,
    schemas: Arc<dyn SchemaProvider>,
    orchestrator: GenerationOrchestrator,
    executor: Arc<dyn SqlExecutor>,
    weather: Arc<dyn WeatherSource>,
    active: ActiveDatabase,
}

impl QueryPipeline {
    /// Built-in policies, prefix identity resolution and static schemas.
    pub fn new(
        orchestrator: GenerationOrchestrator,
        executor: Arc<dyn SqlExecutor>,
        weather: Arc<dyn WeatherSource>,
        active: ActiveDatabase,
    ) -> Self {
        Self {
            router: IntentRouter::new(),
            policies: Arc::new(PolicyTable::builtin()),
            identity: Arc::new(PrefixIdentityResolver),
            schemas: Arc::new(StaticSchemaProvider),
            orchestrator,
            executor,
            weather,
            active,
        }
    }

    pub fn with_policies(mut self, policies: Arc<PolicyTable>) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_schemas(mut self, schemas: Arc<dyn SchemaProvider>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn active(&self) -> &ActiveDatabase {
        &self.active
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn classify_and_route(&self, question: &str) -> Intent {
        self.router.decide(question)
    }

    /// Explicit role wins; otherwise the identity resolver derives one.
    pub fn caller_role(&self, role: Option<&str>, user_id: &str, database: DatabaseId) -> String {
        match role.map(str::trim).filter(|r| !r.is_empty()) {
            Some(role) => role.to_string(),
            None => self.identity.role_for(user_id, database),
        }
    }

    pub async fn handle_chat(&self, request: &ChatRequest) -> Result<ChatResponse, PipelineError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }

        // One snapshot per request; a concurrent switch applies to later requests.
        let database = self.active.get();
        let intent = self.classify_and_route(question);
        info!(
            "Intent for '{}' from {}: {intent} (active database: {database})",
            truncate_chars(question, 100),
            request.user_id
        );

        let options = request.generation_options();
        let response = match intent {
            Intent::TextToSql if request.enable_cross_db.unwrap_or(false) => {
                let cross = self.handle_cross_db(&CrossDbRequest::from(request)).await?;
                ChatResponse::new(cross.answer, cross.meta)
            }
            Intent::TextToSql => {
                let role = self.caller_role(request.role.as_deref(), &request.user_id, database);
                self.handle_database_query(question, &role, database, &options)
                    .await
            }
            Intent::ToolWeather => self.handle_weather_query(question, &options).await,
            Intent::GeneralQa => self.handle_general_qa(question, &options).await,
        };
        Ok(response)
    }

    pub async fn handle_database_query(
        &self,
        question: &str,
        role: &str,
        database: DatabaseId,
        options: &GenerationOptions,
    ) -> ChatResponse {
        if let Some(suggested) = self.router.suggest_database(question) {
            if suggested != database {
                info!("Question targets {suggested} while {database} is active");
                return advisory(role, database, suggested);
            }
        }

        let Some(policy) = self.policies.resolve_role(role) else {
            let decision = self.policies.unknown_role(role);
            return ChatResponse::new(
                format!("Permission denied: {}", decision.reason),
                ResponseMeta {
                    role: Some(role.to_string()),
                    permission: Some(false),
                    ..Default::default()
                },
            );
        };

        let schema = self.schemas.schema_for(database);
        let generated = match self
            .orchestrator
            .generate_sql(question, schema, options)
            .await
        {
            Ok(generated) => generated,
            Err(e) => {
                error!("SQL generation failed: {e}");
                return failure(&e.to_string(), role, ResponseMeta::default());
            }
        };

        let sql = sanitize(&generated.text);
        let decision = authorize(&sql, role, policy);
        if !decision.allowed {
            warn!("Permission denied for role '{role}': {}", decision.reason);
            return ChatResponse::new(
                format!("Permission denied: {}", decision.reason),
                ResponseMeta {
                    sql: Some(sql),
                    role: Some(role.to_string()),
                    permission: Some(false),
                    sql_model: Some(generated.backend),
                    ..Default::default()
                },
            );
        }

        let partial = ResponseMeta {
            sql: Some(sql.clone()),
            permission: Some(true),
            database: Some(database),
            sql_model: Some(generated.backend),
            ..Default::default()
        };

        let rows = match self.executor.execute(database, &sql).await {
            Ok(rows) => rows,
            Err(e) => return failure(&e.to_string(), role, partial),
        };

        let narrated = match self
            .orchestrator
            .narrate(question, &rows.describe(), options)
            .await
        {
            Ok(narrated) => narrated,
            Err(e) => {
                return failure(
                    &e.to_string(),
                    role,
                    ResponseMeta {
                        result_count: Some(rows.row_count()),
                        ..partial
                    },
                )
            }
        };

        ChatResponse::new(
            narrated.text,
            ResponseMeta {
                role: Some(role.to_string()),
                result_count: Some(rows.row_count()),
                answer_model: Some(narrated.backend),
                ..partial
            },
        )
    }

    pub async fn handle_weather_query(
        &self,
        question: &str,
        options: &GenerationOptions,
    ) -> ChatResponse {
        let cloud_model = options.cloud_model.as_deref();
        let answer = match self.weather.current().await {
            Ok(reading) => {
                self.orchestrator
                    .weather_answer(question, &reading.summary(), cloud_model)
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        match answer {
            Ok(answer) => ChatResponse::new(
                answer,
                ResponseMeta {
                    tool: Some("weather".to_string()),
                    data_source: Some(DATA_SOURCE.to_string()),
                    model: Some(self.cloud_model_label(options)),
                    ..Default::default()
                },
            ),
            Err(e) => {
                error!("Weather query failed: {e}");
                ChatResponse::new(
                    format!("Weather query failed: {e}"),
                    ResponseMeta {
                        error: Some(e),
                        ..Default::default()
                    },
                )
            }
        }
    }

    pub async fn handle_general_qa(
        &self,
        question: &str,
        options: &GenerationOptions,
    ) -> ChatResponse {
        match self
            .orchestrator
            .general_answer(question, options.cloud_model.as_deref())
            .await
        {
            Ok(answer) => ChatResponse::new(
                answer,
                ResponseMeta {
                    kind: Some(Intent::GeneralQa.to_string()),
                    model: Some(self.cloud_model_label(options)),
                    ..Default::default()
                },
            ),
            Err(e) => {
                error!("General question answering failed: {e}");
                ChatResponse::new(
                    format!("General question answering failed: {e}"),
                    ResponseMeta {
                        error: Some(e.to_string()),
                        ..Default::default()
                    },
                )
            }
        }
    }

    fn cloud_model_label(&self, options: &GenerationOptions) -> String {
        self.orchestrator
            .cloud()
            .resolve_model(options.cloud_model.as_deref())
    }
}

fn advisory(role: &str, current: DatabaseId, suggested: DatabaseId) -> ChatResponse {
    ChatResponse::new(
        format!(
            "Your question does not match the current database. Switch to the {suggested} to query this information.\n\n\
Current database: {current}\nSuggested database: {suggested}\n\n\
Switch the active database and ask again.",
            current = current.display_name(),
            suggested = suggested.display_name(),
        ),
        ResponseMeta {
            suggestion: Some(format!("switch_to_{suggested}")),
            current_db: Some(current),
            suggested_db: Some(suggested),
            role: Some(role.to_string()),
            ..Default::default()
        },
    )
}

fn failure(message: &str, role: &str, meta: ResponseMeta) -> ChatResponse {
    ChatResponse::new(
        format!("Database query failed: {message}"),
        ResponseMeta {
            error: Some(message.to_string()),
            role: Some(role.to_string()),
            ..meta
        },
    )
}
