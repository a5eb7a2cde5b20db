use super::{PipelineError, QueryPipeline};
use crate::db::DatabaseId;
use crate::security::rbac::authorize;
use crate::security::sql_sanitizer::sanitize;
use crate::shared::models::{
    CrossDbRequest, CrossDbResponse, ExpertToolResult, GenerationOptions, ResponseMeta,
};
use log::{info, warn};

pub fn expert_tool_name(database: DatabaseId) -> String {
    format!("{}_Expert", database.catalog_name())
}

fn expert_failure(database: DatabaseId, query: String, message: String) -> ExpertToolResult {
    warn!("{} failed: {message}", expert_tool_name(database));
    ExpertToolResult {
        tool_name: expert_tool_name(database),
        database: database.catalog_name().to_string(),
        query,
        result: String::new(),
        success: false,
        error_message: Some(message),
    }
}

impl QueryPipeline {
    /// Runs one question against a single fixed database with the caller's policy.
    pub async fn handle_expert_query(
        &self,
        question: &str,
        database: DatabaseId,
        role: &str,
        options: &GenerationOptions,
    ) -> ExpertToolResult {
        let catalog = database.catalog_name();
        let Some(policy) = self.policies.resolve_role(role) else {
            let reason = self.policies.unknown_role(role).reason;
            return expert_failure(database, String::new(), format!("Permission denied: {reason}"));
        };

        let schema = self.schemas.schema_for(database);
        let generated = match self
            .orchestrator
            .generate_expert_sql(catalog, question, schema, options)
            .await
        {
            Ok(generated) => generated,
            Err(e) => return expert_failure(database, String::new(), e.to_string()),
        };

        let sql = sanitize(&generated.text);
        let decision = authorize(&sql, role, policy);
        if !decision.allowed {
            return expert_failure(database, sql, format!("Permission denied: {}", decision.reason));
        }

        let rows = match self.executor.execute(database, &sql).await {
            Ok(rows) => rows,
            Err(e) => return expert_failure(database, sql, e.to_string()),
        };

        let result = if rows.is_empty() {
            format!("No matching information found in {catalog}.")
        } else {
            let described = rows.describe();
            match self.orchestrator.narrate(question, &described, options).await {
                Ok(narrated) => narrated.text,
                Err(e) => {
                    warn!("Narration failed for {catalog}, returning raw rows: {e}");
                    described
                }
            }
        };

        ExpertToolResult {
            tool_name: expert_tool_name(database),
            database: catalog.to_string(),
            query: sql,
            result,
            success: true,
            error_message: None,
        }
    }

    /// Asks every database expert independently and reports each result as produced.
    pub async fn handle_cross_db(
        &self,
        request: &CrossDbRequest,
    ) -> Result<CrossDbResponse, PipelineError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }

        let options = request.generation_options();
        let mut tool_results = Vec::with_capacity(DatabaseId::ALL.len());
        for database in DatabaseId::ALL {
            let role = self.caller_role(request.role.as_deref(), &request.user_id, database);
            tool_results.push(
                self.handle_expert_query(question, database, &role, &options)
                    .await,
            );
        }

        let succeeded = tool_results.iter().filter(|r| r.success).count();
        info!(
            "Cross-database query finished: {succeeded}/{} experts succeeded",
            tool_results.len()
        );

        Ok(CrossDbResponse {
            answer: combined_answer(&tool_results),
            reasoning: reasoning(&tool_results),
            meta: ResponseMeta {
                kind: Some("cross_db".to_string()),
                result_count: Some(succeeded),
                ..Default::default()
            },
            tool_results,
        })
    }
}

fn combined_answer(results: &[ExpertToolResult]) -> String {
    let answers: Vec<String> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| format!("[{}] {}", r.database, r.result))
        .collect();
    if answers.is_empty() {
        "None of the database experts could answer the question.".to_string()
    } else {
        answers.join("\n\n")
    }
}

fn reasoning(results: &[ExpertToolResult]) -> String {
    let steps: Vec<String> = results
        .iter()
        .map(|r| match &r.error_message {
            None => format!("{} succeeded", r.tool_name),
            Some(e) => format!("{} failed ({e})", r.tool_name),
        })
        .collect();
    format!(
        "Consulted {} database experts: {}.",
        results.len(),
        steps.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ActiveDatabase;
    use crate::llm::GenerationOrchestrator;
    use crate::tests::test_util::{FakeCloud, FakeExecutor, FakeLocal, FakeWeather};
    use serde_json::json;
    use std::sync::Arc;

    fn pipeline(local: FakeLocal, executor: Arc<FakeExecutor>) -> QueryPipeline {
        QueryPipeline::new(
            GenerationOrchestrator::new(Arc::new(local), Arc::new(FakeCloud::failing("offline"))),
            executor,
            Arc::new(FakeWeather { reading: None }),
            ActiveDatabase::default(),
        )
    }

    #[test]
    fn test_tool_names() {
        assert_eq!(expert_tool_name(DatabaseId::Hospital), "hospital_db_Expert");
        assert_eq!(expert_tool_name(DatabaseId::Warehouse), "warehouse_db_Expert");
    }

    #[tokio::test]
    async fn test_empty_rows_short_circuit_narration() {
        let local = FakeLocal::serving_sql("SELECT * FROM doctors;", "narrated");
        let p = pipeline(local, Arc::new(FakeExecutor::returning(vec![])));
        let result = p
            .handle_expert_query("doctors?", DatabaseId::Hospital, "admin", &GenerationOptions::default())
            .await;
        assert!(result.success);
        assert_eq!(result.result, "No matching information found in hospital_db.");
        assert_eq!(result.query, "SELECT * FROM doctors;");
    }

    #[tokio::test]
    async fn test_generation_failure_is_reported() {
        let p = pipeline(
            FakeLocal::unavailable("missing"),
            Arc::new(FakeExecutor::returning(vec![json!({"quantity": 4})])),
        );
        let result = p
            .handle_expert_query("stock?", DatabaseId::Warehouse, "Manager", &GenerationOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.tool_name, "warehouse_db_Expert");
        assert!(result.query.is_empty());
        assert!(result.error_message.unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn test_narration_failure_falls_back_to_rows() {
        let p = QueryPipeline::new(
            GenerationOrchestrator::new(
                Arc::new(FakeLocal::unavailable("missing")),
                Arc::new(FakeCloud::sql_only("SELECT quantity FROM inventory;")),
            ),
            Arc::new(FakeExecutor::returning(vec![json!({"quantity": 4})])),
            Arc::new(FakeWeather { reading: None }),
            ActiveDatabase::default(),
        );
        let result = p
            .handle_expert_query("stock?", DatabaseId::Warehouse, "Operator", &GenerationOptions::default())
            .await;
        assert!(result.success);
        assert_eq!(result.result, r#"Found 1 records: [{"quantity":4}]"#);
    }

    #[tokio::test]
    async fn test_denied_expert_never_executes() {
        let executor = Arc::new(FakeExecutor::returning(vec![json!({"price": 1})]));
        let p = pipeline(
            FakeLocal::serving_sql("SELECT price FROM products;", "x"),
            executor.clone(),
        );
        let result = p
            .handle_expert_query("prices", DatabaseId::Warehouse, "Operator", &GenerationOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.query, "SELECT price FROM products;");
        assert!(result.error_message.unwrap().contains("price"));
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_cross_db_reports_each_expert() {
        let executor = Arc::new(FakeExecutor::returning(vec![json!({"n": 1})]));
        let p = pipeline(
            FakeLocal::serving_sql("SELECT * FROM doctors;", "One row."),
            executor.clone(),
        );
        let request = CrossDbRequest {
            user_id: "S2002".to_string(),
            role: None,
            question: "everything about doctors".to_string(),
            model_type: None,
            cloud_model: None,
        };
        let response = p.handle_cross_db(&request).await.unwrap();

        assert_eq!(response.tool_results.len(), 2);
        let hospital = &response.tool_results[0];
        let warehouse = &response.tool_results[1];
        // S2002 resolves to admin in the hospital and Operator in the warehouse.
        assert!(hospital.success);
        assert_eq!(hospital.result, "One row.");
        assert!(!warehouse.success);
        assert!(warehouse.error_message.as_deref().unwrap().contains("doctors"));

        assert_eq!(response.answer, "[hospital_db] One row.");
        assert!(response.reasoning.contains("hospital_db_Expert succeeded"));
        assert!(response.reasoning.contains("warehouse_db_Expert failed"));
        assert_eq!(response.meta.result_count, Some(1));
        assert_eq!(executor.statements(), vec![(DatabaseId::Hospital, "SELECT * FROM doctors;".to_string())]);
    }

    #[tokio::test]
    async fn test_cross_db_rejects_empty_question() {
        let p = pipeline(FakeLocal::serving("x"), Arc::new(FakeExecutor::returning(vec![])));
        let request = CrossDbRequest {
            user_id: "u".to_string(),
            role: None,
            question: String::new(),
            model_type: None,
            cloud_model: None,
        };
        assert!(p.handle_cross_db(&request).await.is_err());
    }
}
