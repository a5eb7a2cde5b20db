use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::db::{ConnectionStatus, DatabaseId};
use crate::shared::models::{
    ChatRequest, ChatResponse, CrossDbRequest, CrossDbResponse, SwitchDbRequest,
};
use crate::shared::state::AppState;

pub async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let pipeline = Arc::clone(&state.pipeline);
    // A panic inside the pipeline surfaces as a 500 rather than a dropped connection.
    let response = tokio::spawn(async move { pipeline.handle_chat(&request).await })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(response))
}

pub async fn handle_cross_db(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CrossDbRequest>,
) -> Result<Json<CrossDbResponse>, ApiError> {
    let pipeline = Arc::clone(&state.pipeline);
    let response = tokio::spawn(async move { pipeline.handle_cross_db(&request).await })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(response))
}

pub async fn handle_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "active_db": state.active().get() }))
}

pub async fn handle_switch_db(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SwitchDbRequest>,
) -> Result<Json<Value>, ApiError> {
    let target: DatabaseId = body
        .target
        .parse()
        .map_err(|e: crate::db::DbError| ApiError::InvalidRequest(e.to_string()))?;
    let active = state.active().switch(target);
    Ok(Json(json!({ "active_db": active })))
}

pub async fn handle_test_db_connections(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, ConnectionStatus>> {
    Json(state.connections.test_connections().await)
}

pub async fn handle_models_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let orchestrator = state.orchestrator();
    let cloud = orchestrator.cloud();
    Json(json!({
        "local_model": orchestrator.local().model_info(),
        "cloud_model": {
            "current": cloud.current_model(),
            "available": cloud.available_models(),
            "status": "available",
        }
    }))
}

#[derive(Debug, Deserialize)]
pub struct ModelSwitchQuery {
    pub model_type: Option<String>,
    pub model_name: Option<String>,
}

pub async fn handle_models_switch(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModelSwitchQuery>,
) -> Result<Json<Value>, ApiError> {
    let orchestrator = state.orchestrator();
    match query.model_type.as_deref() {
        Some("local") => {
            let local = orchestrator.local();
            let success = local.reload().await;
            Ok(Json(json!({
                "success": success,
                "model_type": "local",
                "status": local.model_info(),
            })))
        }
        Some("cloud") => {
            let cloud = orchestrator.cloud();
            match query.model_name.as_deref() {
                Some(name) if cloud.set_model(name) => Ok(Json(json!({
                    "success": true,
                    "model_type": "cloud",
                    "current_model": cloud.current_model(),
                    "available_models": cloud.available_models(),
                }))),
                other => Err(ApiError::InvalidRequest(format!(
                    "Invalid cloud model: {}",
                    other.unwrap_or_default()
                ))),
            }
        }
        _ => Err(ApiError::InvalidRequest(
            "Invalid model type, supported: local, cloud".to_string(),
        )),
    }
}
