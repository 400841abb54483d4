use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use engine::storage::StorageError;
use engine::{Execution, TriggeredBy};
use serde_json::Value;
use uuid::Uuid;

use crate::AppState;

#[derive(serde::Deserialize, Default)]
pub struct ExecuteWorkflowDto {
    #[serde(default)]
    pub trigger_params: HashMap<String, Value>,
}

#[derive(serde::Deserialize)]
pub struct ListExecutionsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

fn map_storage_err(err: StorageError) -> StatusCode {
    match err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::Unavailable(_) | StorageError::Conflict(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(serde::Serialize)]
pub struct ExecuteWorkflowResponse {
    pub execution_id: Uuid,
}

pub async fn execute(
    Path(workflow_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteWorkflowDto>,
) -> Result<(StatusCode, Json<ExecuteWorkflowResponse>), StatusCode> {
    let workflow = state
        .store
        .get_workflow(workflow_id)
        .await
        .map_err(map_storage_err)?;

    let execution_id = state
        .engine
        .submit(workflow, payload.trigger_params, TriggeredBy::Api)
        .await
        .map_err(|e| match e {
            engine::EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            engine::EngineError::ExecutorBusy => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    Ok((StatusCode::ACCEPTED, Json(ExecuteWorkflowResponse { execution_id })))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Execution>, StatusCode> {
    state
        .engine
        .get_execution(id)
        .await
        .map(Json)
        .map_err(|e| match e {
            engine::EngineError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })
}

pub async fn list_for_workflow(
    Path(workflow_id): Path<Uuid>,
    Query(q): Query<ListExecutionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Execution>>, StatusCode> {
    state
        .store
        .list_executions_by_workflow(workflow_id, q.limit, q.offset)
        .await
        .map(Json)
        .map_err(map_storage_err)
}
