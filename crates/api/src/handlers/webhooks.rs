use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::{Trigger, TriggeredBy};
use serde_json::Value;

use crate::AppState;

pub async fn handle_webhook(
    Path(path): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let workflows = state
        .store
        .list_workflows()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let workflow = workflows
        .into_iter()
        .find(|w| matches!(&w.trigger, Trigger::Webhook { path: p } if p == &path))
        .ok_or(StatusCode::NOT_FOUND)?;

    let mut trigger_params = HashMap::new();
    trigger_params.insert("payload".to_string(), payload);

    let execution_id = state
        .engine
        .submit(workflow, trigger_params, TriggeredBy::Api)
        .await
        .map_err(|e| match e {
            engine::EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            engine::EngineError::ExecutorBusy => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "execution_id": execution_id })),
    ))
}
