use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::storage::StorageError;
use engine::{Connection, Node, Trigger, Workflow};
use uuid::Uuid;

use crate::AppState;

#[derive(serde::Deserialize)]
pub struct CreateWorkflowDto {
    pub name: String,
    pub trigger: Trigger,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

fn map_storage_err(err: StorageError) -> StatusCode {
    match err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::Unavailable(_) | StorageError::Conflict(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Workflow>>, StatusCode> {
    state
        .store
        .list_workflows()
        .await
        .map(Json)
        .map_err(map_storage_err)
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Workflow>, StatusCode> {
    state
        .store
        .get_workflow(id)
        .await
        .map(Json)
        .map_err(map_storage_err)
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<Workflow>), StatusCode> {
    let workflow = Workflow::new(payload.name, payload.trigger, payload.nodes, payload.connections);

    engine::dag::build_dependency_graph(&workflow).map_err(|_| StatusCode::BAD_REQUEST)?;

    state
        .store
        .put_workflow(workflow.clone())
        .await
        .map_err(map_storage_err)?;

    Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    state
        .store
        .delete_workflow(id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(map_storage_err)
}
