//! Execution, node-result, and execution-variable repository functions.

use chrono::{DateTime, Utc};

use uuid::Uuid;

use crate::{
    DbError,
    models::{ExecutionRow, NodeResultRow, VariableRow},
};

pub async fn create_execution(
    executor: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    workflow_id: Uuid,
    status: &str,
    started_at: DateTime<Utc>,
    document: serde_json::Value,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        INSERT INTO executions (id, workflow_id, status, started_at, completed_at, document)
        VALUES ($1, $2, $3, $4, NULL, $5)
        "#,
        id,
        workflow_id,
        status,
        started_at,
        document,
    )
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn update_execution(
    executor: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    status: &str,
    completed_at: Option<DateTime<Utc>>,
    document: serde_json::Value,
) -> Result<(), DbError> {
    let result = sqlx::query!(
        r#"
        UPDATE executions
        SET status = $1, completed_at = $2, document = $3
        WHERE id = $4
        "#,
        status,
        completed_at,
        document,
        id,
    )
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

pub async fn get_execution(executor: impl sqlx::PgExecutor<'_>, id: Uuid) -> Result<ExecutionRow, DbError> {
    let row = sqlx::query_as!(
        ExecutionRow,
        r#"SELECT id, workflow_id, status, started_at, completed_at, document
           FROM executions WHERE id = $1"#,
        id,
    )
    .fetch_optional(executor)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

pub async fn list_executions_by_workflow(
    executor: impl sqlx::PgExecutor<'_>,
    workflow_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<ExecutionRow>, DbError> {
    let rows = sqlx::query_as!(
        ExecutionRow,
        r#"SELECT id, workflow_id, status, started_at, completed_at, document
           FROM executions
           WHERE workflow_id = $1
           ORDER BY started_at DESC
           LIMIT $2 OFFSET $3"#,
        workflow_id,
        limit,
        offset,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

pub async fn get_running_executions(executor: impl sqlx::PgExecutor<'_>) -> Result<Vec<ExecutionRow>, DbError> {
    let rows = sqlx::query_as!(
        ExecutionRow,
        r#"SELECT id, workflow_id, status, started_at, completed_at, document
           FROM executions WHERE status = 'running'"#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

pub async fn upsert_node_result(
    executor: impl sqlx::PgExecutor<'_>,
    execution_id: Uuid,
    node_id: &str,
    status: &str,
    document: serde_json::Value,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        INSERT INTO node_results (execution_id, node_id, status, document)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (execution_id, node_id) DO UPDATE
        SET status = EXCLUDED.status, document = EXCLUDED.document
        "#,
        execution_id,
        node_id,
        status,
        document,
    )
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_node_results(
    executor: impl sqlx::PgExecutor<'_>,
    execution_id: Uuid,
) -> Result<Vec<NodeResultRow>, DbError> {
    let rows = sqlx::query_as!(
        NodeResultRow,
        r#"SELECT execution_id, node_id, status, document
           FROM node_results WHERE execution_id = $1"#,
        execution_id,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

pub async fn set_variable(
    executor: impl sqlx::PgExecutor<'_>,
    execution_id: Uuid,
    key: &str,
    value: serde_json::Value,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        INSERT INTO exec_variables (execution_id, key, value)
        VALUES ($1, $2, $3)
        ON CONFLICT (execution_id, key) DO UPDATE SET value = EXCLUDED.value
        "#,
        execution_id,
        key,
        value,
    )
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_variable(
    executor: impl sqlx::PgExecutor<'_>,
    execution_id: Uuid,
    key: &str,
) -> Result<Option<VariableRow>, DbError> {
    let row = sqlx::query_as!(
        VariableRow,
        r#"SELECT execution_id, key, value FROM exec_variables
           WHERE execution_id = $1 AND key = $2"#,
        execution_id,
        key,
    )
    .fetch_optional(executor)
    .await?;

    Ok(row)
}
