//! Workflow CRUD operations.

use uuid::Uuid;

use crate::{DbError, models::WorkflowRow};

/// Insert or overwrite a workflow row (workflows are put by domain `id`,
/// not generated here — the `engine` crate already assigned it).
pub async fn put_workflow(
    executor: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    name: &str,
    definition: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        INSERT INTO workflows (id, name, definition, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, definition = EXCLUDED.definition
        "#,
        id,
        name,
        definition,
        created_at,
    )
    .execute(executor)
    .await?;

    Ok(())
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(executor: impl sqlx::PgExecutor<'_>, id: Uuid) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as!(
        WorkflowRow,
        r#"SELECT id, name, definition, created_at FROM workflows WHERE id = $1"#,
        id,
    )
    .fetch_optional(executor)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Return all workflows ordered by creation time (newest first).
pub async fn list_workflows(executor: impl sqlx::PgExecutor<'_>) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as!(
        WorkflowRow,
        r#"SELECT id, name, definition, created_at FROM workflows ORDER BY created_at DESC"#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Permanently delete a workflow by its primary key.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(executor: impl sqlx::PgExecutor<'_>, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query!("DELETE FROM workflows WHERE id = $1", id)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
