//! Scheduler trigger-table repository functions (cron + event triggers).

use chrono::{DateTime, Utc};

use uuid::Uuid;

use crate::{
    DbError,
    models::{EventTriggerRow, ScheduledTriggerRow},
};

pub async fn put_scheduled_trigger(
    executor: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    workflow_id: Uuid,
    expression: &str,
    status: &str,
    next_fire_at: DateTime<Utc>,
    document: serde_json::Value,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        INSERT INTO scheduled_triggers (id, workflow_id, expression, status, next_fire_at, document)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status, next_fire_at = EXCLUDED.next_fire_at, document = EXCLUDED.document
        "#,
        id,
        workflow_id,
        expression,
        status,
        next_fire_at,
        document,
    )
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn list_scheduled_triggers(executor: impl sqlx::PgExecutor<'_>) -> Result<Vec<ScheduledTriggerRow>, DbError> {
    let rows = sqlx::query_as!(
        ScheduledTriggerRow,
        r#"SELECT id, workflow_id, expression, status, next_fire_at, document
           FROM scheduled_triggers"#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

pub async fn remove_scheduled_trigger(executor: impl sqlx::PgExecutor<'_>, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query!("DELETE FROM scheduled_triggers WHERE id = $1", id)
        .execute(executor)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

pub async fn put_event_trigger(
    executor: impl sqlx::PgExecutor<'_>,
    id: Uuid,
    workflow_id: Uuid,
    event_pattern: &str,
    status: &str,
    document: serde_json::Value,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        INSERT INTO event_triggers (id, workflow_id, event_pattern, status, document)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status, document = EXCLUDED.document
        "#,
        id,
        workflow_id,
        event_pattern,
        status,
        document,
    )
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn list_event_triggers(executor: impl sqlx::PgExecutor<'_>) -> Result<Vec<EventTriggerRow>, DbError> {
    let rows = sqlx::query_as!(
        EventTriggerRow,
        r#"SELECT id, workflow_id, event_pattern, status, document FROM event_triggers"#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

pub async fn remove_event_trigger(executor: impl sqlx::PgExecutor<'_>, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query!("DELETE FROM event_triggers WHERE id = $1", id)
        .execute(executor)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
