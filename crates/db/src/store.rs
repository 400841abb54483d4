//! `PgStore` — the Postgres-backed implementation of `engine::storage::Store`.
//!
//! Workflow, execution, and node-result rows carry a JSONB `document`
//! (or `definition`) column holding the serialized domain type verbatim, so
//! reads never need a hand-maintained column-by-column mapping back to
//! `engine::models`; the remaining plain columns exist purely so queries
//! that filter or order (by workflow, by status) stay index-backed.

use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use engine::storage::{Store, StorageError};
use engine::{Execution, EventTrigger, NodeResult, ScheduledTrigger, Workflow};

use crate::{repository, DbError, DbPool};

/// Durable `Store` implementation over a Postgres connection pool.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Run `body` against a single transaction, committing on `Ok` and
    /// rolling back on `Err`.
    ///
    /// This is an inherent method rather than part of `Store` because a
    /// generic-over-closure method isn't object safe, and `Store` is used as
    /// `Arc<dyn Store>` throughout the engine. Callers who need cross-table
    /// atomicity (e.g. a repository change that touches more than one table
    /// under a single write) reach for `PgStore` directly; the engine's own
    /// write path never needs it since the coordinator already serializes
    /// writes per execution and each one lands in a single row.
    pub async fn run_in_transaction<T, F>(&self, body: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(
                &'c mut sqlx::Transaction<'_, sqlx::Postgres>,
            ) -> BoxFuture<'c, Result<T, StorageError>>
            + Send,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let result = body(&mut tx).await;

        match result {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }
}

impl From<DbError> for StorageError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => StorageError::NotFound(err.to_string()),
            other => StorageError::Unavailable(other.to_string()),
        }
    }
}

fn status_tag<T: serde::Serialize>(status: &T) -> Result<String, StorageError> {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(StorageError::Unavailable(format!(
            "status did not serialize to a string: {other}"
        ))),
        Err(e) => Err(StorageError::Unavailable(e.to_string())),
    }
}

fn to_document<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(value).map_err(|e| StorageError::Unavailable(e.to_string()))
}

fn from_document<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<T, StorageError> {
    serde_json::from_value(value)
        .map_err(|e| StorageError::Unavailable(format!("corrupt {what} document: {e}")))
}

#[async_trait]
impl Store for PgStore {
    async fn create_execution(&self, execution: Execution) -> Result<(), StorageError> {
        let status = status_tag(&execution.status)?;
        let document = to_document(&execution)?;
        repository::executions::create_execution(
            &self.pool,
            execution.id,
            execution.workflow_id,
            &status,
            execution.started_at,
            document,
        )
        .await?;
        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> Result<(), StorageError> {
        let status = status_tag(&execution.status)?;
        let document = to_document(execution)?;
        repository::executions::update_execution(
            &self.pool,
            execution.id,
            &status,
            execution.completed_at,
            document,
        )
        .await?;
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Execution, StorageError> {
        let row = repository::executions::get_execution(&self.pool, id).await?;
        from_document(row.document, "execution")
    }

    async fn list_executions_by_workflow(
        &self,
        workflow_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Execution>, StorageError> {
        let rows =
            repository::executions::list_executions_by_workflow(&self.pool, workflow_id, limit, offset)
                .await?;
        rows.into_iter()
            .map(|r| from_document(r.document, "execution"))
            .collect()
    }

    async fn get_running_executions(&self) -> Result<Vec<Execution>, StorageError> {
        let rows = repository::executions::get_running_executions(&self.pool).await?;
        rows.into_iter()
            .map(|r| from_document(r.document, "execution"))
            .collect()
    }

    async fn upsert_node_result(&self, result: NodeResult) -> Result<(), StorageError> {
        let status = status_tag(&result.status)?;
        let document = to_document(&result)?;
        repository::executions::upsert_node_result(
            &self.pool,
            result.execution_id,
            &result.node_id,
            &status,
            document,
        )
        .await?;
        Ok(())
    }

    async fn get_node_results(&self, execution_id: Uuid) -> Result<Vec<NodeResult>, StorageError> {
        let rows = repository::executions::get_node_results(&self.pool, execution_id).await?;
        rows.into_iter()
            .map(|r| from_document(r.document, "node result"))
            .collect()
    }

    async fn set_variable(
        &self,
        execution_id: Uuid,
        key: String,
        value: serde_json::Value,
    ) -> Result<(), StorageError> {
        repository::executions::set_variable(&self.pool, execution_id, &key, value).await?;
        Ok(())
    }

    async fn get_variable(
        &self,
        execution_id: Uuid,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let row = repository::executions::get_variable(&self.pool, execution_id, key).await?;
        Ok(row.map(|r| r.value))
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StorageError> {
        let row = repository::workflows::get_workflow(&self.pool, id).await?;
        from_document(row.definition, "workflow")
    }

    async fn put_workflow(&self, workflow: Workflow) -> Result<(), StorageError> {
        let definition = to_document(&workflow)?;
        repository::workflows::put_workflow(
            &self.pool,
            workflow.id,
            &workflow.name,
            definition,
            workflow.created_at,
        )
        .await?;
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StorageError> {
        let rows = repository::workflows::list_workflows(&self.pool).await?;
        rows.into_iter()
            .map(|r| from_document(r.definition, "workflow"))
            .collect()
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<(), StorageError> {
        repository::workflows::delete_workflow(&self.pool, id).await?;
        Ok(())
    }

    async fn put_scheduled_trigger(&self, trigger: ScheduledTrigger) -> Result<(), StorageError> {
        let status = status_tag(&trigger.status)?;
        let document = to_document(&trigger)?;
        repository::triggers::put_scheduled_trigger(
            &self.pool,
            trigger.id,
            trigger.workflow_id,
            &trigger.expression,
            &status,
            trigger.next_fire_at,
            document,
        )
        .await?;
        Ok(())
    }

    async fn list_scheduled_triggers(&self) -> Result<Vec<ScheduledTrigger>, StorageError> {
        let rows = repository::triggers::list_scheduled_triggers(&self.pool).await?;
        rows.into_iter()
            .map(|r| from_document(r.document, "scheduled trigger"))
            .collect()
    }

    async fn remove_scheduled_trigger(&self, id: Uuid) -> Result<(), StorageError> {
        repository::triggers::remove_scheduled_trigger(&self.pool, id).await?;
        Ok(())
    }

    async fn put_event_trigger(&self, trigger: EventTrigger) -> Result<(), StorageError> {
        let status = status_tag(&trigger.status)?;
        let document = to_document(&trigger)?;
        repository::triggers::put_event_trigger(
            &self.pool,
            trigger.id,
            trigger.workflow_id,
            &trigger.event_pattern,
            &status,
            document,
        )
        .await?;
        Ok(())
    }

    async fn list_event_triggers(&self) -> Result<Vec<EventTrigger>, StorageError> {
        let rows = repository::triggers::list_event_triggers(&self.pool).await?;
        rows.into_iter()
            .map(|r| from_document(r.document, "event trigger"))
            .collect()
    }

    async fn remove_event_trigger(&self, id: Uuid) -> Result<(), StorageError> {
        repository::triggers::remove_event_trigger(&self.pool, id).await?;
        Ok(())
    }
}
