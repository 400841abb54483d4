//! The `Store` trait — durable CRUD for workflows, executions, node results,
//! execution variables, and the scheduler's trigger tables.
//!
//! Two implementations exist: [`memory::InMemoryStore`] here, used by the
//! engine's own test suite and by embedders that don't want a database, and
//! `db::PgStore` (in the `db` crate), which depends on this crate rather
//! than the other way around so storage stays an external collaborator
//! reached only through this trait.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Execution, EventTrigger, NodeResult, ScheduledTrigger, Workflow};

/// Errors surfaced by a `Store` implementation.
#[derive(Debug, Error, Clone)]
pub enum StorageError {
    /// The requested row does not exist. Terminal — retrying won't help.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store is temporarily unable to serve the request (connection
    /// pool exhausted, deadlock detected, transient I/O error). Retryable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The request violated a data invariant (e.g. duplicate workflow id).
    #[error("storage conflict: {0}")]
    Conflict(String),
}

/// Durable state for the engine. Implementations MUST ensure `NodeResult`
/// writes for one execution never block writes for another, and that writes
/// to `(Execution.status, NodeResult.status)` are linearizable per
/// execution id.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_execution(&self, execution: Execution) -> Result<(), StorageError>;
    async fn update_execution(&self, execution: &Execution) -> Result<(), StorageError>;
    async fn get_execution(&self, id: Uuid) -> Result<Execution, StorageError>;
    async fn list_executions_by_workflow(
        &self,
        workflow_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Execution>, StorageError>;
    async fn get_running_executions(&self) -> Result<Vec<Execution>, StorageError>;

    async fn upsert_node_result(&self, result: NodeResult) -> Result<(), StorageError>;
    async fn get_node_results(&self, execution_id: Uuid) -> Result<Vec<NodeResult>, StorageError>;

    async fn set_variable(
        &self,
        execution_id: Uuid,
        key: String,
        value: Value,
    ) -> Result<(), StorageError>;
    async fn get_variable(
        &self,
        execution_id: Uuid,
        key: &str,
    ) -> Result<Option<Value>, StorageError>;

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StorageError>;
    async fn put_workflow(&self, workflow: Workflow) -> Result<(), StorageError>;
    async fn list_workflows(&self) -> Result<Vec<Workflow>, StorageError>;
    async fn delete_workflow(&self, id: Uuid) -> Result<(), StorageError>;

    async fn put_scheduled_trigger(&self, trigger: ScheduledTrigger) -> Result<(), StorageError>;
    async fn list_scheduled_triggers(&self) -> Result<Vec<ScheduledTrigger>, StorageError>;
    async fn remove_scheduled_trigger(&self, id: Uuid) -> Result<(), StorageError>;

    async fn put_event_trigger(&self, trigger: EventTrigger) -> Result<(), StorageError>;
    async fn list_event_triggers(&self) -> Result<Vec<EventTrigger>, StorageError>;
    async fn remove_event_trigger(&self, id: Uuid) -> Result<(), StorageError>;
}
