//! Engine-level error taxonomy.
//!
//! Three kinds live here: [`ValidationError`] (submit/trigger-creation time,
//! synchronous, nothing persisted), [`ExecutionError`] (attached to a sealed
//! `Execution`), and [`EngineError`] (returned to the caller of `Engine`'s
//! public API). `nodes::NodeError` and `StorageError` are defined in their
//! own crates/modules and convert into these via `#[from]`.

use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;

/// Raised validating a workflow before it is accepted for execution, or
/// validating a trigger definition before it is persisted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("duplicate node id: '{0}'")]
    DuplicateNodeId(String),

    #[error("connection references unknown node '{node_id}' ({side} side)")]
    DanglingConnection { node_id: String, side: &'static str },

    #[error("workflow graph contains a cycle among nodes: {nodes:?}")]
    CycleDetected { nodes: Vec<String> },

    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },
}

/// Raised during a running or just-sealed execution; attached to the
/// `Execution` record's `error` field.
#[derive(Debug, Error, Clone)]
pub enum ExecutionError {
    #[error("execution cancelled")]
    Cancelled,

    #[error("execution aborted by shutdown")]
    Shutdown,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("node '{node_id}' failed: {message}")]
    NodeFailed { node_id: String, message: String },
}

/// Returned synchronously to callers of `Engine`'s public API.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("engine is at capacity (max_concurrent_executions reached)")]
    ExecutorBusy,

    #[error("execution '{0}' not found")]
    ExecutionNotFound(Uuid),

    #[error("workflow '{0}' not found")]
    WorkflowNotFound(Uuid),

    #[error("trigger '{0}' not found")]
    TriggerNotFound(Uuid),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
