//! The `ExecutableNode` trait — the contract every node must fulfil.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::NodeError;

/// Reserved `_ctx` bindings injected into every node's resolved input
/// mapping (see the executor's input-resolution layer).
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the parent workflow.
    pub workflow_id: Uuid,
    /// ID of the current execution run.
    pub execution_id: Uuid,
    /// ID of the node being executed.
    pub node_id: String,
    /// 1-indexed retry attempt counter.
    pub attempt: u32,
    /// Wall-clock time the attempt started, from the engine's `Clock`.
    pub now: DateTime<Utc>,
    /// Tripped when the node should abandon work — checked at every
    /// suspension point (I/O, sleeps) inside `execute`.
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    /// Render the `_ctx` binding as a JSON value for input-resolution.
    pub fn as_json(&self) -> Value {
        serde_json::json!({
            "executionId": self.execution_id,
            "workflowId": self.workflow_id,
            "nodeId": self.node_id,
            "attempt": self.attempt,
            "now": self.now,
        })
    }
}

/// The core node trait. Every built-in and plugin node implements this.
///
/// Implementations MUST NOT mutate `input`, MUST check `ctx.cancellation`
/// between suspension points, and MUST treat construction (the registry
/// factory) as pure — no I/O before the first `execute` call.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Execute the node against its resolved input mapping and return this
    /// node's JSON output.
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError>;
}
