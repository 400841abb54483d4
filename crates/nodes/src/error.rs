//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node's `execute` method, or synthesized by the
/// executor around a node's lifecycle (construction, timeout, panic).
///
/// `is_retryable` tells the executor whether re-invoking `execute` with a
/// fresh attempt could plausibly succeed. Deterministic failures — a bad
/// registry config, a reference that will never resolve — never retry
/// regardless of `max_retries`.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// The node's own business logic reported a failure.
    #[error("node execution failed: {0}")]
    Execute(String),

    /// Constructing the `ExecutableNode` from its config failed.
    #[error("node construction failed: {0}")]
    Construction(String),

    /// The per-node timeout elapsed before `execute` returned.
    #[error("node execution timed out")]
    Timeout,

    /// The node task panicked; the executor caught the join error.
    #[error("node panicked: {0}")]
    Panicked(String),

    /// A `${...}` template reference could not be resolved against the
    /// layered input scope.
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    /// A connection's `condition` expression failed to evaluate.
    #[error("condition evaluation failed: {0}")]
    ConditionEval(String),
}

impl NodeError {
    /// Whether the executor should consider retrying this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            NodeError::Construction(_) | NodeError::UnresolvedReference(_)
        )
    }
}
