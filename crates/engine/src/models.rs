//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow and its
//! executions look like in memory. They serialize to/from the JSONB/JSON
//! columns the `db` crate's tables use.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// How long to wait before retrying a failed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Always wait the same duration.
    Constant { delay_ms: u64 },
    /// Wait `base_ms * 2^(attempt - 1)`, capped at `cap_ms`, with up to 20%
    /// jitter applied to spread out synchronized retries.
    Exponential {
        base_ms: u64,
        cap_ms: u64,
        #[serde(default)]
        jitter: bool,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Exponential {
            base_ms: 100,
            cap_ms: 30_000,
            jitter: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this workflow (referenced by connections).
    pub id: String,
    /// Human-readable label, shown in the UI and logs.
    #[serde(default)]
    pub name: String,
    /// Maps to a registered `ExecutableNode` implementation.
    pub node_type: String,
    /// Arbitrary configuration passed to the node's factory. Opaque to the
    /// executor.
    #[serde(default)]
    pub config: Value,
    /// Per-node execution timeout. Falls back to the engine default when
    /// absent, capped at the engine maximum either way.
    #[serde(default)]
    pub timeout: Option<std::time::Duration>,
    /// Maximum number of retries after the first failed attempt. `None`
    /// means the engine default.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Backoff policy between retries. `None` means the engine default.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Directed edge from one node to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub source_node_id: String,
    pub target_node_id: String,
    /// Key under the source's output to bind.
    #[serde(default)]
    pub source_port: Option<String>,
    /// Key in the target's resolved input to bind `source_port` under.
    #[serde(default)]
    pub target_port: Option<String>,
    /// Expression evaluated against the source's output. When it evaluates
    /// to a falsy value, this edge does not satisfy the dependency and the
    /// target is skipped unless another edge satisfies it.
    #[serde(default)]
    pub condition: Option<String>,
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// How a workflow is started. Distinct from the scheduler's persisted
/// trigger tables (`ScheduledTrigger`/`EventTrigger`) — this describes the
/// default manual/webhook binding carried on the workflow itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Webhook { path: String },
    Manual,
    Cron { expression: String },
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition, immutable once submitted for an
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger: Trigger,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    /// Default variable bindings, merged under trigger params at submit time.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// When true, a failed node only skips its own dependents; independent
    /// branches keep running. Defaults to fail-fast.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Optional execution-wide timeout; trips the execution's root
    /// cancellation token when it elapses.
    #[serde(default)]
    pub execution_timeout: Option<std::time::Duration>,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for tests and programmatic authoring.
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        nodes: Vec<Node>,
        connections: Vec<Connection>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            trigger,
            nodes,
            connections,
            variables: HashMap::new(),
            continue_on_error: false,
            execution_timeout: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Terminal and non-terminal states of an `Execution`. Transitions are
/// monotonic: created → queued → running → {succeeded, failed, cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Created,
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Who or what caused an execution to be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    Manual,
    Scheduler,
    Event,
    Api,
}

/// One run of a `Workflow` with concrete inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub triggered_by: TriggeredBy,
    #[serde(default)]
    pub trigger_params: HashMap<String, Value>,
    /// Merged view of workflow defaults and trigger params, mutable over the
    /// life of the execution as nodes write variables.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub node_results: HashMap<String, NodeResult>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Execution {
    pub fn new(
        workflow_id: Uuid,
        triggered_by: TriggeredBy,
        trigger_params: HashMap<String, Value>,
        variables: HashMap<String, Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: ExecutionStatus::Created,
            triggered_by,
            trigger_params,
            variables,
            node_results: HashMap::new(),
            started_at: now,
            completed_at: None,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeResult
// ---------------------------------------------------------------------------

/// Per-node outcome within one `Execution`. Status moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NodeStatus::Pending | NodeStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: NodeStatus,
    /// 1-indexed retry attempt counter; the attempt that produced the
    /// current status.
    pub attempt: u32,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<std::time::Duration>,
}

impl NodeResult {
    pub fn pending(execution_id: Uuid, node_id: impl Into<String>) -> Self {
        Self {
            execution_id,
            node_id: node_id.into(),
            status: NodeStatus::Pending,
            attempt: 0,
            output: Value::Null,
            error: None,
            started_at: None,
            completed_at: None,
            duration: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler trigger tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTrigger {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub expression: String,
    #[serde(default)]
    pub trigger_params: HashMap<String, Value>,
    pub status: TriggerStatus,
    #[serde(default)]
    pub last_fired_at: Option<DateTime<Utc>>,
    pub next_fire_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTrigger {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// `*` matches any event type; otherwise an exact match on the event's
    /// `event_type` field.
    pub event_pattern: String,
    /// Expression evaluated against the event payload; absent means "always
    /// matches" once the pattern matched.
    #[serde(default)]
    pub conditions: Option<String>,
    #[serde(default)]
    pub trigger_params_template: HashMap<String, Value>,
    pub status: TriggerStatus,
}

/// An inbound event published to the scheduler's event subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub payload: Value,
}
