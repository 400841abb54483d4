//! Row structs that map onto the Postgres schema in `migrations/0001_init.sql`.
//!
//! Workflow, execution, and node-result bodies round-trip as JSONB documents
//! holding the serialized `engine` domain type; the remaining plain columns
//! exist only so `PgStore` can filter and sort without deserializing every
//! row (`status`, `next_fire_at`, …).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON workflow definition (`engine::models::Workflow`).
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A persisted execution row. `document` holds the serialized
/// `engine::models::Execution`, node results included, so a single read
/// returns a complete `Execution`; `status`/`started_at`/`completed_at` are
/// duplicated as plain columns purely to keep `list_executions_by_workflow`
/// and `get_running_executions` index-backed instead of full scans.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub document: serde_json::Value,
}

/// A persisted node-result row, keyed by (execution_id, node_id). Mirrors
/// the `node_results` map inside the owning `ExecutionRow.document`; kept
/// normalized as well so a coordinator's per-node write never has to read
/// and rewrite the whole execution document under contention.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeResultRow {
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: String,
    pub document: serde_json::Value,
}

/// A persisted execution-scoped variable.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VariableRow {
    pub execution_id: Uuid,
    pub key: String,
    pub value: serde_json::Value,
}

/// A persisted cron trigger row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduledTriggerRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub expression: String,
    pub status: String,
    pub next_fire_at: DateTime<Utc>,
    pub document: serde_json::Value,
}

/// A persisted event-trigger row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventTriggerRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub event_pattern: String,
    pub status: String,
    pub document: serde_json::Value,
}
