//! `InMemoryStore` — a `parking_lot`-guarded `Store` implementation used by
//! the engine's own test suite and by callers embedding the engine without
//! a database.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Execution, EventTrigger, NodeResult, ScheduledTrigger, Workflow};
use crate::storage::{Store, StorageError};

/// Every collection gets its own lock so that, e.g., writing a `NodeResult`
/// for one execution never blocks a `get_workflow` call for an unrelated
/// workflow.
#[derive(Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    executions: RwLock<HashMap<Uuid, Execution>>,
    node_results: RwLock<HashMap<(Uuid, String), NodeResult>>,
    variables: RwLock<HashMap<(Uuid, String), Value>>,
    scheduled_triggers: RwLock<HashMap<Uuid, ScheduledTrigger>>,
    event_triggers: RwLock<HashMap<Uuid, EventTrigger>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_execution(&self, execution: Execution) -> Result<(), StorageError> {
        let mut executions = self.executions.write();
        if executions.contains_key(&execution.id) {
            return Err(StorageError::Conflict(format!(
                "execution '{}' already exists",
                execution.id
            )));
        }
        executions.insert(execution.id, execution);
        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> Result<(), StorageError> {
        let mut executions = self.executions.write();
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Execution, StorageError> {
        self.executions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("execution '{id}'")))
    }

    async fn list_executions_by_workflow(
        &self,
        workflow_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Execution>, StorageError> {
        let mut matching: Vec<Execution> = self
            .executions
            .read()
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.started_at);
        let offset = offset.max(0) as usize;
        let limit = limit.max(0) as usize;
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn get_running_executions(&self) -> Result<Vec<Execution>, StorageError> {
        Ok(self
            .executions
            .read()
            .values()
            .filter(|e| matches!(e.status, crate::models::ExecutionStatus::Running))
            .cloned()
            .collect())
    }

    async fn upsert_node_result(&self, result: NodeResult) -> Result<(), StorageError> {
        let key = (result.execution_id, result.node_id.clone());
        self.node_results.write().insert(key, result);
        Ok(())
    }

    async fn get_node_results(&self, execution_id: Uuid) -> Result<Vec<NodeResult>, StorageError> {
        Ok(self
            .node_results
            .read()
            .values()
            .filter(|r| r.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn set_variable(
        &self,
        execution_id: Uuid,
        key: String,
        value: Value,
    ) -> Result<(), StorageError> {
        self.variables.write().insert((execution_id, key), value);
        Ok(())
    }

    async fn get_variable(
        &self,
        execution_id: Uuid,
        key: &str,
    ) -> Result<Option<Value>, StorageError> {
        Ok(self
            .variables
            .read()
            .get(&(execution_id, key.to_string()))
            .cloned())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StorageError> {
        self.workflows
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("workflow '{id}'")))
    }

    async fn put_workflow(&self, workflow: Workflow) -> Result<(), StorageError> {
        self.workflows.write().insert(workflow.id, workflow);
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StorageError> {
        Ok(self.workflows.read().values().cloned().collect())
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<(), StorageError> {
        self.workflows
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("workflow '{id}'")))
    }

    async fn put_scheduled_trigger(&self, trigger: ScheduledTrigger) -> Result<(), StorageError> {
        self.scheduled_triggers.write().insert(trigger.id, trigger);
        Ok(())
    }

    async fn list_scheduled_triggers(&self) -> Result<Vec<ScheduledTrigger>, StorageError> {
        Ok(self.scheduled_triggers.read().values().cloned().collect())
    }

    async fn remove_scheduled_trigger(&self, id: Uuid) -> Result<(), StorageError> {
        self.scheduled_triggers
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("scheduled trigger '{id}'")))
    }

    async fn put_event_trigger(&self, trigger: EventTrigger) -> Result<(), StorageError> {
        self.event_triggers.write().insert(trigger.id, trigger);
        Ok(())
    }

    async fn list_event_triggers(&self) -> Result<Vec<EventTrigger>, StorageError> {
        Ok(self.event_triggers.read().values().cloned().collect())
    }

    async fn remove_event_trigger(&self, id: Uuid) -> Result<(), StorageError> {
        self.event_triggers
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("event trigger '{id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionStatus, TriggeredBy};
    use chrono::Utc;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryStore::new();
        let workflow_id = Uuid::new_v4();
        let execution = Execution::new(
            workflow_id,
            TriggeredBy::Manual,
            HashMap::new(),
            HashMap::new(),
            Utc::now(),
        );
        let id = execution.id;
        store.create_execution(execution).await.unwrap();

        let fetched = store.get_execution(id).await.unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, ExecutionStatus::Created);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryStore::new();
        let execution = Execution::new(
            Uuid::new_v4(),
            TriggeredBy::Manual,
            HashMap::new(),
            HashMap::new(),
            Utc::now(),
        );
        store.create_execution(execution.clone()).await.unwrap();
        assert!(matches!(
            store.create_execution(execution).await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn missing_workflow_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.get_workflow(Uuid::new_v4()).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn node_results_are_scoped_per_execution() {
        let store = InMemoryStore::new();
        let exec_a = Uuid::new_v4();
        let exec_b = Uuid::new_v4();
        store
            .upsert_node_result(NodeResult::pending(exec_a, "n1"))
            .await
            .unwrap();
        store
            .upsert_node_result(NodeResult::pending(exec_b, "n1"))
            .await
            .unwrap();

        let results_a = store.get_node_results(exec_a).await.unwrap();
        assert_eq!(results_a.len(), 1);
        assert_eq!(results_a[0].execution_id, exec_a);
    }
}
