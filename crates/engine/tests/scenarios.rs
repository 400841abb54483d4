//! End-to-end scenarios against `InMemoryStore` and the reference node
//! types, covering linear success, diamond parallelism, fail-fast
//! isolation, retry-then-succeed, mid-flight cancellation, and cycle
//! rejection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine::storage::{memory::InMemoryStore, Store};
use engine::{
    Connection, Engine, EngineError, ExecutionStatus, ExecutorConfig, Node, NodeStatus,
    RetryPolicy, TemplateEvaluator, Trigger, TriggeredBy, ValidationError, Workflow,
};
use nodes::mock::{EchoNode, FailNode, FlakyNode, SleepyNode};
use nodes::{ExecutableNode, ExecutionContext, NodeError, NodeRegistry, SystemClock};
use serde_json::{json, Value};

fn node(id: &str, node_type: &str, config: Value) -> Node {
    Node {
        id: id.to_string(),
        name: id.to_string(),
        node_type: node_type.to_string(),
        config,
        timeout: None,
        max_retries: None,
        retry_policy: None,
    }
}

fn edge(from: &str, to: &str) -> Connection {
    Connection {
        source_node_id: from.to_string(),
        target_node_id: to.to_string(),
        source_port: None,
        target_port: None,
        condition: None,
    }
}

fn registry_with_mocks() -> NodeRegistry {
    let registry = NodeRegistry::new();
    registry
        .register(
            "echo",
            Arc::new(|_cfg: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                Ok(Arc::new(EchoNode::new()))
            }),
        )
        .unwrap();
    registry
        .register(
            "fail",
            Arc::new(|_cfg: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                Ok(Arc::new(FailNode::new("boom")))
            }),
        )
        .unwrap();
    registry
        .register(
            "flaky",
            Arc::new(|_cfg: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                Ok(Arc::new(FlakyNode::new(2, json!({"ok": true}))))
            }),
        )
        .unwrap();
    registry
        .register(
            "sleepy",
            Arc::new(|cfg: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                let ms = cfg.get("sleep_ms").and_then(Value::as_u64).unwrap_or(1000);
                Ok(Arc::new(SleepyNode::new(
                    "sleepy",
                    Duration::from_millis(ms),
                    json!({"slept": true}),
                )))
            }),
        )
        .unwrap();
    registry
}

fn new_engine(registry: NodeRegistry) -> (Engine, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let engine = Engine::new(
        store.clone(),
        registry,
        Arc::new(SystemClock),
        Arc::new(TemplateEvaluator::new()),
        ExecutorConfig::default(),
    );
    (engine, store)
}

fn workflow(nodes: Vec<Node>, connections: Vec<Connection>) -> Workflow {
    Workflow::new("test", Trigger::Manual, nodes, connections)
}

// Scenario 1: linear success A -> B -> C.
#[tokio::test]
async fn linear_chain_succeeds() {
    let (engine, _store) = new_engine(registry_with_mocks());
    let wf = workflow(
        vec![
            node("a", "echo", Value::Null),
            node("b", "echo", Value::Null),
            node("c", "echo", Value::Null),
        ],
        vec![edge("a", "b"), edge("b", "c")],
    );

    let id = engine
        .submit(wf, HashMap::new(), TriggeredBy::Manual)
        .await
        .expect("submit succeeds");
    let execution = engine.join(id).await.expect("execution completes");

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    for node_id in ["a", "b", "c"] {
        assert_eq!(
            execution.node_results[node_id].status,
            NodeStatus::Succeeded
        );
    }
}

// Scenario 2: diamond A -> {B, C} -> D. B and C must overlap in time.
#[derive(Clone, Default)]
struct ConcurrencyProbe {
    inflight: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
}

#[async_trait]
impl ExecutableNode for ConcurrencyProbe {
    async fn execute(&self, _input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inflight.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({}))
    }
}

#[tokio::test(start_paused = true)]
async fn diamond_runs_independent_branches_concurrently() {
    let max_seen = Arc::new(AtomicUsize::new(0));
    let inflight = Arc::new(AtomicUsize::new(0));
    let probe_max = max_seen.clone();
    let probe_inflight = inflight.clone();

    let registry = NodeRegistry::new();
    registry
        .register(
            "probe",
            Arc::new(move |_cfg: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                Ok(Arc::new(ConcurrencyProbe {
                    inflight: probe_inflight.clone(),
                    max_seen: probe_max.clone(),
                }))
            }),
        )
        .unwrap();
    registry
        .register(
            "echo",
            Arc::new(|_cfg: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                Ok(Arc::new(EchoNode::new()))
            }),
        )
        .unwrap();

    let (engine, _store) = new_engine(registry);
    let wf = workflow(
        vec![
            node("a", "echo", Value::Null),
            node("b", "probe", Value::Null),
            node("c", "probe", Value::Null),
            node("d", "echo", Value::Null),
        ],
        vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
    );

    let id = engine
        .submit(wf, HashMap::new(), TriggeredBy::Manual)
        .await
        .unwrap();
    let execution = engine.join(id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    assert_eq!(
        max_seen.load(Ordering::SeqCst),
        2,
        "B and C must have been inflight at the same time"
    );
}

// Scenario 3: fail-fast with isolation. A -> B(fail) -> C, A -> D(echo).
#[tokio::test]
async fn fail_fast_isolates_failure_to_dependents() {
    let (engine, _store) = new_engine(registry_with_mocks());
    let wf = workflow(
        vec![
            node("a", "echo", Value::Null),
            node("b", "fail", Value::Null),
            node("c", "echo", Value::Null),
            node("d", "echo", Value::Null),
        ],
        vec![edge("a", "b"), edge("b", "c"), edge("a", "d")],
    );

    let id = engine
        .submit(wf, HashMap::new(), TriggeredBy::Manual)
        .await
        .unwrap();
    let execution = engine.join(id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.node_results["a"].status, NodeStatus::Succeeded);
    assert_eq!(execution.node_results["b"].status, NodeStatus::Failed);
    assert_eq!(execution.node_results["c"].status, NodeStatus::Skipped);
    assert_eq!(execution.node_results["d"].status, NodeStatus::Succeeded);
}

// Regression: an independent failing root must not block sealing when a
// dependent on a separate branch becomes ready only after the failure is
// already observed. X fails immediately; Y1 -> Y2 has no edge to X, so Y2
// only enters `ready` once Y1 completes, which can happen after `fail_fast`
// is set and every in-flight task has drained.
#[tokio::test]
async fn fail_fast_seals_late_ready_nodes_on_other_branches() {
    let (engine, _store) = new_engine(registry_with_mocks());
    let wf = workflow(
        vec![
            node("x", "fail", Value::Null),
            node("y1", "echo", Value::Null),
            node("y2", "echo", Value::Null),
        ],
        vec![edge("y1", "y2")],
    );

    let id = engine
        .submit(wf, HashMap::new(), TriggeredBy::Manual)
        .await
        .unwrap();
    let execution = tokio::time::timeout(Duration::from_secs(5), engine.join(id))
        .await
        .expect("drive must not deadlock when an independent branch fails fast")
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.node_results["x"].status, NodeStatus::Failed);
    assert_eq!(execution.node_results["y1"].status, NodeStatus::Succeeded);
    assert_eq!(execution.node_results["y2"].status, NodeStatus::Skipped);
}

// Scenario 4: retry-then-succeed via a flaky node with constant backoff.
#[tokio::test(start_paused = true)]
async fn flaky_node_retries_then_succeeds() {
    let (engine, _store) = new_engine(registry_with_mocks());
    let mut flaky = node("f", "flaky", Value::Null);
    flaky.max_retries = Some(3);
    flaky.retry_policy = Some(RetryPolicy::Constant { delay_ms: 10 });

    let wf = workflow(vec![flaky], vec![]);

    let id = engine
        .submit(wf, HashMap::new(), TriggeredBy::Manual)
        .await
        .unwrap();
    let execution = engine.join(id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Succeeded);
    let result = &execution.node_results["f"];
    assert_eq!(result.status, NodeStatus::Succeeded);
    assert_eq!(result.attempt, 3, "node should succeed on its third attempt");
}

// Scenario 5: mid-flight cancellation.
#[tokio::test(start_paused = true)]
async fn cancel_stops_inflight_execution() {
    let (engine, _store) = new_engine(registry_with_mocks());
    let sleepy = node("s", "sleepy", json!({"sleep_ms": 60_000}));
    let wf = workflow(vec![sleepy], vec![]);

    let id = engine
        .submit(wf, HashMap::new(), TriggeredBy::Manual)
        .await
        .unwrap();

    // Give the coordinator a moment to spawn the node task before cancelling.
    tokio::task::yield_now().await;
    engine.cancel(id).await.unwrap();

    let execution = engine.join(id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.error.as_deref(), Some("execution cancelled"));

    // Idempotent: a second cancel on an already-sealed execution still succeeds.
    engine.cancel(id).await.unwrap();
}

// Scenario 5b: a node that never checks its cancellation token is force-sealed
// once `shutdown`'s grace period elapses, with `ErrShutdown` recorded.
#[derive(Clone, Default)]
struct StubbornNode;

#[async_trait]
impl ExecutableNode for StubbornNode {
    async fn execute(&self, _input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(json!({}))
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_force_seals_executions_past_grace_period() {
    let registry = NodeRegistry::new();
    registry
        .register(
            "stubborn",
            Arc::new(|_cfg: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                Ok(Arc::new(StubbornNode))
            }),
        )
        .unwrap();

    let (engine, _store) = new_engine(registry);
    let wf = workflow(vec![node("s", "stubborn", Value::Null)], vec![]);

    let id = engine
        .submit(wf, HashMap::new(), TriggeredBy::Manual)
        .await
        .unwrap();
    tokio::task::yield_now().await;

    engine.shutdown(Duration::from_millis(50)).await;

    let execution = engine.get_execution(id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(
        execution.error.as_deref(),
        Some("execution aborted by shutdown")
    );
}

// Scenario 6: a cyclic workflow is rejected at submit time and nothing is
// persisted.
#[tokio::test]
async fn cyclic_workflow_is_rejected_before_persisting() {
    let (engine, store) = new_engine(registry_with_mocks());
    let wf = workflow(
        vec![node("a", "echo", Value::Null), node("b", "echo", Value::Null)],
        vec![edge("a", "b"), edge("b", "a")],
    );
    let workflow_id = wf.id;

    let err = engine
        .submit(wf, HashMap::new(), TriggeredBy::Manual)
        .await
        .expect_err("cyclic workflow must be rejected");

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::CycleDetected { .. })
    ));

    let executions = store
        .list_executions_by_workflow(workflow_id, 10, 0)
        .await
        .unwrap();
    assert!(executions.is_empty(), "no execution should have been persisted");
}
