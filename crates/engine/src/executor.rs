//! The execution engine: drives one workflow execution end to end across a
//! bounded worker pool, with per-node retry, timeout, and cancellation.
//!
//! `Engine` is the single entry point: `submit` validates and enqueues,
//! `drive` runs the coordinator loop for one execution (spawned internally
//! by `submit`, but also callable directly — tests await it to observe
//! completion deterministically instead of polling `get_execution`).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use rand::Rng;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use nodes::{Clock, ExecutableNode, ExecutionContext, NodeError, NodeRegistry, SharedClock};

use crate::error::{EngineError, ExecutionError, ValidationError};
use crate::expression::ExpressionEvaluator;
use crate::models::{
    Connection, Execution, ExecutionStatus, Node, NodeResult, NodeStatus, RetryPolicy,
    TriggeredBy, Workflow,
};
use crate::storage::{Store, StorageError};
use crate::{dag, metrics};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor, carried on the `Engine`.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Engine-wide cap on concurrently running node tasks, across all
    /// executions.
    pub max_concurrent_nodes: usize,
    /// Cap on concurrently running node tasks within a single execution.
    pub max_concurrent_nodes_per_execution: usize,
    /// Cap on concurrently driven executions. Beyond this, `submit` either
    /// blocks or rejects per `queue_policy`.
    pub max_concurrent_executions: usize,
    pub queue_policy: queue::QueuePolicy,
    pub default_node_timeout: Duration,
    pub max_node_timeout: Duration,
    pub default_max_retries: u32,
    pub default_retry_policy: RetryPolicy,
    /// Retries applied internally to a `NodeResult`/`Execution` storage
    /// write before escalating to an execution-level failure.
    pub storage_retry_attempts: u32,
    pub storage_retry_base_delay: Duration,
    /// How long `shutdown` waits for in-flight executions to drain before
    /// sealing them as cancelled.
    pub shutdown_grace_period: Duration,
    /// Depth of the per-execution completion channel and event buffer.
    pub event_buffer_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: 50,
            max_concurrent_nodes_per_execution: 50,
            max_concurrent_executions: 100,
            queue_policy: queue::QueuePolicy::Reject,
            default_node_timeout: Duration::from_secs(30),
            max_node_timeout: Duration::from_secs(600),
            default_max_retries: 0,
            default_retry_policy: RetryPolicy::default(),
            storage_retry_attempts: 3,
            storage_retry_base_delay: Duration::from_millis(50),
            shutdown_grace_period: Duration::from_secs(30),
            event_buffer_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct ExecutionHandle {
    root_token: CancellationToken,
    join: SyncMutex<Option<JoinHandle<Result<Execution, EngineError>>>>,
}

struct EngineInner {
    store: Arc<dyn Store>,
    registry: NodeRegistry,
    clock: SharedClock,
    evaluator: Arc<dyn ExpressionEvaluator>,
    config: ExecutorConfig,
    node_semaphore: Arc<Semaphore>,
    submission_queue: queue::ExecutionQueue,
    handles: SyncMutex<HashMap<Uuid, Arc<ExecutionHandle>>>,
    shutting_down: std::sync::atomic::AtomicBool,
}

/// The workflow execution engine. Cheaply cloneable; clones share the same
/// underlying state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        registry: NodeRegistry,
        clock: SharedClock,
        evaluator: Arc<dyn ExpressionEvaluator>,
        config: ExecutorConfig,
    ) -> Self {
        let node_semaphore = Arc::new(Semaphore::new(config.max_concurrent_nodes));
        let submission_queue =
            queue::ExecutionQueue::new(config.max_concurrent_executions, config.queue_policy);
        Self {
            inner: Arc::new(EngineInner {
                store,
                registry,
                clock,
                evaluator,
                config,
                node_semaphore,
                submission_queue,
                handles: SyncMutex::new(HashMap::new()),
                shutting_down: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Validate `workflow`, create its `Execution` record in status
    /// `queued`, and spawn the coordinator task that drives it. Returns the
    /// new execution's id immediately; the run itself happens in the
    /// background (await it with [`Engine::join`]).
    #[instrument(skip(self, workflow, trigger_params), fields(workflow_id = %workflow.id))]
    pub async fn submit(
        &self,
        workflow: Workflow,
        trigger_params: HashMap<String, Value>,
        triggered_by: TriggeredBy,
    ) -> Result<Uuid, EngineError> {
        if self.inner.shutting_down.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(EngineError::ExecutorBusy);
        }

        let graph = dag::build_dependency_graph(&workflow)?;
        let _ = &graph; // validated for its own sake; the coordinator recomputes it
        for node in &workflow.nodes {
            self.inner
                .registry
                .ensure_registered(&node.node_type)
                .map_err(|_| ValidationError::UnknownNodeType(node.node_type.clone()))?;
        }

        let mut variables = workflow.variables.clone();
        for (k, v) in &trigger_params {
            variables.insert(k.clone(), v.clone());
        }

        let now = self.inner.clock.now();
        let mut execution = Execution::new(workflow.id, triggered_by, trigger_params, variables, now);
        for node in &workflow.nodes {
            execution
                .node_results
                .insert(node.id.clone(), NodeResult::pending(execution.id, &node.id));
        }
        execution.status = ExecutionStatus::Queued;

        self.inner.store.put_workflow(workflow.clone()).await.ok();
        self.inner.store.create_execution(execution.clone()).await?;
        for nr in execution.node_results.values() {
            self.inner.store.upsert_node_result(nr.clone()).await?;
        }

        let admission_permit = self
            .inner
            .submission_queue
            .acquire()
            .await
            .map_err(|_| EngineError::ExecutorBusy)?;

        let execution_id = execution.id;
        let root_token = CancellationToken::new();
        let handle = Arc::new(ExecutionHandle {
            root_token: root_token.clone(),
            join: SyncMutex::new(None),
        });
        self.inner.handles.lock().insert(execution_id, handle.clone());

        let engine = self.clone();
        let join = tokio::spawn(async move {
            let _admission_permit = admission_permit;
            engine.drive(execution_id).await
        });
        *handle.join.lock() = Some(join);

        info!(%execution_id, "execution submitted");
        Ok(execution_id)
    }

    /// Await the background task spawned by `submit` for `execution_id`,
    /// returning the sealed `Execution`. Used by callers (and tests) that
    /// want synchronous completion instead of polling `get_execution`.
    pub async fn join(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        let handle = self
            .inner
            .handles
            .lock()
            .get(&execution_id)
            .cloned()
            .ok_or(EngineError::ExecutionNotFound(execution_id))?;
        let join = handle.join.lock().take();
        match join {
            Some(j) => j
                .await
                .unwrap_or_else(|e| Err(EngineError::Storage(StorageError::Unavailable(e.to_string())))),
            None => self.get_execution(execution_id).await,
        }
    }

    pub async fn get_execution(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        Ok(self.inner.store.get_execution(execution_id).await?)
    }

    /// Trip `execution_id`'s root cancellation token. Idempotent: a second
    /// call on an already-cancelled or already-terminal execution is a
    /// no-op success.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<(), EngineError> {
        if let Some(handle) = self.inner.handles.lock().get(&execution_id).cloned() {
            handle.root_token.cancel();
        }
        Ok(())
    }

    /// Stop accepting submissions, cancel every running execution, and wait
    /// up to `grace` for them to seal before returning. Executions still
    /// running past the grace period are forcibly sealed `cancelled` with
    /// `ExecutionError::Shutdown`.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner
            .shutting_down
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let handles: Vec<(Uuid, Arc<ExecutionHandle>)> =
            self.inner.handles.lock().iter().map(|(id, h)| (*id, h.clone())).collect();
        for (_, handle) in &handles {
            handle.root_token.cancel();
        }

        let timed_out = tokio::time::timeout(grace, async {
            for (_, handle) in &handles {
                let join = handle.join.lock().take();
                if let Some(j) = join {
                    let _ = j.await;
                }
            }
        })
        .await
        .is_err();

        if !timed_out {
            return;
        }

        // Anything still registered past the grace period never sealed
        // itself; force it to `cancelled` with `ErrShutdown` so no execution
        // is left running after `shutdown` returns.
        for (execution_id, _) in &handles {
            let still_running = self.inner.handles.lock().contains_key(execution_id);
            if !still_running {
                continue;
            }
            if let Ok(mut execution) = self.inner.store.get_execution(*execution_id).await {
                if !execution.status.is_terminal() {
                    execution.status = ExecutionStatus::Cancelled;
                    execution.error = Some(ExecutionError::Shutdown.to_string());
                    execution.completed_at = Some(self.inner.clock.now());
                    self.persist_execution(&mut execution).await;
                }
            }
            self.inner.handles.lock().remove(execution_id);
        }
    }

    // -----------------------------------------------------------------------
    // Coordinator loop
    // -----------------------------------------------------------------------

    /// Run the scheduling loop for one execution to completion. Normally
    /// invoked only by the task `submit` spawns; exposed for tests that want
    /// to await a specific execution's completion directly.
    #[instrument(skip(self), fields(%execution_id))]
    pub async fn drive(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        let mut execution = self.inner.store.get_execution(execution_id).await?;
        let workflow = self.inner.store.get_workflow(execution.workflow_id).await?;
        let graph = dag::build_dependency_graph(&workflow)?;

        let root_token = self
            .inner
            .handles
            .lock()
            .get(&execution_id)
            .map(|h| h.root_token.clone())
            .unwrap_or_else(CancellationToken::new);

        execution.status = ExecutionStatus::Running;
        self.persist_execution(&mut execution).await;
        metrics::execution_started();
        let run_start = self.inner.clock.now();

        let node_map: HashMap<&str, &Node> =
            workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let outgoing: HashMap<&str, Vec<&Connection>> = {
            let mut m: HashMap<&str, Vec<&Connection>> = HashMap::new();
            for c in &workflow.connections {
                m.entry(c.source_node_id.as_str()).or_default().push(c);
            }
            m
        };

        let mut indegree = graph.indegree.clone();
        let mut incoming_all_normal: HashMap<String, bool> =
            workflow.nodes.iter().map(|n| (n.id.clone(), true)).collect();
        let mut ready: VecDeque<String> = graph.roots().into_iter().collect();
        let mut inflight: usize = 0;
        let mut remaining: usize = workflow.nodes.len();
        let mut fail_fast = false;
        let mut first_failure: Option<(String, String)> = None;

        let (tx, mut rx) = mpsc::channel::<NodeCompletion>(self.inner.config.event_buffer_capacity);
        let per_execution_sem = Arc::new(Semaphore::new(
            self.inner.config.max_concurrent_nodes_per_execution,
        ));

        loop {
            while !ready.is_empty()
                && inflight < self.inner.config.max_concurrent_nodes_per_execution
                && !fail_fast
                && !root_token.is_cancelled()
            {
                let node_id = ready.pop_front().unwrap();
                let node = (*node_map.get(node_id.as_str()).expect("node exists")).clone();

                let mut nr = execution
                    .node_results
                    .get(&node_id)
                    .cloned()
                    .unwrap_or_else(|| NodeResult::pending(execution_id, &node_id));
                nr.status = NodeStatus::Running;
                nr.attempt = 1;
                nr.started_at = Some(self.inner.clock.now());
                execution.node_results.insert(node_id.clone(), nr.clone());
                self.persist_node_result(&nr).await;
                metrics::node_started();

                let input = self.resolve_input(&node, &execution, &workflow, &graph);

                inflight += 1;
                self.spawn_node_task(
                    node,
                    input,
                    execution_id,
                    workflow.id,
                    per_execution_sem.clone(),
                    root_token.child_token(),
                    tx.clone(),
                );
            }

            if remaining == 0 {
                break;
            }
            if (root_token.is_cancelled() || fail_fast) && inflight == 0 {
                break;
            }

            let completion = match rx.recv().await {
                Some(c) => c,
                None => break,
            };
            inflight -= 1;

            let mut completions = VecDeque::new();
            completions.push_back(completion);

            while let Some(c) = completions.pop_front() {
                remaining = remaining.saturating_sub(1);
                let duration = c
                    .started_at
                    .map(|s| (self.inner.clock.now() - s).to_std().unwrap_or_default());

                let nr = NodeResult {
                    execution_id,
                    node_id: c.node_id.clone(),
                    status: c.status,
                    attempt: c.attempt,
                    output: c.output.clone(),
                    error: c.error.clone(),
                    started_at: c.started_at,
                    completed_at: Some(self.inner.clock.now()),
                    duration,
                };
                execution.node_results.insert(c.node_id.clone(), nr.clone());
                self.persist_node_result(&nr).await;

                match c.status {
                    NodeStatus::Succeeded => {
                        metrics::node_succeeded(duration.unwrap_or_default());
                        if c.attempt > 1 {
                            metrics::retry_successful();
                        }
                    }
                    NodeStatus::Failed => {
                        metrics::node_failed(duration.unwrap_or_default());
                        if first_failure.is_none() {
                            first_failure = Some((
                                c.node_id.clone(),
                                c.error.clone().unwrap_or_default(),
                            ));
                        }
                        if !workflow.continue_on_error {
                            fail_fast = true;
                        }
                    }
                    NodeStatus::Cancelled => {
                        if first_failure.is_none() {
                            first_failure = Some((c.node_id.clone(), "cancelled".to_string()));
                        }
                    }
                    NodeStatus::Skipped | NodeStatus::Pending | NodeStatus::Running => {}
                }

                let node_succeeded_with_output = matches!(c.status, NodeStatus::Succeeded);
                if let Some(targets) = outgoing.get(c.node_id.as_str()) {
                    for conn in targets {
                        let satisfied_normal = node_succeeded_with_output
                            && match &conn.condition {
                                Some(expr) => self
                                    .inner
                                    .evaluator
                                    .eval_condition(expr, &c.output)
                                    .unwrap_or(false),
                                None => true,
                            };

                        if !satisfied_normal {
                            incoming_all_normal.insert(conn.target_node_id.clone(), false);
                        }

                        let deg = indegree.get_mut(&conn.target_node_id).expect("target exists");
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            if *incoming_all_normal.get(&conn.target_node_id).unwrap_or(&true) {
                                ready.push_back(conn.target_node_id.clone());
                            } else {
                                let skip_completion = NodeCompletion {
                                    node_id: conn.target_node_id.clone(),
                                    status: NodeStatus::Skipped,
                                    output: Value::Null,
                                    error: None,
                                    attempt: 0,
                                    started_at: None,
                                };
                                completions.push_back(skip_completion);
                            }
                        }
                    }
                }
            }

            if remaining == 0 {
                break;
            }
        }

        // Fail-fast and cancellation both stop scheduling while nodes may
        // still sit in `ready` or behind an unresolved dependency; seal those
        // `skipped` so no NodeResult of a terminal execution is left pending.
        if remaining > 0 {
            let unresolved: Vec<String> = execution
                .node_results
                .iter()
                .filter(|(_, nr)| !nr.status.is_terminal())
                .map(|(id, _)| id.clone())
                .collect();
            for node_id in unresolved {
                let nr = NodeResult {
                    execution_id,
                    node_id: node_id.clone(),
                    status: NodeStatus::Skipped,
                    attempt: 0,
                    output: Value::Null,
                    error: None,
                    started_at: None,
                    completed_at: Some(self.inner.clock.now()),
                    duration: None,
                };
                execution.node_results.insert(node_id, nr.clone());
                self.persist_node_result(&nr).await;
            }
        }

        let cancelled = root_token.is_cancelled();
        execution.status = if cancelled {
            ExecutionStatus::Cancelled
        } else if first_failure.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        };
        execution.error = if cancelled {
            Some(ExecutionError::Cancelled.to_string())
        } else {
            first_failure.as_ref().map(|(node_id, message)| {
                ExecutionError::NodeFailed {
                    node_id: node_id.clone(),
                    message: message.clone(),
                }
                .to_string()
            })
        };
        execution.completed_at = Some(self.inner.clock.now());
        self.persist_execution(&mut execution).await;

        let total_duration = (execution.completed_at.unwrap() - run_start)
            .to_std()
            .unwrap_or_default();
        match execution.status {
            ExecutionStatus::Succeeded => {
                metrics::execution_succeeded(total_duration);
                info!(%execution_id, "execution succeeded");
            }
            ExecutionStatus::Failed => {
                metrics::execution_failed(total_duration);
                warn!(%execution_id, error = ?execution.error, "execution failed");
            }
            ExecutionStatus::Cancelled => {
                metrics::execution_cancelled(total_duration);
                info!(%execution_id, "execution cancelled");
            }
            _ => {}
        }

        self.inner.handles.lock().remove(&execution_id);
        Ok(execution)
    }

    fn spawn_node_task(
        &self,
        node: Node,
        input: Value,
        execution_id: Uuid,
        workflow_id: Uuid,
        execution_semaphore: Arc<Semaphore>,
        cancellation: CancellationToken,
        completions: mpsc::Sender<NodeCompletion>,
    ) {
        let registry = self.inner.registry.clone();
        let evaluator = self.inner.evaluator.clone();
        let clock = self.inner.clock.clone();
        let engine_semaphore = self.inner.node_semaphore.clone();
        let config = self.inner.config.clone();
        let node_id = node.id.clone();

        let join = tokio::spawn(run_node_task(
            node,
            input,
            execution_id,
            workflow_id,
            registry,
            evaluator,
            clock,
            engine_semaphore,
            execution_semaphore,
            cancellation,
            config,
        ));

        tokio::spawn(async move {
            let completion = match join.await {
                Ok(c) => c,
                Err(join_err) => NodeCompletion {
                    node_id,
                    status: NodeStatus::Failed,
                    output: Value::Null,
                    error: Some(NodeError::Panicked(join_err.to_string()).to_string()),
                    attempt: 0,
                    started_at: None,
                },
            };
            let _ = completions.send(completion).await;
        });
    }

    /// Assemble a node's resolved input: execution variables, dependency
    /// outputs (namespaced and unprefixed where unambiguous), static port
    /// bindings, then the event/webhook-style `_ctx` is attached per-attempt
    /// by the node task itself since `attempt` varies across retries.
    fn resolve_input(
        &self,
        node: &Node,
        execution: &Execution,
        workflow: &Workflow,
        graph: &dag::DependencyGraph,
    ) -> Value {
        let mut scope = serde_json::Map::new();
        scope.insert(
            "variables".to_string(),
            serde_json::to_value(&execution.variables).unwrap_or(Value::Null),
        );

        let deps = graph.deps.get(&node.id).cloned().unwrap_or_default();
        let mut dependency_keys: HashMap<String, usize> = HashMap::new();

        for dep_id in &deps {
            if let Some(result) = execution.node_results.get(dep_id) {
                scope.insert(dep_id.clone(), serde_json::json!({ "output": result.output }));
                if let Some(obj) = result.output.as_object() {
                    for key in obj.keys() {
                        *dependency_keys.entry(key.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        for dep_id in &deps {
            if let Some(result) = execution.node_results.get(dep_id) {
                if let Some(obj) = result.output.as_object() {
                    for (k, v) in obj {
                        if dependency_keys.get(k).copied().unwrap_or(0) == 1
                            && !scope.contains_key(k)
                        {
                            scope.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
        }

        for conn in &workflow.connections {
            if conn.target_node_id != node.id {
                continue;
            }
            let (Some(source_port), Some(target_port)) = (&conn.source_port, &conn.target_port)
            else {
                continue;
            };
            if let Some(result) = execution.node_results.get(&conn.source_node_id) {
                if let Some(value) = result.output.get(source_port) {
                    scope.insert(target_port.clone(), value.clone());
                }
            }
        }

        // Template references inside `variables`/dependency outputs are
        // resolved once `_ctx` is attached, in `run_node_task` — resolving
        // here too would just repeat the same substitution harmlessly, so
        // it's left to the single place that owns the per-attempt context.
        Value::Object(scope)
    }

    async fn persist_execution(&self, execution: &mut Execution) {
        let mut attempt = 0;
        loop {
            match self.inner.store.update_execution(execution).await {
                Ok(()) => return,
                Err(e) if attempt < self.inner.config.storage_retry_attempts => {
                    attempt += 1;
                    warn!(error = %e, attempt, "retrying execution write");
                    tokio::time::sleep(self.inner.config.storage_retry_base_delay * attempt).await;
                }
                Err(e) => {
                    error!(error = %e, "execution write exhausted retries");
                    execution.status = ExecutionStatus::Failed;
                    execution.error = Some(ExecutionError::Storage(e).to_string());
                    return;
                }
            }
        }
    }

    async fn persist_node_result(&self, result: &NodeResult) {
        let mut attempt = 0;
        loop {
            match self.inner.store.upsert_node_result(result.clone()).await {
                Ok(()) => return,
                Err(e) if attempt < self.inner.config.storage_retry_attempts => {
                    attempt += 1;
                    debug!(error = %e, attempt, "retrying node result write");
                    tokio::time::sleep(self.inner.config.storage_retry_base_delay * attempt).await;
                }
                Err(e) => {
                    error!(error = %e, "node result write exhausted retries");
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Single node execution
// ---------------------------------------------------------------------------

struct NodeCompletion {
    node_id: String,
    status: NodeStatus,
    output: Value,
    error: Option<String>,
    attempt: u32,
    started_at: Option<chrono::DateTime<Utc>>,
}

fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    match policy {
        RetryPolicy::Constant { delay_ms } => Duration::from_millis(*delay_ms),
        RetryPolicy::Exponential {
            base_ms,
            cap_ms,
            jitter,
        } => {
            let exp = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(32));
            let capped = exp.min(*cap_ms);
            let delay_ms = if *jitter {
                let jitter_span = capped / 5; // up to 20%
                if jitter_span == 0 {
                    capped
                } else {
                    capped + rand::thread_rng().gen_range(0..=jitter_span)
                }
            } else {
                capped
            };
            Duration::from_millis(delay_ms)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_node_task(
    node: Node,
    input: Value,
    execution_id: Uuid,
    workflow_id: Uuid,
    registry: NodeRegistry,
    evaluator: Arc<dyn ExpressionEvaluator>,
    clock: SharedClock,
    engine_semaphore: Arc<Semaphore>,
    execution_semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
    config: ExecutorConfig,
) -> NodeCompletion {
    let node_timeout = node
        .timeout
        .unwrap_or(config.default_node_timeout)
        .min(config.max_node_timeout);
    let max_retries = node.max_retries.unwrap_or(config.default_max_retries);
    let retry_policy = node
        .retry_policy
        .clone()
        .unwrap_or_else(|| config.default_retry_policy.clone());

    let started_at = clock.now();
    let mut attempt: u32 = 1;

    loop {
        if cancellation.is_cancelled() {
            return NodeCompletion {
                node_id: node.id,
                status: NodeStatus::Cancelled,
                output: Value::Null,
                error: Some("cancelled before dispatch".to_string()),
                attempt,
                started_at: Some(started_at),
            };
        }

        let engine_permit = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return NodeCompletion {
                    node_id: node.id,
                    status: NodeStatus::Cancelled,
                    output: Value::Null,
                    error: Some("cancelled waiting for a worker slot".to_string()),
                    attempt,
                    started_at: Some(started_at),
                };
            }
            permit = engine_semaphore.clone().acquire_owned() => {
                permit.expect("engine semaphore is never closed")
            }
        };
        let exec_permit = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                drop(engine_permit);
                return NodeCompletion {
                    node_id: node.id,
                    status: NodeStatus::Cancelled,
                    output: Value::Null,
                    error: Some("cancelled waiting for a worker slot".to_string()),
                    attempt,
                    started_at: Some(started_at),
                };
            }
            permit = execution_semaphore.clone().acquire_owned() => {
                permit.expect("execution semaphore is never closed")
            }
        };

        let ctx = ExecutionContext {
            workflow_id,
            execution_id,
            node_id: node.id.clone(),
            attempt,
            now: clock.now(),
            cancellation: cancellation.clone(),
        };

        let mut full_input = input.clone();
        if let Some(obj) = full_input.as_object_mut() {
            obj.insert("_ctx".to_string(), ctx.as_json());
        }
        let resolved_input = match evaluator.resolve_templates(&full_input, &full_input) {
            Ok(v) => v,
            Err(e) => {
                return NodeCompletion {
                    node_id: node.id,
                    status: NodeStatus::Failed,
                    output: Value::Null,
                    error: Some(NodeError::UnresolvedReference(e.to_string()).to_string()),
                    attempt,
                    started_at: Some(started_at),
                };
            }
        };

        let exec_result: Result<Value, NodeError> =
            match registry.build(&node.node_type, node.config.clone()) {
                Ok(executable) => {
                    run_with_timeout(executable, resolved_input, &ctx, node_timeout, &cancellation)
                        .await
                }
                Err(e) => Err(e),
            };

        drop(engine_permit);
        drop(exec_permit);

        match exec_result {
            Ok(output) => {
                return NodeCompletion {
                    node_id: node.id,
                    status: NodeStatus::Succeeded,
                    output,
                    error: None,
                    attempt,
                    started_at: Some(started_at),
                };
            }
            Err(err) => {
                if cancellation.is_cancelled() {
                    return NodeCompletion {
                        node_id: node.id,
                        status: NodeStatus::Cancelled,
                        output: Value::Null,
                        error: Some(err.to_string()),
                        attempt,
                        started_at: Some(started_at),
                    };
                }

                if err.is_retryable() && attempt <= max_retries {
                    let delay = backoff_delay(&retry_policy, attempt);
                    warn!(node_id = %node.id, attempt, ?delay, error = %err, "node failed, retrying");
                    metrics::node_retried();
                    tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => {
                            return NodeCompletion {
                                node_id: node.id,
                                status: NodeStatus::Cancelled,
                                output: Value::Null,
                                error: Some(err.to_string()),
                                attempt,
                                started_at: Some(started_at),
                            };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                    continue;
                }

                return NodeCompletion {
                    node_id: node.id,
                    status: NodeStatus::Failed,
                    output: Value::Null,
                    error: Some(err.to_string()),
                    attempt,
                    started_at: Some(started_at),
                };
            }
        }
    }
}

async fn run_with_timeout(
    executable: Arc<dyn ExecutableNode>,
    input: Value,
    ctx: &ExecutionContext,
    timeout: Duration,
    cancellation: &CancellationToken,
) -> Result<Value, NodeError> {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(NodeError::Execute("cancelled".to_string())),
        res = tokio::time::timeout(timeout, executable.execute(input, ctx)) => {
            match res {
                Ok(inner) => inner,
                Err(_elapsed) => Err(NodeError::Timeout),
            }
        }
    }
}
