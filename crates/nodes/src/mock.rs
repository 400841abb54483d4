//! Reference node implementations used by the engine's own test suite and
//! by callers bootstrapping a registry before any real integration nodes
//! are wired in: `echo`, `fail`, `flaky`, and `sleepy`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{ExecutableNode, ExecutionContext, NodeError};

/// Records every input an instrumented node has seen, for test assertions.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Value>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, input: &Value) {
        self.0.lock().push(input.clone());
    }

    pub fn count(&self) -> usize {
        self.0.lock().len()
    }

    pub fn calls(&self) -> Vec<Value> {
        self.0.lock().clone()
    }
}

/// A node that returns its input unchanged (optionally merged with a fixed
/// set of extra fields) — the "synchronous echo node" referenced by the
/// executor's test scenarios.
pub struct EchoNode {
    pub extra: Value,
    pub calls: CallLog,
}

impl EchoNode {
    pub fn new() -> Self {
        Self {
            extra: Value::Null,
            calls: CallLog::new(),
        }
    }

    pub fn with_extra(extra: Value) -> Self {
        Self {
            extra,
            calls: CallLog::new(),
        }
    }
}

impl Default for EchoNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutableNode for EchoNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        self.calls.record(&input);

        let mut out = input;
        if let (Some(out_obj), Some(extra_obj)) = (out.as_object_mut(), self.extra.as_object()) {
            for (k, v) in extra_obj {
                out_obj.insert(k.clone(), v.clone());
            }
        }
        Ok(out)
    }
}

/// A node that always fails with a fixed message.
pub struct FailNode {
    pub message: String,
    pub calls: CallLog,
}

impl FailNode {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: CallLog::new(),
        }
    }
}

#[async_trait]
impl ExecutableNode for FailNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        self.calls.record(&input);
        Err(NodeError::Execute(self.message.clone()))
    }
}

/// A node that fails on every attempt up to (and including) `fail_attempts`,
/// then succeeds with `output` from the following attempt onward. Attempt
/// number is read from `ctx.attempt`, which the executor increments across
/// retries, so the node itself carries no mutable retry counter.
pub struct FlakyNode {
    pub fail_attempts: u32,
    pub output: Value,
    pub calls: CallLog,
}

impl FlakyNode {
    pub fn new(fail_attempts: u32, output: Value) -> Self {
        Self {
            fail_attempts,
            output,
            calls: CallLog::new(),
        }
    }
}

#[async_trait]
impl ExecutableNode for FlakyNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        self.calls.record(&input);
        if ctx.attempt <= self.fail_attempts {
            return Err(NodeError::Execute(format!(
                "transient failure on attempt {}",
                ctx.attempt
            )));
        }
        Ok(self.output.clone())
    }
}

/// A node that sleeps for a fixed duration (honoring cancellation) before
/// returning a fixed output. Used to exercise diamond-shaped parallelism
/// and mid-flight cancellation in tests.
pub struct SleepyNode {
    pub name: String,
    pub sleep_for: Duration,
    pub output: Value,
    pub calls: CallLog,
}

impl SleepyNode {
    pub fn new(name: impl Into<String>, sleep_for: Duration, output: Value) -> Self {
        Self {
            name: name.into(),
            sleep_for,
            output,
            calls: CallLog::new(),
        }
    }
}

#[async_trait]
impl ExecutableNode for SleepyNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        self.calls.record(&input);
        tokio::select! {
            _ = tokio::time::sleep(self.sleep_for) => {}
            _ = ctx.cancellation.cancelled() => {
                return Err(NodeError::Execute(format!("{} cancelled mid-sleep", self.name)));
            }
        }
        Ok(self.output.clone())
    }
}
