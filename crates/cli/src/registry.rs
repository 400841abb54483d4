//! Builds the `NodeRegistry` the CLI hands to the engine.
//!
//! Registers the reference node types shipped by the `nodes` crate. A real
//! deployment would additionally register integration-specific node types
//! here (HTTP call, Slack post, etc.) before passing the registry on.

use std::sync::Arc;
use std::time::Duration;

use nodes::mock::{EchoNode, FailNode, FlakyNode, SleepyNode};
use nodes::{ExecutableNode, NodeError, NodeRegistry};
use serde::Deserialize;
use serde_json::Value;

pub fn bootstrap() -> NodeRegistry {
    let registry = NodeRegistry::new();

    registry
        .register(
            "echo",
            Arc::new(|config: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                let extra = config.get("extra").cloned().unwrap_or(Value::Null);
                Ok(Arc::new(EchoNode::with_extra(extra)))
            }),
        )
        .expect("echo registered once");

    registry
        .register(
            "fail",
            Arc::new(|config: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                let message = config
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("node configured to fail")
                    .to_string();
                Ok(Arc::new(FailNode::new(message)))
            }),
        )
        .expect("fail registered once");

    registry
        .register(
            "flaky",
            Arc::new(|config: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                #[derive(Deserialize)]
                struct FlakyConfig {
                    #[serde(default)]
                    fail_attempts: u32,
                    #[serde(default)]
                    output: Value,
                }
                let cfg: FlakyConfig = serde_json::from_value(config)
                    .map_err(|e| NodeError::Construction(e.to_string()))?;
                Ok(Arc::new(FlakyNode::new(cfg.fail_attempts, cfg.output)))
            }),
        )
        .expect("flaky registered once");

    registry
        .register(
            "sleepy",
            Arc::new(|config: Value| -> Result<Arc<dyn ExecutableNode>, NodeError> {
                #[derive(Deserialize)]
                struct SleepyConfig {
                    #[serde(default)]
                    name: String,
                    #[serde(default)]
                    sleep_ms: u64,
                    #[serde(default)]
                    output: Value,
                }
                let cfg: SleepyConfig = serde_json::from_value(config)
                    .map_err(|e| NodeError::Construction(e.to_string()))?;
                Ok(Arc::new(SleepyNode::new(
                    cfg.name,
                    Duration::from_millis(cfg.sleep_ms),
                    cfg.output,
                )))
            }),
        )
        .expect("sleepy registered once");

    registry
}
