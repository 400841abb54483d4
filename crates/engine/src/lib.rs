//! `engine` crate — core domain models, dependency resolution, expression
//! evaluation, storage contract, and the execution engine itself.

pub mod dag;
pub mod error;
pub mod executor;
pub mod expression;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod storage;

pub use error::{EngineError, ExecutionError, ValidationError};
pub use executor::{Engine, ExecutorConfig};
pub use expression::{EvalError, ExpressionEvaluator, TemplateEvaluator};
pub use models::{
    Connection, Event, EventTrigger, Execution, ExecutionStatus, Node, NodeResult, NodeStatus,
    RetryPolicy, ScheduledTrigger, Trigger, TriggerStatus, TriggeredBy, Workflow,
};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use storage::{Store, StorageError};
