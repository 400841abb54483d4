//! The `Clock` collaborator interface.
//!
//! Abstracting "now" lets the executor and scheduler be driven by
//! `tokio::time::pause`/`advance` under `#[tokio::test(start_paused = true)]`
//! for deterministic concurrency and retry-timing tests, without the
//! executor itself needing to know it's under test.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Wall-clock abstraction consumed by the executor and scheduler.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system wall clock. Sleeping is done
/// directly via `tokio::time::sleep`, which already honors a paused/
/// advanced tokio time source in tests — no indirection needed there.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Convenience alias for the trait-object form threaded through the engine.
pub type SharedClock = Arc<dyn Clock>;
