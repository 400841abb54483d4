//! In-process submission queue and event buffer shared by the executor and
//! scheduler.
//!
//! Neither type talks to a database or another process — both exist purely
//! to decouple a producer (an API handler, the cron timer, an event
//! publisher) from a consumer (the executor's admission path, the event
//! matcher) with an explicit, bounded policy instead of an unbounded
//! in-memory backlog.

mod error;
mod event_buffer;
mod execution_queue;

pub use error::QueueError;
pub use event_buffer::EventBuffer;
pub use execution_queue::{ExecutionQueue, QueuePolicy};
