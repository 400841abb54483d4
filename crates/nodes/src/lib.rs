//! `nodes` crate — the `ExecutableNode` trait and built-in node implementations.
//!
//! Every node — built-in and plugin alike — must implement [`ExecutableNode`].
//! The engine crate dispatches execution through this trait object.

pub mod clock;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use clock::{Clock, SharedClock, SystemClock};
pub use error::NodeError;
pub use registry::{NodeFactory, NodeRegistry, RegistryError};
pub use traits::{ExecutableNode, ExecutionContext};
