//! `NodeRegistry` — maps a node-type tag to a factory that builds an
//! `ExecutableNode` from that node's (opaque) JSON config.
//!
//! The registry is populated once at startup and handed to the engine by
//! dependency injection; it is never a process-wide `static`, which keeps
//! tests able to register their own fixture node types without interfering
//! with each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

use crate::{ExecutableNode, NodeError};

/// A factory turns a node's config document into an executable instance.
///
/// Constructing a node MUST NOT perform I/O — only parse `config` into a
/// typed struct and fail fast if it's malformed.
pub type NodeFactory =
    Arc<dyn Fn(Value) -> Result<Arc<dyn ExecutableNode>, NodeError> + Send + Sync>;

/// Errors raised by registry operations.
#[derive(Debug, Error, Clone)]
pub enum RegistryError {
    /// `register` was called twice for the same type tag.
    #[error("node type '{0}' is already registered")]
    TypeAlreadyRegistered(String),

    /// `build` was called for a type tag with no registered factory.
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),
}

/// Process-wide (by convention, not by construction) mapping from node-type
/// tag to factory.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: Arc<RwLock<HashMap<String, NodeFactory>>>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `type_tag`. Registration is additive: a
    /// duplicate tag is rejected and the original registration is left
    /// untouched.
    pub fn register(
        &self,
        type_tag: impl Into<String>,
        factory: NodeFactory,
    ) -> Result<(), RegistryError> {
        let type_tag = type_tag.into();
        let mut factories = self.factories.write();
        if factories.contains_key(&type_tag) {
            return Err(RegistryError::TypeAlreadyRegistered(type_tag));
        }
        factories.insert(type_tag, factory);
        Ok(())
    }

    /// Build an `ExecutableNode` for `type_tag` from `config`.
    ///
    /// An unregistered `type_tag` and a failing factory are both reported
    /// as `NodeError::Construction` — by the time the executor calls this,
    /// a `RegistryError::UnknownNodeType` should already have been raised
    /// (and the execution rejected) at submit-time validation via
    /// [`NodeRegistry::contains`].
    pub fn build(
        &self,
        type_tag: &str,
        config: Value,
    ) -> Result<Arc<dyn ExecutableNode>, NodeError> {
        let factory = self.factories.read().get(type_tag).cloned().ok_or_else(|| {
            NodeError::Construction(format!("unknown node type '{type_tag}'"))
        })?;
        factory(config)
    }

    /// Whether a type tag has a registered factory.
    pub fn contains(&self, type_tag: &str) -> bool {
        self.factories.read().contains_key(type_tag)
    }

    /// Return `RegistryError::UnknownNodeType` if `type_tag` isn't
    /// registered. Used by submit-time workflow validation, where an
    /// unknown node type must fail fast rather than wait for execution.
    pub fn ensure_registered(&self, type_tag: &str) -> Result<(), RegistryError> {
        if self.contains(type_tag) {
            Ok(())
        } else {
            Err(RegistryError::UnknownNodeType(type_tag.to_string()))
        }
    }
}
