//! `ExecutionQueue` — bounds how many executions the engine drives at once.
//!
//! `submit` beyond the configured depth either blocks until a slot frees up
//! (`QueuePolicy::Block`) or fails fast (`QueuePolicy::Reject`).

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::QueueError;

/// What happens to a submission that arrives when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Reject immediately with `QueueError::Rejected`.
    Reject,
    /// Wait for a slot to free up.
    Block,
}

/// A bounded admission gate. Holding the returned permit reserves one slot;
/// dropping it frees the slot for the next submission.
pub struct ExecutionQueue {
    semaphore: Arc<Semaphore>,
    policy: QueuePolicy,
}

impl ExecutionQueue {
    pub fn new(capacity: usize, policy: QueuePolicy) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            policy,
        }
    }

    /// Reserve a slot, per this queue's policy.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, QueueError> {
        match self.policy {
            QueuePolicy::Block => Ok(self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("execution queue semaphore is never closed")),
            QueuePolicy::Reject => self
                .semaphore
                .clone()
                .try_acquire_owned()
                .map_err(|_| QueueError::Rejected),
        }
    }

    /// Slots currently free, for metrics/diagnostics.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reject_policy_fails_fast_when_full() {
        let queue = ExecutionQueue::new(1, QueuePolicy::Reject);
        let _permit = queue.acquire().await.unwrap();
        assert!(matches!(queue.acquire().await, Err(QueueError::Rejected)));
    }

    #[tokio::test]
    async fn block_policy_waits_for_a_freed_slot() {
        let queue = Arc::new(ExecutionQueue::new(1, QueuePolicy::Block));
        let permit = queue.acquire().await.unwrap();

        let queue2 = queue.clone();
        let waiter = tokio::spawn(async move { queue2.acquire().await.unwrap() });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(permit);
        let _permit2 = waiter.await.unwrap();
    }
}
