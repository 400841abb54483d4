use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity and its policy is `Reject`.
    #[error("execution queue is at capacity")]
    Rejected,
}
