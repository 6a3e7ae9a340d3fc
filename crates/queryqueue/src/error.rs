//! Error types for the admission controller.

/// Errors surfaced synchronously by [`QueryQueue`](crate::QueryQueue).
///
/// These are the only failures a collaborator ever sees from the controller.
/// Failed attempts of an admitted operation are contained in the retry loop
/// and never show up here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue was used before [`QueryQueue::init`](crate::QueryQueue::init).
    #[error("query queue not initialized")]
    Uninitialized,
    /// [`QueryQueue::init`](crate::QueryQueue::init) was called outside a tokio runtime.
    #[error("query queue must be initialized from within a tokio runtime")]
    RuntimeUnavailable,
    /// The submitted value does not satisfy the operation contract.
    #[error("submitted value is not an operation")]
    InvalidOperation,
}

impl QueueError {
    /// Returns `true` if this error comes from using the queue before initialization.
    pub fn is_uninitialized(&self) -> bool {
        matches!(
            self,
            QueueError::Uninitialized | QueueError::RuntimeUnavailable
        )
    }

    /// Returns `true` if this error is a rejected submission.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, QueueError::InvalidOperation)
    }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
