//! Error and result types for the event bus and its worker pool.
//!
//! Errors are surfaced synchronously at the call site that caused them
//! (configuration, subscription, publishing, pool submission). Failures
//! inside user handlers are never turned into errors here: they are caught
//! at the dispatch boundary, logged, and counted in the statistics.

use thiserror::Error;

/// Result type alias for event bus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the event bus and the underlying worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An operation was attempted before [`init`](crate::EventBus::init)
    /// completed successfully.
    #[error("event bus has not been initialized")]
    NotInitialized,

    /// `init` was called on a bus that is already initialized. The bus
    /// rejects re-initialization rather than re-configuring in place.
    #[error("event bus is already initialized")]
    AlreadyInitialized,

    /// The supplied configuration violates an invariant.
    #[error("invalid configuration: {field} - {reason}")]
    InvalidConfiguration {
        /// Name of the offending configuration field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Subscribe or publish was attempted on a topic that has not been
    /// registered. Not raised by `subscribe_safe`, which registers first.
    #[error("topic not registered: {topic}")]
    TopicUnknown {
        /// The topic name that was looked up
        topic: String,
    },

    /// A priority operation was used on a FIFO pool, or a plain operation
    /// on a priority pool.
    #[error("task model mismatch: {reason}")]
    TaskModelMismatch {
        /// Which direction of the mismatch occurred
        reason: &'static str,
    },

    /// The bounded task queue was at capacity at enqueue time. Publishers
    /// may retry; the bus does not retry internally.
    #[error("task queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },

    /// A submission was attempted after shutdown began.
    #[error("worker pool has been shut down")]
    PoolShutdown,

    /// The pool manager thread failed fatally; the pool no longer accepts
    /// work.
    #[error("worker pool manager failed, pool is poisoned")]
    PoolPoisoned,

    /// An operating-system level failure, such as thread spawning.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },
}

impl Error {
    /// Whether the caller can reasonably retry the failed operation.
    ///
    /// Only backpressure is retryable; every other error reflects a
    /// configuration or lifecycle problem that a retry cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QueueFull { .. })
    }
}
