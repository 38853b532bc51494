//! Push queue errors.

use thiserror::Error;

use super::MAX_QUEUE_CAPACITY;

/// Why an item could not be queued.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Only returned under [`PushPolicy::ReturnErrorIfFull`](super::PushPolicy).
    #[error("outbound queue is full")]
    Full,
    /// The connection's writer has gone away.
    #[error("outbound queues are closed")]
    Closed,
}

/// Rejected [`PushQueuesBuilder`](super::PushQueuesBuilder) settings.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushConfigError {
    #[error(
        "queue capacities must lie in 1..={max}, got high={high} low={low}",
        max = MAX_QUEUE_CAPACITY
    )]
    InvalidCapacity { high: usize, low: usize },
}
