//! Builder for configuring push queues.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::{
    FrameLike,
    MAX_QUEUE_CAPACITY,
    PushConfigError,
    PushHandle,
    PushHandleInner,
    PushQueues,
};

/// Builder for [`PushQueues`].
///
/// Defaults give both queues a capacity of one.
///
/// # Examples
///
/// ```
/// use stompframe::push::PushQueues;
///
/// let (_queues, _handle) = PushQueues::<u8>::builder()
///     .high_capacity(8)
///     .low_capacity(64)
///     .build()
///     .expect("failed to build PushQueues");
/// ```
#[derive(Debug)]
pub struct PushQueuesBuilder<F> {
    high_capacity: usize,
    low_capacity: usize,
    _frame: std::marker::PhantomData<fn() -> F>,
}

impl<F: FrameLike> Default for PushQueuesBuilder<F> {
    fn default() -> Self {
        Self {
            high_capacity: 1,
            low_capacity: 1,
            _frame: std::marker::PhantomData,
        }
    }
}

impl<F: FrameLike> PushQueuesBuilder<F> {
    /// Set the capacity of the high-priority queue.
    #[must_use]
    pub fn high_capacity(mut self, capacity: usize) -> Self {
        self.high_capacity = capacity;
        self
    }

    /// Set the capacity of the low-priority queue.
    #[must_use]
    pub fn low_capacity(mut self, capacity: usize) -> Self {
        self.low_capacity = capacity;
        self
    }

    /// Build the configured [`PushQueues`] and associated [`PushHandle`].
    ///
    /// # Errors
    ///
    /// Returns [`PushConfigError::InvalidCapacity`] if either capacity is zero
    /// or exceeds [`MAX_QUEUE_CAPACITY`].
    pub fn build(self) -> Result<(PushQueues<F>, PushHandle<F>), PushConfigError> {
        let Self {
            high_capacity,
            low_capacity,
            ..
        } = self;
        let valid = |c: usize| (1..=MAX_QUEUE_CAPACITY).contains(&c);
        if !valid(high_capacity) || !valid(low_capacity) {
            return Err(PushConfigError::InvalidCapacity {
                high: high_capacity,
                low: low_capacity,
            });
        }
        let (high_tx, high_rx) = mpsc::channel(high_capacity);
        let (low_tx, low_rx) = mpsc::channel(low_capacity);
        let inner = PushHandleInner {
            high_prio_tx: high_tx,
            low_prio_tx: low_tx,
        };
        Ok((
            PushQueues {
                high_priority_rx: high_rx,
                low_priority_rx: low_rx,
            },
            PushHandle::from_arc(Arc::new(inner)),
        ))
    }
}
