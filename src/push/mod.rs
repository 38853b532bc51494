//! Prioritised outbound queues for a single connection.
//!
//! Every connection owns a [`PushQueues`] pair drained by its transport
//! writer. Producers (the session, the heartbeat task and the channel
//! registry) hold cloneable [`PushHandle`]s and never block: pushes use
//! [`PushHandle::try_push`] so a slow peer cannot stall frame processing.
//! Control replies travel on the high-priority queue; message deliveries on
//! the low-priority queue. Frames keep FIFO order within a priority level.

use tokio::sync::mpsc;

mod builder;
mod errors;
mod handle;

pub use builder::PushQueuesBuilder;
pub use errors::{PushConfigError, PushError};
pub use handle::PushHandle;
pub(crate) use handle::PushHandleInner;

/// Anything that is `Send + 'static` may be queued.
pub trait FrameLike: Send + 'static {}

impl<T> FrameLike for T where T: Send + 'static {}

/// Largest capacity accepted for either queue.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Priority level for outbound items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushPriority {
    High,
    Low,
}

/// Behaviour when a push queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushPolicy {
    /// Return an error to the caller if the queue is full.
    ReturnErrorIfFull,
    /// Silently drop the item.
    DropIfFull,
    /// Drop the item but emit a log warning.
    WarnAndDropIfFull,
}

/// Receiver ends of the push queues, owned by the transport writer.
pub struct PushQueues<F> {
    pub(crate) high_priority_rx: mpsc::Receiver<F>,
    pub(crate) low_priority_rx: mpsc::Receiver<F>,
}

impl<F: FrameLike> PushQueues<F> {
    /// Start building a new set of push queues.
    #[must_use]
    pub fn builder() -> PushQueuesBuilder<F> { PushQueuesBuilder::default() }

    /// Receive the next item, preferring the high-priority queue.
    ///
    /// Returns `None` once both queues are closed and drained.
    pub async fn recv(&mut self) -> Option<(PushPriority, F)> {
        tokio::select! {
            biased;
            Some(f) = self.high_priority_rx.recv() => Some((PushPriority::High, f)),
            Some(f) = self.low_priority_rx.recv() => Some((PushPriority::Low, f)),
            else => None,
        }
    }

    /// Take the next queued item without waiting.
    pub fn try_recv(&mut self) -> Option<(PushPriority, F)> {
        if let Ok(f) = self.high_priority_rx.try_recv() {
            return Some((PushPriority::High, f));
        }
        self.low_priority_rx
            .try_recv()
            .ok()
            .map(|f| (PushPriority::Low, f))
    }

    /// Take every queued item without waiting, high priority first.
    pub fn drain(&mut self) -> Vec<F> {
        std::iter::from_fn(|| self.try_recv())
            .map(|(_, f)| f)
            .collect()
    }

    /// Close both receivers so further pushes fail with [`PushError::Closed`].
    pub fn close(&mut self) {
        self.high_priority_rx.close();
        self.low_priority_rx.close();
    }
}
