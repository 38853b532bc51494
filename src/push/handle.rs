//! Cloneable handle used by producers to push items to a connection.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{FrameLike, PushError, PushPolicy, PushPriority};

/// Shared sender state behind every [`PushHandle`] clone.
pub(crate) struct PushHandleInner<F> {
    pub(crate) high_prio_tx: mpsc::Sender<F>,
    pub(crate) low_prio_tx: mpsc::Sender<F>,
}

/// Cloneable handle used by producers to push items to a connection.
pub struct PushHandle<F>(Arc<PushHandleInner<F>>);

impl<F> Clone for PushHandle<F> {
    fn clone(&self) -> Self { Self(Arc::clone(&self.0)) }
}

impl<F: FrameLike> PushHandle<F> {
    pub(crate) fn from_arc(arc: Arc<PushHandleInner<F>>) -> Self { Self(arc) }

    fn sender(&self, priority: PushPriority) -> &mpsc::Sender<F> {
        match priority {
            PushPriority::High => &self.0.high_prio_tx,
            PushPriority::Low => &self.0.low_prio_tx,
        }
    }

    /// Push an item, waiting for queue capacity if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the receiving end has been dropped.
    pub async fn push(&self, frame: F, priority: PushPriority) -> Result<(), PushError> {
        self.sender(priority)
            .send(frame)
            .await
            .map_err(|_| PushError::Closed)?;
        debug!(?priority, "frame pushed");
        Ok(())
    }

    /// Attempt to push an item without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] if the queue is full and the policy is
    /// [`PushPolicy::ReturnErrorIfFull`], and [`PushError::Closed`] if the
    /// receiving end has been dropped. The other policies drop the item.
    ///
    /// # Examples
    ///
    /// ```
    /// use stompframe::push::{PushError, PushPolicy, PushPriority, PushQueues};
    ///
    /// let (mut queues, handle) = PushQueues::<u8>::builder().build().expect("queues");
    /// handle
    ///     .try_push(1, PushPriority::High, PushPolicy::ReturnErrorIfFull)
    ///     .expect("first push fits");
    /// assert_eq!(
    ///     handle.try_push(2, PushPriority::High, PushPolicy::ReturnErrorIfFull),
    ///     Err(PushError::Full)
    /// );
    /// assert_eq!(queues.try_recv(), Some((PushPriority::High, 1)));
    /// ```
    pub fn try_push(
        &self,
        frame: F,
        priority: PushPriority,
        policy: PushPolicy,
    ) -> Result<(), PushError> {
        match self.sender(priority).try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => match policy {
                PushPolicy::ReturnErrorIfFull => Err(PushError::Full),
                PushPolicy::DropIfFull => Ok(()),
                PushPolicy::WarnAndDropIfFull => {
                    warn!(?priority, "push queue full; frame dropped");
                    crate::metrics::inc_errors("queue_full");
                    Ok(())
                }
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PushError::Closed),
        }
    }

    /// Whether the receiving side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.0.high_prio_tx.is_closed() }

    /// Downgrade to a `Weak` reference for storage in a registry.
    pub(crate) fn downgrade(&self) -> Weak<PushHandleInner<F>> { Arc::downgrade(&self.0) }
}
