//! Per-session transaction buffers.

use std::collections::HashMap;

use thiserror::Error;

use crate::frame::Frame;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("no transaction {0}")]
    Unknown(String),
    #[error("transaction {0} already open")]
    AlreadyOpen(String),
}

/// Frames deferred by open transactions, keyed by transaction id.
///
/// Each buffer only grows while open and is handed back whole, in insertion
/// order, by [`take`](Self::take).
#[derive(Debug, Default)]
pub struct TransactionBuffer {
    open: HashMap<String, Vec<Frame>>,
}

impl TransactionBuffer {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Open an empty transaction.
    ///
    /// # Errors
    ///
    /// [`TransactionError::AlreadyOpen`] if `id` is open; its buffer is kept.
    pub fn begin(&mut self, id: &str) -> Result<(), TransactionError> {
        if self.open.contains_key(id) {
            return Err(TransactionError::AlreadyOpen(id.to_owned()));
        }
        self.open.insert(id.to_owned(), Vec::new());
        Ok(())
    }

    /// Defer `frame` until `id` commits.
    ///
    /// # Errors
    ///
    /// [`TransactionError::Unknown`] if `id` is not open.
    pub fn append(&mut self, id: &str, frame: Frame) -> Result<(), TransactionError> {
        self.open
            .get_mut(id)
            .ok_or_else(|| TransactionError::Unknown(id.to_owned()))?
            .push(frame);
        Ok(())
    }

    /// Close `id` and return its frames for replay.
    pub fn take(&mut self, id: &str) -> Option<Vec<Frame>> { self.open.remove(id) }

    /// Close `id` discarding its frames. Returns whether it was open.
    pub fn abort(&mut self, id: &str) -> bool { self.open.remove(id).is_some() }

    #[must_use]
    pub fn is_open(&self, id: &str) -> bool { self.open.contains_key(id) }

    #[must_use]
    pub fn len(&self) -> usize { self.open.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.open.is_empty() }

    /// Drop every open transaction.
    pub fn clear(&mut self) { self.open.clear(); }
}
