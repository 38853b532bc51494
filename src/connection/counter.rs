//! Process-wide count of served connections.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::time::Instant;

static LIVE: AtomicU64 = AtomicU64::new(0);

/// Occupies one slot of the live-connection gauge until dropped.
pub(super) struct ConnectionSlot {
    opened: Instant,
}

impl ConnectionSlot {
    pub(super) fn acquire() -> Self {
        LIVE.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_connections();
        Self {
            opened: Instant::now(),
        }
    }

    /// How long the connection has been open.
    pub(super) fn age(&self) -> Duration { self.opened.elapsed() }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        LIVE.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::dec_connections();
    }
}

/// Number of connections currently being served.
#[must_use]
pub fn active_connection_count() -> u64 { LIVE.load(Ordering::Relaxed) }
