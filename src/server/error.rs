//! Errors raised by [`StompServer`](super::StompServer).

use std::{io, net::SocketAddr};

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Serving HTTP failed.
    #[error("server error: {0}")]
    Io(#[from] io::Error),
}
