//! Engine and server configuration.
//!
//! Both types use consuming `with_*` setters over sensible defaults so a
//! caller only spells out what differs.

use std::{net::SocketAddr, time::Duration};

/// Per-connection tuning shared by every session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Capacity of the control-frame queue (CONNECTED, RECEIPT, ERROR,
    /// heartbeats).
    pub high_capacity: usize,
    /// Capacity of the MESSAGE delivery queue.
    pub low_capacity: usize,
    /// Extra silence allowed past the negotiated incoming heart-beat
    /// interval before the peer is declared dead.
    pub heartbeat_tolerance: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            high_capacity: 64,
            low_capacity: 1024,
            heartbeat_tolerance: Duration::ZERO,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_high_capacity(mut self, capacity: usize) -> Self {
        self.high_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_low_capacity(mut self, capacity: usize) -> Self {
        self.low_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_heartbeat_tolerance(mut self, tolerance: Duration) -> Self {
        self.heartbeat_tolerance = tolerance;
        self
    }
}

/// Listener settings for the WebSocket server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// HTTP path upgraded to STOMP-over-WebSocket.
    pub path: String,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 61614)),
            path: "/stomp".to_owned(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}
