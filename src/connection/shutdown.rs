//! Connection close reasons and the shared close signal.

use std::{
    fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio_util::sync::CancellationToken;

/// Why a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CloseReason {
    /// The client sent DISCONNECT.
    Disconnected,
    /// The peer closed the transport.
    PeerClosed,
    /// Reading from the transport failed.
    Transport(String),
    /// Inbound text could not be decoded.
    MalformedFrame(String),
    /// A frame arrived that the current state forbids.
    ProtocolViolation(String),
    /// The event dispatcher returned an error.
    HandlerFailed(String),
    /// The peer stayed silent longer than its negotiated interval.
    HeartbeatTimeout {
        /// Negotiated incoming interval.
        expected: Duration,
        /// Time since the last inbound frame when the check fired.
        idle: Duration,
    },
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Whether the close should be reported as abnormal.
    #[must_use]
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, Self::Disconnected | Self::PeerClosed | Self::Shutdown)
    }

    /// WebSocket close status code for this reason.
    #[must_use]
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Disconnected | Self::PeerClosed => 1000,
            Self::Shutdown | Self::HeartbeatTimeout { .. } => 1001,
            Self::MalformedFrame(_) | Self::ProtocolViolation(_) => 1002,
            Self::Transport(_) | Self::HandlerFailed(_) => 1011,
        }
    }

    /// Short machine-readable label, also used as the metrics error kind.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::PeerClosed => "peer_closed",
            Self::Transport(_) => "transport",
            Self::MalformedFrame(_) => "malformed_frame",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::HandlerFailed(_) => "handler_failed",
            Self::HeartbeatTimeout { .. } => "heartbeat_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::MalformedFrame(e) => write!(f, "malformed frame: {e}"),
            Self::ProtocolViolation(e) => write!(f, "protocol violation: {e}"),
            Self::HandlerFailed(e) => write!(f, "handler failed: {e}"),
            Self::HeartbeatTimeout { expected, idle } => write!(
                f,
                "no heartbeat for {}ms (expected every {}ms)",
                idle.as_millis(),
                expected.as_millis()
            ),
            other => f.write_str(other.label()),
        }
    }
}

/// One-shot close request shared by a connection and its timer tasks.
///
/// The first [`trigger`](Self::trigger) wins; later reasons are ignored.
#[derive(Clone, Debug, Default)]
pub struct CloseSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<CloseReason>>,
}

impl CloseSignal {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// A signal that also fires when `parent` is cancelled.
    #[must_use]
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            reason: Arc::default(),
        }
    }

    /// Request the connection to close. Returns `true` for the first caller.
    pub fn trigger(&self, reason: CloseReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    /// Resolve once the signal has fired.
    pub async fn cancelled(&self) { self.token.cancelled().await; }

    #[must_use]
    pub fn is_triggered(&self) -> bool { self.token.is_cancelled() }

    /// Reason recorded by the first trigger.
    ///
    /// A signal cancelled through its parent token reports
    /// [`CloseReason::Shutdown`].
    #[must_use]
    pub fn reason(&self) -> Option<CloseReason> {
        if let Some(reason) = self.reason.get() {
            return Some(reason.clone());
        }
        self.token.is_cancelled().then_some(CloseReason::Shutdown)
    }
}
