//! Transport-facing driver for one STOMP connection.
//!
//! [`StompConnection`] reads inbound text sequentially, answers bare EOL
//! keepalives, decodes frames and feeds them to its [`StompSession`]. The
//! `select!` loop is `biased` towards the close signal, so a heart-beat
//! timeout or server shutdown wins over pending input. Teardown runs exactly
//! once when [`run`](StompConnection::run) returns.

mod counter;
mod shutdown;

use std::{io, net::SocketAddr};

pub use counter::active_connection_count;
use counter::ConnectionSlot;
use futures::{Stream, StreamExt};
use log::{info, warn};
pub use shutdown::{CloseReason, CloseSignal};

use crate::{
    codec,
    error::SessionError,
    frame::{Frame, Outbound},
    metrics::{self, Direction},
    push::{PushHandle, PushPolicy, PushPriority},
    session::{SessionState, StompSession},
};

/// Drives a [`StompSession`] from a stream of inbound text.
pub struct StompConnection {
    session: StompSession,
    outbound: PushHandle<Outbound>,
    close: CloseSignal,
    peer: Option<SocketAddr>,
    slot: ConnectionSlot,
}

impl StompConnection {
    #[must_use]
    pub fn new(session: StompSession) -> Self {
        let outbound = session.outbound().clone();
        let close = session.close_signal().clone();
        Self {
            session,
            outbound,
            close,
            peer: None,
            slot: ConnectionSlot::acquire(),
        }
    }

    #[must_use]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    #[must_use]
    pub fn session(&self) -> &StompSession { &self.session }

    /// Process `inbound` until the connection ends and report why.
    ///
    /// The session is closed and purged from the registry before this
    /// returns, whatever the reason.
    pub async fn run<S>(mut self, mut inbound: S) -> CloseReason
    where
        S: Stream<Item = io::Result<String>> + Unpin,
    {
        let id = self.session.id();
        info!(
            "connection opened: session={id}, peer={:?}, active={}",
            self.peer,
            active_connection_count()
        );

        let reason = loop {
            tokio::select! {
                biased;

                () = self.close.cancelled() => {
                    break self.close.reason().unwrap_or(CloseReason::Shutdown);
                }
                next = inbound.next() => match next {
                    None => break CloseReason::PeerClosed,
                    Some(Err(e)) => break CloseReason::Transport(e.to_string()),
                    Some(Ok(text)) => {
                        if let Some(reason) = self.on_text(&text).await {
                            break reason;
                        }
                    }
                },
            }
        };

        self.close.trigger(reason.clone());
        self.session.close();
        if reason.is_abnormal() {
            metrics::inc_errors(reason.label());
            warn!(
                "connection closed abnormally: session={id}, peer={:?}, reason={reason}, open_ms={}",
                self.peer,
                self.slot.age().as_millis()
            );
        } else {
            info!(
                "connection closed: session={id}, peer={:?}, reason={reason}, open_ms={}",
                self.peer,
                self.slot.age().as_millis()
            );
        }
        reason
    }

    async fn on_text(&mut self, text: &str) -> Option<CloseReason> {
        self.session.touch();
        metrics::inc_frames(Direction::Inbound);
        if codec::is_heartbeat(text) {
            self.push(Outbound::Heartbeat);
            return None;
        }

        let frame = match codec::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                metrics::inc_errors(e.kind());
                self.push(Frame::error(e.to_string()).into());
                return Some(CloseReason::MalformedFrame(e.to_string()));
            }
        };

        match self.session.handle(frame).await {
            Ok(()) if self.session.state() == SessionState::Closing => {
                Some(CloseReason::Disconnected)
            }
            Ok(()) => None,
            Err(SessionError::Handler(e)) => Some(CloseReason::HandlerFailed(e.to_string())),
            Err(SessionError::Closed) => Some(CloseReason::Shutdown),
            Err(e) => Some(CloseReason::ProtocolViolation(e.to_string())),
        }
    }

    fn push(&self, item: Outbound) {
        let _ = self
            .outbound
            .try_push(item, PushPriority::High, PushPolicy::DropIfFull);
    }
}
