//! Session error types.
//!
//! [`ProtocolViolation`] covers mistakes a client can recover from: the
//! session answers with an ERROR frame and keeps going. [`SessionError`]
//! wraps those together with the failures that end the connection.

use thiserror::Error;

use crate::{frame::Command, handler::HandlerError, session::TransactionError};

/// A recoverable protocol mistake, reported to the client as ERROR.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolViolation {
    #[error("already subscribed to destination {0}")]
    DuplicateSubscription(String),

    #[error("subscription id {0} is already in use")]
    DuplicateSubscriptionId(String),

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("No Transaction found: {0}")]
    UnknownTransaction(String),

    #[error("transaction {0} is already open")]
    DuplicateTransaction(String),

    #[error("no outstanding message {0}")]
    UnknownMessage(String),

    #[error("unsupported ack mode: {0}")]
    InvalidAckMode(String),

    #[error("malformed heart-beat header: {0}")]
    InvalidHeartbeat(String),

    #[error("{0} is a server command")]
    ServerCommand(Command),
}

impl ProtocolViolation {
    /// Short label used as the metrics error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateSubscription(_) => "duplicate_subscription",
            Self::DuplicateSubscriptionId(_) => "duplicate_subscription_id",
            Self::MissingHeader(_) => "missing_header",
            Self::UnknownTransaction(_) => "unknown_transaction",
            Self::DuplicateTransaction(_) => "duplicate_transaction",
            Self::UnknownMessage(_) => "unknown_message",
            Self::InvalidAckMode(_) => "invalid_ack_mode",
            Self::InvalidHeartbeat(_) => "invalid_heartbeat",
            Self::ServerCommand(_) => "server_command",
        }
    }
}

impl From<TransactionError> for ProtocolViolation {
    fn from(e: TransactionError) -> Self {
        match e {
            TransactionError::Unknown(id) => Self::UnknownTransaction(id),
            TransactionError::AlreadyOpen(id) => Self::DuplicateTransaction(id),
        }
    }
}

/// Failure while handling a frame.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Recoverable; the session replies ERROR and stays open.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// A frame other than CONNECT or STOMP arrived before the handshake.
    #[error("{0} received before CONNECT")]
    NotConnected(Command),

    #[error("CONNECT received on an established session")]
    AlreadyConnected,

    /// The event dispatcher failed.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    /// The session has already been closed.
    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// Whether the connection must be torn down.
    #[must_use]
    pub fn is_fatal(&self) -> bool { !matches!(self, Self::Protocol(_)) }
}
