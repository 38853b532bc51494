//! Application event dispatch.
//!
//! A session reports protocol events (connect, publish, subscribe, ...) to an
//! [`EventDispatcher`] supplied by the embedding application. The dispatcher
//! decides what business logic runs; a failure tears down the connection
//! that raised the event.

use std::{error::Error as StdError, fmt};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::{frame::Headers, registry::SessionId};

/// Kind of protocol event raised by a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Message,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Message => "message",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Ack => "ack",
            Self::Nack => "nack",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Event handed to the dispatcher.
///
/// `headers` is the per-request header context: the triggering frame's
/// headers, plus `message-id`, `message` and `origin-session` for ack and
/// nack events. It lives only for the duration of the inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StompEvent {
    pub kind: EventKind,
    pub session: SessionId,
    pub destination: Option<String>,
    pub body: Option<Bytes>,
    pub headers: Headers,
}

impl StompEvent {
    #[must_use]
    pub fn new(kind: EventKind, session: SessionId) -> Self {
        Self {
            kind,
            session,
            destination: None,
            body: None,
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// Whether a dispatcher acted on an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No handler is interested in this event; not an error.
    NoHandler,
}

/// Failure reported by an [`EventDispatcher`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error.
    #[must_use]
    pub fn from_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str { &self.message }
}

/// Application hook invoked for every protocol event.
#[async_trait]
pub trait EventDispatcher: Send + Sync + 'static {
    /// Handle `event`.
    ///
    /// # Errors
    ///
    /// Any error closes the originating connection abnormally.
    async fn dispatch(&self, event: &StompEvent) -> Result<DispatchOutcome, HandlerError>;
}

/// Dispatcher that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl EventDispatcher for NoopDispatcher {
    async fn dispatch(&self, _event: &StompEvent) -> Result<DispatchOutcome, HandlerError> {
        Ok(DispatchOutcome::NoHandler)
    }
}
