//! STOMP frame model.
//!
//! A [`Frame`] is a command, an ordered header multimap and a body. Frames are
//! produced by [`crate::codec::parse`] and turned back into text by
//! [`crate::codec::serialize`]. [`Outbound`] is the unit queued towards a
//! peer: either a complete frame or a bare heartbeat EOL.

mod command;
mod headers;

use std::borrow::Cow;

use bytes::Bytes;
pub use command::{Command, UnknownCommand};
pub use headers::Headers;

/// Protocol version negotiated with every client.
pub const PROTOCOL_VERSION: &str = "1.2";

/// A single protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    headers: Headers,
    body: Bytes,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Assemble a frame from its parts.
    #[must_use]
    pub fn from_parts(command: Command, headers: Headers, body: Bytes) -> Self {
        Self {
            command,
            headers,
            body,
        }
    }

    /// Append a header and return the frame.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Replace the body and return the frame.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn command(&self) -> Command { self.command }

    #[must_use]
    pub fn headers(&self) -> &Headers { &self.headers }

    pub fn headers_mut(&mut self) -> &mut Headers { &mut self.headers }

    /// First value of header `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> { self.headers.get(name) }

    #[must_use]
    pub fn body(&self) -> &Bytes { &self.body }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> { String::from_utf8_lossy(&self.body) }

    /// Split the frame into command, headers and body.
    #[must_use]
    pub fn into_parts(self) -> (Command, Headers, Bytes) { (self.command, self.headers, self.body) }

    /// `ERROR` frame carrying a human-readable `message` header.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Command::Error).with_header("message", message)
    }

    /// `RECEIPT` frame acknowledging the client's `receipt` header.
    #[must_use]
    pub fn receipt(receipt_id: impl Into<String>) -> Self {
        Self::new(Command::Receipt).with_header("receipt-id", receipt_id)
    }
}

/// Item written to a peer by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A complete frame.
    Frame(Frame),
    /// A lone EOL used as a keepalive.
    Heartbeat,
}

impl Outbound {
    /// Render the item as transport text.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Frame(frame) => crate::codec::serialize(&frame),
            Self::Heartbeat => "\n".to_owned(),
        }
    }

    /// The wrapped frame, if this is not a heartbeat.
    #[must_use]
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Self::Frame(frame) => Some(frame),
            Self::Heartbeat => None,
        }
    }
}

impl From<Frame> for Outbound {
    fn from(frame: Frame) -> Self { Self::Frame(frame) }
}

#[cfg(test)]
mod tests;
