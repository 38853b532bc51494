//! Error types for the STOMP text codec.
//!
//! Every variant describes text that cannot be turned into a frame. The
//! session layer treats all of them as fatal for the connection.

use thiserror::Error;

use crate::frame::UnknownCommand;

/// Failure to decode frame text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Nothing but line endings were received.
    #[error("empty frame")]
    EmptyFrame,

    /// The command line is not a STOMP command.
    #[error(transparent)]
    UnknownCommand(#[from] UnknownCommand),

    /// The header block never ended with a blank line.
    #[error("header block is not terminated by a blank line")]
    MissingHeaderTerminator,

    /// A header line has no `:` separator.
    #[error("malformed header line: {line:?}")]
    MalformedHeader {
        /// Offending line without its line ending.
        line: String,
    },

    /// A header contains an escape sequence STOMP 1.2 does not define.
    #[error("undefined escape sequence {sequence:?} in header")]
    InvalidEscape {
        /// The backslash sequence as received.
        sequence: String,
    },

    /// `content-length` is not a non-negative integer.
    #[error("invalid content-length: {value:?}")]
    InvalidContentLength {
        /// Raw header value.
        value: String,
    },

    /// The body is not followed by a NUL octet.
    #[error("frame body is not terminated by NUL")]
    MissingNul,

    /// Something other than line endings follows the terminating NUL.
    #[error("unexpected data after frame terminator")]
    TrailingData,
}

impl CodecError {
    /// Short label used for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyFrame => "empty_frame",
            Self::UnknownCommand(_) => "unknown_command",
            Self::MissingHeaderTerminator => "missing_header_terminator",
            Self::MalformedHeader { .. } => "malformed_header",
            Self::InvalidEscape { .. } => "invalid_escape",
            Self::InvalidContentLength { .. } => "invalid_content_length",
            Self::MissingNul => "missing_nul",
            Self::TrailingData => "trailing_data",
        }
    }
}
