//! STOMP 1.2 text codec.
//!
//! A frame on the wire is a command line, zero or more `name:value` header
//! lines, a blank line, the body and a terminating NUL. Lines end in LF or
//! CRLF. Header values are escaped (`\\`, `\n`, `\c`, `\r`) on every frame
//! except `CONNECT` and `CONNECTED`. When `content-length` is present it
//! fixes the body size, otherwise the body runs to the first NUL.

mod error;

use bytes::Bytes;
pub use error::CodecError;

use crate::frame::{Command, Frame, Headers};

/// Decode one frame from transport text.
///
/// Leading line endings (heartbeats that arrived in the same message) are
/// skipped and trailing line endings after the NUL are tolerated. Duplicate
/// headers are retained, lookups see the first occurrence.
///
/// # Errors
///
/// Returns a [`CodecError`] describing the first grammar violation found.
///
/// # Examples
///
/// ```
/// use stompframe::{codec::parse, frame::Command};
///
/// let frame = parse("SEND\ndestination:/queue/a\n\nhello\0").expect("valid frame");
/// assert_eq!(frame.command(), Command::Send);
/// assert_eq!(frame.header("destination"), Some("/queue/a"));
/// assert_eq!(&frame.body()[..], b"hello");
/// ```
pub fn parse(text: &str) -> Result<Frame, CodecError> {
    let text = text.trim_start_matches(['\r', '\n']);
    if text.is_empty() {
        return Err(CodecError::EmptyFrame);
    }

    let (command_line, mut rest) = split_line(text).ok_or(CodecError::MissingHeaderTerminator)?;
    let command: Command = command_line.parse()?;

    let mut headers = Headers::new();
    loop {
        let (line, remainder) = split_line(rest).ok_or(CodecError::MissingHeaderTerminator)?;
        rest = remainder;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedHeader {
                line: line.to_owned(),
            })?;
        if command.escapes_headers() {
            headers.push(unescape(name)?, unescape(value)?);
        } else {
            headers.push(name, value);
        }
    }

    let body = read_body(rest, headers.get("content-length"))?;
    Ok(Frame::from_parts(command, headers, body))
}

/// Encode a frame as transport text, including the terminating NUL.
///
/// The body is written as UTF-8; invalid sequences are replaced because the
/// WebSocket transport carries text messages. A `content-length` header is
/// rewritten to the length of the body actually written.
#[must_use]
pub fn serialize(frame: &Frame) -> String {
    let command = frame.command();
    let body = frame.body_text();
    let mut out = String::with_capacity(64 + body.len());
    out.push_str(command.as_str());
    out.push('\n');
    let body_len = body.len().to_string();
    for (name, value) in frame.headers().iter() {
        let value = if name == "content-length" { body_len.as_str() } else { value };
        if command.escapes_headers() {
            push_escaped(&mut out, name);
            out.push(':');
            push_escaped(&mut out, value);
        } else {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
        }
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&body);
    out.push('\0');
    out
}

/// Whether `text` is a keepalive consisting only of line endings.
#[must_use]
pub fn is_heartbeat(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| matches!(b, b'\n' | b'\r'))
}

fn split_line(text: &str) -> Option<(&str, &str)> {
    let (line, rest) = text.split_once('\n')?;
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

fn read_body(rest: &str, content_length: Option<&str>) -> Result<Bytes, CodecError> {
    let bytes = rest.as_bytes();
    let end = match content_length {
        Some(raw) => {
            let len: usize =
                raw.trim()
                    .parse()
                    .map_err(|_| CodecError::InvalidContentLength {
                        value: raw.to_owned(),
                    })?;
            if bytes.get(len) != Some(&0) {
                return Err(CodecError::MissingNul);
            }
            len
        }
        None => bytes
            .iter()
            .position(|b| *b == 0)
            .ok_or(CodecError::MissingNul)?,
    };
    let (body, terminator) = bytes.split_at(end);
    if !terminator
        .iter()
        .skip(1)
        .all(|b| matches!(b, b'\n' | b'\r'))
    {
        return Err(CodecError::TrailingData);
    }
    Ok(Bytes::copy_from_slice(body))
}

fn unescape(raw: &str) -> Result<String, CodecError> {
    if !raw.contains('\\') {
        return Ok(raw.to_owned());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some('r') => out.push('\r'),
            Some(other) => {
                return Err(CodecError::InvalidEscape {
                    sequence: format!("\\{other}"),
                });
            }
            None => {
                return Err(CodecError::InvalidEscape {
                    sequence: "\\".to_owned(),
                });
            }
        }
    }
    Ok(out)
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}
