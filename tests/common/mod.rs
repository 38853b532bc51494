//! Shared utilities for integration tests.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use stompframe::{Frame, frame::Outbound};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Wire text of a CONNECT frame, optionally proposing heart-beats.
pub fn connect_text(heart_beat: Option<&str>) -> String {
    match heart_beat {
        Some(hb) => format!("CONNECT\naccept-version:1.2\nheart-beat:{hb}\n\n\0"),
        None => "CONNECT\naccept-version:1.2\n\n\0".to_owned(),
    }
}

/// Frames among `items`, heart-beats dropped.
pub fn frames(items: &[Outbound]) -> Vec<&Frame> { items.iter().filter_map(Outbound::frame).collect() }
