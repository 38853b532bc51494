//! Test utilities for `stompframe`.
//!
//! [`SessionHarness`] wires a [`StompSession`](stompframe::StompSession) to a
//! [`RecordingDispatcher`] and in-memory push queues so tests can feed frames
//! and inspect replies without a socket.
//!
//! ```rust
//! use stompframe::Command;
//! use stompframe_testing::{SessionHarness, frame};
//!
//! # async fn example() -> std::io::Result<()> {
//! let mut harness = SessionHarness::new().map_err(std::io::Error::other)?;
//! let connected = harness.connect(Some("0,0")).await?;
//! assert_eq!(connected.header("version"), Some("1.2"));
//! harness
//!     .send(frame(Command::Subscribe, &[("id", "0"), ("destination", "/q")]))
//!     .await
//!     .map_err(std::io::Error::other)?;
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod harness;
mod logging;

pub use dispatcher::RecordingDispatcher;
pub use harness::{SessionHarness, drive_connection, frame, frame_with_body};
pub use logging::{LoggerHandle, logger};
