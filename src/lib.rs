#![doc(html_root_url = "https://docs.rs/stompframe/latest")]
//! STOMP 1.2 protocol engine over WebSocket.
//!
//! The crate is built around four pieces:
//!
//! - [`session::StompSession`], the per-connection protocol state machine;
//! - [`registry::ChannelRegistry`], the process-wide subscription table with
//!   outstanding-message tracking for `client` and `client-individual` acks;
//! - [`session::TransactionBuffer`], which defers SEND/ACK/NACK until COMMIT;
//! - [`heartbeat::HeartbeatScheduler`], the negotiated liveness timers.
//!
//! [`connection::StompConnection`] drives a session from inbound text and
//! [`server::StompServer`] serves connections over axum WebSockets.
//! Applications observe protocol events through a
//! [`handler::EventDispatcher`].

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod heartbeat;
pub mod metrics;
pub mod panic;
pub mod push;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;

pub use connection::{CloseReason, StompConnection};
pub use error::{ProtocolViolation, SessionError};
pub use frame::{Command, Frame, Headers};
pub use handler::{DispatchOutcome, EventDispatcher, EventKind, HandlerError, StompEvent};
pub use metrics::{CONNECTIONS_ACTIVE, ERRORS_TOTAL, FRAMES_PROCESSED, MESSAGES_DELIVERED};
pub use registry::{AckMode, ChannelRegistry, SessionId};
pub use session::StompSession;
