//! In-memory drivers for sessions and connections.

use std::{io, sync::Arc};

use futures::stream;
use stompframe::{
    ChannelRegistry,
    CloseReason,
    Command,
    Frame,
    SessionError,
    SessionId,
    StompConnection,
    StompSession,
    config::EngineConfig,
    frame::Outbound,
    push::{PushConfigError, PushQueues},
};

use crate::RecordingDispatcher;

/// Build a frame from a command and `name:value` pairs.
#[must_use]
pub fn frame(command: Command, headers: &[(&str, &str)]) -> Frame {
    headers
        .iter()
        .fold(Frame::new(command), |frame, (name, value)| {
            frame.with_header(*name, *value)
        })
}

/// [`frame`] with a text body.
#[must_use]
pub fn frame_with_body(command: Command, headers: &[(&str, &str)], body: &str) -> Frame {
    frame(command, headers).with_body(body.to_owned())
}

/// A session wired to a recording dispatcher and inspectable queues.
pub struct SessionHarness {
    pub session: StompSession,
    pub registry: Arc<ChannelRegistry>,
    pub dispatcher: Arc<RecordingDispatcher>,
    queues: PushQueues<Outbound>,
}

impl SessionHarness {
    /// A session on a fresh registry with default configuration.
    ///
    /// # Errors
    ///
    /// Propagates queue configuration errors.
    pub fn new() -> Result<Self, PushConfigError> {
        Self::with_parts(
            Arc::new(ChannelRegistry::new()),
            Arc::new(RecordingDispatcher::new()),
            EngineConfig::default(),
        )
    }

    /// A session sharing `registry` and `dispatcher` with other harnesses.
    ///
    /// # Errors
    ///
    /// Propagates queue configuration errors.
    pub fn with_parts(
        registry: Arc<ChannelRegistry>,
        dispatcher: Arc<RecordingDispatcher>,
        config: EngineConfig,
    ) -> Result<Self, PushConfigError> {
        let (queues, handle) = PushQueues::builder()
            .high_capacity(config.high_capacity)
            .low_capacity(config.low_capacity)
            .build()?;
        let session = StompSession::new(
            SessionId::next(),
            Arc::clone(&registry),
            dispatcher.clone(),
            handle,
        )
        .with_config(config);
        Ok(Self {
            session,
            registry,
            dispatcher,
            queues,
        })
    }

    /// Hand one frame to the session.
    ///
    /// # Errors
    ///
    /// Returns the session's fatal error, if any.
    pub async fn send(&mut self, frame: Frame) -> Result<(), SessionError> {
        self.session.handle(frame).await
    }

    /// Send CONNECT, optionally proposing `heart_beat`, and return the
    /// server's CONNECTED reply.
    ///
    /// # Errors
    ///
    /// Fails if the session rejects the handshake or sends no CONNECTED.
    pub async fn connect(&mut self, heart_beat: Option<&str>) -> io::Result<Frame> {
        let mut connect = frame(Command::Connect, &[("accept-version", "1.2")]);
        if let Some(value) = heart_beat {
            connect = connect.with_header("heart-beat", value);
        }
        self.send(connect).await.map_err(io::Error::other)?;
        self.frames()
            .into_iter()
            .find(|f| f.command() == Command::Connected)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no CONNECTED frame"))
    }

    /// Everything queued towards the client so far, high priority first.
    pub fn outbound(&mut self) -> Vec<Outbound> { self.queues.drain() }

    /// Queued frames, skipping heart-beats.
    pub fn frames(&mut self) -> Vec<Frame> {
        self.outbound()
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Frame(frame) => Some(frame),
                Outbound::Heartbeat => None,
            })
            .collect()
    }

    /// Commands of the queued frames.
    pub fn commands(&mut self) -> Vec<Command> {
        self.frames().iter().map(Frame::command).collect()
    }

    /// Split into the session and its queues, e.g. to run a connection.
    #[must_use]
    pub fn into_parts(self) -> (StompSession, PushQueues<Outbound>) { (self.session, self.queues) }
}

/// Run a connection over `inbound` text that ends after the last item, and
/// return the close reason with everything written to the client.
pub async fn drive_connection<I>(
    session: StompSession,
    mut queues: PushQueues<Outbound>,
    inbound: I,
) -> (CloseReason, Vec<Outbound>)
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let items: Vec<io::Result<String>> = inbound.into_iter().map(|text| Ok(text.into())).collect();
    let reason = StompConnection::new(session).run(stream::iter(items)).await;
    (reason, queues.drain())
}
