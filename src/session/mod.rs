//! Per-connection STOMP protocol state machine.
//!
//! A [`StompSession`] consumes decoded client frames one at a time. It owns
//! the connection's subscriptions, ack modes, open transactions and
//! heart-beat timers, mutates the shared [`ChannelRegistry`], replies through
//! the connection's [`PushHandle`] and reports protocol events to the
//! application's [`EventDispatcher`].
//!
//! Errors split two ways. A [`ProtocolViolation`] is answered with an ERROR
//! frame and the session carries on; [`StompSession::handle`] swallows it.
//! Everything else is returned to the caller, which must close the
//! connection.

mod transaction;

use std::{collections::HashMap, sync::Arc};

use tracing::{debug, warn};
pub use transaction::{TransactionBuffer, TransactionError};

use crate::{
    config::EngineConfig,
    connection::CloseSignal,
    error::{ProtocolViolation, SessionError},
    frame::{Command, Frame, Headers, Outbound, PROTOCOL_VERSION},
    handler::{DispatchOutcome, EventDispatcher, EventKind, StompEvent},
    heartbeat::{Heartbeat, HeartbeatScheduler, HeartbeatSpec, LastActivity},
    push::{PushHandle, PushPolicy, PushPriority},
    registry::{AckMode, ChannelRegistry, SessionId, Subscriber},
};

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for CONNECT.
    New,
    Connected,
    /// DISCONNECT received; further frames are ignored.
    Closing,
    /// Torn down; no further frames are processed.
    Closed,
}

/// Protocol state of one client connection.
pub struct StompSession {
    id: SessionId,
    state: SessionState,
    registry: Arc<ChannelRegistry>,
    dispatcher: Arc<dyn EventDispatcher>,
    outbound: PushHandle<Outbound>,
    subscriptions: HashMap<String, String>,
    destinations: HashMap<String, String>,
    ack_modes: HashMap<String, AckMode>,
    transactions: TransactionBuffer,
    heartbeat: Option<HeartbeatScheduler>,
    last_activity: Arc<LastActivity>,
    request_headers: Headers,
    close: CloseSignal,
    config: EngineConfig,
}

fn require<'a>(frame: &'a Frame, name: &'static str) -> Result<&'a str, ProtocolViolation> {
    frame.header(name).ok_or(ProtocolViolation::MissingHeader(name))
}

impl StompSession {
    /// Create a session and make it reachable for registry deliveries.
    #[must_use]
    pub fn new(
        id: SessionId,
        registry: Arc<ChannelRegistry>,
        dispatcher: Arc<dyn EventDispatcher>,
        outbound: PushHandle<Outbound>,
    ) -> Self {
        registry.register_session(id, &outbound);
        Self {
            id,
            state: SessionState::New,
            registry,
            dispatcher,
            outbound,
            subscriptions: HashMap::new(),
            destinations: HashMap::new(),
            ack_modes: HashMap::new(),
            transactions: TransactionBuffer::new(),
            heartbeat: None,
            last_activity: Arc::new(LastActivity::new()),
            request_headers: Headers::new(),
            close: CloseSignal::new(),
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Signal used by the heart-beat watcher to close the connection.
    #[must_use]
    pub fn with_close_signal(mut self, close: CloseSignal) -> Self {
        self.close = close;
        self
    }

    #[must_use]
    pub fn id(&self) -> SessionId { self.id }

    #[must_use]
    pub fn state(&self) -> SessionState { self.state }

    #[must_use]
    pub fn close_signal(&self) -> &CloseSignal { &self.close }

    /// Handle feeding this session's outbound queues.
    #[must_use]
    pub fn outbound(&self) -> &PushHandle<Outbound> { &self.outbound }

    /// Shared inbound-activity clock read by the heart-beat watcher.
    #[must_use]
    pub fn last_activity(&self) -> &Arc<LastActivity> { &self.last_activity }

    /// Record inbound traffic, including bare heart-beat EOLs.
    pub fn touch(&self) { self.last_activity.touch(); }

    /// Negotiated heart-beat, once connected with one enabled.
    #[must_use]
    pub fn heartbeat(&self) -> Option<Heartbeat> {
        self.heartbeat.as_ref().map(HeartbeatScheduler::heartbeat)
    }

    /// Ack mode of subscription `id`.
    #[must_use]
    pub fn ack_mode(&self, id: &str) -> Option<AckMode> { self.ack_modes.get(id).copied() }

    /// Subscription id held for `destination`.
    #[must_use]
    pub fn subscription_id(&self, destination: &str) -> Option<&str> {
        self.subscriptions.get(destination).map(String::as_str)
    }

    /// Header context of the frame being handled; empty between frames.
    #[must_use]
    pub fn request_headers(&self) -> &Headers { &self.request_headers }

    #[must_use]
    pub fn open_transactions(&self) -> usize { self.transactions.len() }

    /// Handle one inbound frame.
    ///
    /// Protocol violations are answered with an ERROR frame and yield
    /// `Ok(())`. A frame carrying a `receipt` header is answered with a
    /// RECEIPT once handled.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`SessionError`] when the connection must close.
    pub async fn handle(&mut self, frame: Frame) -> Result<(), SessionError> {
        let receipt = frame.header("receipt").map(str::to_owned);
        let result = self.process(frame).await;
        self.request_headers.clear();
        match result {
            Ok(true) => {
                if let Some(id) = receipt {
                    self.reply(Frame::receipt(id));
                }
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(SessionError::Protocol(violation)) => {
                self.report(&violation, receipt.as_deref());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stop timers and purge this session from the registry. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.stop_heartbeat();
        self.transactions.clear();
        let removed = self.registry.teardown(self.id);
        self.subscriptions.clear();
        self.destinations.clear();
        self.ack_modes.clear();
        self.request_headers.clear();
        self.state = SessionState::Closed;
        debug!(session = %self.id, subscriptions = removed, "session closed");
    }

    /// Returns whether the frame was acted on and may be receipted.
    async fn process(&mut self, frame: Frame) -> Result<bool, SessionError> {
        match self.state {
            SessionState::Closed => Err(SessionError::Closed),
            SessionState::Closing => {
                debug!(session = %self.id, command = %frame.command(), "frame ignored while closing");
                Ok(false)
            }
            SessionState::New => match frame.command() {
                Command::Connect | Command::Stomp => self.on_connect(&frame).await.map(|()| false),
                other => Err(SessionError::NotConnected(other)),
            },
            SessionState::Connected => self.apply(frame).await.map(|()| true),
        }
    }

    async fn apply(&mut self, frame: Frame) -> Result<(), SessionError> {
        match frame.command() {
            Command::Connect | Command::Stomp => Err(SessionError::AlreadyConnected),
            Command::Send => self.on_send(frame).await,
            Command::Subscribe => self.on_subscribe(&frame).await,
            Command::Unsubscribe => self.on_unsubscribe(&frame).await,
            Command::Ack | Command::Nack => self.on_acknowledge(frame).await,
            Command::Begin => self.on_begin(&frame),
            Command::Commit => self.on_commit(&frame).await,
            Command::Abort => self.on_abort(&frame),
            Command::Disconnect => {
                self.on_disconnect();
                Ok(())
            }
            cmd @ (Command::Connected | Command::Message | Command::Receipt | Command::Error) => {
                Err(ProtocolViolation::ServerCommand(cmd).into())
            }
        }
    }

    async fn on_connect(&mut self, frame: &Frame) -> Result<(), SessionError> {
        self.request_headers = frame.headers().clone();
        let proposal = frame.header("heart-beat");
        let (heartbeat, rejected) = match proposal.map(str::parse::<HeartbeatSpec>) {
            Some(Ok(spec)) => (Heartbeat::negotiate(spec), None),
            Some(Err(e)) => (Heartbeat::DISABLED, Some(ProtocolViolation::InvalidHeartbeat(e.0))),
            None => (Heartbeat::DISABLED, None),
        };

        let mut connected = Frame::new(Command::Connected)
            .with_header("version", PROTOCOL_VERSION)
            .with_header("server", concat!("stompframe/", env!("CARGO_PKG_VERSION")))
            .with_header("session", self.id.to_string());
        if proposal.is_some() {
            connected = connected.with_header("heart-beat", heartbeat.header_value());
        }
        self.last_activity.touch();
        if heartbeat.is_enabled() {
            self.heartbeat = Some(HeartbeatScheduler::start(
                heartbeat,
                self.outbound.clone(),
                Arc::clone(&self.last_activity),
                self.close.clone(),
                self.config.heartbeat_tolerance,
            ));
        }
        self.state = SessionState::Connected;
        self.reply(connected);
        if let Some(violation) = rejected {
            self.report(&violation, None);
        }
        debug!(session = %self.id, heartbeat = %heartbeat.header_value(), "session connected");

        let event = StompEvent::new(EventKind::Connect, self.id).with_headers(self.request_headers.clone());
        self.dispatch(&event).await
    }

    async fn on_send(&mut self, frame: Frame) -> Result<(), SessionError> {
        require(&frame, "destination")?;
        if let Some(tx) = frame.header("transaction").map(str::to_owned) {
            self.transactions
                .append(&tx, frame)
                .map_err(ProtocolViolation::from)?;
            return Ok(());
        }
        self.publish(frame).await
    }

    async fn publish(&mut self, frame: Frame) -> Result<(), SessionError> {
        let destination = require(&frame, "destination")?.to_owned();
        self.request_headers = frame.headers().clone();
        let (_, headers, body) = frame.into_parts();
        let event = StompEvent::new(EventKind::Message, self.id)
            .with_destination(destination)
            .with_body(body)
            .with_headers(headers);
        self.dispatch(&event).await
    }

    async fn on_subscribe(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let destination = require(frame, "destination")?;
        let id = require(frame, "id")?;
        let ack_mode = match frame.header("ack") {
            Some(value) => value
                .parse::<AckMode>()
                .map_err(|e| ProtocolViolation::InvalidAckMode(e.0))?,
            None => AckMode::Auto,
        };
        if self.subscriptions.contains_key(destination) {
            return Err(ProtocolViolation::DuplicateSubscription(destination.to_owned()).into());
        }
        if self.destinations.contains_key(id) {
            return Err(ProtocolViolation::DuplicateSubscriptionId(id.to_owned()).into());
        }

        self.registry.join(
            destination,
            Subscriber {
                session: self.id,
                subscription: id.to_owned(),
                ack_mode,
            },
        );
        self.subscriptions.insert(destination.to_owned(), id.to_owned());
        self.destinations.insert(id.to_owned(), destination.to_owned());
        self.ack_modes.insert(id.to_owned(), ack_mode);

        self.request_headers = frame.headers().clone();
        let event = StompEvent::new(EventKind::Subscribe, self.id)
            .with_destination(destination)
            .with_headers(self.request_headers.clone());
        self.dispatch(&event).await
    }

    async fn on_unsubscribe(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let id = require(frame, "id")?;
        let Some(destination) = self.destinations.remove(id) else {
            debug!(session = %self.id, subscription = id, "unsubscribe of unknown id ignored");
            return Ok(());
        };
        self.subscriptions.remove(&destination);
        self.ack_modes.remove(id);
        self.registry.leave(&destination, self.id);

        self.request_headers = frame.headers().clone();
        let event = StompEvent::new(EventKind::Unsubscribe, self.id)
            .with_destination(destination)
            .with_headers(self.request_headers.clone());
        self.dispatch(&event).await
    }

    async fn on_acknowledge(&mut self, frame: Frame) -> Result<(), SessionError> {
        require(&frame, "id")?;
        if let Some(tx) = frame.header("transaction").map(str::to_owned) {
            self.transactions
                .append(&tx, frame)
                .map_err(ProtocolViolation::from)?;
            return Ok(());
        }
        self.acknowledge(&frame).await
    }

    /// Resolve an ACK or NACK against the registry and dispatch one event
    /// per released message, oldest first.
    async fn acknowledge(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let kind = if frame.command() == Command::Nack {
            EventKind::Nack
        } else {
            EventKind::Ack
        };
        let message_id = require(frame, "id")?;
        let (subscription, mode) = self
            .registry
            .resolve_outstanding(self.id, message_id)
            .ok_or_else(|| ProtocolViolation::UnknownMessage(message_id.to_owned()))?;

        let released = match mode {
            AckMode::Client => self.registry.ack_cumulative(self.id, &subscription, message_id),
            AckMode::ClientIndividual => self
                .registry
                .ack_individual(self.id, &subscription, message_id)
                .into_iter()
                .collect(),
            AckMode::Auto => Vec::new(),
        };
        debug!(
            session = %self.id,
            %subscription,
            %kind,
            released = released.len(),
            "acknowledgment resolved"
        );

        for message in released {
            let mut headers = frame.headers().clone();
            headers.insert("message-id", message.message_id.as_str());
            headers.insert("message", String::from_utf8_lossy(&message.body));
            headers.insert("origin-session", message.session.to_string());
            self.request_headers = headers.clone();
            let event = StompEvent::new(kind, self.id)
                .with_destination(message.destination)
                .with_body(message.body)
                .with_headers(headers);
            self.dispatch(&event).await?;
        }
        Ok(())
    }

    fn on_begin(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let tx = require(frame, "transaction")?;
        self.transactions
            .begin(tx)
            .map_err(ProtocolViolation::from)?;
        debug!(session = %self.id, transaction = tx, "transaction opened");
        Ok(())
    }

    /// Replay the transaction's frames in order.
    ///
    /// Each frame behaves as if it had been sent on its own: a protocol
    /// error is reported and replay moves on. Only fatal errors stop it.
    async fn on_commit(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let tx = require(frame, "transaction")?;
        let Some(buffered) = self.transactions.take(tx) else {
            debug!(session = %self.id, transaction = tx, "commit of unknown transaction ignored");
            return Ok(());
        };
        debug!(session = %self.id, transaction = tx, frames = buffered.len(), "committing transaction");
        for mut frame in buffered {
            frame.headers_mut().remove("transaction");
            let result = match frame.command() {
                Command::Send => self.publish(frame).await,
                Command::Ack | Command::Nack => self.acknowledge(&frame).await,
                other => {
                    warn!(session = %self.id, command = %other, "unexpected buffered frame skipped");
                    Ok(())
                }
            };
            match result {
                Err(SessionError::Protocol(violation)) => {
                    self.report(&violation, None);
                }
                other => other?,
            }
        }
        Ok(())
    }

    fn on_abort(&mut self, frame: &Frame) -> Result<(), SessionError> {
        let tx = require(frame, "transaction")?;
        if self.transactions.abort(tx) {
            debug!(session = %self.id, transaction = tx, "transaction aborted");
        } else {
            debug!(session = %self.id, transaction = tx, "abort of unknown transaction ignored");
        }
        Ok(())
    }

    /// Uncommitted transactions are discarded, the named one included.
    fn on_disconnect(&mut self) {
        self.transactions.clear();
        self.stop_heartbeat();
        self.state = SessionState::Closing;
        debug!(session = %self.id, "client disconnecting");
    }

    async fn dispatch(&self, event: &StompEvent) -> Result<(), SessionError> {
        match self.dispatcher.dispatch(event).await? {
            DispatchOutcome::Handled => {}
            DispatchOutcome::NoHandler => {
                debug!(session = %self.id, kind = %event.kind, "no handler for event");
            }
        }
        Ok(())
    }

    fn stop_heartbeat(&mut self) {
        if let Some(scheduler) = self.heartbeat.take() {
            scheduler.stop();
        }
    }

    fn report(&self, violation: &ProtocolViolation, receipt: Option<&str>) {
        warn!(session = %self.id, error = %violation, "protocol error");
        crate::metrics::inc_errors(violation.kind());
        let mut error = Frame::error(violation.to_string());
        if let Some(id) = receipt {
            error = error.with_header("receipt-id", id);
        }
        self.reply(error);
    }

    fn reply(&self, frame: Frame) {
        if let Err(e) =
            self.outbound
                .try_push(frame.into(), PushPriority::High, PushPolicy::WarnAndDropIfFull)
        {
            debug!(session = %self.id, error = %e, "reply not sent");
        }
    }
}

impl Drop for StompSession {
    fn drop(&mut self) { self.close(); }
}

#[cfg(test)]
mod tests;
