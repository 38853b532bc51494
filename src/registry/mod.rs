//! Process-wide channel registry.
//!
//! [`ChannelRegistry`] is the only state shared between sessions. It maps
//! destinations to their subscribers and keeps, per `(session, subscription)`,
//! the ordered ledger of delivered-but-unacknowledged messages. Every public
//! operation takes one registry-wide lock, so joins, leaves, deliveries, acks
//! and teardown are linearizable: a delivery never observes a half-removed
//! session and never reaches a subscription after `leave` returned.

mod directory;
mod ledger;

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
pub use directory::{SessionDirectory, SessionId};
use ledger::AckLedger;
pub use ledger::OutstandingMessage;
use thiserror::Error;
use tracing::debug;

use crate::{
    frame::{Command, Frame, Outbound},
    push::{PushError, PushPolicy, PushPriority},
};

/// Acknowledgment policy of a subscription.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AckMode {
    /// Messages count as acknowledged once delivered.
    #[default]
    Auto,
    /// An ACK covers the named message and every older one.
    Client,
    /// An ACK covers exactly the named message.
    ClientIndividual,
}

/// Returned when an `ack` header names no known mode.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported ack mode: {0:?}")]
pub struct InvalidAckMode(pub String);

impl AckMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Client => "client",
            Self::ClientIndividual => "client-individual",
        }
    }

    /// Whether deliveries must be tracked until acknowledged.
    #[must_use]
    pub fn requires_ack(self) -> bool { !matches!(self, Self::Auto) }
}

impl FromStr for AckMode {
    type Err = InvalidAckMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "client" => Ok(Self::Client),
            "client-individual" => Ok(Self::ClientIndividual),
            other => Err(InvalidAckMode(other.to_owned())),
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One session's subscription to a destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscriber {
    pub session: SessionId,
    pub subscription: String,
    pub ack_mode: AckMode,
}

#[derive(Debug)]
struct Membership {
    destination: String,
    ack_mode: AckMode,
}

#[derive(Debug, Default)]
struct RegistryState {
    channels: HashMap<String, BTreeMap<SessionId, Subscriber>>,
    memberships: HashMap<SessionId, HashMap<String, Membership>>,
    ledgers: HashMap<(SessionId, String), AckLedger>,
    owners: HashMap<(SessionId, String), String>,
}

impl RegistryState {
    fn forget_subscription(&mut self, session: SessionId, subscription: &str) {
        if let Some(memberships) = self.memberships.get_mut(&session) {
            memberships.remove(subscription);
            if memberships.is_empty() {
                self.memberships.remove(&session);
            }
        }
        if let Some(ledger) = self.ledgers.remove(&(session, subscription.to_owned())) {
            for message_id in ledger.message_ids() {
                self.owners.remove(&(session, message_id.to_owned()));
            }
        }
    }
}

/// Shared pub/sub routing table with acknowledgment tracking.
#[derive(Default)]
pub struct ChannelRegistry {
    state: Mutex<RegistryState>,
    directory: SessionDirectory,
    next_message: AtomicU64,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a session reachable for deliveries.
    pub fn register_session(&self, session: SessionId, handle: &crate::push::PushHandle<Outbound>) {
        self.directory.insert(session, handle);
    }

    /// Add `subscriber` to `destination`.
    ///
    /// Returns `false` and leaves the existing entry untouched when the
    /// session already subscribes to the destination.
    pub fn join(&self, destination: &str, subscriber: Subscriber) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let channel = state.channels.entry(destination.to_owned()).or_default();
        if channel.contains_key(&subscriber.session) {
            return false;
        }
        state
            .memberships
            .entry(subscriber.session)
            .or_default()
            .insert(
                subscriber.subscription.clone(),
                Membership {
                    destination: destination.to_owned(),
                    ack_mode: subscriber.ack_mode,
                },
            );
        debug!(
            destination,
            session = %subscriber.session,
            subscription = %subscriber.subscription,
            ack = %subscriber.ack_mode,
            "joined channel"
        );
        channel.insert(subscriber.session, subscriber);
        true
    }

    /// Remove `session` from `destination`, discarding its outstanding
    /// messages for that subscription.
    ///
    /// The destination entry is reclaimed once its last subscriber leaves.
    pub fn leave(&self, destination: &str, session: SessionId) -> Option<Subscriber> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let channel = state.channels.get_mut(destination)?;
        let subscriber = channel.remove(&session)?;
        if channel.is_empty() {
            state.channels.remove(destination);
        }
        state.forget_subscription(session, &subscriber.subscription);
        debug!(destination, %session, "left channel");
        Some(subscriber)
    }

    /// Publish `body` to every current subscriber of `destination`.
    ///
    /// A fresh message id is assigned even when nobody is subscribed. For
    /// `client` and `client-individual` subscriptions the delivery is
    /// recorded as outstanding with the subscription's next ordinal. Each
    /// live subscriber receives a `MESSAGE` frame on its low-priority queue.
    pub fn deliver(&self, destination: &str, body: impl Into<Bytes>) -> String {
        let body = body.into();
        let message_id = format!("msg-{}", self.next_message.fetch_add(1, Ordering::Relaxed) + 1);
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(channel) = state.channels.get(destination) else {
            debug!(destination, %message_id, "no subscribers; message discarded");
            return message_id;
        };

        let mut delivered = 0usize;
        for subscriber in channel.values() {
            let mut frame = Frame::new(Command::Message)
                .with_header("subscription", &subscriber.subscription)
                .with_header("message-id", &message_id)
                .with_header("destination", destination);
            if subscriber.ack_mode.requires_ack() {
                let ledger = state
                    .ledgers
                    .entry((subscriber.session, subscriber.subscription.clone()))
                    .or_default();
                let ordinal = ledger.next_ordinal();
                ledger.record(OutstandingMessage {
                    message_id: message_id.clone(),
                    session: subscriber.session,
                    subscription: subscriber.subscription.clone(),
                    destination: destination.to_owned(),
                    body: body.clone(),
                    ordinal,
                    ack_mode: subscriber.ack_mode,
                });
                state.owners.insert(
                    (subscriber.session, message_id.clone()),
                    subscriber.subscription.clone(),
                );
                frame = frame.with_header("ack", &message_id);
            }
            let frame = frame
                .with_header("content-length", body.len().to_string())
                .with_body(body.clone());

            let Some(handle) = self.directory.get(&subscriber.session) else {
                continue;
            };
            match handle.try_push(
                frame.into(),
                PushPriority::Low,
                PushPolicy::WarnAndDropIfFull,
            ) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(session = %subscriber.session, error = %e, "subscriber unreachable"),
            }
        }
        crate::metrics::inc_delivered(delivered);
        debug!(destination, %message_id, delivered, "message delivered");
        message_id
    }

    /// Acknowledge `message_id` and every older outstanding message of the
    /// subscription.
    ///
    /// Removed messages are returned in ascending ordinal order; an unknown
    /// id removes nothing.
    pub fn ack_cumulative(
        &self,
        session: SessionId,
        subscription: &str,
        message_id: &str,
    ) -> Vec<OutstandingMessage> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(ledger) = state.ledgers.get_mut(&(session, subscription.to_owned())) else {
            return Vec::new();
        };
        let acked = ledger.ack_cumulative(message_id);
        for message in &acked {
            state.owners.remove(&(session, message.message_id.clone()));
        }
        acked
    }

    /// Acknowledge exactly `message_id`.
    pub fn ack_individual(
        &self,
        session: SessionId,
        subscription: &str,
        message_id: &str,
    ) -> Option<OutstandingMessage> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let acked = state
            .ledgers
            .get_mut(&(session, subscription.to_owned()))?
            .ack_individual(message_id)?;
        state.owners.remove(&(session, acked.message_id.clone()));
        Some(acked)
    }

    /// Subscription id under which `message_id` is outstanding for `session`.
    #[must_use]
    pub fn lookup_subscription_for_message(
        &self,
        session: SessionId,
        message_id: &str,
    ) -> Option<String> {
        self.lock()
            .owners
            .get(&(session, message_id.to_owned()))
            .cloned()
    }

    /// Owning subscription of an outstanding message, together with the ack
    /// mode captured when it was delivered.
    #[must_use]
    pub fn resolve_outstanding(
        &self,
        session: SessionId,
        message_id: &str,
    ) -> Option<(String, AckMode)> {
        let state = self.lock();
        let subscription = state.owners.get(&(session, message_id.to_owned()))?;
        let message = state
            .ledgers
            .get(&(session, subscription.clone()))?
            .get(message_id)?;
        Some((subscription.clone(), message.ack_mode))
    }

    /// Ack mode recorded when `subscription` joined its destination.
    #[must_use]
    pub fn lookup_ack_mode(&self, session: SessionId, subscription: &str) -> Option<AckMode> {
        self.lock()
            .memberships
            .get(&session)?
            .get(subscription)
            .map(|m| m.ack_mode)
    }

    /// Purge every subscription and outstanding message of `session`.
    ///
    /// Returns the number of subscriptions removed. Safe to call repeatedly.
    pub fn teardown(&self, session: SessionId) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        self.directory.remove(&session);
        let Some(memberships) = state.memberships.remove(&session) else {
            return 0;
        };
        for (subscription, membership) in &memberships {
            if let Some(channel) = state.channels.get_mut(&membership.destination) {
                channel.remove(&session);
                if channel.is_empty() {
                    state.channels.remove(&membership.destination);
                }
            }
            state.ledgers.remove(&(session, subscription.clone()));
        }
        state.owners.retain(|(owner, _), _| *owner != session);
        debug!(%session, subscriptions = memberships.len(), "session torn down");
        memberships.len()
    }

    /// Push a frame to one session's high-priority queue.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the session is gone.
    pub fn send_to(&self, session: SessionId, frame: Frame) -> Result<(), PushError> {
        let handle = self.directory.get(&session).ok_or(PushError::Closed)?;
        handle.try_push(frame.into(), PushPriority::High, PushPolicy::WarnAndDropIfFull)
    }

    /// Current subscribers of `destination`, ordered by session id.
    #[must_use]
    pub fn subscribers(&self, destination: &str) -> Vec<Subscriber> {
        self.lock()
            .channels
            .get(destination)
            .map(|channel| channel.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `session` subscribes to `destination`.
    #[must_use]
    pub fn is_subscribed(&self, destination: &str, session: SessionId) -> bool {
        self.lock()
            .channels
            .get(destination)
            .is_some_and(|channel| channel.contains_key(&session))
    }

    /// Outstanding message ids of a subscription, oldest first.
    #[must_use]
    pub fn outstanding(&self, session: SessionId, subscription: &str) -> Vec<String> {
        self.lock()
            .ledgers
            .get(&(session, subscription.to_owned()))
            .map(|ledger| ledger.message_ids().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Destinations with at least one subscriber, sorted.
    #[must_use]
    pub fn destinations(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().channels.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Sessions whose connections are still alive.
    #[must_use]
    pub fn live_sessions(&self) -> Vec<SessionId> { self.directory.active_ids() }
}
