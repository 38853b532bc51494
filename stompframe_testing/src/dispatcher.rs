//! Event dispatcher that records what it sees.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use stompframe::{
    ChannelRegistry,
    DispatchOutcome,
    EventDispatcher,
    EventKind,
    HandlerError,
    StompEvent,
};

/// Records every dispatched event and optionally fails on one kind.
///
/// With [`relaying`](Self::relaying) it also publishes message events to a
/// registry, behaving like a minimal broker.
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<StompEvent>>,
    fail_on: Option<EventKind>,
    relay: Option<Arc<ChannelRegistry>>,
}

impl RecordingDispatcher {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Return a handler error for every event of `kind`.
    #[must_use]
    pub fn failing_on(mut self, kind: EventKind) -> Self {
        self.fail_on = Some(kind);
        self
    }

    /// Deliver message events to `registry`.
    #[must_use]
    pub fn relaying(mut self, registry: Arc<ChannelRegistry>) -> Self {
        self.relay = Some(registry);
        self
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<StompEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded events of one kind.
    pub fn events_of(&self, kind: EventKind) -> Vec<StompEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn kinds(&self) -> Vec<EventKind> { self.events().iter().map(|e| e.kind).collect() }
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: &StompEvent) -> Result<DispatchOutcome, HandlerError> {
        if self.fail_on == Some(event.kind) {
            return Err(HandlerError::new(format!("{} handler failed", event.kind)));
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        if let (EventKind::Message, Some(registry), Some(destination)) =
            (event.kind, &self.relay, event.destination.as_deref())
        {
            registry.deliver(destination, event.body.clone().unwrap_or_default());
        }
        Ok(DispatchOutcome::Handled)
    }
}
