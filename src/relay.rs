//! Dispatcher that turns every SEND into a registry delivery.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::{
    handler::{DispatchOutcome, EventDispatcher, EventKind, HandlerError, StompEvent},
    registry::ChannelRegistry,
};

/// Publishes message events to the destination's current subscribers.
///
/// Other events are left unhandled. This is what the `stompframe` binary
/// runs, making it a plain in-memory broker.
#[derive(Clone)]
pub struct RelayDispatcher {
    registry: Arc<ChannelRegistry>,
}

impl RelayDispatcher {
    #[must_use]
    pub fn new(registry: Arc<ChannelRegistry>) -> Self { Self { registry } }
}

#[async_trait]
impl EventDispatcher for RelayDispatcher {
    async fn dispatch(&self, event: &StompEvent) -> Result<DispatchOutcome, HandlerError> {
        if event.kind != EventKind::Message {
            return Ok(DispatchOutcome::NoHandler);
        }
        let destination = event
            .destination
            .as_deref()
            .ok_or_else(|| HandlerError::new("message event without destination"))?;
        let body = event.body.clone().unwrap_or_default();
        let message_id = self.registry.deliver(destination, body);
        debug!("relayed message: destination={destination}, message_id={message_id}");
        Ok(DispatchOutcome::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AckMode, SessionId, Subscriber};

    #[tokio::test]
    async fn relays_only_message_events() {
        let registry = Arc::new(ChannelRegistry::new());
        let session = SessionId::new(1);
        registry.join(
            "/q",
            Subscriber {
                session,
                subscription: "s".to_owned(),
                ack_mode: AckMode::Client,
            },
        );
        let relay = RelayDispatcher::new(Arc::clone(&registry));

        let subscribe = StompEvent::new(EventKind::Subscribe, session).with_destination("/q");
        assert_eq!(
            relay.dispatch(&subscribe).await.expect("dispatch"),
            DispatchOutcome::NoHandler
        );
        assert!(registry.outstanding(session, "s").is_empty());

        let message = StompEvent::new(EventKind::Message, session)
            .with_destination("/q")
            .with_body("hi");
        assert_eq!(
            relay.dispatch(&message).await.expect("dispatch"),
            DispatchOutcome::Handled
        );
        assert_eq!(registry.outstanding(session, "s").len(), 1);
    }
}
