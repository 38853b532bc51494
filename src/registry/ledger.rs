//! Per-subscription record of outstanding messages.
//!
//! Ordinals are local to one subscription and strictly increasing, so
//! "everything up to and including X" is a range split on the ordinal map.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

use super::{AckMode, SessionId};

/// A delivered message that has not been acknowledged yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutstandingMessage {
    pub message_id: String,
    pub session: SessionId,
    pub subscription: String,
    pub destination: String,
    pub body: Bytes,
    /// Delivery sequence number within the subscription, starting at 1.
    pub ordinal: u64,
    /// Ack mode in force when the message was delivered.
    pub ack_mode: AckMode,
}

#[derive(Debug, Default)]
pub(super) struct AckLedger {
    last_ordinal: u64,
    outstanding: BTreeMap<u64, OutstandingMessage>,
    ordinals: HashMap<String, u64>,
}

impl AckLedger {
    pub(super) fn next_ordinal(&mut self) -> u64 {
        self.last_ordinal += 1;
        self.last_ordinal
    }

    pub(super) fn record(&mut self, message: OutstandingMessage) {
        self.ordinals
            .insert(message.message_id.clone(), message.ordinal);
        self.outstanding.insert(message.ordinal, message);
    }

    /// Remove `message_id` and everything older, oldest first.
    pub(super) fn ack_cumulative(&mut self, message_id: &str) -> Vec<OutstandingMessage> {
        let Some(&ordinal) = self.ordinals.get(message_id) else {
            return Vec::new();
        };
        let newer = self.outstanding.split_off(&(ordinal + 1));
        let acked = std::mem::replace(&mut self.outstanding, newer);
        let acked: Vec<_> = acked.into_values().collect();
        for message in &acked {
            self.ordinals.remove(&message.message_id);
        }
        acked
    }

    pub(super) fn get(&self, message_id: &str) -> Option<&OutstandingMessage> {
        self.outstanding.get(self.ordinals.get(message_id)?)
    }

    pub(super) fn ack_individual(&mut self, message_id: &str) -> Option<OutstandingMessage> {
        let ordinal = self.ordinals.remove(message_id)?;
        self.outstanding.remove(&ordinal)
    }

    pub(super) fn message_ids(&self) -> impl Iterator<Item = &str> {
        self.outstanding.values().map(|m| m.message_id.as_str())
    }
}
