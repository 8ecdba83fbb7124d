//! The message envelope exchanged between processes.
//!
//! A [`Message`] is a value object. Type, timestamp and sender are fixed at
//! construction; payload and ack target are attached once by the builder
//! methods. The only mutable field is the ack counter, which is atomic.
//!
//! Messages are ordered by timestamp alone. Timestamps are unique across the
//! cluster, so two distinct messages never compare equal.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use crate::clock::Timestamp;
use crate::error::{CoreError, Result};
use crate::types::ProcessId;

/// Discriminator for the four message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Application-generated update, subject to total ordering.
    Update,
    /// Acknowledgment of an update, identified by its timestamp.
    Ack,
    /// Termination probe, or the exit signal handed to the application.
    Exit,
    /// Request that a probing peer keep waiting.
    Poke,
}

impl MessageKind {
    /// Single-letter tag used in log lines.
    pub const fn tag(&self) -> char {
        match self {
            MessageKind::Update => 'u',
            MessageKind::Ack => 'a',
            MessageKind::Exit => 'e',
            MessageKind::Poke => 'p',
        }
    }
}

/// Update payload: a fixed vector of integer deltas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload(pub Vec<i32>);

impl Payload {
    /// Create a payload from its deltas.
    pub fn new(values: Vec<i32>) -> Self {
        Self(values)
    }

    /// The deltas.
    pub fn values(&self) -> &[i32] {
        &self.0
    }
}

/// A message with its ack counter.
pub struct Message {
    kind: MessageKind,
    timestamp: Timestamp,
    sender: ProcessId,
    payload: Option<Payload>,
    ack_target: Option<Timestamp>,
    acks: AtomicU32,
}

impl Message {
    /// Create a message with no payload, no ack target and zero acks.
    pub fn new(kind: MessageKind, timestamp: Timestamp, sender: ProcessId) -> Self {
        Self {
            kind,
            timestamp,
            sender,
            payload: None,
            ack_target: None,
            acks: AtomicU32::new(0),
        }
    }

    /// An unstamped update from `sender`. The engine assigns the timestamp.
    pub fn update(sender: ProcessId, payload: Payload) -> Self {
        Self::new(MessageKind::Update, Timestamp::floor(sender), sender).with_payload(payload)
    }

    /// An acknowledgment of the update stamped `target`.
    pub fn ack(timestamp: Timestamp, sender: ProcessId, target: Timestamp) -> Self {
        Self::new(MessageKind::Ack, timestamp, sender).with_ack_target(target)
    }

    /// Readiness sentinel. Never surfaced to application logic.
    pub fn ready() -> Self {
        Self::new(
            MessageKind::Update,
            Timestamp::floor(ProcessId::SENTINEL),
            ProcessId::SENTINEL,
        )
    }

    /// Exit signal handed to the local application on clean shutdown.
    pub fn exit_signal(pid: ProcessId) -> Self {
        Self::new(MessageKind::Exit, Timestamp::floor(pid), pid)
    }

    /// Attach the update payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach the ack target. Ignored for anything but acks.
    pub fn with_ack_target(mut self, target: Timestamp) -> Self {
        if self.kind == MessageKind::Ack {
            self.ack_target = Some(target);
        }
        self
    }

    /// Replace the timestamp. Used once, when the engine stamps an outgoing
    /// message.
    pub fn stamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn sender(&self) -> ProcessId {
        self.sender
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Timestamp of the acknowledged update. Only set on acks.
    pub fn ack_target(&self) -> Option<Timestamp> {
        self.ack_target
    }

    /// Current ack count.
    pub fn acks(&self) -> u32 {
        self.acks.load(AtomicOrdering::Acquire)
    }

    /// Add one ack and return the new count. Safe under concurrent callers.
    pub fn increment_ack(&self) -> u32 {
        self.acks.fetch_add(1, AtomicOrdering::AcqRel) + 1
    }

    /// Whether this is a readiness sentinel.
    pub fn is_ready_sentinel(&self) -> bool {
        self.sender.is_sentinel()
    }

    /// A fresh instance for one outbound recipient.
    ///
    /// Shares nothing with `self` and starts at zero acks, so acks counted on
    /// the retained copy can never leak onto the wire.
    pub fn transport_copy(&self) -> Self {
        Self {
            kind: self.kind,
            timestamp: self.timestamp,
            sender: self.sender,
            payload: self.payload.clone(),
            ack_target: self.ack_target,
            acks: AtomicU32::new(0),
        }
    }
}

impl Clone for Message {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            timestamp: self.timestamp,
            sender: self.sender,
            payload: self.payload.clone(),
            ack_target: self.ack_target,
            acks: AtomicU32::new(self.acks()),
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind)
            .field("timestamp", &self.timestamp)
            .field("sender", &self.sender)
            .field("payload", &self.payload)
            .field("ack_target", &self.ack_target)
            .field("acks", &self.acks())
            .finish()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}

impl Eq for Message {}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Message {
    /// Strictly ascending by timestamp.
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

/// The five logical fields that cross the wire.
///
/// The ack counter is local bookkeeping and is not part of the wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub kind: MessageKind,
    pub timestamp: Timestamp,
    pub sender: ProcessId,
    pub payload: Option<Payload>,
    pub ack_target: Option<Timestamp>,
}

impl WireMessage {
    /// Check field combinations that only make sense for one kind.
    pub fn validate(&self) -> Result<()> {
        match (self.kind, self.ack_target) {
            (MessageKind::Ack, None) => Err(CoreError::InvalidMessage(
                "ack without a target timestamp".into(),
            )),
            (kind, Some(_)) if kind != MessageKind::Ack => Err(CoreError::InvalidMessage(
                format!("ack target on '{}' message", kind.tag()),
            )),
            _ => Ok(()),
        }
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            kind: message.kind,
            timestamp: message.timestamp,
            sender: message.sender,
            payload: message.payload.clone(),
            ack_target: message.ack_target,
        }
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = CoreError;

    fn try_from(wire: WireMessage) -> Result<Self> {
        wire.validate()?;
        Ok(Self {
            kind: wire.kind,
            timestamp: wire.timestamp,
            sender: wire.sender,
            payload: wire.payload,
            ack_target: wire.ack_target,
            acks: AtomicU32::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ts(ticks: u64, pid: i32) -> Timestamp {
        Timestamp::new(ticks, ProcessId::new(pid))
    }

    #[test]
    fn test_transport_copy_is_independent() {
        let retained = Message::update(ProcessId::new(1), Payload::new(vec![3, -4]));
        let copy = retained.transport_copy();

        retained.increment_ack();
        retained.increment_ack();

        assert_eq!(retained.acks(), 2);
        assert_eq!(copy.acks(), 0);
        assert_eq!(copy.payload(), retained.payload());
    }

    #[test]
    fn test_clone_keeps_count_but_not_counter() {
        let original = Message::update(ProcessId::new(1), Payload::new(vec![1, 1]));
        original.increment_ack();

        let cloned = original.clone();
        original.increment_ack();

        assert_eq!(cloned.acks(), 1);
        assert_eq!(original.acks(), 2);
    }

    #[test]
    fn test_concurrent_increment() {
        let message = Arc::new(Message::update(ProcessId::new(0), Payload::new(vec![0, 0])));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&message);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        m.increment_ack();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(message.acks(), 8000);
    }

    #[test]
    fn test_ack_target_only_on_acks() {
        let poke = Message::new(MessageKind::Poke, ts(4, 1), ProcessId::new(1))
            .with_ack_target(ts(3, 2));
        assert_eq!(poke.ack_target(), None);

        let ack = Message::ack(ts(4, 1), ProcessId::new(1), ts(3, 2));
        assert_eq!(ack.ack_target(), Some(ts(3, 2)));
    }

    #[test]
    fn test_order_by_timestamp() {
        let mut a = Message::update(ProcessId::new(1), Payload::new(vec![0, 0]));
        a.stamp(ts(5, 1));
        let mut b = Message::update(ProcessId::new(2), Payload::new(vec![0, 0]));
        b.stamp(ts(5, 2));
        let mut c = Message::update(ProcessId::new(0), Payload::new(vec![0, 0]));
        c.stamp(ts(4, 0));

        let mut all = vec![a.clone(), b.clone(), c.clone()];
        all.sort();
        assert_eq!(all[0].timestamp(), c.timestamp());
        assert_eq!(all[1].timestamp(), a.timestamp());
        assert_eq!(all[2].timestamp(), b.timestamp());
    }

    #[test]
    fn test_sentinels() {
        assert!(Message::ready().is_ready_sentinel());
        let exit = Message::exit_signal(ProcessId::new(2));
        assert_eq!(exit.kind(), MessageKind::Exit);
        assert_eq!(exit.sender(), ProcessId::new(2));
        assert!(!exit.is_ready_sentinel());
    }

    #[test]
    fn test_wire_rejects_ack_without_target() {
        let wire = WireMessage {
            kind: MessageKind::Ack,
            timestamp: ts(1, 1),
            sender: ProcessId::new(1),
            payload: None,
            ack_target: None,
        };
        assert!(Message::try_from(wire).is_err());
    }

    #[test]
    fn test_wire_rejects_target_on_update() {
        let wire = WireMessage {
            kind: MessageKind::Update,
            timestamp: ts(1, 1),
            sender: ProcessId::new(1),
            payload: Some(Payload::new(vec![1, 2])),
            ack_target: Some(ts(0, 2)),
        };
        assert!(Message::try_from(wire).is_err());
    }

    #[test]
    fn test_wire_drops_ack_count() {
        let message = Message::update(ProcessId::new(1), Payload::new(vec![5, 5]));
        message.increment_ack();

        let decoded = Message::try_from(WireMessage::from(&message)).unwrap();
        assert_eq!(decoded.acks(), 0);
    }
}
