//! Delivery bookkeeping: the pending-update queue, orphan acks and the
//! readiness rule.
//!
//! Updates wait in a [`DeliveryQueue`] ordered by timestamp until every peer
//! that must acknowledge them has done so. An ack can overtake the update it
//! names when the two travel over different links; such acks are parked in
//! [`PendingAcks`] and folded into the update once it is enqueued.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordcast_core::{Message, MessageKind, ProcessId, Timestamp};

/// Min-priority queue of updates awaiting delivery.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    heap: BinaryHeap<Reverse<Message>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an update.
    ///
    /// Anything other than an update is handed back unchanged.
    pub fn push(&mut self, message: Message) -> std::result::Result<(), Message> {
        if message.kind() != MessageKind::Update {
            return Err(message);
        }
        self.heap.push(Reverse(message));
        Ok(())
    }

    /// The update with the smallest timestamp.
    pub fn peek(&self) -> Option<&Message> {
        self.heap.peek().map(|Reverse(message)| message)
    }

    /// Remove and return the update with the smallest timestamp.
    pub fn pop(&mut self) -> Option<Message> {
        self.heap.pop().map(|Reverse(message)| message)
    }

    /// Count one ack against every queued update stamped `target`.
    ///
    /// Returns how many entries matched. Timestamps are unique, so anything
    /// other than 0 or 1 points at a misconfigured cluster.
    pub fn acknowledge(&self, target: Timestamp) -> usize {
        let mut matched = 0;
        for Reverse(message) in self.heap.iter() {
            if message.timestamp() == target {
                message.increment_ack();
                matched += 1;
            }
        }
        matched
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Unordered bag of ack targets whose update has not arrived yet.
#[derive(Debug, Default)]
pub struct PendingAcks {
    targets: Vec<Timestamp>,
}

impl PendingAcks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park one ack for `target`.
    pub fn record(&mut self, target: Timestamp) {
        self.targets.push(target);
    }

    /// Remove every parked ack for `target` and return how many there were.
    pub fn take(&mut self, target: Timestamp) -> u32 {
        let before = self.targets.len();
        self.targets.retain(|t| *t != target);
        (before - self.targets.len()) as u32
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Outcome of the readiness check on a queued update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Every required ack has arrived.
    Ready,
    /// Still missing acks.
    Waiting,
    /// More acks than there are peers to send them. Never delivered.
    Overacked,
}

/// Apply the readiness rule to `message` as seen by process `local` in a
/// cluster of `peer_count` peers (excluding `local`).
///
/// A local update needs an ack from every peer. A remote update needs one
/// from every peer except its sender, which never acks its own broadcast.
pub fn readiness(message: &Message, local: ProcessId, peer_count: usize) -> Readiness {
    let required = if message.sender() == local {
        peer_count
    } else {
        peer_count.saturating_sub(1)
    };
    match (message.acks() as usize).cmp(&required) {
        Ordering::Less => Readiness::Waiting,
        Ordering::Equal => Readiness::Ready,
        Ordering::Greater => Readiness::Overacked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordcast_core::Payload;
    use proptest::prelude::*;

    fn update(ticks: u64, sender: i32) -> Message {
        let sender = ProcessId::new(sender);
        let mut message = Message::update(sender, Payload::new(vec![1, -1]));
        message.stamp(Timestamp::new(ticks, sender));
        message
    }

    fn ts(ticks: u64, pid: i32) -> Timestamp {
        Timestamp::new(ticks, ProcessId::new(pid))
    }

    #[test]
    fn test_queue_pops_in_timestamp_order() {
        let mut queue = DeliveryQueue::new();
        queue.push(update(5, 1)).unwrap();
        queue.push(update(3, 2)).unwrap();
        queue.push(update(5, 0)).unwrap();
        queue.push(update(4, 1)).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|m| m.timestamp())
            .collect();
        assert_eq!(order, vec![ts(3, 2), ts(4, 1), ts(5, 0), ts(5, 1)]);
    }

    #[test]
    fn test_queue_rejects_non_updates() {
        let mut queue = DeliveryQueue::new();
        let ack = Message::ack(ts(2, 1), ProcessId::new(1), ts(1, 0));

        let rejected = queue.push(ack).unwrap_err();
        assert_eq!(rejected.kind(), MessageKind::Ack);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_acknowledge_counts_matches() {
        let mut queue = DeliveryQueue::new();
        queue.push(update(3, 1)).unwrap();
        queue.push(update(4, 1)).unwrap();

        assert_eq!(queue.acknowledge(ts(4, 1)), 1);
        assert_eq!(queue.acknowledge(ts(4, 1)), 1);
        assert_eq!(queue.acknowledge(ts(9, 9)), 0);

        assert_eq!(queue.pop().unwrap().acks(), 0);
        assert_eq!(queue.pop().unwrap().acks(), 2);
    }

    #[test]
    fn test_pending_take_consumes_all_matches() {
        let mut pending = PendingAcks::new();
        pending.record(ts(7, 2));
        pending.record(ts(8, 1));
        pending.record(ts(7, 2));

        assert_eq!(pending.take(ts(7, 2)), 2);
        assert_eq!(pending.take(ts(7, 2)), 0);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_local_update_needs_every_peer() {
        let local = ProcessId::new(1);
        let message = update(3, 1);

        assert_eq!(readiness(&message, local, 2), Readiness::Waiting);
        message.increment_ack();
        assert_eq!(readiness(&message, local, 2), Readiness::Waiting);
        message.increment_ack();
        assert_eq!(readiness(&message, local, 2), Readiness::Ready);
        message.increment_ack();
        assert_eq!(readiness(&message, local, 2), Readiness::Overacked);
    }

    #[test]
    fn test_remote_update_excludes_sender() {
        let local = ProcessId::new(0);
        let message = update(3, 2);

        assert_eq!(readiness(&message, local, 2), Readiness::Waiting);
        message.increment_ack();
        assert_eq!(readiness(&message, local, 2), Readiness::Ready);
        message.increment_ack();
        assert_eq!(readiness(&message, local, 2), Readiness::Overacked);
    }

    #[test]
    fn test_single_process_cluster() {
        let message = update(1, 0);
        assert_eq!(readiness(&message, ProcessId::new(0), 0), Readiness::Ready);
    }

    proptest! {
        #[test]
        fn test_orphan_acks_land_regardless_of_arrival_order(
            orphans in 0u32..6,
            direct in 0u32..6,
        ) {
            let target = ts(10, 3);

            // Acks that arrive before the update.
            let mut pending = PendingAcks::new();
            for _ in 0..orphans {
                pending.record(target);
            }
            pending.record(ts(11, 3));

            let mut queue = DeliveryQueue::new();
            let message = update(10, 3);
            for _ in 0..pending.take(target) {
                message.increment_ack();
            }
            queue.push(message).unwrap();

            // Acks that arrive after it.
            for _ in 0..direct {
                prop_assert_eq!(queue.acknowledge(target), 1);
            }

            prop_assert_eq!(queue.peek().unwrap().acks(), orphans + direct);
            prop_assert_eq!(pending.len(), 1);
        }
    }
}
