//! The ordering algorithm, free of I/O.
//!
//! [`OrderingCore`] owns the clock, the delivery queue and the orphan acks.
//! The async engine feeds it messages from the application and from peers,
//! multicasts whatever lands in its outbox and forwards whatever it delivers.
//! Keeping the core synchronous lets every ordering rule be tested without a
//! runtime.

use tracing::{debug, info, warn};

use ordcast_core::{LogicalClock, Message, MessageKind, Payload, ProcessId, Timestamp};

use crate::delivery::{readiness, DeliveryQueue, PendingAcks, Readiness};
use crate::termination::{ExitProtocol, ExitState};

/// Counters describing a finished run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Updates handed to the local application.
    pub delivered: u64,
    /// Messages stamped and multicast by this process.
    pub sent: u64,
    /// Messages received from peers.
    pub received: u64,
    /// Protocol anomalies logged along the way.
    pub anomalies: u64,
    /// Exit probes sent before shutdown.
    pub exit_attempts: u32,
}

/// Clock, queues and termination flags of one process.
#[derive(Debug)]
pub struct OrderingCore {
    pid: ProcessId,
    peer_count: usize,
    clock: LogicalClock,
    queue: DeliveryQueue,
    pending: PendingAcks,
    exit: ExitProtocol,
    outbox: Vec<Message>,
    overacked: Option<Timestamp>,
    report: RunReport,
}

impl OrderingCore {
    /// Create the core for `pid` in a cluster with `peer_count` other
    /// processes.
    pub fn new(pid: ProcessId, clock_step: u64, peer_count: usize) -> Self {
        Self {
            pid,
            peer_count,
            clock: LogicalClock::new(pid, clock_step),
            queue: DeliveryQueue::new(),
            pending: PendingAcks::new(),
            exit: ExitProtocol::new(),
            outbox: Vec::new(),
            overacked: None,
            report: RunReport::default(),
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn peer_count(&self) -> usize {
        self.peer_count
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Updates waiting for acks.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Acks parked for updates not yet received.
    pub fn orphan_acks(&self) -> usize {
        self.pending.len()
    }

    pub fn exit_state(&self) -> ExitState {
        self.exit.state()
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.requested()
    }

    /// Messages to multicast, in the order they were stamped.
    pub fn take_outbox(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbox)
    }

    /// Build an update from the local application, stamp it, and queue it
    /// for multicast and local delivery.
    ///
    /// The update always carries this process as its sender.
    pub fn submit(&mut self, payload: Payload) -> Timestamp {
        let ts = self.clock.increment();
        let mut message = Message::update(self.pid, payload);
        message.stamp(ts);
        debug!(pid = %self.pid, ts = %ts, "sending update");
        self.multicast(&message);
        self.enqueue(message);
        ts
    }

    /// Process one message received from a peer.
    pub fn receive(&mut self, message: Message) {
        if message.is_ready_sentinel() {
            warn!(pid = %self.pid, "readiness sentinel after startup, ignored");
            self.report.anomalies += 1;
            return;
        }

        self.clock.increment();
        self.report.received += 1;

        match message.kind() {
            MessageKind::Ack => self.on_ack(&message),
            MessageKind::Update => self.on_update(message),
            MessageKind::Exit => self.on_exit_probe(&message),
            MessageKind::Poke => self.on_poke(&message),
        }
    }

    fn on_ack(&mut self, message: &Message) {
        let Some(target) = message.ack_target() else {
            warn!(pid = %self.pid, sender = %message.sender(), "ack without target");
            self.report.anomalies += 1;
            return;
        };

        match self.queue.acknowledge(target) {
            0 => {
                debug!(pid = %self.pid, ts = %target, sender = %message.sender(), "ack before update");
                self.pending.record(target);
            }
            1 => {}
            matched => {
                warn!(pid = %self.pid, ts = %target, matched, "ack matched several queued updates");
                self.report.anomalies += 1;
            }
        }
    }

    fn on_update(&mut self, message: Message) {
        if message.acks() != 0 {
            warn!(
                pid = %self.pid,
                ts = %message.timestamp(),
                acks = message.acks(),
                "update arrived with a non-zero ack count"
            );
            self.report.anomalies += 1;
        }

        let ts = message.timestamp();
        if ts >= self.clock.now() {
            self.clock.set_time(ts);
        }

        let ack = Message::ack(self.clock.increment(), self.pid, ts);
        self.multicast(&ack);

        for _ in 0..self.pending.take(ts) {
            message.increment_ack();
        }
        self.enqueue(message);
    }

    fn on_exit_probe(&mut self, message: &Message) {
        if self.exit.ok_to_let_peers_exit() {
            info!(pid = %self.pid, "{} finished", message.sender());
        } else {
            debug!(pid = %self.pid, sender = %message.sender(), "asking peer to wait");
            let poke = Message::new(MessageKind::Poke, self.clock.increment(), self.pid);
            self.multicast(&poke);
        }
    }

    fn on_poke(&mut self, message: &Message) {
        debug!(pid = %self.pid, sender = %message.sender(), "poked");
        self.exit.poked();
    }

    /// Pop every update at the head of the queue that is ready, in timestamp
    /// order. Stops at the first one that is not.
    pub fn deliver(&mut self) -> Vec<Message> {
        let mut delivered = Vec::new();

        while let Some(head) = self.queue.peek() {
            let ts = head.timestamp();
            for _ in 0..self.pending.take(ts) {
                head.increment_ack();
            }

            match readiness(head, self.pid, self.peer_count) {
                Readiness::Ready => {
                    if let Some(message) = self.queue.pop() {
                        debug!(pid = %self.pid, ts = %ts, "delivering");
                        delivered.push(message);
                    }
                }
                Readiness::Waiting => break,
                Readiness::Overacked => {
                    if self.overacked != Some(ts) {
                        warn!(
                            pid = %self.pid,
                            ts = %ts,
                            acks = head.acks(),
                            sender = %head.sender(),
                            "update has more acks than peers, withholding it"
                        );
                        self.overacked = Some(ts);
                        self.report.anomalies += 1;
                    }
                    break;
                }
            }
        }

        self.report.delivered += delivered.len() as u64;
        delivered
    }

    /// The application is done generating updates.
    pub fn request_exit(&mut self) {
        if !self.exit.requested() {
            info!(pid = %self.pid, queued = self.queue.len(), "exit requested");
        }
        self.exit.request();
    }

    /// Start an exit attempt if the queue is empty.
    ///
    /// Returns true if a probe was queued for multicast. Otherwise this
    /// process keeps objecting to peer probes and stays in ordinary
    /// processing.
    pub fn start_exit_attempt(&mut self) -> bool {
        if !self.queue.is_empty() {
            self.exit.hold();
            return false;
        }

        self.exit.probe();
        let probe = Message::new(MessageKind::Exit, self.clock.increment(), self.pid);
        debug!(pid = %self.pid, attempt = self.exit.attempts(), "probing peers for exit");
        self.multicast(&probe);
        true
    }

    /// The grace wait was interrupted.
    pub fn abandon_exit_attempt(&mut self) {
        debug!(pid = %self.pid, "exit attempt interrupted");
        self.exit.interrupted();
    }

    /// Decide the current attempt after the final receive pass.
    pub fn finish_exit_attempt(&mut self) -> ExitState {
        let state = self.exit.conclude(self.queue.is_empty());
        debug!(pid = %self.pid, ?state, "exit attempt concluded");
        state
    }

    /// Counters so far.
    pub fn report(&self) -> RunReport {
        RunReport {
            exit_attempts: self.exit.attempts(),
            ..self.report.clone()
        }
    }

    fn multicast(&mut self, message: &Message) {
        self.report.sent += 1;
        self.outbox.push(message.transport_copy());
    }

    fn enqueue(&mut self, message: Message) {
        if let Err(rejected) = self.queue.push(message) {
            warn!(
                pid = %self.pid,
                kind = %rejected.kind().tag(),
                "only updates can be queued for delivery"
            );
            self.report.anomalies += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: i32) -> ProcessId {
        ProcessId::new(n)
    }

    fn ts(ticks: u64, p: i32) -> Timestamp {
        Timestamp::new(ticks, pid(p))
    }

    fn remote_update(ticks: u64, sender: i32, deltas: Vec<i32>) -> Message {
        let mut message = Message::update(pid(sender), Payload::new(deltas));
        message.stamp(ts(ticks, sender));
        message
    }

    fn remote_ack(ticks: u64, sender: i32, target: Timestamp) -> Message {
        Message::ack(ts(ticks, sender), pid(sender), target)
    }

    fn remote_probe(ticks: u64, sender: i32) -> Message {
        Message::new(MessageKind::Exit, ts(ticks, sender), pid(sender))
    }

    fn kinds(outbox: &[Message]) -> Vec<MessageKind> {
        outbox.iter().map(|m| m.kind()).collect()
    }

    #[test]
    fn test_submit_stamps_and_retains_update() {
        let mut core = OrderingCore::new(pid(1), 1, 2);

        core.submit(Payload::new(vec![5, 5]));

        let outbox = core.take_outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].timestamp(), ts(1, 1));
        assert_eq!(outbox[0].acks(), 0);
        assert_eq!(core.queued(), 1);
        assert!(core.deliver().is_empty());
    }

    #[test]
    fn test_submitted_update_is_always_local() {
        let mut core = OrderingCore::new(pid(0), 1, 2);

        let stamped = core.submit(Payload::new(vec![1, 1]));
        let outbox = core.take_outbox();
        assert_eq!(outbox[0].sender(), pid(0));
        assert_eq!(outbox[0].timestamp(), stamped);

        // A local update needs an ack from every peer, not all but one.
        core.receive(remote_ack(3, 2, stamped));
        assert!(core.deliver().is_empty());
        core.receive(remote_ack(4, 1, stamped));
        assert_eq!(core.deliver().len(), 1);
    }

    #[test]
    fn test_local_update_ready_after_every_peer_acks() {
        let mut core = OrderingCore::new(pid(0), 1, 2);
        core.submit(Payload::new(vec![1, 1]));
        let target = core.take_outbox()[0].timestamp();

        core.receive(remote_ack(3, 1, target));
        assert!(core.deliver().is_empty());

        core.receive(remote_ack(3, 2, target));
        let delivered = core.deliver();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].timestamp(), target);
        assert_eq!(core.queued(), 0);
    }

    #[test]
    fn test_remote_update_acked_and_ready_after_n_minus_one() {
        let mut core = OrderingCore::new(pid(0), 1, 2);

        core.receive(remote_update(4, 1, vec![3, -3]));
        let outbox = core.take_outbox();
        assert_eq!(kinds(&outbox), vec![MessageKind::Ack]);
        assert_eq!(outbox[0].ack_target(), Some(ts(4, 1)));
        assert!(outbox[0].timestamp() > ts(4, 1));
        assert!(core.deliver().is_empty());

        core.receive(remote_ack(6, 2, ts(4, 1)));
        assert_eq!(core.deliver().len(), 1);
    }

    #[test]
    fn test_clock_catches_up_past_observed_update() {
        let mut core = OrderingCore::new(pid(2), 1, 2);

        core.receive(remote_update(40, 1, vec![0, 0]));
        assert!(core.now() > ts(40, 1));
        assert_eq!(core.now().pid(), pid(2));

        core.submit(Payload::new(vec![1, 2]));
        let outbox = core.take_outbox();
        assert!(outbox.last().unwrap().timestamp() > ts(40, 1));
    }

    #[test]
    fn test_orphan_ack_applied_when_update_arrives() {
        let mut core = OrderingCore::new(pid(0), 1, 2);

        core.receive(remote_ack(5, 2, ts(4, 1)));
        assert_eq!(core.orphan_acks(), 1);
        assert_eq!(core.queued(), 0);

        core.receive(remote_update(4, 1, vec![7, 7]));
        assert_eq!(core.orphan_acks(), 0);

        let delivered = core.deliver();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].acks(), 1);
    }

    #[test]
    fn test_later_ready_update_never_overtakes_earlier() {
        let mut core = OrderingCore::new(pid(0), 1, 2);

        core.receive(remote_update(3, 1, vec![1, 0]));
        core.receive(remote_update(5, 2, vec![2, 0]));

        // The later update is fully acked, the earlier one is not.
        core.receive(remote_ack(7, 1, ts(5, 2)));
        assert!(core.deliver().is_empty());

        core.receive(remote_ack(8, 2, ts(3, 1)));
        let order: Vec<_> = core.deliver().iter().map(|m| m.timestamp()).collect();
        assert_eq!(order, vec![ts(3, 1), ts(5, 2)]);
    }

    #[test]
    fn test_concurrent_local_and_remote_updates_order_by_suffix() {
        // Process 1 and process 2 both stamp an update at tick 1. Process 1's
        // suffix is smaller, so every process delivers it first.
        let mut core = OrderingCore::new(pid(2), 1, 2);
        core.submit(Payload::new(vec![0, 2]));
        assert_eq!(core.take_outbox()[0].timestamp(), ts(1, 2));

        core.receive(remote_update(1, 1, vec![0, 1]));
        core.receive(remote_ack(2, 0, ts(1, 1)));
        core.receive(remote_ack(2, 0, ts(1, 2)));
        core.receive(remote_ack(3, 1, ts(1, 2)));

        let order: Vec<_> = core.deliver().iter().map(|m| m.sender()).collect();
        assert_eq!(order, vec![pid(1), pid(2)]);
    }

    #[test]
    fn test_equal_ticks_deliver_in_suffix_order_whatever_the_arrival() {
        for senders in [[1, 2], [2, 1]] {
            let mut core = OrderingCore::new(pid(0), 1, 2);
            for sender in senders {
                core.receive(remote_update(5, sender, vec![sender, 0]));
            }
            core.receive(remote_ack(9, 2, ts(5, 1)));
            core.receive(remote_ack(9, 1, ts(5, 2)));

            let order: Vec<_> = core.deliver().iter().map(|m| m.timestamp()).collect();
            assert_eq!(order, vec![ts(5, 1), ts(5, 2)]);
        }
    }

    #[test]
    fn test_overacked_remote_update_is_withheld() {
        let mut core = OrderingCore::new(pid(0), 1, 2);
        core.receive(remote_update(2, 1, vec![0, 0]));
        core.receive(remote_ack(3, 2, ts(2, 1)));
        core.receive(remote_ack(4, 2, ts(2, 1)));

        assert!(core.deliver().is_empty());
        assert!(core.deliver().is_empty());
        assert_eq!(core.queued(), 1);
        assert_eq!(core.report().anomalies, 1);
    }

    #[test]
    fn test_exit_probe_granted_by_silence_when_exiting() {
        let mut core = OrderingCore::new(pid(0), 1, 1);
        core.request_exit();
        assert!(core.start_exit_attempt());
        assert_eq!(kinds(&core.take_outbox()), vec![MessageKind::Exit]);

        core.receive(remote_probe(9, 1));
        assert!(core.take_outbox().is_empty());
        assert_eq!(core.finish_exit_attempt(), ExitState::Granted);
    }

    #[test]
    fn test_exit_probe_poked_while_running() {
        let mut core = OrderingCore::new(pid(0), 1, 1);

        core.receive(remote_probe(9, 1));

        let outbox = core.take_outbox();
        assert_eq!(kinds(&outbox), vec![MessageKind::Poke]);
        assert_eq!(outbox[0].sender(), pid(0));
    }

    #[test]
    fn test_poke_defers_exit() {
        let mut core = OrderingCore::new(pid(1), 1, 1);
        core.request_exit();
        assert!(core.start_exit_attempt());

        core.receive(Message::new(MessageKind::Poke, ts(5, 0), pid(0)));
        assert_eq!(core.finish_exit_attempt(), ExitState::Deferred);
    }

    #[test]
    fn test_exit_waits_for_local_queue() {
        let mut core = OrderingCore::new(pid(0), 1, 1);
        core.submit(Payload::new(vec![1, 1]));
        core.take_outbox();
        core.request_exit();

        assert!(!core.start_exit_attempt());
        assert_eq!(core.exit_state(), ExitState::LocalDrainWait);

        core.receive(remote_probe(4, 1));
        assert_eq!(kinds(&core.take_outbox()), vec![MessageKind::Poke]);
    }

    #[test]
    fn test_update_during_grace_defers_exit() {
        let mut core = OrderingCore::new(pid(0), 1, 2);
        core.request_exit();
        assert!(core.start_exit_attempt());

        core.receive(remote_update(8, 1, vec![1, 1]));
        assert_eq!(core.finish_exit_attempt(), ExitState::Deferred);
    }

    #[test]
    fn test_stray_sentinel_is_ignored() {
        let mut core = OrderingCore::new(pid(0), 1, 1);
        let before = core.now();

        core.receive(Message::ready());

        assert_eq!(core.now(), before);
        assert_eq!(core.report().anomalies, 1);
        assert_eq!(core.report().received, 0);
    }

    #[test]
    fn test_report_counts() {
        let mut core = OrderingCore::new(pid(0), 1, 1);
        core.submit(Payload::new(vec![1, 1]));
        core.receive(remote_ack(5, 1, ts(1, 0)));
        core.deliver();

        let report = core.report();
        assert_eq!(report.sent, 1);
        assert_eq!(report.received, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.anomalies, 0);
    }
}
