//! Proptest generators for property-based testing.

use proptest::prelude::*;

use ordcast_core::{Message, MessageKind, Payload, ProcessId, Timestamp};

/// Generate a non-sentinel process id below `max`.
pub fn process_id(max: i32) -> impl Strategy<Value = ProcessId> {
    (0..max.max(1)).prop_map(ProcessId::new)
}

/// Generate a timestamp from a process below `max_pid`.
pub fn timestamp(max_pid: i32) -> impl Strategy<Value = Timestamp> {
    (0u64..1_000_000, process_id(max_pid)).prop_map(|(ticks, pid)| Timestamp::new(ticks, pid))
}

/// Generate a currency-style payload: two deltas in `-80..80`.
pub fn payload() -> impl Strategy<Value = Payload> {
    (-80i32..80, -80i32..80).prop_map(|(sell, buy)| Payload::new(vec![sell, buy]))
}

/// Generate a MessageKind.
pub fn message_kind() -> impl Strategy<Value = MessageKind> {
    prop_oneof![
        Just(MessageKind::Update),
        Just(MessageKind::Ack),
        Just(MessageKind::Exit),
        Just(MessageKind::Poke),
    ]
}

/// Generate a well-formed stamped message of any kind.
pub fn message(max_pid: i32) -> impl Strategy<Value = Message> {
    (message_kind(), timestamp(max_pid), timestamp(max_pid), payload()).prop_map(
        |(kind, ts, target, payload)| {
            let message = Message::new(kind, ts, ts.pid());
            match kind {
                MessageKind::Update => message.with_payload(payload),
                MessageKind::Ack => message.with_ack_target(target),
                MessageKind::Exit | MessageKind::Poke => message,
            }
        },
    )
}

/// Updates to submit per process, plus a delivery schedule.
#[derive(Debug, Clone)]
pub struct Workload {
    /// `updates[pid]` is submitted by process `pid`, in order.
    pub updates: Vec<Vec<Payload>>,
    /// Interleaving choices. Each entry either submits the next pending update
    /// of some process or moves one in-flight message.
    pub schedule: Vec<ScheduleStep>,
}

/// One choice in a [`Workload`] schedule.
#[derive(Debug, Clone, Copy)]
pub enum ScheduleStep {
    /// Submit the next update of process `pid % n`, if it has one left.
    Submit(usize),
    /// Move the oldest message on the `index % busy`-th busy link.
    Deliver(usize),
}

impl Workload {
    pub fn process_count(&self) -> usize {
        self.updates.len()
    }

    pub fn total_updates(&self) -> usize {
        self.updates.iter().map(Vec::len).sum()
    }
}

impl Arbitrary for Workload {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (2usize..=4)
            .prop_flat_map(|n| {
                (
                    prop::collection::vec(prop::collection::vec(payload(), 0..=5), n),
                    prop::collection::vec(schedule_step(), 0..120),
                )
            })
            .prop_map(|(updates, schedule)| Workload { updates, schedule })
            .boxed()
    }
}

fn schedule_step() -> impl Strategy<Value = ScheduleStep> {
    prop_oneof![
        any::<usize>().prop_map(ScheduleStep::Submit),
        any::<usize>().prop_map(ScheduleStep::Deliver),
    ]
}
