//! # ordcast Testkit
//!
//! Testing utilities for ordcast.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: [`LocalCluster`] runs N real engines over in-memory links;
//!   [`SimulatedCluster`] drives N ordering cores under a caller-chosen
//!   message schedule
//! - **Generators**: Proptest strategies for messages and workloads
//!
//! ## Property Testing
//!
//! Replay a random workload under a random interleaving and check that every
//! process delivers the same sequence:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use ordcast_testkit::{replay, timestamps, Workload};
//!
//! proptest! {
//!     #[test]
//!     fn same_order_everywhere(workload: Workload) {
//!         let cluster = replay(&workload);
//!         for pid in 1..cluster.len() {
//!             prop_assert_eq!(
//!                 timestamps(cluster.delivered(0)),
//!                 timestamps(cluster.delivered(pid)),
//!             );
//!         }
//!     }
//! }
//! ```
//!
//! ## Local Clusters
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use ordcast_core::Payload;
//! use ordcast_testkit::LocalCluster;
//!
//! # async fn example() {
//! let mut cluster = LocalCluster::start(3, Duration::from_millis(100));
//! cluster.wait_ready().await.unwrap();
//! cluster.app(0).submit(Payload::new(vec![1, -1])).unwrap();
//! cluster.finish_all();
//! let delivered = cluster.collect_all().await;
//! # }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{drain_until_exit, timestamps, LocalCluster, SimulatedCluster};
pub use generators::{ScheduleStep, Workload};

/// Run `workload` on a [`SimulatedCluster`] following its schedule, then
/// submit whatever is left and let every message land.
pub fn replay(workload: &Workload) -> SimulatedCluster {
    let n = workload.process_count();
    let mut cluster = SimulatedCluster::new(n, 1);
    let mut next = vec![0usize; n];

    for step in &workload.schedule {
        match *step {
            ScheduleStep::Submit(pid) => {
                let pid = pid % n;
                if let Some(payload) = workload.updates[pid].get(next[pid]) {
                    cluster.submit(pid, payload.clone());
                    next[pid] += 1;
                }
            }
            ScheduleStep::Deliver(index) => {
                let busy = cluster.in_flight();
                if !busy.is_empty() {
                    let (from, to) = busy[index % busy.len()];
                    cluster.step(from, to);
                }
            }
        }
    }

    for (pid, updates) in workload.updates.iter().enumerate() {
        for payload in &updates[next[pid]..] {
            cluster.submit(pid, payload.clone());
        }
    }

    let mut choice = workload.schedule.len();
    cluster.run_until_quiet(|busy| {
        choice = choice.wrapping_mul(31).wrapping_add(7);
        choice % busy
    });
    cluster
}
