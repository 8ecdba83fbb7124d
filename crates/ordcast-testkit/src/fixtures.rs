//! Multi-process fixtures.
//!
//! Two harnesses, one per level:
//!
//! - [`LocalCluster`] runs real engines on the current runtime, fully meshed
//!   with in-memory transports. Timing is real.
//! - [`SimulatedCluster`] drives bare [`OrderingCore`]s by hand. The caller
//!   picks which in-flight message moves next, so any interleaving that
//!   per-link FIFO order allows can be replayed exactly.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::task::JoinHandle;

use ordcast::{AppHandle, EngineConfig, OrderingCore, OrderingEngine, RunReport};
use ordcast_core::{Message, Payload, ProcessId, Timestamp};
use ordcast_net::{memory, PeerLink};

/// N engines connected pairwise over in-memory links.
///
/// Process `i` has id `i`. Must be started from inside a Tokio runtime.
pub struct LocalCluster {
    apps: Vec<AppHandle>,
    engines: Vec<JoinHandle<ordcast::Result<RunReport>>>,
}

impl LocalCluster {
    /// Start `n` engines with step-1 clocks and the given exit grace interval.
    pub fn start(n: usize, grace: Duration) -> Self {
        Self::start_with(n, |pid| EngineConfig::new(pid, 1).with_grace_interval(grace))
    }

    /// Start `n` engines, configuring each one with `config`.
    pub fn start_with(n: usize, config: impl Fn(ProcessId) -> EngineConfig) -> Self {
        let mut links: Vec<Vec<PeerLink>> = (0..n).map(|_| Vec::new()).collect();
        for i in 0..n {
            for j in (i + 1)..n {
                let (left, right) = memory::pair(&format!("P{}", i), &format!("P{}", j));
                links[i].push(PeerLink::spawn(left));
                links[j].push(PeerLink::spawn(right));
            }
        }

        let mut apps = Vec::with_capacity(n);
        let mut engines = Vec::with_capacity(n);
        for (i, peer_links) in links.into_iter().enumerate() {
            let pid = ProcessId::new(i as i32);
            let (engine, app) = OrderingEngine::new(config(pid), peer_links);
            engines.push(engine.spawn());
            apps.push(app);
        }

        Self { apps, engines }
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// The application handle of process `i`.
    pub fn app(&mut self, i: usize) -> &mut AppHandle {
        &mut self.apps[i]
    }

    pub fn apps_mut(&mut self) -> &mut [AppHandle] {
        &mut self.apps
    }

    /// Wait until every engine has reported readiness.
    pub async fn wait_ready(&mut self) -> ordcast::Result<()> {
        for app in self.apps.iter_mut() {
            app.wait_ready().await?;
        }
        Ok(())
    }

    /// Signal every application as done generating.
    pub fn finish_all(&mut self) {
        for app in self.apps.iter_mut() {
            app.finish();
        }
    }

    /// Drain every application up to its exit message.
    ///
    /// Returns `None` for a process whose engine stopped without one.
    pub async fn collect_all(&mut self) -> Vec<Option<Vec<Message>>> {
        let mut all = Vec::with_capacity(self.apps.len());
        for app in self.apps.iter_mut() {
            all.push(drain_until_exit(app).await);
        }
        all
    }

    /// Wait for every engine to stop and return their reports.
    ///
    /// A panic inside an engine task is re-raised here.
    pub async fn join(self) -> Vec<ordcast::Result<RunReport>> {
        let mut reports = Vec::with_capacity(self.engines.len());
        for engine in self.engines {
            match engine.await {
                Ok(report) => reports.push(report),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => panic!("engine task cancelled: {}", e),
            }
        }
        reports
    }
}

/// Receive deliveries until the exit message.
pub async fn drain_until_exit(app: &mut AppHandle) -> Option<Vec<Message>> {
    let mut delivered = Vec::new();
    while let Some(message) = app.recv().await {
        if app.is_exit(&message) {
            return Some(delivered);
        }
        delivered.push(message);
    }
    None
}

/// Timestamps of `messages`, in order.
pub fn timestamps(messages: &[Message]) -> Vec<Timestamp> {
    messages.iter().map(|m| m.timestamp()).collect()
}

/// Ordering cores wired through hand-driven FIFO links.
pub struct SimulatedCluster {
    cores: Vec<OrderingCore>,
    /// `links[from][to]`, messages in flight from one process to another.
    links: Vec<Vec<VecDeque<Message>>>,
    delivered: Vec<Vec<Message>>,
}

impl SimulatedCluster {
    /// `n` processes with ids `0..n`.
    pub fn new(n: usize, clock_step: u64) -> Self {
        let peer_count = n.saturating_sub(1);
        Self {
            cores: (0..n)
                .map(|i| OrderingCore::new(ProcessId::new(i as i32), clock_step, peer_count))
                .collect(),
            links: (0..n)
                .map(|_| (0..n).map(|_| VecDeque::new()).collect())
                .collect(),
            delivered: (0..n).map(|_| Vec::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    pub fn core(&self, pid: usize) -> &OrderingCore {
        &self.cores[pid]
    }

    /// Updates delivered so far at process `pid`, in delivery order.
    pub fn delivered(&self, pid: usize) -> &[Message] {
        &self.delivered[pid]
    }

    /// Submit an update at process `pid`.
    pub fn submit(&mut self, pid: usize, payload: Payload) {
        self.cores[pid].submit(payload);
        self.settle(pid);
    }

    /// Links with a message in flight, as `(from, to)`.
    pub fn in_flight(&self) -> Vec<(usize, usize)> {
        let mut busy = Vec::new();
        for (from, row) in self.links.iter().enumerate() {
            for (to, queue) in row.iter().enumerate() {
                if !queue.is_empty() {
                    busy.push((from, to));
                }
            }
        }
        busy
    }

    /// Move the oldest message on link `from -> to`. Returns false if the
    /// link was empty.
    pub fn step(&mut self, from: usize, to: usize) -> bool {
        let Some(message) = self.links[from][to].pop_front() else {
            return false;
        };
        self.cores[to].receive(message);
        self.settle(to);
        true
    }

    /// Move messages until nothing is in flight. `choose(n)` picks which of
    /// the `n` busy links goes next.
    pub fn run_until_quiet(&mut self, mut choose: impl FnMut(usize) -> usize) -> usize {
        let mut steps = 0;
        loop {
            let busy = self.in_flight();
            if busy.is_empty() {
                return steps;
            }
            let (from, to) = busy[choose(busy.len()) % busy.len()];
            self.step(from, to);
            steps += 1;
        }
    }

    fn settle(&mut self, pid: usize) {
        for message in self.cores[pid].take_outbox() {
            for (to, queue) in self.links[pid].iter_mut().enumerate() {
                if to != pid {
                    queue.push_back(message.transport_copy());
                }
            }
        }
        let ready = self.cores[pid].deliver();
        self.delivered[pid].extend(ready);
    }
}
