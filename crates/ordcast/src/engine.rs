//! The async ordering engine.
//!
//! One engine task per process. Each loop iteration drains the application
//! queue, drains every peer link, delivers whatever became ready, and once
//! the application is done, runs the exit negotiation.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ordcast_core::{Message, Payload};
use ordcast_net::{establish, BootstrapConfig, PeerLink};

use crate::app::AppHandle;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::ordering::{OrderingCore, RunReport};
use crate::termination::ExitState;

/// Coordinator that owns the ordering state and every peer link.
pub struct OrderingEngine {
    config: EngineConfig,
    core: OrderingCore,
    links: Vec<PeerLink>,
    from_app: mpsc::UnboundedReceiver<Payload>,
    to_app: mpsc::UnboundedSender<Message>,
    interrupt: Arc<Notify>,
    app_gone: bool,
}

impl OrderingEngine {
    /// Create an engine over already started links.
    pub fn new(config: EngineConfig, links: Vec<PeerLink>) -> (Self, AppHandle) {
        let (app_tx, from_app) = mpsc::unbounded_channel();
        let (to_app, app_rx) = mpsc::unbounded_channel();
        let interrupt = Arc::new(Notify::new());

        let core = OrderingCore::new(config.process_id, config.clock_step, links.len());
        let app = AppHandle::new(config.process_id, app_tx, app_rx, interrupt.clone());

        let engine = Self {
            config,
            core,
            links,
            from_app,
            to_app,
            interrupt,
            app_gone: false,
        };
        (engine, app)
    }

    /// Read the roster, connect to every peer and create the engine.
    pub async fn bootstrap(
        config: EngineConfig,
        bootstrap: &BootstrapConfig,
    ) -> Result<(Self, AppHandle)> {
        let cluster = establish(bootstrap).await?;
        info!(
            pid = %config.process_id,
            rank = cluster.rank,
            peers = cluster.links.len(),
            "cluster established"
        );
        Ok(Self::new(config, cluster.links))
    }

    /// Run the engine on its own task.
    pub fn spawn(self) -> JoinHandle<Result<RunReport>> {
        tokio::spawn(self.run())
    }

    /// Run until exit is negotiated.
    ///
    /// Resolves once every link has been drained and joined and the exit
    /// message has been handed to the application.
    pub async fn run(mut self) -> Result<RunReport> {
        self.await_links().await?;
        self.forward(Message::ready());
        info!(pid = %self.core.pid(), peers = self.links.len(), "engine ready");

        loop {
            let busy = self.step();

            if self.core.exit_requested() {
                match self.attempt_exit().await {
                    ExitState::Granted => break,
                    ExitState::LocalDrainWait if !busy => self.idle().await,
                    _ => {}
                }
            } else if !busy {
                self.idle().await;
            }
        }

        self.shutdown().await;
        let report = self.core.report();
        info!(
            pid = %self.core.pid(),
            delivered = report.delivered,
            sent = report.sent,
            received = report.received,
            anomalies = report.anomalies,
            "engine stopped"
        );
        Ok(report)
    }

    async fn await_links(&mut self) -> Result<()> {
        let poll = self.config.readiness_poll;
        for link in self.links.iter_mut() {
            loop {
                match tokio::time::timeout(poll, link.recv()).await {
                    Ok(Some(message)) if message.is_ready_sentinel() => {
                        debug!(link = %link.label(), "link ready");
                        break;
                    }
                    Ok(Some(message)) => {
                        warn!(
                            link = %link.label(),
                            kind = %message.kind().tag(),
                            "message before readiness, processing it"
                        );
                        self.core.receive(message);
                    }
                    Ok(None) => {
                        return Err(EngineError::LinkFailed {
                            link: link.label().to_string(),
                        })
                    }
                    Err(_) => debug!(link = %link.label(), "waiting for link"),
                }
            }
        }
        Ok(())
    }

    /// One pass over every input. Returns whether anything was processed.
    fn step(&mut self) -> bool {
        let submitted = self.drain_app();
        let received = self.drain_links();
        let delivered = self.deliver();
        submitted + received + delivered > 0
    }

    fn drain_app(&mut self) -> usize {
        if self.core.exit_requested() {
            return 0;
        }

        let mut count = 0;
        loop {
            match self.from_app.try_recv() {
                Ok(payload) => {
                    self.core.submit(payload);
                    count += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.core.request_exit();
                    break;
                }
            }
        }
        self.flush();
        count
    }

    fn drain_links(&mut self) -> usize {
        let mut count = 0;
        for link in self.links.iter_mut() {
            while let Some(message) = link.try_recv() {
                self.core.receive(message);
                count += 1;
            }
        }
        self.flush();
        count
    }

    fn deliver(&mut self) -> usize {
        let delivered = self.core.deliver();
        let count = delivered.len();
        for message in delivered {
            self.forward(message);
        }
        count
    }

    /// Multicast everything the core queued, one independent copy per link.
    fn flush(&mut self) {
        for message in self.core.take_outbox() {
            for link in &self.links {
                if let Err(e) = link.send(message.transport_copy()) {
                    warn!(
                        link = %link.label(),
                        kind = %message.kind().tag(),
                        ts = %message.timestamp(),
                        "message dropped: {}",
                        e
                    );
                }
            }
        }
    }

    fn forward(&mut self, message: Message) {
        if self.to_app.send(message).is_err() && !self.app_gone {
            warn!(pid = %self.core.pid(), "application stopped receiving");
            self.app_gone = true;
        }
    }

    async fn idle(&self) {
        tokio::time::sleep(self.config.idle_poll).await;
    }

    async fn attempt_exit(&mut self) -> ExitState {
        if !self.core.start_exit_attempt() {
            return self.core.exit_state();
        }
        self.flush();

        let grace = self.config.grace_interval;
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(grace) => false,
            _ = self.interrupt.notified() => true,
        };
        if interrupted {
            self.core.abandon_exit_attempt();
            return self.core.exit_state();
        }

        self.drain_links();
        self.deliver();
        self.core.finish_exit_attempt()
    }

    async fn shutdown(&mut self) {
        self.flush();

        let mut leftovers = 0;
        for link in self.links.iter_mut() {
            let (messages, stats) = link.shutdown().await;
            debug!(
                link = %link.label(),
                sent = stats.sent,
                received = stats.received,
                errors = stats.send_errors + stats.recv_errors,
                "link closed"
            );
            leftovers += messages.len();
            for message in messages {
                self.core.receive(message);
            }
        }

        self.deliver();
        let unsent = self.core.take_outbox().len();
        if leftovers > 0 {
            debug!(pid = %self.core.pid(), leftovers, unsent, "processed messages drained at shutdown");
        }
        if self.core.queued() > 0 {
            warn!(
                pid = %self.core.pid(),
                queued = self.core.queued(),
                "updates still queued at shutdown will not be delivered"
            );
        }

        self.forward(Message::exit_signal(self.core.pid()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordcast_core::{MessageKind, ProcessId, Timestamp};
    use ordcast_net::{memory, MessageSink};
    use std::time::Duration;

    fn config(pid: i32) -> EngineConfig {
        EngineConfig::new(ProcessId::new(pid), 1).with_grace_interval(Duration::from_millis(100))
    }

    /// Collect deliveries up to and including the exit message.
    async fn collect(app: &mut AppHandle) -> Vec<Message> {
        let mut delivered = Vec::new();
        while let Some(message) = app.recv().await {
            if app.is_exit(&message) {
                return delivered;
            }
            delivered.push(message);
        }
        panic!("engine stopped without an exit message");
    }

    #[tokio::test]
    async fn test_single_process_delivers_own_updates() {
        let (engine, mut app) = OrderingEngine::new(config(0), Vec::new());
        let handle = engine.spawn();

        app.wait_ready().await.unwrap();
        for i in 0..3 {
            app.submit(Payload::new(vec![i, -i])).unwrap();
        }
        app.finish();

        let delivered = collect(&mut app).await;
        let values: Vec<_> = delivered
            .iter()
            .map(|m| m.payload().unwrap().values()[0])
            .collect();
        assert_eq!(values, vec![0, 1, 2]);

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.delivered, 3);
        assert_eq!(report.exit_attempts, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_two_processes_agree_on_order() {
        let (a, b) = memory::pair("P0", "P1");
        let (engine0, mut app0) = OrderingEngine::new(config(0), vec![PeerLink::spawn(a)]);
        let (engine1, mut app1) = OrderingEngine::new(config(1), vec![PeerLink::spawn(b)]);
        let handle0 = engine0.spawn();
        let handle1 = engine1.spawn();

        app0.wait_ready().await.unwrap();
        app1.wait_ready().await.unwrap();
        for i in 0..5 {
            app0.submit(Payload::new(vec![i, 0])).unwrap();
            app1.submit(Payload::new(vec![0, i])).unwrap();
        }
        app0.finish();
        app1.finish();

        let (seen0, seen1) = tokio::join!(collect(&mut app0), collect(&mut app1));
        let order0: Vec<_> = seen0.iter().map(|m| m.timestamp()).collect();
        let order1: Vec<_> = seen1.iter().map(|m| m.timestamp()).collect();

        assert_eq!(order0.len(), 10);
        assert_eq!(order0, order1);
        assert!(order0.windows(2).all(|w| w[0] < w[1]));
        assert!(seen0.iter().all(|m| m.kind() == MessageKind::Update));

        handle0.await.unwrap().unwrap();
        handle1.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_restarts_exit_attempt() {
        let (engine, mut app) = OrderingEngine::new(
            config(0).with_grace_interval(Duration::from_millis(300)),
            Vec::new(),
        );
        let handle = engine.spawn();

        app.wait_ready().await.unwrap();
        app.finish();
        tokio::time::sleep(Duration::from_millis(50)).await;
        app.interrupt();

        assert!(collect(&mut app).await.is_empty());
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.exit_attempts, 2);
    }

    #[tokio::test]
    async fn test_message_drained_at_shutdown_is_processed() {
        let (a, mut peer) = memory::pair("P0", "P1");
        let (mut engine, mut app) = OrderingEngine::new(config(0), vec![PeerLink::spawn(a)]);
        engine.await_links().await.unwrap();

        // The peer's last update is still sitting in the inbound queue when
        // the link is shut down.
        let stamp = Timestamp::new(3, ProcessId::new(1));
        let mut update = Message::update(ProcessId::new(1), Payload::new(vec![6, 6]));
        update.stamp(stamp);
        peer.send(&update).await.unwrap();
        peer.close().await.unwrap();
        while !engine.links[0].is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        engine.shutdown().await;

        let delivered = collect(&mut app).await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].timestamp(), stamp);
        assert_eq!(engine.core.report().received, 1);
        assert_eq!(engine.core.queued(), 0);
    }
}
