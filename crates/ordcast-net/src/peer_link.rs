//! Per-peer connection worker.
//!
//! A [`PeerLink`] owns one [`Transport`] inside a spawned task and exposes two
//! single-producer/single-consumer queues to the engine:
//!
//! - **outbound**: written only by the engine, drained by the worker onto the
//!   stream in program order.
//! - **inbound**: written only by the worker, drained by the engine.
//!
//! The worker drives the read and write halves of the stream concurrently.
//!
//! The first inbound item is always a readiness sentinel produced locally by
//! the worker once the stream is usable.
//!
//! ## Shutdown
//!
//! Shutdown is two-phase. [`PeerLink::shutdown`] signals the worker, which
//! flushes every queued outbound message and closes the transport. The engine
//! then drains the inbound queue to its end before joining the worker, so a
//! message that was received but not yet consumed is never dropped.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ordcast_core::Message;

use crate::error::{NetError, Result};
use crate::transport::{MessageSink, MessageSource, Transport};

/// Counters reported by a worker when it terminates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// Messages written to the stream.
    pub sent: u64,
    /// Messages read from the stream.
    pub received: u64,
    /// Failed writes.
    pub send_errors: u64,
    /// Failed or undecodable reads.
    pub recv_errors: u64,
    /// Whether the remote end closed the stream first.
    pub remote_closed: bool,
}

/// Handle to a running link worker.
pub struct PeerLink {
    label: String,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<Message>,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<LinkStats>>,
}

impl PeerLink {
    /// Start a worker for `transport`.
    pub fn spawn<T: Transport>(transport: T) -> Self {
        let label = transport.peer_label();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = tokio::spawn(run_worker(
            transport,
            outbound_rx,
            inbound_tx,
            shutdown_rx,
            label.clone(),
        ));

        Self {
            label,
            outbound: outbound_tx,
            inbound: inbound_rx,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        }
    }

    /// Name of the remote end.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Queue a message for sending.
    ///
    /// Fails with [`NetError::LinkClosed`] once the worker has terminated.
    pub fn send(&self, message: Message) -> Result<()> {
        self.outbound.send(message).map_err(|_| NetError::LinkClosed)
    }

    /// Take the next received message without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.inbound.try_recv().ok()
    }

    /// Wait for the next received message.
    ///
    /// Returns `None` once the worker has terminated and the queue is empty.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    /// Whether the worker has terminated.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Two-phase shutdown: signal, drain, join.
    ///
    /// Returns every message still in the inbound queue, in arrival order, for
    /// the caller to process, along with the worker's counters.
    pub async fn shutdown(&mut self) -> (Vec<Message>, LinkStats) {
        if let Some(signal) = self.shutdown.take() {
            // The worker may already be gone after end of stream.
            let _ = signal.send(());
        }

        let mut leftovers = Vec::new();
        while let Some(message) = self.inbound.recv().await {
            leftovers.push(message);
        }

        let stats = match self.worker.take() {
            Some(worker) => match worker.await {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(link = %self.label, "link worker panicked: {}", e);
                    LinkStats::default()
                }
            },
            None => LinkStats::default(),
        };

        debug!(
            link = %self.label,
            leftovers = leftovers.len(),
            sent = stats.sent,
            received = stats.received,
            "link shut down"
        );
        (leftovers, stats)
    }
}

async fn run_worker<T: Transport>(
    transport: T,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    inbound: mpsc::UnboundedSender<Message>,
    mut shutdown: oneshot::Receiver<()>,
    label: String,
) -> LinkStats {
    info!(link = %label, "starting link worker");
    if inbound.send(Message::ready()).is_err() {
        return LinkStats::default();
    }

    let (mut reader, mut writer) = transport.split();
    let mut read_stats = LinkStats::default();
    let mut write_stats = LinkStats::default();

    // Both halves run concurrently so a write blocked on a full stream never
    // stops this end from draining the peer's traffic.
    tokio::select! {
        () = read_loop(&mut reader, &inbound, &mut read_stats, &label) => {}
        () = write_loop(&mut writer, &mut outbound, &mut shutdown, &mut write_stats, &label) => {}
    }

    LinkStats {
        sent: write_stats.sent,
        send_errors: write_stats.send_errors,
        ..read_stats
    }
}

/// Forward received messages until end of stream.
async fn read_loop<R: MessageSource>(
    reader: &mut R,
    inbound: &mpsc::UnboundedSender<Message>,
    stats: &mut LinkStats,
    label: &str,
) {
    loop {
        match reader.recv().await {
            Some(Ok(message)) => {
                stats.received += 1;
                if inbound.send(message).is_err() {
                    debug!(link = %label, "engine dropped inbound queue");
                }
            }
            Some(Err(e)) => {
                stats.recv_errors += 1;
                warn!(link = %label, "error reading from stream: {}", e);
            }
            None => {
                info!(link = %label, "remote closed the stream");
                stats.remote_closed = true;
                return;
            }
        }
    }
}

/// Write queued messages in order until shutdown, then flush and close.
async fn write_loop<W: MessageSink>(
    writer: &mut W,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    shutdown: &mut oneshot::Receiver<()>,
    stats: &mut LinkStats,
    label: &str,
) {
    loop {
        tokio::select! {
            biased;

            _ = &mut *shutdown => break,

            Some(message) = outbound.recv() => {
                write_one(writer, &message, stats, label).await;
            }
        }
    }

    while let Ok(message) = outbound.try_recv() {
        write_one(writer, &message, stats, label).await;
    }
    if let Err(e) = writer.close().await {
        warn!(link = %label, "error closing stream: {}", e);
    }
}

async fn write_one<W: MessageSink>(
    writer: &mut W,
    message: &Message,
    stats: &mut LinkStats,
    label: &str,
) {
    if message.acks() != 0 {
        warn!(
            link = %label,
            ts = %message.timestamp(),
            acks = message.acks(),
            "outbound message carries a non-zero ack count"
        );
    }
    match writer.send(message).await {
        Ok(()) => stats.sent += 1,
        Err(e) => {
            stats.send_errors += 1;
            warn!(link = %label, kind = %message.kind().tag(), "error sending message: {}", e);
        }
    }
}
