//! The application's side of the engine.

use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use ordcast_core::{Message, MessageKind, Payload, ProcessId};

use crate::error::{EngineError, Result};

/// Handle through which an application submits updates and receives
/// deliveries.
///
/// Deliveries arrive in the cluster-wide total order. The first message is
/// always a readiness sentinel and the last one is an exit message carrying
/// this process's id.
pub struct AppHandle {
    pid: ProcessId,
    to_engine: Option<mpsc::UnboundedSender<Payload>>,
    from_engine: mpsc::UnboundedReceiver<Message>,
    interrupt: Arc<Notify>,
}

impl AppHandle {
    pub(crate) fn new(
        pid: ProcessId,
        to_engine: mpsc::UnboundedSender<Payload>,
        from_engine: mpsc::UnboundedReceiver<Message>,
        interrupt: Arc<Notify>,
    ) -> Self {
        Self {
            pid,
            to_engine: Some(to_engine),
            from_engine,
            interrupt,
        }
    }

    /// This process's id.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Submit an update carrying `payload`.
    ///
    /// The engine builds the update with this process as its sender and
    /// stamps it on the way out.
    pub fn submit(&self, payload: Payload) -> Result<()> {
        match &self.to_engine {
            Some(sender) => sender
                .send(payload)
                .map_err(|_| EngineError::AppDisconnected),
            None => Err(EngineError::AppDisconnected),
        }
    }

    /// Signal that no further updates will be submitted.
    ///
    /// The engine then starts negotiating exit with its peers. Deliveries
    /// keep arriving until the exit message.
    pub fn finish(&mut self) {
        self.to_engine = None;
    }

    /// Whether [`finish`](Self::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.to_engine.is_none()
    }

    /// Wake the engine out of an exit grace wait. The attempt is abandoned
    /// and retried. If no wait is in progress, the next one is cut short.
    pub fn interrupt(&self) {
        self.interrupt.notify_one();
    }

    /// Take the next delivery without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.from_engine.try_recv().ok()
    }

    /// Wait for the next delivery.
    ///
    /// Returns `None` once the engine has stopped and every delivery has been
    /// taken.
    pub async fn recv(&mut self) -> Option<Message> {
        self.from_engine.recv().await
    }

    /// Wait for the engine's readiness sentinel.
    pub async fn wait_ready(&mut self) -> Result<()> {
        match self.from_engine.recv().await {
            Some(message) if message.is_ready_sentinel() => Ok(()),
            Some(_) | None => Err(EngineError::AppDisconnected),
        }
    }

    /// Whether `message` is the final exit message for this process.
    pub fn is_exit(&self, message: &Message) -> bool {
        message.kind() == MessageKind::Exit && message.sender() == self.pid
    }
}
