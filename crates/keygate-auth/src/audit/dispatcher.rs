use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::{AuditEvent, AuditSink};

/// Fire-and-forget front end for an [`AuditSink`].
///
/// Owns a bounded channel drained by one worker task. [`AuditDispatcher::record`]
/// is synchronous and never waits: when the queue is full or the worker has
/// stopped, the event is logged and dropped.
#[derive(Debug, Clone)]
pub struct AuditDispatcher {
    sender: mpsc::Sender<AuditEvent>,
}

impl AuditDispatcher {
    /// Starts the worker task. Must be called within a Tokio runtime.
    #[must_use]
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<AuditEvent>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let action = event.action;
                if let Err(e) = sink.record(event).await {
                    tracing::error!(error = %e, action = action.code(), "Failed to record audit event");
                }
            }
            tracing::debug!("Audit worker stopped");
        });
        (Self { sender }, worker)
    }

    /// Queues an event without waiting.
    pub fn record(&self, event: AuditEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(action = event.action.code(), "Audit queue full, event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                tracing::error!(action = event.action.code(), "Audit worker gone, event dropped");
            }
        }
    }
}
