//! Event bus: hands events from mutating calls to background workers.
//!
//! Emission never blocks. The queue is bounded; an event that does not fit,
//! or arrives after shutdown, is dropped and counted as a rejected publish.

use super::model::CatalogEvent;
use crate::metrics::{CatalogMetrics, PublishOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives events after a successful mutation. Must not block.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: CatalogEvent);
}

/// Consumes events on a bus worker.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn handle(&self, event: CatalogEvent);
}

/// Emitter used when notifications are disabled.
#[derive(Debug, Default)]
pub struct DiscardEmitter;

impl EventEmitter for DiscardEmitter {
    fn emit(&self, event: CatalogEvent) {
        debug!(event_type = %event.event_type(), name = %event.name(), "Notifications disabled, event dropped");
    }
}

/// Bounded queue drained by a fixed set of worker tasks.
pub struct EventBus {
    sender: Mutex<Option<mpsc::Sender<CatalogEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<CatalogMetrics>,
}

impl EventBus {
    /// Start `worker_count` workers feeding `sink`. Must be called inside a tokio runtime.
    pub fn start(
        sink: Arc<dyn EventSink>,
        worker_count: usize,
        capacity: usize,
        metrics: Arc<CatalogMetrics>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..worker_count.max(1))
            .map(|id| {
                let rx = rx.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        match next {
                            Some(event) => sink.handle(event).await,
                            None => break,
                        }
                    }
                    debug!(worker = id, "Event bus worker stopped");
                })
            })
            .collect();

        info!(workers = worker_count, capacity, "Event bus started");
        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            metrics,
        }
    }

    /// Events waiting for a worker.
    pub fn queued(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    /// Stop accepting events and wait for queued ones to drain.
    pub async fn shutdown(&self, timeout: Duration) {
        drop(self.sender.lock().take());
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }

        let drained = tokio::time::timeout(timeout, futures::future::join_all(workers)).await;
        match drained {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!(error = %e, "Event bus worker failed");
                    }
                }
                info!("Event bus drained");
            }
            Err(_) => warn!(timeout_ms = timeout.as_millis() as u64, "Event bus drain timed out"),
        }
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, event: CatalogEvent) {
        let sender = self.sender.lock().clone();
        let (reason, event) = match sender {
            Some(tx) => match tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(event)) => ("Event queue full", event),
                Err(TrySendError::Closed(event)) => ("Event bus closed", event),
            },
            None => ("Event bus shut down", event),
        };
        let event_type = event.event_type();
        warn!(event_type = %event_type, name = %event.name(), "{}, event dropped", reason);
        self.metrics
            .record_publish(event_type.as_str(), PublishOutcome::Rejected);
    }
}
