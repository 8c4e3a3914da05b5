//! Serializes events and publishes them through a transport.

use super::message::{expand, Destination};
use crate::error::NotificationError;
use crate::events::{CatalogEvent, EventSink};
use crate::metrics::{CatalogMetrics, PublishOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Delivers serialized messages to a destination.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn publish(
        &self,
        destination: Destination,
        key: &str,
        payload: &[u8],
    ) -> Result<(), NotificationError>;

    /// Flush and release the transport.
    async fn close(&self) {}
}

/// Event sink that turns each event into messages and publishes them.
///
/// Every attempt is metered. Failures are logged and dropped: there is no
/// retry and nothing reaches the caller of the mutation.
pub struct NotificationPublisher {
    transport: Arc<dyn NotificationTransport>,
    metrics: Arc<CatalogMetrics>,
    publish_timeout: Duration,
}

impl NotificationPublisher {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        metrics: Arc<CatalogMetrics>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            metrics,
            publish_timeout,
        }
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }

    async fn publish_one(
        &self,
        destination: Destination,
        key: &str,
        payload: &[u8],
    ) -> Result<(), NotificationError> {
        match tokio::time::timeout(
            self.publish_timeout,
            self.transport.publish(destination, key, payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Transport {
                destination: destination.to_string(),
                message: format!("timed out after {}ms", self.publish_timeout.as_millis()),
            }),
        }
    }
}

#[async_trait]
impl EventSink for NotificationPublisher {
    async fn handle(&self, event: CatalogEvent) {
        let event_type = event.event_type();
        let messages = match expand(&event) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(event_type = %event_type, name = %event.name(), error = %e, "Failed to build notification");
                self.metrics
                    .record_publish(event_type.as_str(), PublishOutcome::Serialization);
                self.metrics
                    .observe_publish_delay(event_type.as_str(), event.constructed().elapsed());
                return;
            }
        };

        for outbound in messages {
            let message_type = outbound.message_type().to_string();
            let outcome = match serde_json::to_vec(&outbound.message) {
                Err(e) => {
                    warn!(message_type = %message_type, name = %outbound.key(), error = %e, "Failed to serialize notification");
                    PublishOutcome::Serialization
                }
                Ok(body) => match self
                    .publish_one(outbound.destination, outbound.key(), &body)
                    .await
                {
                    Ok(()) => {
                        debug!(
                            message_type = %message_type,
                            destination = %outbound.destination,
                            name = %outbound.key(),
                            trace_id = %event.context().trace_id,
                            "Notification published"
                        );
                        PublishOutcome::Success
                    }
                    Err(e) => {
                        warn!(
                            message_type = %message_type,
                            destination = %outbound.destination,
                            name = %outbound.key(),
                            error = %e,
                            "Failed to publish notification"
                        );
                        PublishOutcome::Transport
                    }
                },
            };
            self.metrics.record_publish(&message_type, outcome);
            self.metrics
                .observe_publish_delay(&message_type, event.constructed().elapsed());
        }
    }
}
