//! Prometheus metrics export.

use ::prometheus::{
    Encoder, HistogramOpts, HistogramTimer, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Histogram buckets in seconds for notification publish delay.
const PUBLISH_DELAY_BUCKETS: [f64; 9] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];

/// Histogram buckets in seconds for backend requests.
const REQUEST_BUCKETS: [f64; 10] = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];

/// Which implementation served a connector request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Backend client library (Thrift, REST)
    Client,
    /// Direct SQL against the metastore database
    Fast,
}

impl Strategy {
    pub fn as_label(&self) -> &'static str {
        match self {
            Strategy::Client => "client",
            Strategy::Fast => "fast",
        }
    }
}

/// Outcome of one notification publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishOutcome {
    Success,
    /// The event bus refused the event (queue full or closed)
    Rejected,
    /// The event could not be serialized
    Serialization,
    /// The transport failed or timed out
    Transport,
}

impl PublishOutcome {
    fn labels(&self) -> (&'static str, &'static str) {
        match self {
            PublishOutcome::Success => ("success", "none"),
            PublishOutcome::Rejected => ("failure", "rejected"),
            PublishOutcome::Serialization => ("failure", "serialization"),
            PublishOutcome::Transport => ("failure", "transport"),
        }
    }
}

/// Process-wide metrics backed by a Prometheus registry.
///
/// Shared by every connector through the plugin context and by the
/// notification publisher.
pub struct CatalogMetrics {
    registry: Registry,
    notification_count: IntCounterVec,
    publish_delay: HistogramVec,
    connector_requests: HistogramVec,
    connector_errors: IntCounterVec,
}

impl CatalogMetrics {
    /// Create metrics registered in a fresh registry.
    pub fn new() -> crate::Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics registered in `registry`.
    pub fn with_registry(registry: Registry) -> crate::Result<Self> {
        let notification_count = IntCounterVec::new(
            Opts::new(
                "fedcat_notification_count",
                "Notification publish attempts by message type and outcome",
            ),
            &["type", "outcome", "reason"],
        )?;
        let publish_delay = HistogramVec::new(
            HistogramOpts::new(
                "fedcat_notification_publish_delay_seconds",
                "Time from event construction to publish completion",
            )
            .buckets(PUBLISH_DELAY_BUCKETS.to_vec()),
            &["type"],
        )?;
        let connector_requests = HistogramVec::new(
            HistogramOpts::new(
                "fedcat_connector_request_seconds",
                "Backend request latency per catalog, request and strategy",
            )
            .buckets(REQUEST_BUCKETS.to_vec()),
            &["catalog", "request", "strategy"],
        )?;
        let connector_errors = IntCounterVec::new(
            Opts::new(
                "fedcat_connector_errors_total",
                "Failed dispatched requests per catalog and error kind",
            ),
            &["catalog", "request", "kind"],
        )?;

        registry.register(Box::new(notification_count.clone()))?;
        registry.register(Box::new(publish_delay.clone()))?;
        registry.register(Box::new(connector_requests.clone()))?;
        registry.register(Box::new(connector_errors.clone()))?;

        Ok(Self {
            registry,
            notification_count,
            publish_delay,
            connector_requests,
            connector_errors,
        })
    }

    /// Count one publish attempt for a message type.
    pub fn record_publish(&self, message_type: &str, outcome: PublishOutcome) {
        let (outcome, reason) = outcome.labels();
        self.notification_count
            .with_label_values(&[message_type, outcome, reason])
            .inc();
    }

    /// Observe the delay between event construction and publish completion.
    pub fn observe_publish_delay(&self, message_type: &str, delay: Duration) {
        self.publish_delay
            .with_label_values(&[message_type])
            .observe(delay.as_secs_f64());
    }

    /// Start a backend request timer; the sample is recorded on drop.
    pub fn start_request(&self, catalog: &str, request: &str, strategy: Strategy) -> HistogramTimer {
        self.connector_requests
            .with_label_values(&[catalog, request, strategy.as_label()])
            .start_timer()
    }

    pub fn record_request_error(&self, catalog: &str, request: &str, kind: &str) {
        self.connector_errors
            .with_label_values(&[catalog, request, kind])
            .inc();
    }

    // === ACCESSORS ===

    pub fn notification_count(&self, message_type: &str, outcome: PublishOutcome) -> u64 {
        let (outcome, reason) = outcome.labels();
        self.notification_count
            .with_label_values(&[message_type, outcome, reason])
            .get()
    }

    /// Sum of failed publish attempts across message types and reasons.
    pub fn notification_failures(&self) -> u64 {
        use ::prometheus::core::Collector;
        self.notification_count
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .filter(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == "outcome" && l.get_value() == "failure")
            })
            .map(|m| m.get_counter().get_value() as u64)
            .sum()
    }

    pub fn request_count(&self, catalog: &str, request: &str, strategy: Strategy) -> u64 {
        self.connector_requests
            .with_label_values(&[catalog, request, strategy.as_label()])
            .get_sample_count()
    }

    pub fn publish_delay_count(&self, message_type: &str) -> u64 {
        self.publish_delay
            .with_label_values(&[message_type])
            .get_sample_count()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Export all registered metrics in Prometheus text format.
    pub fn export_prometheus_text(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_counters() {
        let metrics = CatalogMetrics::new().unwrap();
        metrics.record_publish("table.create", PublishOutcome::Success);
        metrics.record_publish("table.create", PublishOutcome::Success);
        metrics.record_publish("partition.add", PublishOutcome::Transport);
        metrics.record_publish("table.delete", PublishOutcome::Rejected);

        assert_eq!(
            metrics.notification_count("table.create", PublishOutcome::Success),
            2
        );
        assert_eq!(
            metrics.notification_count("partition.add", PublishOutcome::Transport),
            1
        );
        assert_eq!(metrics.notification_failures(), 2);
    }

    #[test]
    fn test_request_timer_records_on_drop() {
        let metrics = CatalogMetrics::new().unwrap();
        {
            let _timer = metrics.start_request("prodhive", "table.exists", Strategy::Fast);
        }
        assert_eq!(
            metrics.request_count("prodhive", "table.exists", Strategy::Fast),
            1
        );
        assert_eq!(
            metrics.request_count("prodhive", "table.exists", Strategy::Client),
            0
        );
    }

    #[test]
    fn test_export_text() {
        let metrics = CatalogMetrics::new().unwrap();
        metrics.record_publish("table.update", PublishOutcome::Success);
        metrics.observe_publish_delay("table.update", Duration::from_millis(12));
        metrics.record_request_error("lake", "table.get", "entity_not_found");

        let text = metrics.export_prometheus_text();
        assert!(text.contains("# TYPE fedcat_notification_count counter"));
        assert!(text.contains(
            "fedcat_notification_count{outcome=\"success\",reason=\"none\",type=\"table.update\"} 1"
        ));
        assert!(text.contains("fedcat_notification_publish_delay_seconds_count{type=\"table.update\"} 1"));
        assert!(text.contains("fedcat_connector_errors_total"));
    }

    #[test]
    fn test_shared_registry_rejects_double_registration() {
        let registry = Registry::new();
        let _first = CatalogMetrics::with_registry(registry.clone()).unwrap();
        assert!(CatalogMetrics::with_registry(registry).is_err());
    }
}
