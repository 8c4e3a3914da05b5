//! Metrics for connectors and the notification pipeline.

mod prometheus;

pub use self::prometheus::{CatalogMetrics, PublishOutcome, Strategy};
