//! Notification publishing.
//!
//! Events become JSON messages on two destinations: table events (tables,
//! databases and per-batch partition summaries) and partition events.

pub mod diff;
mod kafka;
mod message;
mod publisher;

pub use kafka::KafkaTransport;
pub use message::{
    expand, Destination, MessageContext, NotificationMessage, Outbound, PARTITIONS_UPDATED,
};
pub use publisher::{NotificationPublisher, NotificationTransport};

#[cfg(test)]
pub(crate) use publisher::tests::MemoryTransport;
