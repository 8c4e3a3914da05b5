//! Kafka transport on an rdkafka `FutureProducer`.

use super::message::Destination;
use super::publisher::NotificationTransport;
use crate::config::NotificationConfig;
use crate::error::NotificationError;
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{info, warn};

pub struct KafkaTransport {
    producer: FutureProducer,
    table_topic: String,
    partition_topic: String,
    send_timeout: Duration,
}

/// Base producer settings. Every publish is a single attempt: librdkafka
/// must not resend on its own, so idempotence is off and retries are zero.
pub(crate) fn producer_config(config: &NotificationConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", config.bootstrap_servers.join(","))
        .set("message.timeout.ms", config.publish_timeout_ms.to_string())
        .set("acks", "all")
        .set("enable.idempotence", "false")
        .set("retries", "0");
    client_config
}

impl KafkaTransport {
    pub fn new(config: &NotificationConfig) -> crate::Result<Self> {
        let mut client_config = producer_config(config);

        let security = &config.security;
        if let Some(ref protocol) = security.protocol {
            client_config.set("security.protocol", protocol);
        }
        if let Some(ref mechanism) = security.sasl_mechanism {
            client_config.set("sasl.mechanism", mechanism);
        }
        if let Some(ref username) = security.sasl_username {
            client_config.set("sasl.username", username);
        }
        if let Some(ref password) = security.sasl_password {
            client_config.set("sasl.password", password);
        }
        if let Some(ref path) = security.ssl_ca_location {
            client_config.set("ssl.ca.location", path.to_string_lossy().as_ref());
        }
        if let Some(ref path) = security.ssl_cert_location {
            client_config.set("ssl.certificate.location", path.to_string_lossy().as_ref());
        }
        if let Some(ref path) = security.ssl_key_location {
            client_config.set("ssl.key.location", path.to_string_lossy().as_ref());
        }

        let producer: FutureProducer = client_config.create().map_err(|e| {
            crate::Error::Config(format!(
                "Failed to create Kafka producer for {}: {}",
                config.bootstrap_servers.join(","),
                e
            ))
        })?;

        info!(
            servers = %config.bootstrap_servers.join(","),
            table_topic = %config.table_topic,
            partition_topic = %config.partition_topic,
            "Kafka notification producer created"
        );

        Ok(Self {
            producer,
            table_topic: config.table_topic.clone(),
            partition_topic: config.partition_topic.clone(),
            send_timeout: Duration::from_millis(config.publish_timeout_ms),
        })
    }

    pub fn topic(&self, destination: Destination) -> &str {
        match destination {
            Destination::TableEvents => &self.table_topic,
            Destination::PartitionEvents => &self.partition_topic,
        }
    }
}

#[async_trait]
impl NotificationTransport for KafkaTransport {
    async fn publish(
        &self,
        destination: Destination,
        key: &str,
        payload: &[u8],
    ) -> Result<(), NotificationError> {
        let topic = self.topic(destination);
        let record = FutureRecord::to(topic).key(key).payload(payload);
        self.producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| NotificationError::Transport {
                destination: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn close(&self) {
        // flush blocks the calling thread until the queue drains
        let producer = self.producer.clone();
        let timeout = self.send_timeout;
        match tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Kafka producer flush failed"),
            Err(e) => warn!(error = %e, "Kafka producer flush task failed"),
        }
        info!("Kafka notification producer closed");
    }
}
