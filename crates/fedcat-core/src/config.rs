//! Configuration structures for fedcat.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// One entry per federated catalog
    #[serde(default)]
    pub catalogs: Vec<CatalogConfig>,

    /// Notification pipeline configuration
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// A single catalog registration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Catalog name, the first segment of every qualified name it serves
    pub name: String,

    /// Connector plugin type tag (e.g. `hive`, `iceberg-rest`)
    #[serde(rename = "type")]
    pub connector_type: String,

    /// Connector name used in logs and metrics; defaults to the catalog name
    #[serde(default)]
    pub connector_name: Option<String>,

    /// Connector-specific properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Port for the auxiliary RPC interface, if one is wanted
    #[serde(default)]
    pub aux_interface_port: Option<u16>,
}

impl CatalogConfig {
    /// Create a registration with no properties.
    pub fn new(name: impl Into<String>, connector_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connector_type: connector_type.into(),
            connector_name: None,
            properties: BTreeMap::new(),
            aux_interface_port: None,
        }
    }

    /// Add a connector property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Request an auxiliary interface on `port`.
    pub fn with_aux_port(mut self, port: u16) -> Self {
        self.aux_interface_port = Some(port);
        self
    }

    /// Effective connector name.
    pub fn connector_name(&self) -> &str {
        self.connector_name.as_deref().unwrap_or(&self.name)
    }
}

/// Notification pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Publish events at all
    #[serde(default)]
    pub enabled: bool,

    /// Kafka bootstrap servers
    #[serde(default)]
    pub bootstrap_servers: Vec<String>,

    /// Topic for table and database events
    #[serde(default = "default_table_topic")]
    pub table_topic: String,

    /// Topic for per-partition events
    #[serde(default = "default_partition_topic")]
    pub partition_topic: String,

    /// Number of bus worker tasks
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Bounded event queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Per-message publish timeout in milliseconds
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    /// Security configuration
    #[serde(default)]
    pub security: KafkaSecurityConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bootstrap_servers: Vec::new(),
            table_topic: default_table_topic(),
            partition_topic: default_partition_topic(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            publish_timeout_ms: default_publish_timeout_ms(),
            security: KafkaSecurityConfig::default(),
        }
    }
}

/// Kafka security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KafkaSecurityConfig {
    /// Security protocol (PLAINTEXT, SSL, SASL_SSL, SASL_PLAINTEXT)
    pub protocol: Option<String>,

    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    pub sasl_mechanism: Option<String>,

    /// SASL username
    pub sasl_username: Option<String>,

    /// SASL password
    pub sasl_password: Option<String>,

    /// SSL CA certificate location
    pub ssl_ca_location: Option<PathBuf>,

    /// SSL client certificate location
    pub ssl_cert_location: Option<PathBuf>,

    /// SSL client key location
    pub ssl_key_location: Option<PathBuf>,
}

/// Monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Metrics HTTP port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Health check HTTP port
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            health_port: default_health_port(),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_table_topic() -> String {
    "fedcat_table_events".into()
}
fn default_partition_topic() -> String {
    "fedcat_partition_events".into()
}
fn default_worker_count() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    10_000
}
fn default_publish_timeout_ms() -> u64 {
    5_000
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_health_port() -> u16 {
    8080
}

impl Config {
    /// Parse configuration from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.catalogs.is_empty() {
            return Err(crate::Error::Config(
                "At least one catalog is required".into(),
            ));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for catalog in &self.catalogs {
            if catalog.name.is_empty() {
                return Err(crate::Error::Config("Catalog name is required".into()));
            }
            if catalog.name.contains('/') {
                return Err(crate::Error::Config(format!(
                    "Catalog name '{}' must not contain '/'",
                    catalog.name
                )));
            }
            if catalog.connector_type.is_empty() {
                return Err(crate::Error::Config(format!(
                    "Catalog '{}' has no connector type",
                    catalog.name
                )));
            }
            if !names.insert(catalog.name.as_str()) {
                return Err(crate::Error::Config(format!(
                    "Catalog '{}' is configured more than once",
                    catalog.name
                )));
            }
            if let Some(port) = catalog.aux_interface_port {
                if port == 0 {
                    return Err(crate::Error::Config(format!(
                        "Catalog '{}' has an auxiliary interface port of 0",
                        catalog.name
                    )));
                }
                if !ports.insert(port) {
                    return Err(crate::Error::Config(format!(
                        "Auxiliary interface port {} is used by more than one catalog",
                        port
                    )));
                }
            }
        }

        let n = &self.notifications;
        if n.enabled {
            if n.bootstrap_servers.is_empty() {
                return Err(crate::Error::Config(
                    "At least one bootstrap server required when notifications are enabled".into(),
                ));
            }
            if n.table_topic.is_empty() || n.partition_topic.is_empty() {
                return Err(crate::Error::Config(
                    "Notification topics must not be empty".into(),
                ));
            }
        }
        if n.worker_count == 0 {
            return Err(crate::Error::Config(
                "notifications.worker_count must be positive".into(),
            ));
        }
        if n.queue_capacity == 0 {
            return Err(crate::Error::Config(
                "notifications.queue_capacity must be positive".into(),
            ));
        }

        if self.monitoring.metrics_port == self.monitoring.health_port {
            tracing::warn!(
                port = self.monitoring.metrics_port,
                "Metrics and health share a port; /metrics is served by the health server"
            );
        }

        Ok(())
    }
}
