//! Connector plugin registry and per-catalog connector instances.
//!
//! The [`ConnectorManager`] is built once at startup from configuration and
//! is read-only afterwards; lookups take no lock.

use super::{
    ConnectorContext, ConnectorDatabaseService, ConnectorFactory, ConnectorPartitionService,
    ConnectorPlugin, ConnectorTableService, ConnectorTypeConverter,
};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::metrics::CatalogMetrics;
use crate::{Error, Result};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry of connector plugins keyed by type tag.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn ConnectorPlugin>>,
}

impl PluginRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Create a registry with the built-in connector plugins.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.plugins.push(Arc::new(super::hive::HivePlugin));
        registry.plugins.push(Arc::new(super::rest::IcebergRestPlugin));
        registry.plugins.push(Arc::new(super::postgresql::PostgresPlugin));
        registry
    }

    /// Register a plugin. Two plugins may not share a type tag.
    pub fn register(&mut self, plugin: Arc<dyn ConnectorPlugin>) -> Result<()> {
        if self.get(plugin.connector_type()).is_some() {
            return Err(Error::ConfigurationConflict(format!(
                "A connector plugin of type '{}' is already registered",
                plugin.connector_type()
            )));
        }
        debug!(connector_type = %plugin.connector_type(), "Registered connector plugin");
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn get(&self, connector_type: &str) -> Option<Arc<dyn ConnectorPlugin>> {
        self.plugins
            .iter()
            .find(|p| p.connector_type() == connector_type)
            .cloned()
    }

    /// Registered type tags.
    pub fn supported_types(&self) -> Vec<String> {
        self.plugins
            .iter()
            .map(|p| p.connector_type().to_string())
            .collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Descriptive view of a registered catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogInfo {
    pub name: String,
    pub connector_name: String,
    pub connector_type: String,
    pub fast_path: bool,
    pub aux_port: Option<u16>,
}

/// The live connector behind one catalog name.
pub struct ConnectorInstance {
    info: CatalogInfo,
    type_converter: Arc<dyn ConnectorTypeConverter>,
    database_service: Arc<dyn ConnectorDatabaseService>,
    table_service: Arc<dyn ConnectorTableService>,
    partition_service: Arc<dyn ConnectorPartitionService>,
    factory: Box<dyn ConnectorFactory>,
    stopped: AtomicBool,
}

impl ConnectorInstance {
    fn new(
        info: CatalogInfo,
        type_converter: Arc<dyn ConnectorTypeConverter>,
        factory: Box<dyn ConnectorFactory>,
    ) -> Self {
        Self {
            info,
            type_converter,
            database_service: factory.database_service(),
            table_service: factory.table_service(),
            partition_service: factory.partition_service(),
            factory,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn catalog_name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &CatalogInfo {
        &self.info
    }

    pub fn type_converter(&self) -> &Arc<dyn ConnectorTypeConverter> {
        &self.type_converter
    }

    pub fn database_service(&self) -> &Arc<dyn ConnectorDatabaseService> {
        &self.database_service
    }

    pub fn table_service(&self) -> &Arc<dyn ConnectorTableService> {
        &self.table_service
    }

    pub fn partition_service(&self) -> &Arc<dyn ConnectorPartitionService> {
        &self.partition_service
    }

    pub fn fast_path_enabled(&self) -> bool {
        self.info.fast_path
    }

    pub async fn health_check(&self) -> CatalogResult<()> {
        self.factory.health_check().await
    }

    /// Stop the connector. Subsequent calls are no-ops.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.factory.stop().await;
        info!(catalog = %self.info.name, "Connector stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Process-wide registry from catalog name to connector instance.
pub struct ConnectorManager {
    plugins: PluginRegistry,
    metrics: Arc<CatalogMetrics>,
    catalogs: HashMap<String, Arc<ConnectorInstance>>,
}

impl ConnectorManager {
    pub fn new(plugins: PluginRegistry, metrics: Arc<CatalogMetrics>) -> Self {
        Self {
            plugins,
            metrics,
            catalogs: HashMap::new(),
        }
    }

    /// Build a manager with one connector per configured catalog.
    ///
    /// On failure the connectors created so far are stopped before the error
    /// is returned.
    pub async fn from_config(
        plugins: PluginRegistry,
        metrics: Arc<CatalogMetrics>,
        catalogs: &[CatalogConfig],
    ) -> Result<Self> {
        let mut manager = Self::new(plugins, metrics);
        for catalog in catalogs {
            if let Err(e) = manager.register(catalog).await {
                manager.shutdown().await;
                return Err(e);
            }
        }
        info!(catalogs = manager.catalogs.len(), "Connector manager initialized");
        Ok(manager)
    }

    /// Instantiate and register the connector for one catalog.
    pub async fn register(&mut self, config: &CatalogConfig) -> Result<()> {
        if self.catalogs.contains_key(&config.name) {
            return Err(Error::ConfigurationConflict(format!(
                "Catalog '{}' is already registered",
                config.name
            )));
        }
        let plugin = self
            .plugins
            .get(&config.connector_type)
            .ok_or_else(|| Error::UnknownPlugin {
                catalog: config.name.clone(),
                connector_type: config.connector_type.clone(),
            })?;

        let context = ConnectorContext {
            catalog_name: config.name.clone(),
            connector_name: config.connector_name().to_string(),
            connector_type: config.connector_type.clone(),
            properties: config.properties.clone(),
            metrics: Arc::clone(&self.metrics),
        };
        let factory = plugin.create(context).await?;

        let aux_port = match config.aux_interface_port {
            Some(port) if !plugin.supports_aux_interface() => {
                warn!(
                    catalog = %config.name,
                    connector_type = %config.connector_type,
                    port,
                    "Connector does not support an auxiliary interface, ignoring port"
                );
                None
            }
            other => other,
        };
        let info = CatalogInfo {
            name: config.name.clone(),
            connector_name: config.connector_name().to_string(),
            connector_type: config.connector_type.clone(),
            fast_path: factory.fast_path_enabled(),
            aux_port,
        };
        info!(
            catalog = %info.name,
            connector_type = %info.connector_type,
            fast_path = info.fast_path,
            "Registered catalog"
        );
        let instance = ConnectorInstance::new(info, plugin.type_converter(), factory);
        self.catalogs
            .insert(config.name.clone(), Arc::new(instance));
        Ok(())
    }

    /// Resolve a catalog name.
    pub fn get(&self, catalog: &str) -> CatalogResult<Arc<ConnectorInstance>> {
        self.catalogs
            .get(catalog)
            .cloned()
            .ok_or_else(|| CatalogError::CatalogNotFound {
                catalog: catalog.to_string(),
            })
    }

    /// Registered catalog names, sorted.
    pub fn catalog_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.catalogs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn catalog(&self, name: &str) -> Option<CatalogInfo> {
        self.catalogs.get(name).map(|i| i.info().clone())
    }

    /// Catalog descriptions sorted by name.
    pub fn catalogs(&self) -> Vec<CatalogInfo> {
        self.catalog_names()
            .iter()
            .filter_map(|n| self.catalog(n))
            .collect()
    }

    /// `(catalog, port)` for every catalog that asked for an auxiliary interface.
    pub fn catalogs_needing_aux_interface(&self) -> Vec<(String, u16)> {
        let mut result: Vec<(String, u16)> = self
            .catalogs
            .values()
            .filter_map(|i| i.info().aux_port.map(|p| (i.catalog_name().to_string(), p)))
            .collect();
        result.sort();
        result
    }

    pub fn metrics(&self) -> &Arc<CatalogMetrics> {
        &self.metrics
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Check every catalog's backend concurrently, results sorted by catalog name.
    pub async fn health_check(&self) -> Vec<(String, CatalogResult<()>)> {
        let checks = self.catalog_names().into_iter().filter_map(|name| {
            let instance = self.catalogs.get(&name).cloned()?;
            Some(async move {
                let result = instance.health_check().await;
                (name, result)
            })
        });
        join_all(checks).await
    }

    /// Stop every connector instance exactly once.
    pub async fn shutdown(&self) {
        for name in self.catalog_names() {
            if let Some(instance) = self.catalogs.get(&name) {
                instance.stop().await;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::CanonicalType;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct NoopServices;

    #[async_trait]
    impl ConnectorDatabaseService for NoopServices {}
    #[async_trait]
    impl ConnectorTableService for NoopServices {}
    #[async_trait]
    impl ConnectorPartitionService for NoopServices {}

    struct PassThrough;

    impl ConnectorTypeConverter for PassThrough {
        fn to_canonical(&self, native: &str) -> CanonicalType {
            CanonicalType::parse(native)
        }
        fn from_canonical(&self, canonical: &CanonicalType) -> CatalogResult<String> {
            Ok(canonical.to_string())
        }
    }

    struct TestFactory {
        stops: Arc<AtomicUsize>,
        health_delay: std::time::Duration,
    }

    #[async_trait]
    impl ConnectorFactory for TestFactory {
        fn database_service(&self) -> Arc<dyn ConnectorDatabaseService> {
            Arc::new(NoopServices)
        }
        fn table_service(&self) -> Arc<dyn ConnectorTableService> {
            Arc::new(NoopServices)
        }
        fn partition_service(&self) -> Arc<dyn ConnectorPartitionService> {
            Arc::new(NoopServices)
        }
        async fn health_check(&self) -> CatalogResult<()> {
            tokio::time::sleep(self.health_delay).await;
            Ok(())
        }
        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestPlugin {
        tag: &'static str,
        stops: Arc<AtomicUsize>,
        aux: bool,
    }

    #[async_trait]
    impl ConnectorPlugin for TestPlugin {
        fn connector_type(&self) -> &str {
            self.tag
        }
        async fn create(&self, context: ConnectorContext) -> Result<Box<dyn ConnectorFactory>> {
            if context.property("fail").is_some() {
                return Err(Error::Config("requested failure".into()));
            }
            Ok(Box::new(TestFactory {
                stops: Arc::clone(&self.stops),
                health_delay: std::time::Duration::from_millis(context.u64_property("health-delay-ms", 0)?),
            }))
        }
        fn type_converter(&self) -> Arc<dyn ConnectorTypeConverter> {
            Arc::new(PassThrough)
        }
        fn supports_aux_interface(&self) -> bool {
            self.aux
        }
    }

    fn registry(stops: &Arc<AtomicUsize>) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(TestPlugin {
                tag: "memory",
                stops: Arc::clone(stops),
                aux: true,
            }))
            .unwrap();
        registry
            .register(Arc::new(TestPlugin {
                tag: "no-aux",
                stops: Arc::clone(stops),
                aux: false,
            }))
            .unwrap();
        registry
    }

    /// Registry with a single `memory` plugin whose services are all unsupported.
    pub(crate) fn test_registry() -> PluginRegistry {
        registry(&Arc::new(AtomicUsize::new(0)))
    }

    fn metrics() -> Arc<CatalogMetrics> {
        Arc::new(CatalogMetrics::new().unwrap())
    }

    #[test]
    fn test_registry_rejects_duplicate_type() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut registry = registry(&stops);
        let err = registry
            .register(Arc::new(TestPlugin {
                tag: "memory",
                stops,
                aux: true,
            }))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigurationConflict(_)));
    }

    #[test]
    fn test_default_registry_types() {
        let types = PluginRegistry::with_defaults().supported_types();
        assert_eq!(
            types,
            vec![
                "hive".to_string(),
                "iceberg-rest".to_string(),
                "postgresql".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_plugin_is_fatal() {
        let stops = Arc::new(AtomicUsize::new(0));
        let result = ConnectorManager::from_config(
            registry(&stops),
            metrics(),
            &[CatalogConfig::new("x", "oracle")],
        )
        .await;
        assert!(matches!(result, Err(Error::UnknownPlugin { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_catalog_conflicts() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut manager = ConnectorManager::new(registry(&stops), metrics());
        manager.register(&CatalogConfig::new("a", "memory")).await.unwrap();
        let err = manager
            .register(&CatalogConfig::new("a", "memory"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigurationConflict(_)));
    }

    #[tokio::test]
    async fn test_lookup_and_aux_ports() {
        let stops = Arc::new(AtomicUsize::new(0));
        let manager = ConnectorManager::from_config(
            registry(&stops),
            metrics(),
            &[
                CatalogConfig::new("zeta", "memory").with_aux_port(12002),
                CatalogConfig::new("alpha", "memory").with_aux_port(12001),
                CatalogConfig::new("beta", "memory"),
                CatalogConfig::new("gamma", "no-aux").with_aux_port(12003),
            ],
        )
        .await
        .unwrap();

        assert_eq!(manager.catalog_names(), vec!["alpha", "beta", "gamma", "zeta"]);
        assert_eq!(manager.get("beta").unwrap().catalog_name(), "beta");
        assert!(matches!(
            manager.get("missing"),
            Err(CatalogError::CatalogNotFound { .. })
        ));
        assert_eq!(
            manager.catalogs_needing_aux_interface(),
            vec![("alpha".to_string(), 12001), ("zeta".to_string(), 12002)]
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_each_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let manager = ConnectorManager::from_config(
            registry(&stops),
            metrics(),
            &[CatalogConfig::new("a", "memory"), CatalogConfig::new("b", "memory")],
        )
        .await
        .unwrap();
        manager.shutdown().await;
        manager.shutdown().await;
        assert_eq!(stops.load(Ordering::SeqCst), 2);
        assert!(manager.get("a").unwrap().is_stopped());
    }

    #[tokio::test]
    async fn test_failed_startup_stops_created_connectors() {
        let stops = Arc::new(AtomicUsize::new(0));
        let result = ConnectorManager::from_config(
            registry(&stops),
            metrics(),
            &[
                CatalogConfig::new("a", "memory"),
                CatalogConfig::new("b", "memory").with_property("fail", "yes"),
            ],
        )
        .await;
        assert!(result.is_err());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_health_checks_run_concurrently() {
        let stops = Arc::new(AtomicUsize::new(0));
        let manager = ConnectorManager::from_config(
            registry(&stops),
            metrics(),
            &[
                CatalogConfig::new("slow-b", "memory").with_property("health-delay-ms", "300"),
                CatalogConfig::new("slow-a", "memory").with_property("health-delay-ms", "300"),
                CatalogConfig::new("slow-c", "memory").with_property("health-delay-ms", "300"),
            ],
        )
        .await
        .unwrap();

        let started = std::time::Instant::now();
        let results = manager.health_check().await;
        assert!(started.elapsed() < std::time::Duration::from_millis(800));
        let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["slow-a", "slow-b", "slow-c"]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }
}
