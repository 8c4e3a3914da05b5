//! Hive metastore connector.
//!
//! Catalog properties:
//!
//! | key | default |
//! |-----|---------|
//! | `hive.metastore.uris` | required, `thrift://host:port` |
//! | `hive.allow-rename-table` | `false` |
//! | `hive.request-timeout-seconds` | `30` |
//! | `hive.fast-path.enabled` | `false` |
//! | `hive.fast-path.datasource.url` | required with the fast path |
//! | `hive.fast-path.datasource.max-connections` | `5` |
//!
//! With the fast path enabled, table `exists` and `get_table_names` query
//! the metastore database directly (see [`fast`]).

pub mod client;
pub mod converter;
pub mod datasource;
pub mod fast;
pub mod service;
pub mod thrift;

pub use client::{MetastoreClient, MetastoreError};
pub use converter::HiveTypeConverter;
pub use datasource::MetastoreDataSource;
pub use fast::HiveFastTableService;
pub use service::{HiveContext, HiveDatabaseService, HivePartitionService, HiveTableService};
pub use thrift::ThriftMetastoreClient;

use crate::connector::{
    ConnectorContext, ConnectorDatabaseService, ConnectorFactory, ConnectorPartitionService,
    ConnectorPlugin, ConnectorTableService, ConnectorTypeConverter,
};
use crate::error::{CatalogError, CatalogResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const CONNECTOR_TYPE: &str = "hive";

pub const METASTORE_URIS: &str = "hive.metastore.uris";
pub const ALLOW_RENAME_TABLE: &str = "hive.allow-rename-table";
pub const REQUEST_TIMEOUT_SECONDS: &str = "hive.request-timeout-seconds";
pub const FAST_PATH_ENABLED: &str = "hive.fast-path.enabled";
pub const FAST_PATH_DATASOURCE_URL: &str = "hive.fast-path.datasource.url";
pub const FAST_PATH_MAX_CONNECTIONS: &str = "hive.fast-path.datasource.max-connections";

/// Plugin for `type = "hive"` catalogs.
#[derive(Debug, Default)]
pub struct HivePlugin;

#[async_trait]
impl ConnectorPlugin for HivePlugin {
    fn connector_type(&self) -> &str {
        CONNECTOR_TYPE
    }

    async fn create(&self, context: ConnectorContext) -> crate::Result<Box<dyn ConnectorFactory>> {
        let uris = context.required_property(METASTORE_URIS)?;
        let client = ThriftMetastoreClient::connect(&context.catalog_name, uris).await?;
        let factory = HiveConnectorFactory::build(&context, Arc::new(client)).await?;
        Ok(Box::new(factory))
    }

    fn type_converter(&self) -> Arc<dyn ConnectorTypeConverter> {
        Arc::new(HiveTypeConverter)
    }
}

/// Services of one Hive catalog.
pub struct HiveConnectorFactory {
    context: Arc<HiveContext>,
    database_service: Arc<HiveDatabaseService>,
    table_service: Arc<dyn ConnectorTableService>,
    partition_service: Arc<HivePartitionService>,
    datasource: Option<Arc<dyn MetastoreDataSource>>,
}

impl HiveConnectorFactory {
    /// Open the fast path datasource if configured and build the services.
    ///
    /// The client is closed if anything after its creation fails.
    pub async fn build(context: &ConnectorContext, client: Arc<dyn MetastoreClient>) -> crate::Result<Self> {
        let datasource = match fast_path_datasource(context) {
            Ok(datasource) => datasource,
            Err(e) => {
                client.close().await;
                return Err(e);
            }
        };
        match Self::new(context, client.clone(), datasource.clone()) {
            Ok(factory) => Ok(factory),
            Err(e) => {
                if let Some(ds) = &datasource {
                    ds.close();
                }
                client.close().await;
                Err(e)
            }
        }
    }

    /// Build the services over an existing client and, for the fast path, a datasource.
    pub fn new(
        context: &ConnectorContext,
        client: Arc<dyn MetastoreClient>,
        datasource: Option<Arc<dyn MetastoreDataSource>>,
    ) -> crate::Result<Self> {
        let hive = Arc::new(HiveContext {
            catalog: context.catalog_name.clone(),
            client,
            converter: HiveTypeConverter,
            request_timeout: Duration::from_secs(
                context.u64_property(REQUEST_TIMEOUT_SECONDS, 30)?,
            ),
            allow_rename: context.bool_property(ALLOW_RENAME_TABLE, false)?,
            metrics: context.metrics.clone(),
        });

        let table_service: Arc<dyn ConnectorTableService> = match &datasource {
            Some(ds) => Arc::new(HiveFastTableService::new(
                HiveTableService::new(hive.clone()),
                ds.clone(),
            )),
            None => Arc::new(HiveTableService::new(hive.clone())),
        };
        info!(
            catalog = %hive.catalog,
            fast_path = datasource.is_some(),
            allow_rename = hive.allow_rename,
            "Hive connector ready"
        );

        Ok(Self {
            database_service: Arc::new(HiveDatabaseService::new(hive.clone())),
            partition_service: Arc::new(HivePartitionService::new(hive.clone())),
            table_service,
            context: hive,
            datasource,
        })
    }
}

fn fast_path_datasource(context: &ConnectorContext) -> crate::Result<Option<Arc<dyn MetastoreDataSource>>> {
    if !context.bool_property(FAST_PATH_ENABLED, false)? {
        return Ok(None);
    }
    let url = context.required_property(FAST_PATH_DATASOURCE_URL)?;
    let max = context.u64_property(FAST_PATH_MAX_CONNECTIONS, 5)? as usize;
    Ok(Some(Arc::from(datasource::from_url(url, max)?)))
}

#[async_trait]
impl ConnectorFactory for HiveConnectorFactory {
    fn database_service(&self) -> Arc<dyn ConnectorDatabaseService> {
        self.database_service.clone()
    }

    fn table_service(&self) -> Arc<dyn ConnectorTableService> {
        self.table_service.clone()
    }

    fn partition_service(&self) -> Arc<dyn ConnectorPartitionService> {
        self.partition_service.clone()
    }

    fn fast_path_enabled(&self) -> bool {
        self.datasource.is_some()
    }

    async fn health_check(&self) -> CatalogResult<()> {
        self.context
            .client
            .get_all_databases()
            .await
            .map(|_| ())
            .map_err(|e| CatalogError::unavailable_with("Hive Metastore probe failed", e))
    }

    async fn stop(&self) {
        if let Some(ds) = &self.datasource {
            ds.close();
        }
        self.context.client.close().await;
        info!(catalog = %self.context.catalog, "Hive connector stopped");
    }
}
