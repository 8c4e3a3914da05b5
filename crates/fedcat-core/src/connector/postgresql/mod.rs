//! PostgreSQL connector.
//!
//! Exposes the schemas of one PostgreSQL database as databases and their
//! tables and views as tables, read from `information_schema`.
//!
//! Catalog properties:
//!
//! | key | default |
//! |-----|---------|
//! | `postgresql.url` | required |
//! | `postgresql.max-connections` | `4` |
//! | `postgresql.request-timeout-seconds` | `30` |
//! | `postgresql.allow-rename-table` | `true` |

pub mod converter;
pub mod service;

pub use converter::PostgresTypeConverter;
pub use service::{
    PostgresContext, PostgresDatabaseService, PostgresPartitionService, PostgresTableService,
};

use crate::connector::{
    ConnectorContext, ConnectorDatabaseService, ConnectorFactory, ConnectorPartitionService,
    ConnectorPlugin, ConnectorTableService, ConnectorTypeConverter,
};
use crate::error::{CatalogError, CatalogResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const CONNECTOR_TYPE: &str = "postgresql";

pub const URL: &str = "postgresql.url";
pub const MAX_CONNECTIONS: &str = "postgresql.max-connections";
pub const REQUEST_TIMEOUT_SECONDS: &str = "postgresql.request-timeout-seconds";
pub const ALLOW_RENAME_TABLE: &str = "postgresql.allow-rename-table";

/// Plugin for `type = "postgresql"` catalogs.
#[derive(Debug, Default)]
pub struct PostgresPlugin;

/// Connection pool for the catalog's database. Connections open lazily.
pub fn pool(context: &ConnectorContext) -> crate::Result<deadpool_postgres::Pool> {
    let url = context.required_property(URL)?;
    let max_connections = context.u64_property(MAX_CONNECTIONS, 4)?.max(1) as usize;
    let mut cfg = deadpool_postgres::Config::new();
    cfg.url = Some(url.to_string());
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(max_connections));
    cfg.create_pool(
        Some(deadpool_postgres::Runtime::Tokio1),
        tokio_postgres::NoTls,
    )
    .map_err(|e| {
        crate::Error::Config(format!(
            "Catalog '{}' has an unusable {}: {}",
            context.catalog_name, URL, e
        ))
    })
}

#[async_trait]
impl ConnectorPlugin for PostgresPlugin {
    fn connector_type(&self) -> &str {
        CONNECTOR_TYPE
    }

    async fn create(&self, context: ConnectorContext) -> crate::Result<Box<dyn ConnectorFactory>> {
        let pool = pool(&context)?;
        let pg = Arc::new(PostgresContext {
            catalog: context.catalog_name.clone(),
            pool,
            converter: PostgresTypeConverter,
            request_timeout: Duration::from_secs(context.u64_property(REQUEST_TIMEOUT_SECONDS, 30)?),
            allow_rename: context.bool_property(ALLOW_RENAME_TABLE, true)?,
            metrics: context.metrics.clone(),
        });
        Ok(Box::new(PostgresConnectorFactory::new(pg)))
    }

    fn type_converter(&self) -> Arc<dyn ConnectorTypeConverter> {
        Arc::new(PostgresTypeConverter)
    }

    // The auxiliary interface speaks the Hive metastore protocol.
    fn supports_aux_interface(&self) -> bool {
        false
    }
}

/// Services of one PostgreSQL catalog.
pub struct PostgresConnectorFactory {
    pg: Arc<PostgresContext>,
    database_service: Arc<PostgresDatabaseService>,
    table_service: Arc<PostgresTableService>,
    partition_service: Arc<PostgresPartitionService>,
}

impl PostgresConnectorFactory {
    pub fn new(pg: Arc<PostgresContext>) -> Self {
        info!(
            catalog = %pg.catalog,
            max_connections = pg.pool.status().max_size,
            allow_rename = pg.allow_rename,
            "PostgreSQL connector ready"
        );
        Self {
            database_service: Arc::new(PostgresDatabaseService::new(pg.clone())),
            table_service: Arc::new(PostgresTableService::new(pg.clone())),
            partition_service: Arc::new(PostgresPartitionService),
            pg,
        }
    }
}

#[async_trait]
impl ConnectorFactory for PostgresConnectorFactory {
    fn database_service(&self) -> Arc<dyn ConnectorDatabaseService> {
        self.database_service.clone()
    }

    fn table_service(&self) -> Arc<dyn ConnectorTableService> {
        self.table_service.clone()
    }

    fn partition_service(&self) -> Arc<dyn ConnectorPartitionService> {
        self.partition_service.clone()
    }

    async fn health_check(&self) -> CatalogResult<()> {
        let client = self.pg.client().await?;
        client
            .simple_query("select 1")
            .await
            .map(|_| ())
            .map_err(|e| CatalogError::unavailable_with("postgres health query failed", e))
    }

    async fn stop(&self) {
        self.pg.pool.close();
        info!(catalog = %self.pg.catalog, "PostgreSQL connector stopped");
    }
}
