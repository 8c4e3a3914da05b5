//! Iceberg REST catalog connector.
//!
//! Catalog properties:
//!
//! | key | default |
//! |-----|---------|
//! | `rest.uri` | required |
//! | `rest.warehouse` | none |
//! | `rest.credential-type` | `none` (`bearer`, `oauth2`) |
//! | `rest.token` | required with `bearer` |
//! | `rest.oauth2.client-id` / `rest.oauth2.client-secret` | required with `oauth2` |
//! | `rest.oauth2.scope` | `catalog` |
//! | `rest.request-timeout-seconds` | `30` |
//! | `rest.allow-rename-table` | `true` |

pub mod api;
pub mod client;
pub mod converter;
pub mod service;

pub use client::{CredentialType, RestCatalogClient, RestClientConfig};
pub use converter::IcebergTypeConverter;
pub use service::{RestContext, RestDatabaseService, RestPartitionService, RestTableService};

use crate::connector::{
    ConnectorContext, ConnectorDatabaseService, ConnectorFactory, ConnectorPartitionService,
    ConnectorPlugin, ConnectorTableService, ConnectorTypeConverter,
};
use crate::error::CatalogResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const CONNECTOR_TYPE: &str = "iceberg-rest";

pub const URI: &str = "rest.uri";
pub const WAREHOUSE: &str = "rest.warehouse";
pub const CREDENTIAL_TYPE: &str = "rest.credential-type";
pub const TOKEN: &str = "rest.token";
pub const OAUTH2_CLIENT_ID: &str = "rest.oauth2.client-id";
pub const OAUTH2_CLIENT_SECRET: &str = "rest.oauth2.client-secret";
pub const OAUTH2_SCOPE: &str = "rest.oauth2.scope";
pub const REQUEST_TIMEOUT_SECONDS: &str = "rest.request-timeout-seconds";
pub const ALLOW_RENAME_TABLE: &str = "rest.allow-rename-table";

/// Plugin for `type = "iceberg-rest"` catalogs.
#[derive(Debug, Default)]
pub struct IcebergRestPlugin;

/// Read the client settings out of catalog properties.
pub fn client_config(context: &ConnectorContext) -> crate::Result<RestClientConfig> {
    let mut config = RestClientConfig::new(context.required_property(URI)?);
    config.warehouse = context.property(WAREHOUSE).map(str::to_string);
    config.timeout = Duration::from_secs(context.u64_property(REQUEST_TIMEOUT_SECONDS, 30)?);
    config.credential_type = context
        .property(CREDENTIAL_TYPE)
        .unwrap_or("none")
        .parse()?;
    match config.credential_type {
        CredentialType::None => {}
        CredentialType::Bearer => {
            config.bearer_token = Some(context.required_property(TOKEN)?.to_string());
        }
        CredentialType::OAuth2 => {
            config.oauth2_client_id = Some(context.required_property(OAUTH2_CLIENT_ID)?.to_string());
            config.oauth2_client_secret =
                Some(context.required_property(OAUTH2_CLIENT_SECRET)?.to_string());
            config.oauth2_scope = Some(
                context
                    .property(OAUTH2_SCOPE)
                    .unwrap_or("catalog")
                    .to_string(),
            );
        }
    }
    Ok(config)
}

#[async_trait]
impl ConnectorPlugin for IcebergRestPlugin {
    fn connector_type(&self) -> &str {
        CONNECTOR_TYPE
    }

    async fn create(&self, context: ConnectorContext) -> crate::Result<Box<dyn ConnectorFactory>> {
        let config = client_config(&context)?;
        let request_timeout = config.timeout;
        let allow_rename = context.bool_property(ALLOW_RENAME_TABLE, true)?;
        let client = RestCatalogClient::new(&context.catalog_name, config).await?;
        let rest = Arc::new(RestContext {
            catalog: context.catalog_name.clone(),
            client,
            converter: IcebergTypeConverter,
            request_timeout,
            allow_rename,
            metrics: context.metrics.clone(),
        });
        Ok(Box::new(RestConnectorFactory::new(rest)))
    }

    fn type_converter(&self) -> Arc<dyn ConnectorTypeConverter> {
        Arc::new(IcebergTypeConverter)
    }

    // The auxiliary interface speaks the Hive metastore protocol.
    fn supports_aux_interface(&self) -> bool {
        false
    }
}

/// Services of one Iceberg REST catalog.
pub struct RestConnectorFactory {
    rest: Arc<RestContext>,
    database_service: Arc<RestDatabaseService>,
    table_service: Arc<RestTableService>,
    partition_service: Arc<RestPartitionService>,
}

impl RestConnectorFactory {
    pub fn new(rest: Arc<RestContext>) -> Self {
        info!(catalog = %rest.catalog, allow_rename = rest.allow_rename, "Iceberg REST connector ready");
        Self {
            database_service: Arc::new(RestDatabaseService::new(rest.clone())),
            table_service: Arc::new(RestTableService::new(rest.clone())),
            partition_service: Arc::new(RestPartitionService),
            rest,
        }
    }
}

#[async_trait]
impl ConnectorFactory for RestConnectorFactory {
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
        self.rest.client.load_config().await.map(|_| ())
    }

    async fn stop(&self) {
        self.rest.client.close();
        info!(catalog = %self.rest.catalog, "Iceberg REST connector stopped");
    }
}
