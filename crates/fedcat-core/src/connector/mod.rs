//! Connector contract.
//!
//! A connector adapts one metadata backend to the canonical model. Each
//! connector type ships a [`ConnectorPlugin`]; the plugin builds a
//! [`ConnectorFactory`] per configured catalog, and the factory hands out the
//! database, table and partition services bound to that catalog's backend
//! resources.
//!
//! Service methods default to [`CatalogError::UnsupportedOperation`], so a
//! connector only implements what its backend offers.
//!
//! ## Connector types
//!
//! - **hive**: Hive metastore over Thrift, with an optional SQL fast path
//! - **iceberg-rest**: Iceberg REST catalog
//! - **postgresql**: schemas and tables of one PostgreSQL database

pub mod hive;
pub mod manager;
pub mod postgresql;
pub mod rest;

use crate::error::{CatalogError, CatalogResult};
use crate::metrics::CatalogMetrics;
use crate::model::{
    DatabaseInfo, ListRequest, Page, PartitionInfo, PartitionsSaveResponse, RequestContext,
    TableInfo,
};
use crate::name::QualifiedName;
use crate::types::CanonicalType;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use manager::{CatalogInfo, ConnectorInstance, ConnectorManager, PluginRegistry};

/// Translates between a backend's native type strings and canonical types.
///
/// Implementations are pure and stateless.
pub trait ConnectorTypeConverter: Send + Sync {
    /// Native type string to canonical type.
    fn to_canonical(&self, native: &str) -> CanonicalType;

    /// Canonical type to the backend's native type string.
    fn from_canonical(&self, canonical: &CanonicalType) -> CatalogResult<String>;
}

/// Map a `get` result into an existence check.
pub(crate) fn exists_from<T>(result: CatalogResult<T>) -> CatalogResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(CatalogError::EntityNotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Database operations of one catalog.
#[async_trait]
pub trait ConnectorDatabaseService: Send + Sync {
    async fn exists(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<bool> {
        exists_from(self.get(ctx, name).await)
    }

    async fn get(&self, _ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<DatabaseInfo> {
        Err(CatalogError::unsupported(name.catalog(), "database.get"))
    }

    async fn create(&self, _ctx: &RequestContext, info: &DatabaseInfo) -> CatalogResult<()> {
        Err(CatalogError::unsupported(info.name.catalog(), "database.create"))
    }

    async fn update(&self, _ctx: &RequestContext, info: &DatabaseInfo) -> CatalogResult<()> {
        Err(CatalogError::unsupported(info.name.catalog(), "database.update"))
    }

    async fn delete(&self, _ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        Err(CatalogError::unsupported(name.catalog(), "database.delete"))
    }

    /// Databases of the catalog `parent`.
    async fn list(
        &self,
        _ctx: &RequestContext,
        parent: &QualifiedName,
        _request: &ListRequest,
    ) -> CatalogResult<Page<DatabaseInfo>> {
        Err(CatalogError::unsupported(parent.catalog(), "database.list"))
    }

    async fn list_names(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<QualifiedName>> {
        Ok(self.list(ctx, parent, request).await?.map(|db| db.name))
    }
}

/// Table operations of one catalog.
#[async_trait]
pub trait ConnectorTableService: Send + Sync {
    async fn exists(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<bool> {
        exists_from(self.get(ctx, name).await)
    }

    async fn get(&self, _ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<TableInfo> {
        Err(CatalogError::unsupported(name.catalog(), "table.get"))
    }

    async fn create(&self, _ctx: &RequestContext, info: &TableInfo) -> CatalogResult<()> {
        Err(CatalogError::unsupported(info.name.catalog(), "table.create"))
    }

    async fn update(&self, _ctx: &RequestContext, info: &TableInfo) -> CatalogResult<()> {
        Err(CatalogError::unsupported(info.name.catalog(), "table.update"))
    }

    async fn delete(&self, _ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        Err(CatalogError::unsupported(name.catalog(), "table.delete"))
    }

    /// Tables of the database `parent`.
    async fn list(
        &self,
        _ctx: &RequestContext,
        parent: &QualifiedName,
        _request: &ListRequest,
    ) -> CatalogResult<Page<TableInfo>> {
        Err(CatalogError::unsupported(parent.catalog(), "table.list"))
    }

    async fn list_names(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<QualifiedName>> {
        Ok(self.list(ctx, parent, request).await?.map(|t| t.name))
    }

    async fn rename(
        &self,
        _ctx: &RequestContext,
        old_name: &QualifiedName,
        _new_name: &QualifiedName,
    ) -> CatalogResult<()> {
        Err(CatalogError::unsupported(old_name.catalog(), "table.rename"))
    }

    /// Reverse lookup from storage locations to table names.
    ///
    /// With `prefix_search` a table matches when its location starts with one
    /// of `uris`; otherwise locations must match exactly. A location shared by
    /// several tables maps to all of them.
    async fn get_table_names(
        &self,
        _ctx: &RequestContext,
        catalog: &QualifiedName,
        _uris: &[String],
        _prefix_search: bool,
    ) -> CatalogResult<HashMap<String, Vec<QualifiedName>>> {
        Err(CatalogError::unsupported(catalog.catalog(), "table.get_table_names"))
    }
}

/// Partition operations of one catalog.
#[async_trait]
pub trait ConnectorPartitionService: Send + Sync {
    async fn exists(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<bool> {
        exists_from(self.get(ctx, name).await)
    }

    async fn get(&self, _ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<PartitionInfo> {
        Err(CatalogError::unsupported(name.catalog(), "partition.get"))
    }

    async fn create(&self, _ctx: &RequestContext, info: &PartitionInfo) -> CatalogResult<()> {
        Err(CatalogError::unsupported(info.name.catalog(), "partition.create"))
    }

    async fn update(&self, _ctx: &RequestContext, info: &PartitionInfo) -> CatalogResult<()> {
        Err(CatalogError::unsupported(info.name.catalog(), "partition.update"))
    }

    async fn delete(&self, _ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        Err(CatalogError::unsupported(name.catalog(), "partition.delete"))
    }

    /// Partitions of the table `parent`.
    async fn list(
        &self,
        _ctx: &RequestContext,
        parent: &QualifiedName,
        _request: &ListRequest,
    ) -> CatalogResult<Page<PartitionInfo>> {
        Err(CatalogError::unsupported(parent.catalog(), "partition.list"))
    }

    async fn list_names(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<QualifiedName>> {
        Ok(self.list(ctx, parent, request).await?.map(|p| p.name))
    }

    /// Add new partitions and overwrite existing ones.
    async fn save_partitions(
        &self,
        _ctx: &RequestContext,
        table: &QualifiedName,
        _partitions: &[PartitionInfo],
    ) -> CatalogResult<PartitionsSaveResponse> {
        Err(CatalogError::unsupported(table.catalog(), "partition.save"))
    }

    /// Drop partitions of `table` by partition name (`k=v/...`).
    async fn delete_partitions(
        &self,
        _ctx: &RequestContext,
        table: &QualifiedName,
        _partition_names: &[String],
    ) -> CatalogResult<()> {
        Err(CatalogError::unsupported(table.catalog(), "partition.delete_many"))
    }

    async fn partition_count(&self, _ctx: &RequestContext, table: &QualifiedName) -> CatalogResult<usize> {
        Err(CatalogError::unsupported(table.catalog(), "partition.count"))
    }
}

/// Services of one live catalog, sharing that catalog's backend resources.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    fn database_service(&self) -> Arc<dyn ConnectorDatabaseService>;

    fn table_service(&self) -> Arc<dyn ConnectorTableService>;

    fn partition_service(&self) -> Arc<dyn ConnectorPartitionService>;

    /// Whether table lookups are served by the SQL fast path.
    fn fast_path_enabled(&self) -> bool {
        false
    }

    /// Probe the backend.
    async fn health_check(&self) -> CatalogResult<()> {
        Ok(())
    }

    /// Release clients and pools. Called exactly once by the manager.
    async fn stop(&self);
}

/// Named factory for one connector type.
#[async_trait]
pub trait ConnectorPlugin: Send + Sync {
    /// Type tag matched against `type` in catalog configuration.
    fn connector_type(&self) -> &str;

    /// Build the services for one catalog.
    async fn create(&self, context: ConnectorContext) -> crate::Result<Box<dyn ConnectorFactory>>;

    fn type_converter(&self) -> Arc<dyn ConnectorTypeConverter>;

    /// Whether catalogs of this type can be exposed over the auxiliary RPC interface.
    fn supports_aux_interface(&self) -> bool {
        true
    }
}

/// Everything a plugin needs to build one catalog's connector.
#[derive(Clone)]
pub struct ConnectorContext {
    pub catalog_name: String,
    pub connector_name: String,
    pub connector_type: String,
    pub properties: BTreeMap<String, String>,
    pub metrics: Arc<CatalogMetrics>,
}

impl ConnectorContext {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn required_property(&self, key: &str) -> crate::Result<&str> {
        match self.property(key) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(crate::Error::Config(format!(
                "Catalog '{}' requires property '{}'",
                self.catalog_name, key
            ))),
        }
    }

    pub fn bool_property(&self, key: &str, default: bool) -> crate::Result<bool> {
        match self.property(key) {
            None => Ok(default),
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                other => Err(crate::Error::Config(format!(
                    "Catalog '{}' property '{}' is not a boolean: {}",
                    self.catalog_name, key, other
                ))),
            },
        }
    }

    pub fn u64_property(&self, key: &str, default: u64) -> crate::Result<u64> {
        match self.property(key) {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|_| {
                crate::Error::Config(format!(
                    "Catalog '{}' property '{}' is not a number: {}",
                    self.catalog_name, key, v
                ))
            }),
        }
    }
}

/// Run a backend call bounded by the request deadline and a connector default.
///
/// Elapsed deadlines surface as `BackendUnavailable`.
pub async fn with_deadline<F, T>(
    ctx: &RequestContext,
    default_timeout: Duration,
    operation: &str,
    fut: F,
) -> CatalogResult<T>
where
    F: Future<Output = CatalogResult<T>>,
{
    let limit = match ctx.remaining() {
        Some(remaining) => remaining.min(default_timeout),
        None => default_timeout,
    };
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CatalogError::unavailable(format!(
            "{} timed out after {}ms (trace {})",
            operation,
            limit.as_millis(),
            ctx.trace_id
        ))),
    }
}
