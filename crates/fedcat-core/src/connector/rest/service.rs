//! Database and table services over an Iceberg REST catalog.
//!
//! Databases are single-level namespaces. Partitions are managed by the
//! table format itself and are not exposed.

use super::api;
use super::client::RestCatalogClient;
use super::converter::{self, IcebergTypeConverter};
use crate::connector::{
    with_deadline, ConnectorDatabaseService, ConnectorPartitionService, ConnectorTableService,
};
use crate::error::{CatalogError, CatalogResult};
use crate::metrics::{CatalogMetrics, Strategy};
use crate::model::{DatabaseInfo, ListRequest, Page, RequestContext, TableInfo};
use crate::name::QualifiedName;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct RestContext {
    pub catalog: String,
    pub client: RestCatalogClient,
    pub converter: IcebergTypeConverter,
    pub request_timeout: Duration,
    pub allow_rename: bool,
    pub metrics: Arc<CatalogMetrics>,
}

impl RestContext {
    async fn call<T, F>(&self, ctx: &RequestContext, request: &str, fut: F) -> CatalogResult<T>
    where
        F: Future<Output = CatalogResult<T>>,
    {
        let _timer = self
            .metrics
            .start_request(&self.catalog, request, Strategy::Client);
        with_deadline(ctx, self.request_timeout, request, fut).await
    }
}

fn namespace_of(name: &QualifiedName) -> CatalogResult<&str> {
    name.database()
        .ok_or_else(|| CatalogError::InvalidRequest(format!("'{}' has no database", name)))
}

fn table_of(name: &QualifiedName) -> CatalogResult<(&str, &str)> {
    match (name.database(), name.table()) {
        (Some(ns), Some(table)) => Ok((ns, table)),
        _ => Err(CatalogError::InvalidRequest(format!("'{}' is not a table name", name))),
    }
}

fn child_page(
    mut names: Vec<String>,
    request: &ListRequest,
    child: impl Fn(&str) -> CatalogResult<QualifiedName>,
) -> CatalogResult<Page<QualifiedName>> {
    names.sort();
    let page = Page::from_all(names, request, |n| n.as_str())?;
    let items = page
        .items
        .iter()
        .map(|n| child(n))
        .collect::<CatalogResult<Vec<_>>>()?;
    Ok(Page {
        items,
        next_page_token: page.next_page_token,
    })
}

pub struct RestDatabaseService {
    rest: Arc<RestContext>,
}

impl RestDatabaseService {
    pub fn new(rest: Arc<RestContext>) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl ConnectorDatabaseService for RestDatabaseService {
    async fn get(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<DatabaseInfo> {
        let namespace = namespace_of(name)?;
        let response = self
            .rest
            .call(ctx, "database.get", self.rest.client.load_namespace(name, namespace))
            .await?;
        Ok(converter::database_info(name, &response))
    }

    async fn create(&self, ctx: &RequestContext, info: &DatabaseInfo) -> CatalogResult<()> {
        let request = converter::namespace_request(info)?;
        self.rest
            .call(ctx, "database.create", self.rest.client.create_namespace(&info.name, &request))
            .await?;
        info!(catalog = %self.rest.catalog, database = %info.name, "Created namespace");
        Ok(())
    }

    async fn update(&self, ctx: &RequestContext, info: &DatabaseInfo) -> CatalogResult<()> {
        let namespace = namespace_of(&info.name)?;
        let current = self
            .rest
            .call(ctx, "database.update", self.rest.client.load_namespace(&info.name, namespace))
            .await?;
        let updates = converter::namespace_properties(info);
        let removals = current
            .properties
            .keys()
            .filter(|k| !updates.contains_key(*k))
            .cloned()
            .collect();
        let request = api::UpdateNamespacePropertiesRequest { removals, updates };
        self.rest
            .call(
                ctx,
                "database.update",
                self.rest
                    .client
                    .update_namespace_properties(&info.name, namespace, &request),
            )
            .await
    }

    async fn delete(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        let namespace = namespace_of(name)?;
        self.rest
            .call(ctx, "database.delete", self.rest.client.drop_namespace(name, namespace))
            .await?;
        info!(catalog = %self.rest.catalog, database = %name, "Dropped namespace");
        Ok(())
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<DatabaseInfo>> {
        let names = self.list_names(ctx, parent, request).await?;
        let mut items = Vec::with_capacity(names.items.len());
        for name in &names.items {
            items.push(self.get(ctx, name).await?);
        }
        Ok(Page {
            items,
            next_page_token: names.next_page_token,
        })
    }

    async fn list_names(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<QualifiedName>> {
        let namespaces = self
            .rest
            .call(ctx, "database.list", self.rest.client.list_namespaces(parent))
            .await?;
        child_page(namespaces, request, |ns| parent.database_child(ns))
    }
}

pub struct RestTableService {
    rest: Arc<RestContext>,
}

impl RestTableService {
    pub fn new(rest: Arc<RestContext>) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl ConnectorTableService for RestTableService {
    async fn get(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<TableInfo> {
        let (namespace, table) = table_of(name)?;
        let response = self
            .rest
            .call(ctx, "table.get", self.rest.client.load_table(name, namespace, table))
            .await?;
        Ok(converter::table_info(name, &response, &self.rest.converter))
    }

    async fn create(&self, ctx: &RequestContext, info: &TableInfo) -> CatalogResult<()> {
        let (namespace, _) = table_of(&info.name)?;
        let request = converter::create_request(info, &self.rest.converter)?;
        self.rest
            .call(
                ctx,
                "table.create",
                self.rest.client.create_table(&info.name, namespace, &request),
            )
            .await?;
        info!(catalog = %self.rest.catalog, table = %info.name, "Created Iceberg table");
        Ok(())
    }

    async fn update(&self, ctx: &RequestContext, info: &TableInfo) -> CatalogResult<()> {
        let (namespace, table) = table_of(&info.name)?;
        let current = self
            .rest
            .call(ctx, "table.update", self.rest.client.load_table(&info.name, namespace, table))
            .await?;
        let commit = converter::commit_request(&current, info, &self.rest.converter)?;
        if commit.updates.is_empty() {
            debug!(table = %info.name, "No table changes to commit");
            return Ok(());
        }
        self.rest
            .call(
                ctx,
                "table.update",
                self.rest.client.commit_table(&info.name, namespace, table, &commit),
            )
            .await
    }

    async fn delete(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        let (namespace, table) = table_of(name)?;
        self.rest
            .call(ctx, "table.delete", self.rest.client.drop_table(name, namespace, table))
            .await?;
        info!(catalog = %self.rest.catalog, table = %name, "Dropped Iceberg table");
        Ok(())
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<TableInfo>> {
        let names = self.list_names(ctx, parent, request).await?;
        let mut items = Vec::with_capacity(names.items.len());
        for name in &names.items {
            match self.get(ctx, name).await {
                Ok(info) => items.push(info),
                Err(CatalogError::EntityNotFound { .. }) => {
                    debug!(table = %name, "Table vanished while listing")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Page {
            items,
            next_page_token: names.next_page_token,
        })
    }

    async fn list_names(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<QualifiedName>> {
        let namespace = namespace_of(parent)?;
        let tables = self
            .rest
            .call(ctx, "table.list", self.rest.client.list_tables(parent, namespace))
            .await?;
        child_page(tables, request, |t| parent.table_child(t))
    }

    async fn rename(
        &self,
        ctx: &RequestContext,
        old_name: &QualifiedName,
        new_name: &QualifiedName,
    ) -> CatalogResult<()> {
        if !self.rest.allow_rename {
            return Err(CatalogError::unsupported(&self.rest.catalog, "table.rename"));
        }
        let (old_ns, old_table) = table_of(old_name)?;
        let (new_ns, new_table) = table_of(new_name)?;
        let request = api::RenameTableRequest {
            source: api::TableIdentifier::new(old_ns, old_table),
            destination: api::TableIdentifier::new(new_ns, new_table),
        };
        self.rest
            .call(ctx, "table.rename", self.rest.client.rename_table(old_name, &request))
            .await?;
        info!(catalog = %self.rest.catalog, from = %old_name, to = %new_name, "Renamed Iceberg table");
        Ok(())
    }
}

/// Partitions are not exposed; every operation is unsupported.
pub struct RestPartitionService;

impl ConnectorPartitionService for RestPartitionService {}
