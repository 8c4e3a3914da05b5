//! Fast path table service.
//!
//! Answers `exists` and `get_table_names` with read-only SQL against the
//! metastore's backing database and delegates everything else to the
//! client-backed [`HiveTableService`].

use super::datasource::MetastoreDataSource;
use super::service::HiveTableService;
use crate::connector::{with_deadline, ConnectorTableService};
use crate::error::CatalogResult;
use crate::metrics::Strategy;
use crate::model::{ListRequest, Page, RequestContext, TableInfo};
use crate::name::QualifiedName;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct HiveFastTableService {
    inner: HiveTableService,
    datasource: Arc<dyn MetastoreDataSource>,
}

impl HiveFastTableService {
    pub fn new(inner: HiveTableService, datasource: Arc<dyn MetastoreDataSource>) -> Self {
        Self { inner, datasource }
    }
}

#[async_trait]
impl ConnectorTableService for HiveFastTableService {
    async fn exists(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<bool> {
        let hive = self.inner.context();
        let (Some(db), Some(table)) = (name.database(), name.table()) else {
            return Ok(false);
        };
        let _timer = hive
            .metrics
            .start_request(&hive.catalog, "table.exists", Strategy::Fast);
        with_deadline(
            ctx,
            hive.request_timeout,
            "table.exists",
            self.datasource.table_exists(db, table),
        )
        .await
    }

    async fn get(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<TableInfo> {
        self.inner.get(ctx, name).await
    }

    async fn create(&self, ctx: &RequestContext, info: &TableInfo) -> CatalogResult<()> {
        self.inner.create(ctx, info).await
    }

    async fn update(&self, ctx: &RequestContext, info: &TableInfo) -> CatalogResult<()> {
        self.inner.update(ctx, info).await
    }

    async fn delete(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        self.inner.delete(ctx, name).await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<TableInfo>> {
        self.inner.list(ctx, parent, request).await
    }

    async fn list_names(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<QualifiedName>> {
        self.inner.list_names(ctx, parent, request).await
    }

    async fn rename(
        &self,
        ctx: &RequestContext,
        old_name: &QualifiedName,
        new_name: &QualifiedName,
    ) -> CatalogResult<()> {
        self.inner.rename(ctx, old_name, new_name).await
    }

    async fn get_table_names(
        &self,
        ctx: &RequestContext,
        catalog: &QualifiedName,
        uris: &[String],
        prefix_search: bool,
    ) -> CatalogResult<HashMap<String, Vec<QualifiedName>>> {
        if uris.is_empty() {
            return Ok(HashMap::new());
        }
        let hive = self.inner.context();
        let rows = {
            let _timer =
                hive.metrics
                    .start_request(&hive.catalog, "table.get_table_names", Strategy::Fast);
            with_deadline(
                ctx,
                hive.request_timeout,
                "table.get_table_names",
                self.datasource.tables_by_location(uris, prefix_search),
            )
            .await?
        };

        let mut result: HashMap<String, Vec<QualifiedName>> = HashMap::new();
        for row in rows {
            let name = QualifiedName::of_table(catalog.catalog(), row.database, row.table)?;
            result.entry(row.location).or_default().push(name);
        }
        debug!(
            catalog = %hive.catalog,
            uris = uris.len(),
            locations = result.len(),
            prefix_search,
            "Resolved tables by location"
        );
        Ok(result)
    }
}
