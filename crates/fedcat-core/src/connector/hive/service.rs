//! Hive connector services over a [`MetastoreClient`].

use super::client::{HivePartition, MetastoreClient, MetastoreError};
use super::converter::{self, HiveTypeConverter};
use crate::connector::{
    with_deadline, ConnectorDatabaseService, ConnectorPartitionService, ConnectorTableService,
};
use crate::error::{CatalogError, CatalogResult};
use crate::metrics::{CatalogMetrics, Strategy};
use crate::model::{
    DatabaseInfo, ListRequest, Page, PartitionInfo, PartitionsSaveResponse, RequestContext,
    TableInfo,
};
use crate::name::{NameDepth, QualifiedName};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared state of one Hive catalog.
pub struct HiveContext {
    pub catalog: String,
    pub client: Arc<dyn MetastoreClient>,
    pub converter: HiveTypeConverter,
    pub request_timeout: Duration,
    pub allow_rename: bool,
    pub metrics: Arc<CatalogMetrics>,
}

impl HiveContext {
    /// Time a metastore call and map its error into the canonical kind for `name`.
    pub(crate) async fn call<T, F>(
        &self,
        ctx: &RequestContext,
        request: &str,
        name: &QualifiedName,
        fut: F,
    ) -> CatalogResult<T>
    where
        F: Future<Output = Result<T, MetastoreError>>,
    {
        let _timer = self
            .metrics
            .start_request(&self.catalog, request, Strategy::Client);
        with_deadline(ctx, self.request_timeout, request, async {
            fut.await.map_err(|e| map_error(name, e))
        })
        .await
    }
}

/// Map a metastore error for an operation on `name`.
pub(crate) fn map_error(name: &QualifiedName, err: MetastoreError) -> CatalogError {
    match err {
        MetastoreError::NoSuchObject(_) => CatalogError::not_found(name),
        MetastoreError::AlreadyExists(_) => CatalogError::already_exists(name),
        MetastoreError::InvalidObject(m) | MetastoreError::InvalidOperation(m) => {
            CatalogError::constraint(m)
        }
        e @ (MetastoreError::Meta(_) | MetastoreError::Transport(_)) => {
            CatalogError::unavailable_with(format!("metastore call for '{}' failed", name), e)
        }
    }
}

fn db_of(name: &QualifiedName) -> CatalogResult<&str> {
    name.database()
        .ok_or_else(|| CatalogError::InvalidRequest(format!("'{}' has no database", name)))
}

fn table_of(name: &QualifiedName) -> CatalogResult<(&str, &str)> {
    match (name.database(), name.table()) {
        (Some(db), Some(table)) => Ok((db, table)),
        _ => Err(CatalogError::InvalidRequest(format!("'{}' is not a table name", name))),
    }
}

/// Database service.
pub struct HiveDatabaseService {
    hive: Arc<HiveContext>,
}

impl HiveDatabaseService {
    pub fn new(hive: Arc<HiveContext>) -> Self {
        Self { hive }
    }
}

#[async_trait]
impl ConnectorDatabaseService for HiveDatabaseService {
    async fn get(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<DatabaseInfo> {
        let db = db_of(name)?;
        let database = self
            .hive
            .call(ctx, "database.get", name, self.hive.client.get_database(db))
            .await?;
        converter::database_info(&self.hive.catalog, &database)
    }

    async fn create(&self, ctx: &RequestContext, info: &DatabaseInfo) -> CatalogResult<()> {
        let database = converter::hive_database(info)?;
        self.hive
            .call(ctx, "database.create", &info.name, self.hive.client.create_database(&database))
            .await?;
        info!(catalog = %self.hive.catalog, database = %database.name, "Created Hive database");
        Ok(())
    }

    async fn update(&self, ctx: &RequestContext, info: &DatabaseInfo) -> CatalogResult<()> {
        let database = converter::hive_database(info)?;
        self.hive
            .call(
                ctx,
                "database.update",
                &info.name,
                self.hive.client.alter_database(&database.name, &database),
            )
            .await
    }

    async fn delete(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        let db = db_of(name)?;
        self.hive
            .call(ctx, "database.delete", name, self.hive.client.drop_database(db))
            .await?;
        info!(catalog = %self.hive.catalog, database = %db, "Dropped Hive database");
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
        let mut names = self
            .hive
            .call(ctx, "database.list", parent, self.hive.client.get_all_databases())
            .await?;
        names.sort();
        let page = Page::from_all(names, request, |n| n.as_str())?;
        let items = page
            .items
            .iter()
            .map(|db| parent.database_child(db.as_str()))
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(Page {
            items,
            next_page_token: page.next_page_token,
        })
    }
}

/// Table service using the metastore client for every operation.
pub struct HiveTableService {
    hive: Arc<HiveContext>,
}

impl HiveTableService {
    pub fn new(hive: Arc<HiveContext>) -> Self {
        Self { hive }
    }

    pub fn context(&self) -> &Arc<HiveContext> {
        &self.hive
    }
}

#[async_trait]
impl ConnectorTableService for HiveTableService {
    async fn get(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<TableInfo> {
        let (db, table) = table_of(name)?;
        let hive_table = self
            .hive
            .call(ctx, "table.get", name, self.hive.client.get_table(db, table))
            .await?;
        converter::table_info(&self.hive.catalog, &hive_table, &self.hive.converter)
    }

    async fn create(&self, ctx: &RequestContext, info: &TableInfo) -> CatalogResult<()> {
        let hive_table = converter::hive_table(info, &self.hive.converter)?;
        self.hive
            .call(ctx, "table.create", &info.name, self.hive.client.create_table(&hive_table))
            .await?;
        info!(catalog = %self.hive.catalog, table = %info.name, "Created Hive table");
        Ok(())
    }

    async fn update(&self, ctx: &RequestContext, info: &TableInfo) -> CatalogResult<()> {
        let (db, table) = table_of(&info.name)?;
        let hive_table = converter::hive_table(info, &self.hive.converter)?;
        self.hive
            .call(
                ctx,
                "table.update",
                &info.name,
                self.hive.client.alter_table(db, table, &hive_table),
            )
            .await
    }

    async fn delete(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        let (db, table) = table_of(name)?;
        self.hive
            .call(ctx, "table.delete", name, self.hive.client.drop_table(db, table))
            .await?;
        info!(catalog = %self.hive.catalog, table = %name, "Dropped Hive table");
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
                // Dropped between the listing and the fetch.
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
        let db = db_of(parent)?;
        let mut tables = self
            .hive
            .call(ctx, "table.list", parent, self.hive.client.get_all_tables(db))
            .await?;
        tables.sort();
        let page = Page::from_all(tables, request, |t| t.as_str())?;
        let items = page
            .items
            .iter()
            .map(|t| parent.table_child(t.as_str()))
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(Page {
            items,
            next_page_token: page.next_page_token,
        })
    }

    async fn rename(
        &self,
        ctx: &RequestContext,
        old_name: &QualifiedName,
        new_name: &QualifiedName,
    ) -> CatalogResult<()> {
        if !self.hive.allow_rename {
            return Err(CatalogError::unsupported(&self.hive.catalog, "table.rename"));
        }
        let (old_db, old_table) = table_of(old_name)?;
        let (new_db, new_table) = table_of(new_name)?;
        let mut hive_table = self
            .hive
            .call(ctx, "table.rename", old_name, self.hive.client.get_table(old_db, old_table))
            .await?;
        hive_table.db_name = new_db.to_string();
        hive_table.table_name = new_table.to_string();
        self.hive
            .call(
                ctx,
                "table.rename",
                new_name,
                self.hive.client.alter_table(old_db, old_table, &hive_table),
            )
            .await?;
        info!(catalog = %self.hive.catalog, from = %old_name, to = %new_name, "Renamed Hive table");
        Ok(())
    }
}

/// Partition service.
pub struct HivePartitionService {
    hive: Arc<HiveContext>,
}

impl HivePartitionService {
    pub fn new(hive: Arc<HiveContext>) -> Self {
        Self { hive }
    }

    async fn load_table(
        &self,
        ctx: &RequestContext,
        request: &str,
        table_name: &QualifiedName,
    ) -> CatalogResult<super::client::HiveTable> {
        let (db, table) = table_of(table_name)?;
        self.hive
            .call(ctx, request, table_name, self.hive.client.get_table(db, table))
            .await
    }

    fn partition_infos(
        &self,
        table_name: &QualifiedName,
        table: &super::client::HiveTable,
        partitions: &[HivePartition],
    ) -> CatalogResult<Vec<PartitionInfo>> {
        partitions
            .iter()
            .map(|p| converter::partition_info(table_name, table, p))
            .collect()
    }
}

fn parent_table(name: &QualifiedName) -> CatalogResult<QualifiedName> {
    name.require(NameDepth::Partition)?;
    name.table_name()
        .ok_or_else(|| CatalogError::InvalidRequest(format!("'{}' has no table", name)))
}

#[async_trait]
impl ConnectorPartitionService for HivePartitionService {
    async fn get(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<PartitionInfo> {
        let table_name = parent_table(name)?;
        let (db, table) = table_of(&table_name)?;
        let partition_name = name.partition().unwrap_or_default();
        let hive_table = self.load_table(ctx, "partition.get", &table_name).await?;
        let partition = self
            .hive
            .call(
                ctx,
                "partition.get",
                name,
                self.hive.client.get_partition_by_name(db, table, partition_name),
            )
            .await?;
        converter::partition_info(&table_name, &hive_table, &partition)
    }

    async fn create(&self, ctx: &RequestContext, info: &PartitionInfo) -> CatalogResult<()> {
        let table_name = parent_table(&info.name)?;
        let hive_table = self.load_table(ctx, "partition.create", &table_name).await?;
        let partition = converter::hive_partition(&hive_table, info)?;
        self.hive
            .call(
                ctx,
                "partition.create",
                &info.name,
                self.hive.client.add_partitions(std::slice::from_ref(&partition)),
            )
            .await
    }

    async fn update(&self, ctx: &RequestContext, info: &PartitionInfo) -> CatalogResult<()> {
        let table_name = parent_table(&info.name)?;
        let (db, table) = table_of(&table_name)?;
        let hive_table = self.load_table(ctx, "partition.update", &table_name).await?;
        let partition = converter::hive_partition(&hive_table, info)?;
        self.hive
            .call(
                ctx,
                "partition.update",
                &info.name,
                self.hive
                    .client
                    .alter_partitions(db, table, std::slice::from_ref(&partition)),
            )
            .await
    }

    async fn delete(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        let table_name = parent_table(name)?;
        let (db, table) = table_of(&table_name)?;
        let partition_name = name.partition().unwrap_or_default();
        self.hive
            .call(
                ctx,
                "partition.delete",
                name,
                self.hive.client.drop_partition_by_name(db, table, partition_name),
            )
            .await
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<PartitionInfo>> {
        let (db, table) = table_of(parent)?;
        let hive_table = self.load_table(ctx, "partition.list", parent).await?;
        let partitions = self
            .hive
            .call(ctx, "partition.list", parent, self.hive.client.get_partitions(db, table))
            .await?;
        let mut infos = self.partition_infos(parent, &hive_table, &partitions)?;
        infos.sort_by(|a, b| a.partition_name().cmp(b.partition_name()));
        Page::from_all(infos, request, |p| p.partition_name())
    }

    async fn list_names(
        &self,
        ctx: &RequestContext,
        parent: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<QualifiedName>> {
        let (db, table) = table_of(parent)?;
        let mut names = self
            .hive
            .call(
                ctx,
                "partition.list_names",
                parent,
                self.hive.client.get_partition_names(db, table),
            )
            .await?;
        names.sort();
        let page = Page::from_all(names, request, |n| n.as_str())?;
        let items = page
            .items
            .iter()
            .map(|n| parent.partition_child(n.as_str()))
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(Page {
            items,
            next_page_token: page.next_page_token,
        })
    }

    async fn save_partitions(
        &self,
        ctx: &RequestContext,
        table_name: &QualifiedName,
        partitions: &[PartitionInfo],
    ) -> CatalogResult<PartitionsSaveResponse> {
        let (db, table) = table_of(table_name)?;
        let hive_table = self.load_table(ctx, "partition.save", table_name).await?;
        let existing: HashSet<String> = self
            .hive
            .call(
                ctx,
                "partition.save",
                table_name,
                self.hive.client.get_partition_names(db, table),
            )
            .await?
            .into_iter()
            .collect();

        let mut response = PartitionsSaveResponse::default();
        let mut to_add = Vec::new();
        let mut to_alter = Vec::new();
        for info in partitions {
            if info.name.table_name().as_ref() != Some(table_name) {
                return Err(CatalogError::InvalidRequest(format!(
                    "partition '{}' does not belong to '{}'",
                    info.name, table_name
                )));
            }
            let partition = converter::hive_partition(&hive_table, info)?;
            let name = info.partition_name().to_string();
            if existing.contains(&name) {
                response.updated.push(name);
                to_alter.push(partition);
            } else {
                response.added.push(name);
                to_add.push(partition);
            }
        }

        // add_partitions is one metastore transaction; alter runs after it commits
        if !to_add.is_empty() {
            self.hive
                .call(ctx, "partition.save", table_name, self.hive.client.add_partitions(&to_add))
                .await?;
        }
        if !to_alter.is_empty() {
            let altered = self
                .hive
                .call(
                    ctx,
                    "partition.save",
                    table_name,
                    self.hive.client.alter_partitions(db, table, &to_alter),
                )
                .await;
            if let Err(e) = altered {
                if response.added.is_empty() {
                    return Err(e);
                }
                warn!(
                    catalog = %self.hive.catalog,
                    table = %table_name,
                    added = response.added.len(),
                    error = %e,
                    "Partition update failed after new partitions were added"
                );
                let saved = PartitionsSaveResponse {
                    added: response.added,
                    updated: Vec::new(),
                };
                return Err(CatalogError::partially_saved(saved, e));
            }
        }
        info!(
            catalog = %self.hive.catalog,
            table = %table_name,
            added = response.added.len(),
            updated = response.updated.len(),
            "Saved Hive partitions"
        );
        Ok(response)
    }

    async fn delete_partitions(
        &self,
        ctx: &RequestContext,
        table_name: &QualifiedName,
        partition_names: &[String],
    ) -> CatalogResult<()> {
        let (db, table) = table_of(table_name)?;
        let names = partition_names
            .iter()
            .map(|p| table_name.partition_child(p.as_str()))
            .collect::<CatalogResult<Vec<_>>>()?;

        // Reject the whole batch before dropping anything if a partition is missing
        let existing: HashSet<String> = self
            .hive
            .call(
                ctx,
                "partition.delete",
                table_name,
                self.hive.client.get_partition_names(db, table),
            )
            .await?
            .into_iter()
            .collect();
        if let Some(missing) = names
            .iter()
            .find(|n| !existing.contains(n.partition().unwrap_or_default()))
        {
            return Err(CatalogError::not_found(missing));
        }

        let mut dropped = Vec::with_capacity(names.len());
        for (partition_name, name) in partition_names.iter().zip(&names) {
            let result = self
                .hive
                .call(
                    ctx,
                    "partition.delete",
                    name,
                    self.hive.client.drop_partition_by_name(db, table, partition_name),
                )
                .await;
            match result {
                Ok(()) => dropped.push(partition_name.clone()),
                Err(e) if dropped.is_empty() => return Err(e),
                Err(e) => {
                    warn!(
                        catalog = %self.hive.catalog,
                        table = %table_name,
                        dropped = dropped.len(),
                        error = %e,
                        "Partition batch delete stopped partway"
                    );
                    return Err(CatalogError::partially_deleted(dropped, e));
                }
            }
        }
        Ok(())
    }

    async fn partition_count(&self, ctx: &RequestContext, table_name: &QualifiedName) -> CatalogResult<usize> {
        let (db, table) = table_of(table_name)?;
        let names = self
            .hive
            .call(
                ctx,
                "partition.count",
                table_name,
                self.hive.client.get_partition_names(db, table),
            )
            .await?;
        Ok(names.len())
    }
}
