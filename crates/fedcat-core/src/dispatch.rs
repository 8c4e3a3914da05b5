//! Dispatch facade.
//!
//! Resolves the catalog segment of a name to its connector, checks the name
//! has the depth the operation needs, forwards the call and, once a mutation
//! has succeeded, emits exactly one event. Backend errors arrive already
//! mapped to a canonical kind and are passed through unchanged.

use crate::connector::{ConnectorInstance, ConnectorManager};
use crate::error::{CatalogError, CatalogResult};
use crate::events::{CatalogEvent, EventEmitter, EventPayload};
use crate::model::{
    DatabaseInfo, ListRequest, Page, PartitionInfo, PartitionsSaveResponse, RequestContext,
    TableInfo,
};
use crate::name::{NameDepth, QualifiedName};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lazily walk every page of a list call.
pub fn paged<'a, T, F, Fut>(request: ListRequest, fetch: F) -> BoxStream<'a, CatalogResult<T>>
where
    T: Send + 'a,
    F: Fn(ListRequest) -> Fut + Send + 'a,
    Fut: Future<Output = CatalogResult<Page<T>>> + Send + 'a,
{
    stream::try_unfold(Some(request), move |state| {
        let pending = state.map(|req| {
            let fut = fetch(req.clone());
            (req, fut)
        });
        async move {
            let Some((req, fut)) = pending else {
                return Ok::<_, CatalogError>(None);
            };
            let page = fut.await?;
            let next = page
                .next_page_token
                .map(|token| req.with_page_token(Some(token)));
            Ok(Some((stream::iter(page.items.into_iter().map(Ok::<T, CatalogError>)), next)))
        }
    })
    .try_flatten()
    .boxed()
}

pub struct CatalogDispatcher {
    manager: Arc<ConnectorManager>,
    events: Arc<dyn EventEmitter>,
}

impl CatalogDispatcher {
    pub fn new(manager: Arc<ConnectorManager>, events: Arc<dyn EventEmitter>) -> Self {
        Self { manager, events }
    }

    pub fn manager(&self) -> &Arc<ConnectorManager> {
        &self.manager
    }

    /// Catalog lookup comes first: an unregistered catalog is `CatalogNotFound`
    /// whatever the rest of the request looks like.
    fn resolve(&self, name: &QualifiedName, depth: NameDepth) -> CatalogResult<Arc<ConnectorInstance>> {
        let instance = self.manager.get(name.catalog())?;
        name.require(depth)?;
        Ok(instance)
    }

    fn observe<T>(&self, name: &QualifiedName, request: &str, result: CatalogResult<T>) -> CatalogResult<T> {
        if let Err(e) = &result {
            debug!(catalog = %name.catalog(), name = %name, request, error = %e, "Catalog request failed");
            self.manager
                .metrics()
                .record_request_error(name.catalog(), request, e.kind());
        }
        result
    }

    fn emit(&self, name: QualifiedName, ctx: &RequestContext, payload: EventPayload) {
        let event = CatalogEvent::new(name, ctx, payload);
        info!(
            event_type = %event.event_type(),
            name = %event.name(),
            trace_id = %ctx.trace_id,
            "Catalog mutation applied"
        );
        self.events.emit(event);
    }

    // === DATABASES ===

    pub async fn database_exists(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<bool> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(name, NameDepth::Database)?;
            instance.database_service().exists(ctx, name).await
        }
        .await;
        self.observe(name, "database.exists", result)
    }

    pub async fn get_database(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<DatabaseInfo> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(name, NameDepth::Database)?;
            instance.database_service().get(ctx, name).await
        }
        .await;
        self.observe(name, "database.get", result)
    }

    pub async fn create_database(&self, ctx: &RequestContext, info: &DatabaseInfo) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(&info.name, NameDepth::Database)?;
            instance.database_service().create(ctx, info).await
        }
        .await;
        self.observe(&info.name, "database.create", result)?;
        self.emit(info.name.clone(), ctx, EventPayload::DatabaseCreated(info.clone()));
        Ok(())
    }

    pub async fn update_database(&self, ctx: &RequestContext, info: &DatabaseInfo) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(&info.name, NameDepth::Database)?;
            instance.database_service().update(ctx, info).await
        }
        .await;
        self.observe(&info.name, "database.update", result)?;
        self.emit(info.name.clone(), ctx, EventPayload::DatabaseUpdated(info.clone()));
        Ok(())
    }

    pub async fn delete_database(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(name, NameDepth::Database)?;
            instance.database_service().delete(ctx, name).await
        }
        .await;
        self.observe(name, "database.delete", result)?;
        self.emit(name.clone(), ctx, EventPayload::DatabaseDeleted);
        Ok(())
    }

    /// One page of the databases in `catalog`.
    pub async fn list_databases(
        &self,
        ctx: &RequestContext,
        catalog: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<DatabaseInfo>> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(catalog, NameDepth::Catalog)?;
            instance.database_service().list(ctx, catalog, request).await
        }
        .await;
        self.observe(catalog, "database.list", result)
    }

    pub async fn list_database_names(
        &self,
        ctx: &RequestContext,
        catalog: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<QualifiedName>> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(catalog, NameDepth::Catalog)?;
            instance.database_service().list_names(ctx, catalog, request).await
        }
        .await;
        self.observe(catalog, "database.list_names", result)
    }

    /// Every database in `catalog`, fetched page by page as the stream is polled.
    pub fn databases<'a>(
        &'a self,
        ctx: &'a RequestContext,
        catalog: &'a QualifiedName,
        request: ListRequest,
    ) -> BoxStream<'a, CatalogResult<DatabaseInfo>> {
        paged(request, move |req| async move {
            self.list_databases(ctx, catalog, &req).await
        })
    }

    // === TABLES ===

    pub async fn table_exists(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<bool> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(name, NameDepth::Table)?;
            instance.table_service().exists(ctx, name).await
        }
        .await;
        self.observe(name, "table.exists", result)
    }

    pub async fn get_table(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<TableInfo> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(name, NameDepth::Table)?;
            instance.table_service().get(ctx, name).await
        }
        .await;
        self.observe(name, "table.get", result)
    }

    pub async fn create_table(&self, ctx: &RequestContext, info: &TableInfo) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(&info.name, NameDepth::Table)?;
            instance.table_service().create(ctx, info).await
        }
        .await;
        self.observe(&info.name, "table.create", result)?;
        self.emit(info.name.clone(), ctx, EventPayload::TableCreated(info.clone()));
        Ok(())
    }

    /// Update a table. The event carries the table as it was before and after.
    pub async fn update_table(&self, ctx: &RequestContext, info: &TableInfo) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(&info.name, NameDepth::Table)?;
            let service = instance.table_service();
            let old = service.get(ctx, &info.name).await?;
            service.update(ctx, info).await?;
            Ok((instance, old))
        }
        .await;
        let (instance, old) = self.observe(&info.name, "table.update", result)?;
        let new = self.reload(&instance, ctx, &info.name, || info.clone()).await;
        self.emit(info.name.clone(), ctx, EventPayload::TableUpdated { old, new });
        Ok(())
    }

    /// Delete a table. The event carries the dropped table.
    pub async fn delete_table(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(name, NameDepth::Table)?;
            let service = instance.table_service();
            let old = service.get(ctx, name).await?;
            service.delete(ctx, name).await?;
            Ok(old)
        }
        .await;
        let old = self.observe(name, "table.delete", result)?;
        self.emit(name.clone(), ctx, EventPayload::TableDeleted(old));
        Ok(())
    }

    pub async fn rename_table(
        &self,
        ctx: &RequestContext,
        old_name: &QualifiedName,
        new_name: &QualifiedName,
    ) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(old_name, NameDepth::Table)?;
            new_name.require(NameDepth::Table)?;
            if new_name.catalog() != old_name.catalog() {
                return Err(CatalogError::InvalidRequest(format!(
                    "cannot rename '{}' across catalogs to '{}'",
                    old_name, new_name
                )));
            }
            let service = instance.table_service();
            let old = service.get(ctx, old_name).await?;
            service.rename(ctx, old_name, new_name).await?;
            Ok((instance, old))
        }
        .await;
        let (instance, old) = self.observe(old_name, "table.rename", result)?;
        let new = self
            .reload(&instance, ctx, new_name, || old.renamed(new_name.clone()))
            .await;
        self.emit(old_name.clone(), ctx, EventPayload::TableRenamed { old, new });
        Ok(())
    }

    // The mutation has committed, so a failed re-read must not fail the call.
    async fn reload(
        &self,
        instance: &ConnectorInstance,
        ctx: &RequestContext,
        name: &QualifiedName,
        fallback: impl FnOnce() -> TableInfo,
    ) -> TableInfo {
        match instance.table_service().get(ctx, name).await {
            Ok(table) => table,
            Err(e) => {
                warn!(name = %name, error = %e, "Could not re-read table after mutation");
                fallback()
            }
        }
    }

    /// One page of the tables in `database`.
    pub async fn list_tables(
        &self,
        ctx: &RequestContext,
        database: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<TableInfo>> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(database, NameDepth::Database)?;
            instance.table_service().list(ctx, database, request).await
        }
        .await;
        self.observe(database, "table.list", result)
    }

    pub async fn list_table_names(
        &self,
        ctx: &RequestContext,
        database: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<QualifiedName>> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(database, NameDepth::Database)?;
            instance.table_service().list_names(ctx, database, request).await
        }
        .await;
        self.observe(database, "table.list_names", result)
    }

    pub fn tables<'a>(
        &'a self,
        ctx: &'a RequestContext,
        database: &'a QualifiedName,
        request: ListRequest,
    ) -> BoxStream<'a, CatalogResult<TableInfo>> {
        paged(request, move |req| async move {
            self.list_tables(ctx, database, &req).await
        })
    }

    /// Tables of `catalog` stored at `uris`, keyed by location.
    pub async fn get_table_names(
        &self,
        ctx: &RequestContext,
        catalog: &QualifiedName,
        uris: &[String],
        prefix_search: bool,
    ) -> CatalogResult<HashMap<String, Vec<QualifiedName>>> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(catalog, NameDepth::Catalog)?;
            instance
                .table_service()
                .get_table_names(ctx, catalog, uris, prefix_search)
                .await
        }
        .await;
        self.observe(catalog, "table.get_table_names", result)
    }

    // === PARTITIONS ===

    fn owning_table(name: &QualifiedName) -> CatalogResult<QualifiedName> {
        name.table_name()
            .ok_or_else(|| CatalogError::InvalidRequest(format!("'{}' has no table segment", name)))
    }

    pub async fn partition_exists(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<bool> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(name, NameDepth::Partition)?;
            instance.partition_service().exists(ctx, name).await
        }
        .await;
        self.observe(name, "partition.exists", result)
    }

    pub async fn get_partition(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<PartitionInfo> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(name, NameDepth::Partition)?;
            instance.partition_service().get(ctx, name).await
        }
        .await;
        self.observe(name, "partition.get", result)
    }

    /// Create one partition. Emitted as a one-partition `PartitionsAdded` on its table.
    pub async fn create_partition(&self, ctx: &RequestContext, info: &PartitionInfo) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(&info.name, NameDepth::Partition)?;
            let table = Self::owning_table(&info.name)?;
            instance.partition_service().create(ctx, info).await?;
            Ok(table)
        }
        .await;
        let table = self.observe(&info.name, "partition.create", result)?;
        let response = PartitionsSaveResponse {
            added: vec![info.partition_name().to_string()],
            updated: Vec::new(),
        };
        self.emit(
            table,
            ctx,
            EventPayload::PartitionsAdded {
                partitions: vec![info.clone()],
                response,
            },
        );
        Ok(())
    }

    /// Overwrite one partition. Emitted as a `PartitionsAdded` with no added partitions.
    pub async fn update_partition(&self, ctx: &RequestContext, info: &PartitionInfo) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(&info.name, NameDepth::Partition)?;
            let table = Self::owning_table(&info.name)?;
            instance.partition_service().update(ctx, info).await?;
            Ok(table)
        }
        .await;
        let table = self.observe(&info.name, "partition.update", result)?;
        let response = PartitionsSaveResponse {
            added: Vec::new(),
            updated: vec![info.partition_name().to_string()],
        };
        self.emit(
            table,
            ctx,
            EventPayload::PartitionsAdded {
                partitions: Vec::new(),
                response,
            },
        );
        Ok(())
    }

    pub async fn delete_partition(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(name, NameDepth::Partition)?;
            let table = Self::owning_table(name)?;
            instance.partition_service().delete(ctx, name).await?;
            Ok(table)
        }
        .await;
        let table = self.observe(name, "partition.delete", result)?;
        let partition_names = name.partition().map(str::to_string).into_iter().collect();
        self.emit(table, ctx, EventPayload::PartitionsDeleted { partition_names });
        Ok(())
    }

    /// Add or overwrite partitions of `table`.
    ///
    /// An empty batch is a no-op and emits nothing. On a partially applied
    /// batch the committed partitions are still emitted.
    pub async fn save_partitions(
        &self,
        ctx: &RequestContext,
        table: &QualifiedName,
        partitions: &[PartitionInfo],
    ) -> CatalogResult<PartitionsSaveResponse> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(table, NameDepth::Table)?;
            if partitions.is_empty() {
                return Ok(None);
            }
            let response = instance
                .partition_service()
                .save_partitions(ctx, table, partitions)
                .await?;
            Ok(Some(response))
        }
        .await;
        let response = match self.observe(table, "partition.save", result) {
            Ok(Some(response)) => response,
            Ok(None) => return Ok(PartitionsSaveResponse::default()),
            // Listeners still hear about what the backend committed
            Err(CatalogError::PartiallyApplied { saved, deleted, source }) => {
                self.emit_saved(ctx, table, partitions, &saved);
                return Err(CatalogError::PartiallyApplied { saved, deleted, source });
            }
            Err(e) => return Err(e),
        };
        self.emit_saved(ctx, table, partitions, &response);
        Ok(response)
    }

    fn emit_saved(
        &self,
        ctx: &RequestContext,
        table: &QualifiedName,
        partitions: &[PartitionInfo],
        response: &PartitionsSaveResponse,
    ) {
        if response.added.is_empty() && response.updated.is_empty() {
            return;
        }
        let added: HashSet<&str> = response.added.iter().map(String::as_str).collect();
        let partitions = partitions
            .iter()
            .filter(|p| added.contains(p.partition_name()))
            .cloned()
            .collect();
        self.emit(
            table.clone(),
            ctx,
            EventPayload::PartitionsAdded {
                partitions,
                response: response.clone(),
            },
        );
    }

    /// Drop partitions of `table` by partition name.
    ///
    /// An empty batch is a no-op and emits nothing. A batch the connector
    /// reports as partially applied emits an event for the dropped subset and
    /// still returns the error.
    pub async fn delete_partitions(
        &self,
        ctx: &RequestContext,
        table: &QualifiedName,
        partition_names: &[String],
    ) -> CatalogResult<()> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(table, NameDepth::Table)?;
            if partition_names.is_empty() {
                return Ok(false);
            }
            instance
                .partition_service()
                .delete_partitions(ctx, table, partition_names)
                .await?;
            Ok(true)
        }
        .await;
        match self.observe(table, "partition.delete_many", result) {
            Ok(true) => {
                self.emit(
                    table.clone(),
                    ctx,
                    EventPayload::PartitionsDeleted {
                        partition_names: partition_names.to_vec(),
                    },
                );
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(CatalogError::PartiallyApplied { saved, deleted, source }) => {
                if !deleted.is_empty() {
                    self.emit(
                        table.clone(),
                        ctx,
                        EventPayload::PartitionsDeleted {
                            partition_names: deleted.clone(),
                        },
                    );
                }
                Err(CatalogError::PartiallyApplied { saved, deleted, source })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn partition_count(&self, ctx: &RequestContext, table: &QualifiedName) -> CatalogResult<usize> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(table, NameDepth::Table)?;
            instance.partition_service().partition_count(ctx, table).await
        }
        .await;
        self.observe(table, "partition.count", result)
    }

    pub async fn list_partitions(
        &self,
        ctx: &RequestContext,
        table: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<PartitionInfo>> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(table, NameDepth::Table)?;
            instance.partition_service().list(ctx, table, request).await
        }
        .await;
        self.observe(table, "partition.list", result)
    }

    pub async fn list_partition_names(
        &self,
        ctx: &RequestContext,
        table: &QualifiedName,
        request: &ListRequest,
    ) -> CatalogResult<Page<QualifiedName>> {
        let result: CatalogResult<_> = async {
            let instance = self.resolve(table, NameDepth::Table)?;
            instance.partition_service().list_names(ctx, table, request).await
        }
        .await;
        self.observe(table, "partition.list_names", result)
    }

    pub fn partitions<'a>(
        &'a self,
        ctx: &'a RequestContext,
        table: &'a QualifiedName,
        request: ListRequest,
    ) -> BoxStream<'a, CatalogResult<PartitionInfo>> {
        paged(request, move |req| async move {
            self.list_partitions(ctx, table, &req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::connector::manager::tests::test_registry;
    use crate::events::EventType;
    use crate::metrics::CatalogMetrics;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<CatalogEvent>>,
    }

    impl EventEmitter for Recording {
        fn emit(&self, event: CatalogEvent) {
            self.events.lock().push(event);
        }
    }

    async fn dispatcher() -> (CatalogDispatcher, Arc<Recording>) {
        let manager = ConnectorManager::from_config(
            test_registry(),
            Arc::new(CatalogMetrics::new().unwrap()),
            &[CatalogConfig::new("mem", "memory")],
        )
        .await
        .unwrap();
        let events = Arc::new(Recording::default());
        (CatalogDispatcher::new(Arc::new(manager), events.clone()), events)
    }

    #[tokio::test]
    async fn test_unknown_catalog_fails_fast() {
        let (dispatcher, events) = dispatcher().await;
        let ctx = RequestContext::default();
        let name = QualifiedName::of_table("nope", "db", "t").unwrap();

        let err = dispatcher.get_table(&ctx, &name).await.unwrap_err();
        assert!(matches!(err, CatalogError::CatalogNotFound { .. }));
        let err = dispatcher
            .create_table(&ctx, &TableInfo::new(name.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::CatalogNotFound { .. }));
        assert!(events.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_catalog_wins_over_argument_checks() {
        let (dispatcher, events) = dispatcher().await;
        let ctx = RequestContext::default();
        let db = QualifiedName::of_database("nope", "db").unwrap();
        let table = QualifiedName::of_table("nope", "db", "a").unwrap();

        let err = dispatcher.get_table(&ctx, &db).await.unwrap_err();
        assert!(matches!(err, CatalogError::CatalogNotFound { ref catalog } if catalog == "nope"));
        let err = dispatcher
            .list_partitions(&ctx, &db, &ListRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::CatalogNotFound { .. }));

        let elsewhere = QualifiedName::of_table("other", "db", "a").unwrap();
        let err = dispatcher.rename_table(&ctx, &table, &elsewhere).await.unwrap_err();
        assert!(matches!(err, CatalogError::CatalogNotFound { ref catalog } if catalog == "nope"));
        let err = dispatcher.rename_table(&ctx, &table, &db).await.unwrap_err();
        assert!(matches!(err, CatalogError::CatalogNotFound { .. }));
        assert!(events.events.lock().is_empty());

        let text = dispatcher.manager().metrics().export_prometheus_text();
        assert!(text.contains("kind=\"catalog_not_found\""));
    }

    #[tokio::test]
    async fn test_wrong_depth_is_invalid_request() {
        let (dispatcher, _) = dispatcher().await;
        let ctx = RequestContext::default();
        let db = QualifiedName::of_database("mem", "db").unwrap();

        let err = dispatcher.get_table(&ctx, &db).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRequest(_)));
        let err = dispatcher
            .list_databases(&ctx, &db, &ListRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_unsupported_mutation_emits_nothing_and_is_metered() {
        let (dispatcher, events) = dispatcher().await;
        let ctx = RequestContext::default();
        let old = QualifiedName::of_table("mem", "db", "a").unwrap();
        let new = QualifiedName::of_table("mem", "db", "b").unwrap();

        let err = dispatcher.delete_database(&ctx, &old.database_name().unwrap()).await.unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedOperation { .. }));
        assert!(dispatcher.rename_table(&ctx, &old, &new).await.is_err());
        assert!(events.events.lock().is_empty());

        let text = dispatcher.manager().metrics().export_prometheus_text();
        assert!(text.contains("request=\"database.delete\""));
        assert!(text.contains("kind=\"unsupported_operation\""));
    }

    #[tokio::test]
    async fn test_rename_across_catalogs_is_rejected() {
        let (dispatcher, _) = dispatcher().await;
        let err = dispatcher
            .rename_table(
                &RequestContext::default(),
                &QualifiedName::of_table("mem", "db", "a").unwrap(),
                &QualifiedName::of_table("other", "db", "a").unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_partition_batches_are_noops() {
        let (dispatcher, events) = dispatcher().await;
        let ctx = RequestContext::default();
        let table = QualifiedName::of_table("mem", "db", "t").unwrap();

        let response = dispatcher.save_partitions(&ctx, &table, &[]).await.unwrap();
        assert_eq!(response, PartitionsSaveResponse::default());
        dispatcher.delete_partitions(&ctx, &table, &[]).await.unwrap();
        assert!(events.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_paged_stream_follows_tokens() {
        let pages: Vec<Vec<u32>> = vec![vec![1, 2], vec![3, 4], vec![5]];
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let stream = paged(ListRequest::default().with_limit(2), move |req| {
            *counter.lock() += 1;
            let index: usize = req.page_token.as_deref().map(|t| t.parse().unwrap()).unwrap_or(0);
            let items = pages[index].clone();
            let next = (index + 1 < pages.len()).then(|| (index + 1).to_string());
            async move {
                Ok(Page {
                    items,
                    next_page_token: next,
                })
            }
        });

        let first_two: Vec<u32> = stream.take(2).try_collect().await.unwrap();
        assert_eq!(first_two, vec![1, 2]);
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_event_type_labels_match_requests() {
        assert_eq!(EventType::TableUpdated.as_str(), "table.update");
    }
}
