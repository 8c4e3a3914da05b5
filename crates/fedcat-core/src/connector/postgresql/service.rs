//! Database and table services over a PostgreSQL database.
//!
//! One catalog is one PostgreSQL database. Its schemas are exposed as
//! databases and its tables and views as tables. PostgreSQL has no
//! metastore-style partitions, so the partition service keeps the
//! unsupported defaults.

use super::converter::{is_system_schema, quote_ident, ColumnRow, PostgresTypeConverter};
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
use tokio_postgres::error::SqlState;
use tracing::{debug, info};

const SCHEMA: &str = "select schema_name::text, schema_owner::text \
     from information_schema.schemata where schema_name = $1";

const SCHEMAS: &str = "select schema_name::text from information_schema.schemata \
     order by schema_name";

const TABLE: &str = "select t.table_type::text, \
            pg_catalog.pg_get_userbyid(k.relowner)::text, \
            pg_catalog.obj_description(k.oid, 'pg_class') \
     from information_schema.tables t \
     join pg_catalog.pg_namespace n on n.nspname = t.table_schema \
     join pg_catalog.pg_class k on k.relnamespace = n.oid and k.relname = t.table_name \
     where t.table_schema = $1 and t.table_name = $2";

const TABLE_EXISTS: &str = "select 1 from information_schema.tables \
     where table_schema = $1 and table_name = $2";

const TABLES: &str = "select table_name::text from information_schema.tables \
     where table_schema = $1 order by table_name";

const COLUMNS: &str = "select c.column_name::text, c.data_type::text, c.udt_name::text, \
            c.is_nullable::text, c.character_maximum_length::int, \
            c.numeric_precision::int, c.numeric_scale::int, c.ordinal_position::int, \
            d.description \
     from information_schema.columns c \
     join pg_catalog.pg_namespace n on n.nspname = c.table_schema \
     join pg_catalog.pg_class k on k.relnamespace = n.oid and k.relname = c.table_name \
     join pg_catalog.pg_attribute a on a.attrelid = k.oid and a.attname = c.column_name \
     left join pg_catalog.pg_description d on d.objoid = k.oid and d.objsubid = a.attnum \
     where c.table_schema = $1 and c.table_name = $2 \
     order by c.ordinal_position";

/// Table property carrying `information_schema.tables.table_type`.
pub const TABLE_TYPE_PROPERTY: &str = "table_type";
/// Table property carrying the table comment.
pub const COMMENT_PROPERTY: &str = "comment";

/// Shared state of one PostgreSQL catalog.
pub struct PostgresContext {
    pub catalog: String,
    pub pool: deadpool_postgres::Pool,
    pub converter: PostgresTypeConverter,
    pub request_timeout: Duration,
    pub allow_rename: bool,
    pub metrics: Arc<CatalogMetrics>,
}

impl PostgresContext {
    async fn call<T, F>(&self, ctx: &RequestContext, request: &str, fut: F) -> CatalogResult<T>
    where
        F: Future<Output = CatalogResult<T>>,
    {
        let _timer = self
            .metrics
            .start_request(&self.catalog, request, Strategy::Client);
        with_deadline(ctx, self.request_timeout, request, fut).await
    }

    pub(crate) async fn client(&self) -> CatalogResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| CatalogError::unavailable_with("postgres pool exhausted", e))
    }

    async fn schema_exists(&self, schema: &str) -> CatalogResult<bool> {
        let client = self.client().await?;
        let row = client
            .query_opt(SCHEMA, &[&schema])
            .await
            .map_err(query_error)?;
        Ok(row.is_some())
    }
}

/// Map a PostgreSQL error onto the catalog error kinds.
///
/// `missing` names the entity reported when an object does not exist and
/// `conflict` the one reported when an object already exists.
pub(crate) fn translate(
    e: tokio_postgres::Error,
    missing: &QualifiedName,
    conflict: &QualifiedName,
) -> CatalogError {
    match e.code().and_then(|code| classify(code, missing, conflict)) {
        Some(err) => err,
        None => query_error(e),
    }
}

fn classify(code: &SqlState, missing: &QualifiedName, conflict: &QualifiedName) -> Option<CatalogError> {
    if *code == SqlState::INVALID_SCHEMA_NAME || *code == SqlState::UNDEFINED_TABLE {
        Some(CatalogError::not_found(missing))
    } else if *code == SqlState::DUPLICATE_SCHEMA || *code == SqlState::DUPLICATE_TABLE {
        Some(CatalogError::already_exists(conflict))
    } else if *code == SqlState::DEPENDENT_OBJECTS_STILL_EXIST {
        Some(CatalogError::constraint(format!("'{}' still has dependent objects", missing)))
    } else if *code == SqlState::INSUFFICIENT_PRIVILEGE {
        Some(CatalogError::constraint(format!("permission denied on '{}'", missing)))
    } else {
        None
    }
}

fn query_error(e: tokio_postgres::Error) -> CatalogError {
    CatalogError::unavailable_with("postgres query failed", e)
}

fn schema_of(name: &QualifiedName) -> CatalogResult<&str> {
    name.database()
        .ok_or_else(|| CatalogError::InvalidRequest(format!("'{}' has no database", name)))
}

fn table_of(name: &QualifiedName) -> CatalogResult<(&str, &str)> {
    match (name.database(), name.table()) {
        (Some(schema), Some(table)) => Ok((schema, table)),
        _ => Err(CatalogError::InvalidRequest(format!("'{}' is not a table name", name))),
    }
}

/// Sorted, filtered page of child names under `parent`.
fn child_page(
    names: Vec<String>,
    request: &ListRequest,
    child: impl Fn(&str) -> CatalogResult<QualifiedName>,
) -> CatalogResult<Page<QualifiedName>> {
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

/// Schema DDL for `info`. An owner becomes the schema's `authorization`.
pub(crate) fn create_schema_sql(schema: &str, owner: Option<&str>) -> String {
    match owner {
        Some(owner) => format!(
            "create schema {} authorization {}",
            quote_ident(schema),
            quote_ident(owner)
        ),
        None => format!("create schema {}", quote_ident(schema)),
    }
}

/// Rename statements moving `old` to `new`, possibly across schemas.
pub(crate) fn rename_sql(old: (&str, &str), new: (&str, &str)) -> Vec<String> {
    let mut statements = Vec::new();
    let (mut schema, table) = old;
    if schema != new.0 {
        statements.push(format!(
            "alter table {}.{} set schema {}",
            quote_ident(schema),
            quote_ident(table),
            quote_ident(new.0)
        ));
        schema = new.0;
    }
    if table != new.1 {
        statements.push(format!(
            "alter table {}.{} rename to {}",
            quote_ident(schema),
            quote_ident(table),
            quote_ident(new.1)
        ));
    }
    statements
}

pub struct PostgresDatabaseService {
    pg: Arc<PostgresContext>,
}

impl PostgresDatabaseService {
    pub fn new(pg: Arc<PostgresContext>) -> Self {
        Self { pg }
    }
}

#[async_trait]
impl ConnectorDatabaseService for PostgresDatabaseService {
    async fn get(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<DatabaseInfo> {
        let schema = schema_of(name)?;
        let row = self
            .pg
            .call(ctx, "database.get", async {
                let client = self.pg.client().await?;
                client.query_opt(SCHEMA, &[&schema]).await.map_err(query_error)
            })
            .await?
            .ok_or_else(|| CatalogError::not_found(name))?;
        let mut info = DatabaseInfo::new(name.clone());
        info.owner = row.try_get(1).map_err(query_error)?;
        Ok(info)
    }

    async fn create(&self, ctx: &RequestContext, info: &DatabaseInfo) -> CatalogResult<()> {
        let schema = schema_of(&info.name)?;
        let sql = create_schema_sql(schema, info.owner.as_deref());
        self.pg
            .call(ctx, "database.create", async {
                let client = self.pg.client().await?;
                client
                    .batch_execute(&sql)
                    .await
                    .map_err(|e| translate(e, &info.name, &info.name))
            })
            .await?;
        info!(catalog = %self.pg.catalog, database = %info.name, "Created schema");
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        let schema = schema_of(name)?;
        let sql = format!("drop schema {}", quote_ident(schema));
        self.pg
            .call(ctx, "database.delete", async {
                let client = self.pg.client().await?;
                client
                    .batch_execute(&sql)
                    .await
                    .map_err(|e| translate(e, name, name))
            })
            .await?;
        info!(catalog = %self.pg.catalog, database = %name, "Dropped schema");
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
        let rows = self
            .pg
            .call(ctx, "database.list", async {
                let client = self.pg.client().await?;
                client.query(SCHEMAS, &[]).await.map_err(query_error)
            })
            .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in &rows {
            let schema: String = row.try_get(0).map_err(query_error)?;
            if !is_system_schema(&schema) {
                names.push(schema);
            }
        }
        child_page(names, request, |schema| parent.database_child(schema))
    }
}

pub struct PostgresTableService {
    pg: Arc<PostgresContext>,
}

impl PostgresTableService {
    pub fn new(pg: Arc<PostgresContext>) -> Self {
        Self { pg }
    }
}

#[async_trait]
impl ConnectorTableService for PostgresTableService {
    async fn exists(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<bool> {
        let (schema, table) = table_of(name)?;
        self.pg
            .call(ctx, "table.exists", async {
                let client = self.pg.client().await?;
                let row = client
                    .query_opt(TABLE_EXISTS, &[&schema, &table])
                    .await
                    .map_err(query_error)?;
                Ok(row.is_some())
            })
            .await
    }

    async fn get(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<TableInfo> {
        let (schema, table) = table_of(name)?;
        let (table_row, column_rows) = self
            .pg
            .call(ctx, "table.get", async {
                let client = self.pg.client().await?;
                let table_row = client
                    .query_opt(TABLE, &[&schema, &table])
                    .await
                    .map_err(query_error)?;
                let column_rows = match table_row {
                    Some(_) => client
                        .query(COLUMNS, &[&schema, &table])
                        .await
                        .map_err(query_error)?,
                    None => Vec::new(),
                };
                Ok((table_row, column_rows))
            })
            .await?;
        let table_row = table_row.ok_or_else(|| CatalogError::not_found(name))?;

        let mut info = TableInfo::new(name.clone());
        let table_type: String = table_row.try_get(0).map_err(query_error)?;
        info.properties.insert(TABLE_TYPE_PROPERTY.to_string(), table_type);
        info.owner = table_row.try_get(1).map_err(query_error)?;
        if let Some(comment) = table_row.try_get::<_, Option<String>>(2).map_err(query_error)? {
            info.properties.insert(COMMENT_PROPERTY.to_string(), comment);
        }
        for row in &column_rows {
            let column = ColumnRow {
                column_name: row.try_get(0).map_err(query_error)?,
                data_type: row.try_get(1).map_err(query_error)?,
                udt_name: row.try_get(2).map_err(query_error)?,
                is_nullable: row.try_get(3).map_err(query_error)?,
                character_maximum_length: row.try_get(4).map_err(query_error)?,
                numeric_precision: row.try_get(5).map_err(query_error)?,
                numeric_scale: row.try_get(6).map_err(query_error)?,
                ordinal_position: row.try_get(7).map_err(query_error)?,
                comment: row.try_get(8).map_err(query_error)?,
            };
            info.fields.push(column.to_field(&self.pg.converter));
        }
        Ok(info)
    }

    async fn delete(&self, ctx: &RequestContext, name: &QualifiedName) -> CatalogResult<()> {
        let (schema, table) = table_of(name)?;
        let sql = format!("drop table {}.{}", quote_ident(schema), quote_ident(table));
        self.pg
            .call(ctx, "table.delete", async {
                let client = self.pg.client().await?;
                client
                    .batch_execute(&sql)
                    .await
                    .map_err(|e| translate(e, name, name))
            })
            .await?;
        info!(catalog = %self.pg.catalog, table = %name, "Dropped table");
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
        let schema = schema_of(parent)?;
        let rows = self
            .pg
            .call(ctx, "table.list", async {
                if !self.pg.schema_exists(schema).await? {
                    return Err(CatalogError::not_found(parent));
                }
                let client = self.pg.client().await?;
                client.query(TABLES, &[&schema]).await.map_err(query_error)
            })
            .await?;
        let names = rows
            .iter()
            .map(|row| row.try_get::<_, String>(0).map_err(query_error))
            .collect::<CatalogResult<Vec<_>>>()?;
        child_page(names, request, |table| parent.table_child(table))
    }

    async fn rename(
        &self,
        ctx: &RequestContext,
        old_name: &QualifiedName,
        new_name: &QualifiedName,
    ) -> CatalogResult<()> {
        if !self.pg.allow_rename {
            return Err(CatalogError::unsupported(&self.pg.catalog, "table.rename"));
        }
        let statements = rename_sql(table_of(old_name)?, table_of(new_name)?);
        debug!(from = %old_name, to = %new_name, statements = statements.len(), "Renaming table");
        self.pg
            .call(ctx, "table.rename", async {
                let mut client = self.pg.client().await?;
                let tx = client
                    .transaction()
                    .await
                    .map_err(query_error)?;
                for sql in &statements {
                    tx.batch_execute(sql)
                        .await
                        .map_err(|e| translate(e, old_name, new_name))?;
                }
                tx.commit().await.map_err(query_error)
            })
            .await?;
        info!(catalog = %self.pg.catalog, from = %old_name, to = %new_name, "Renamed table");
        Ok(())
    }
}

/// PostgreSQL tables carry no partitions of their own.
pub struct PostgresPartitionService;

impl ConnectorPartitionService for PostgresPartitionService {}
