//! Direct SQL access to the metastore's backing database.
//!
//! Only the two lookups of the fast path go through here. Both read the
//! `DBS`, `TBLS` and `SDS` tables of the standard metastore schema.

use crate::error::{CatalogError, CatalogResult};
use async_trait::async_trait;
use tracing::{debug, info};

/// One row of a location lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLocation {
    pub database: String,
    pub table: String,
    pub location: String,
}

#[async_trait]
pub trait MetastoreDataSource: Send + Sync {
    /// Whether `database.table` is registered.
    async fn table_exists(&self, database: &str, table: &str) -> CatalogResult<bool>;

    /// Tables whose storage location equals, or with `prefix` starts with, one of `uris`.
    async fn tables_by_location(
        &self,
        uris: &[String],
        prefix: bool,
    ) -> CatalogResult<Vec<TableLocation>>;

    /// Close the pool.
    fn close(&self);
}

/// Open a data source from a `sqlite://` or `postgres://` url.
pub fn from_url(url: &str, max_connections: usize) -> crate::Result<Box<dyn MetastoreDataSource>> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        Ok(Box::new(SqliteDataSource::open(path, max_connections)?))
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Box::new(PostgresDataSource::open(url, max_connections)?))
    } else {
        Err(crate::Error::Config(format!(
            "Unsupported fast path datasource url: {}",
            url
        )))
    }
}

/// Append the location predicate for `count` uris, numbering placeholders with `placeholder`.
fn location_clause(
    sql: &mut String,
    column: &str,
    count: usize,
    prefix: bool,
    placeholder: impl Fn(usize) -> String,
) {
    if prefix {
        sql.push_str(" and (1=0");
        for i in 0..count {
            sql.push_str(&format!(" or {} like {}", column, placeholder(i)));
        }
        sql.push(')');
    } else {
        let params: Vec<String> = (0..count).map(&placeholder).collect();
        sql.push_str(&format!(" and {} in ({})", column, params.join(",")));
    }
}

/// Escape LIKE wildcards in a location and append the match-all suffix.
fn like_pattern(uri: &str) -> String {
    let mut pattern = String::with_capacity(uri.len() + 1);
    for c in uri.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn bind_values(uris: &[String], prefix: bool) -> Vec<String> {
    if prefix {
        uris.iter().map(|u| like_pattern(u)).collect()
    } else {
        uris.to_vec()
    }
}

const SQLITE_EXISTS: &str = "select 1 from DBS d join TBLS t on d.DB_ID = t.DB_ID \
     where d.NAME = ?1 and t.TBL_NAME = ?2 limit 1";

const SQLITE_TABLES_BY_LOCATION: &str = "select d.NAME, t.TBL_NAME, s.LOCATION \
     from DBS d, TBLS t, SDS s where d.DB_ID = t.DB_ID and t.SD_ID = s.SD_ID";

/// SQLite-backed metastore database.
pub struct SqliteDataSource {
    pool: deadpool_sqlite::Pool,
}

impl SqliteDataSource {
    pub fn open(path: &str, max_connections: usize) -> crate::Result<Self> {
        let pool = deadpool_sqlite::Config::new(path)
            .builder(deadpool_sqlite::Runtime::Tokio1)
            .map_err(|e| crate::Error::Config(format!("Invalid sqlite datasource: {}", e)))?
            .max_size(max_connections)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build sqlite pool: {}", e)))?;
        info!(path = %path, max_connections, "Opened SQLite metastore datasource");
        Ok(Self { pool })
    }

    async fn interact<T, F>(&self, f: F) -> CatalogResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| CatalogError::unavailable_with("sqlite pool exhausted", e))?;
        conn.interact(f)
            .await
            .map_err(|e| CatalogError::unavailable(format!("sqlite interaction failed: {}", e)))?
            .map_err(|e| CatalogError::unavailable_with("sqlite query failed", e))
    }
}

#[async_trait]
impl MetastoreDataSource for SqliteDataSource {
    async fn table_exists(&self, database: &str, table: &str) -> CatalogResult<bool> {
        let (database, table) = (database.to_string(), table.to_string());
        self.interact(move |conn| {
            let mut stmt = conn.prepare_cached(SQLITE_EXISTS)?;
            stmt.exists(rusqlite::params![database, table])
        })
        .await
    }

    async fn tables_by_location(
        &self,
        uris: &[String],
        prefix: bool,
    ) -> CatalogResult<Vec<TableLocation>> {
        let mut sql = SQLITE_TABLES_BY_LOCATION.to_string();
        location_clause(&mut sql, "s.LOCATION", uris.len(), prefix, |i| {
            format!("?{}", i + 1)
        });
        if prefix {
            // SQLite has no default LIKE escape character.
            sql = add_sqlite_escape(&sql);
        }
        let values = bind_values(uris, prefix);
        debug!(sql = %sql, uris = values.len(), "Fast path location lookup");
        self.interact(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
                Ok(TableLocation {
                    database: row.get(0)?,
                    table: row.get(1)?,
                    location: row.get(2)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    fn close(&self) {
        self.pool.close();
    }
}

/// Attach `escape '\'` to every numbered LIKE placeholder.
fn add_sqlite_escape(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut rest = sql;
    while let Some(idx) = rest.find(" like ?") {
        let (head, tail) = rest.split_at(idx + " like ?".len());
        out.push_str(head);
        let digits = tail.chars().take_while(|c| c.is_ascii_digit()).count();
        out.push_str(&tail[..digits]);
        out.push_str(" escape '\\'");
        rest = &tail[digits..];
    }
    out.push_str(rest);
    out
}

const POSTGRES_EXISTS: &str = "select 1 from \"DBS\" d join \"TBLS\" t on d.\"DB_ID\" = t.\"DB_ID\" \
     where d.\"NAME\" = $1 and t.\"TBL_NAME\" = $2 limit 1";

const POSTGRES_TABLES_BY_LOCATION: &str = "select d.\"NAME\", t.\"TBL_NAME\", s.\"LOCATION\" \
     from \"DBS\" d, \"TBLS\" t, \"SDS\" s \
     where d.\"DB_ID\" = t.\"DB_ID\" and t.\"SD_ID\" = s.\"SD_ID\"";

/// PostgreSQL-backed metastore database.
pub struct PostgresDataSource {
    pool: deadpool_postgres::Pool,
}

impl PostgresDataSource {
    pub fn open(url: &str, max_connections: usize) -> crate::Result<Self> {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some(url.to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(max_connections));
        let pool = cfg
            .create_pool(
                Some(deadpool_postgres::Runtime::Tokio1),
                tokio_postgres::NoTls,
            )
            .map_err(|e| crate::Error::Config(format!("Failed to build postgres pool: {}", e)))?;
        info!(max_connections, "Opened PostgreSQL metastore datasource");
        Ok(Self { pool })
    }

    async fn client(&self) -> CatalogResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| CatalogError::unavailable_with("postgres pool exhausted", e))
    }
}

#[async_trait]
impl MetastoreDataSource for PostgresDataSource {
    async fn table_exists(&self, database: &str, table: &str) -> CatalogResult<bool> {
        let client = self.client().await?;
        let row = client
            .query_opt(POSTGRES_EXISTS, &[&database, &table])
            .await
            .map_err(|e| CatalogError::unavailable_with("postgres query failed", e))?;
        Ok(row.is_some())
    }

    async fn tables_by_location(
        &self,
        uris: &[String],
        prefix: bool,
    ) -> CatalogResult<Vec<TableLocation>> {
        let mut sql = POSTGRES_TABLES_BY_LOCATION.to_string();
        location_clause(&mut sql, "s.\"LOCATION\"", uris.len(), prefix, |i| {
            format!("${}", i + 1)
        });
        let values = bind_values(uris, prefix);
        let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = values
            .iter()
            .map(|v| v as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();
        debug!(sql = %sql, uris = values.len(), "Fast path location lookup");

        let client = self.client().await?;
        let rows = client
            .query(sql.as_str(), &params)
            .await
            .map_err(|e| CatalogError::unavailable_with("postgres query failed", e))?;
        rows.iter()
            .map(|row| {
                Ok(TableLocation {
                    database: row.try_get(0).map_err(pg_column_error)?,
                    table: row.try_get(1).map_err(pg_column_error)?,
                    location: row.try_get(2).map_err(pg_column_error)?,
                })
            })
            .collect()
    }

    fn close(&self) {
        self.pool.close();
    }
}

fn pg_column_error(e: tokio_postgres::Error) -> CatalogError {
    CatalogError::unavailable_with("unexpected metastore row", e)
}
