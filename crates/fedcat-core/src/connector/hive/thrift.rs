//! Thrift implementation of [`MetastoreClient`] on the `hive_metastore` crate.

use super::client::{
    HiveColumn, HiveDatabase, HivePartition, HiveStorage, HiveTable, MetastoreClient,
    MetastoreError, MetastoreResult,
};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::{Error, Result};
use ahash::AHashMap;
use async_trait::async_trait;
use faststr::FastStr;
use hive_metastore::{ThriftHiveMetastoreClient, ThriftHiveMetastoreClientBuilder};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use volo_thrift::MaybeException;

/// Fetch every partition in one call.
const ALL_PARTITIONS: i16 = -1;

/// Metastore client speaking the HMS Thrift protocol.
///
/// With several configured URIs the client stays on one endpoint until a
/// transport failure, then moves on to the next.
pub struct ThriftMetastoreClient {
    catalog: String,
    endpoints: Vec<(String, u16)>,
    current: AtomicUsize,
    client: RwLock<Option<ThriftHiveMetastoreClient>>,
    circuit_breaker: CircuitBreaker,
}

impl ThriftMetastoreClient {
    /// Create a client for `thrift://host:port[,thrift://host:port...]`.
    ///
    /// A failed initial connection is logged and retried on the first call.
    pub async fn connect(catalog: &str, uris: &str) -> Result<Self> {
        let endpoints = parse_thrift_uris(uris)?;
        let client = Self {
            catalog: catalog.to_string(),
            endpoints,
            current: AtomicUsize::new(0),
            client: RwLock::new(None),
            circuit_breaker: CircuitBreaker::new(
                CircuitBreakerConfig::new(format!("hive-metastore-{}", catalog))
                    .with_failure_threshold(5)
                    .with_reset_timeout(Duration::from_secs(30))
                    .with_success_threshold(2),
            ),
        };
        if let Err(e) = client.ensure_connected().await {
            warn!(catalog = %catalog, uris = %uris, error = %e, "Initial connection to Hive Metastore failed, will retry on first operation");
        } else {
            info!(catalog = %catalog, endpoint = %client.endpoint(), "Connected to Hive Metastore");
        }
        Ok(client)
    }

    /// `host:port` of the endpoint currently in use.
    fn endpoint(&self) -> String {
        let (host, port) = &self.endpoints[self.current.load(Ordering::SeqCst) % self.endpoints.len()];
        format!("{}:{}", host, port)
    }

    /// Drop the live client and move to the next endpoint.
    fn fail_over(&self) {
        *self.client.write() = None;
        if self.endpoints.len() > 1 {
            let next = (self.current.fetch_add(1, Ordering::SeqCst) + 1) % self.endpoints.len();
            warn!(catalog = %self.catalog, endpoint = %self.endpoint(), index = next, "Failing over to next Hive Metastore");
        }
    }

    async fn ensure_connected(&self) -> MetastoreResult<ThriftHiveMetastoreClient> {
        if let Some(client) = self.client.read().as_ref() {
            return Ok(client.clone());
        }
        let mut last_error = None;
        for _ in 0..self.endpoints.len() {
            let address = self.endpoint();
            let resolved = tokio::net::lookup_host(&address)
                .await
                .map_err(|e| MetastoreError::Transport(format!("Failed to resolve {}: {}", address, e)))
                .and_then(|mut addrs| {
                    addrs
                        .next()
                        .ok_or_else(|| MetastoreError::Transport(format!("No address for {}", address)))
                });
            match resolved {
                Ok(socket_addr) => {
                    debug!(catalog = %self.catalog, address = %socket_addr, "Connecting to Hive Metastore");
                    let client = ThriftHiveMetastoreClientBuilder::new(format!("fedcat-{}", self.catalog))
                        .address(socket_addr)
                        .build();
                    *self.client.write() = Some(client.clone());
                    return Ok(client);
                }
                Err(e) => {
                    last_error = Some(e);
                    self.fail_over();
                }
            }
        }
        Err(last_error.unwrap_or_else(|| MetastoreError::Transport("No metastore endpoints".to_string())))
    }

    /// Run one Thrift call under the circuit breaker.
    async fn invoke<T, E, CE, F, Fut>(&self, operation: &str, f: F) -> MetastoreResult<T>
    where
        E: Debug,
        CE: Display,
        F: FnOnce(ThriftHiveMetastoreClient) -> Fut,
        Fut: Future<Output = std::result::Result<MaybeException<T, E>, CE>>,
    {
        if !self.circuit_breaker.is_allowed() {
            return Err(MetastoreError::Transport(format!(
                "Circuit breaker is open, {} blocked",
                operation
            )));
        }
        let client = match self.ensure_connected().await {
            Ok(client) => client,
            Err(e) => {
                self.circuit_breaker.record_failure();
                return Err(e);
            }
        };
        let result = match f(client).await {
            Ok(MaybeException::Ok(value)) => Ok(value),
            Ok(MaybeException::Exception(e)) => Err(MetastoreError::from_message(format!("{:?}", e))),
            Err(e) => {
                let message = e.to_string();
                match MetastoreError::from_message(message.clone()) {
                    MetastoreError::Meta(_) => Err(MetastoreError::Transport(format!(
                        "{} failed: {}",
                        operation, message
                    ))),
                    classified => Err(classified),
                }
            }
        };
        match &result {
            Err(MetastoreError::Transport(_)) | Err(MetastoreError::Meta(_)) => {
                self.circuit_breaker.record_failure();
                self.fail_over();
            }
            _ => self.circuit_breaker.record_success(),
        }
        result
    }
}

#[async_trait]
impl MetastoreClient for ThriftMetastoreClient {
    async fn get_all_databases(&self) -> MetastoreResult<Vec<String>> {
        let names = self
            .invoke("get_all_databases", |c| async move { c.get_all_databases().await })
            .await?;
        Ok(names.into_iter().map(|s| s.to_string()).collect())
    }

    async fn get_database(&self, db: &str) -> MetastoreResult<HiveDatabase> {
        let db = fs(db);
        let database = self
            .invoke("get_database", |c| async move { c.get_database(db).await })
            .await?;
        Ok(from_thrift_database(&database))
    }

    async fn create_database(&self, database: &HiveDatabase) -> MetastoreResult<()> {
        let database = to_thrift_database(database);
        self.invoke("create_database", |c| async move { c.create_database(database).await })
            .await
    }

    async fn alter_database(&self, db: &str, database: &HiveDatabase) -> MetastoreResult<()> {
        let (db, database) = (fs(db), to_thrift_database(database));
        self.invoke("alter_database", |c| async move { c.alter_database(db, database).await })
            .await
    }

    async fn drop_database(&self, db: &str) -> MetastoreResult<()> {
        let db = fs(db);
        self.invoke("drop_database", |c| async move {
            c.drop_database(db, false, false).await
        })
        .await
    }

    async fn get_all_tables(&self, db: &str) -> MetastoreResult<Vec<String>> {
        let db = fs(db);
        let names = self
            .invoke("get_all_tables", |c| async move { c.get_all_tables(db).await })
            .await?;
        Ok(names.into_iter().map(|s| s.to_string()).collect())
    }

    async fn get_table(&self, db: &str, table: &str) -> MetastoreResult<HiveTable> {
        let (db, table) = (fs(db), fs(table));
        let hive_table = self
            .invoke("get_table", |c| async move { c.get_table(db, table).await })
            .await?;
        Ok(from_thrift_table(&hive_table))
    }

    async fn create_table(&self, table: &HiveTable) -> MetastoreResult<()> {
        let table = to_thrift_table(table);
        self.invoke("create_table", |c| async move { c.create_table(table).await })
            .await
    }

    async fn alter_table(&self, db: &str, name: &str, table: &HiveTable) -> MetastoreResult<()> {
        let (db, name, table) = (fs(db), fs(name), to_thrift_table(table));
        self.invoke("alter_table", |c| async move { c.alter_table(db, name, table).await })
            .await
    }

    async fn drop_table(&self, db: &str, table: &str) -> MetastoreResult<()> {
        let (db, table) = (fs(db), fs(table));
        self.invoke("drop_table", |c| async move { c.drop_table(db, table, false).await })
            .await
    }

    async fn get_partition_names(&self, db: &str, table: &str) -> MetastoreResult<Vec<String>> {
        let (db, table) = (fs(db), fs(table));
        let names = self
            .invoke("get_partition_names", |c| async move {
                c.get_partition_names(db, table, ALL_PARTITIONS).await
            })
            .await?;
        Ok(names.into_iter().map(|s| s.to_string()).collect())
    }

    async fn get_partitions(&self, db: &str, table: &str) -> MetastoreResult<Vec<HivePartition>> {
        let (db, table) = (fs(db), fs(table));
        let partitions = self
            .invoke("get_partitions", |c| async move {
                c.get_partitions(db, table, ALL_PARTITIONS).await
            })
            .await?;
        Ok(partitions.iter().map(from_thrift_partition).collect())
    }

    async fn get_partition_by_name(
        &self,
        db: &str,
        table: &str,
        partition_name: &str,
    ) -> MetastoreResult<HivePartition> {
        let (db, table, name) = (fs(db), fs(table), fs(partition_name));
        let partition = self
            .invoke("get_partition_by_name", |c| async move {
                c.get_partition_by_name(db, table, name).await
            })
            .await?;
        Ok(from_thrift_partition(&partition))
    }

    async fn add_partitions(&self, partitions: &[HivePartition]) -> MetastoreResult<()> {
        if partitions.is_empty() {
            return Ok(());
        }
        let parts: Vec<_> = partitions.iter().map(to_thrift_partition).collect();
        self.invoke("add_partitions", |c| async move { c.add_partitions(parts).await })
            .await
            .map(|added| debug!(catalog = %self.catalog, added, "Added Hive partitions"))
    }

    async fn alter_partitions(
        &self,
        db: &str,
        table: &str,
        partitions: &[HivePartition],
    ) -> MetastoreResult<()> {
        if partitions.is_empty() {
            return Ok(());
        }
        let (db, table) = (fs(db), fs(table));
        let parts: Vec<_> = partitions.iter().map(to_thrift_partition).collect();
        self.invoke("alter_partitions", |c| async move {
            c.alter_partitions(db, table, parts).await
        })
        .await
    }

    async fn drop_partition_by_name(
        &self,
        db: &str,
        table: &str,
        partition_name: &str,
    ) -> MetastoreResult<()> {
        let (db, table, name) = (fs(db), fs(table), fs(partition_name));
        let dropped = self
            .invoke("drop_partition_by_name", |c| async move {
                c.drop_partition_by_name(db, table, name, false).await
            })
            .await?;
        if !dropped {
            return Err(MetastoreError::NoSuchObject(partition_name.to_string()));
        }
        Ok(())
    }

    async fn close(&self) {
        *self.client.write() = None;
        info!(catalog = %self.catalog, "Hive Metastore client closed");
    }
}

/// Parse comma-separated Thrift URIs (thrift://host:port) into endpoints.
pub(crate) fn parse_thrift_uris(uris: &str) -> Result<Vec<(String, u16)>> {
    let endpoints = uris
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(parse_thrift_uri)
        .collect::<Result<Vec<_>>>()?;
    if endpoints.is_empty() {
        return Err(Error::Config(format!("No Hive Metastore URI in '{}'", uris)));
    }
    Ok(endpoints)
}

/// Parse one Thrift URI into host and port.
fn parse_thrift_uri(uri: &str) -> Result<(String, u16)> {
    let address = uri.strip_prefix("thrift://").unwrap_or(uri);
    let (host, port) = address.rsplit_once(':').ok_or_else(|| {
        Error::Config(format!(
            "Invalid Hive Metastore URI format: {}. Expected thrift://host:port",
            uri
        ))
    })?;
    if host.is_empty() {
        return Err(Error::Config(format!("Missing host in Hive Metastore URI: {}", uri)));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| Error::Config(format!("Invalid port in Hive Metastore URI: {}", port)))?;
    Ok((host.to_string(), port))
}

// Conversions between the native model and the generated Thrift structs

fn fs(s: &str) -> FastStr {
    FastStr::from(s.to_string())
}

fn opt_string(s: &Option<FastStr>) -> Option<String> {
    s.as_ref().map(|v| v.to_string())
}

fn to_params(map: &BTreeMap<String, String>) -> Option<AHashMap<FastStr, FastStr>> {
    if map.is_empty() {
        return None;
    }
    Some(map.iter().map(|(k, v)| (fs(k), fs(v))).collect())
}

fn from_params(map: &Option<AHashMap<FastStr, FastStr>>) -> BTreeMap<String, String> {
    map.as_ref()
        .map(|p| p.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        .unwrap_or_default()
}

fn to_thrift_columns(cols: &[HiveColumn]) -> Vec<hive_metastore::FieldSchema> {
    cols.iter()
        .map(|c| hive_metastore::FieldSchema {
            name: Some(fs(&c.name)),
            r#type: Some(fs(&c.type_name)),
            comment: c.comment.as_deref().map(fs),
        })
        .collect()
}

fn from_thrift_columns(cols: &Option<Vec<hive_metastore::FieldSchema>>) -> Vec<HiveColumn> {
    cols.as_ref()
        .map(|cols| {
            cols.iter()
                .map(|c| HiveColumn {
                    name: opt_string(&c.name).unwrap_or_default(),
                    type_name: opt_string(&c.r#type).unwrap_or_else(|| "string".into()),
                    comment: opt_string(&c.comment),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn to_thrift_storage(sd: &HiveStorage) -> hive_metastore::StorageDescriptor {
    hive_metastore::StorageDescriptor {
        cols: Some(to_thrift_columns(&sd.cols)),
        location: sd.location.as_deref().map(fs),
        input_format: sd.input_format.as_deref().map(fs),
        output_format: sd.output_format.as_deref().map(fs),
        serde_info: Some(hive_metastore::SerDeInfo {
            name: None,
            serialization_lib: sd.serialization_lib.as_deref().map(fs),
            parameters: to_params(&sd.serde_parameters),
        }),
        compressed: Some(false),
        num_buckets: Some(-1),
        bucket_cols: None,
        sort_cols: None,
        parameters: None,
        skewed_info: None,
        stored_as_sub_directories: Some(false),
    }
}

fn from_thrift_storage(sd: &Option<hive_metastore::StorageDescriptor>) -> HiveStorage {
    let Some(sd) = sd else {
        return HiveStorage::default();
    };
    HiveStorage {
        location: opt_string(&sd.location),
        input_format: opt_string(&sd.input_format),
        output_format: opt_string(&sd.output_format),
        serialization_lib: sd
            .serde_info
            .as_ref()
            .and_then(|s| opt_string(&s.serialization_lib)),
        serde_parameters: sd
            .serde_info
            .as_ref()
            .map(|s| from_params(&s.parameters))
            .unwrap_or_default(),
        cols: from_thrift_columns(&sd.cols),
    }
}

fn to_thrift_database(db: &HiveDatabase) -> hive_metastore::Database {
    hive_metastore::Database {
        name: Some(fs(&db.name)),
        description: db.description.as_deref().map(fs),
        location_uri: db.location_uri.as_deref().map(fs),
        parameters: to_params(&db.parameters),
        privileges: None,
        owner_name: db.owner_name.as_deref().map(fs),
        owner_type: None,
        catalog_name: None,
    }
}

fn from_thrift_database(db: &hive_metastore::Database) -> HiveDatabase {
    HiveDatabase {
        name: opt_string(&db.name).unwrap_or_default(),
        description: opt_string(&db.description),
        location_uri: opt_string(&db.location_uri),
        owner_name: opt_string(&db.owner_name),
        parameters: from_params(&db.parameters),
    }
}

fn to_thrift_table(table: &HiveTable) -> hive_metastore::Table {
    hive_metastore::Table {
        table_name: Some(fs(&table.table_name)),
        db_name: Some(fs(&table.db_name)),
        owner: table.owner.as_deref().map(fs),
        create_time: table.create_time,
        last_access_time: Some(0),
        retention: Some(0),
        sd: Some(to_thrift_storage(&table.sd)),
        partition_keys: Some(to_thrift_columns(&table.partition_keys)),
        parameters: to_params(&table.parameters),
        view_original_text: None,
        view_expanded_text: None,
        table_type: table.table_type.as_deref().map(fs),
        privileges: None,
        temporary: Some(false),
        rewrite_enabled: None,
        cat_name: None,
    }
}

fn from_thrift_table(table: &hive_metastore::Table) -> HiveTable {
    HiveTable {
        db_name: opt_string(&table.db_name).unwrap_or_default(),
        table_name: opt_string(&table.table_name).unwrap_or_default(),
        owner: opt_string(&table.owner),
        create_time: table.create_time,
        table_type: opt_string(&table.table_type),
        sd: from_thrift_storage(&table.sd),
        partition_keys: from_thrift_columns(&table.partition_keys),
        parameters: from_params(&table.parameters),
    }
}

fn to_thrift_partition(partition: &HivePartition) -> hive_metastore::Partition {
    hive_metastore::Partition {
        values: Some(partition.values.iter().map(|v| fs(v)).collect()),
        db_name: Some(fs(&partition.db_name)),
        table_name: Some(fs(&partition.table_name)),
        create_time: partition.create_time,
        last_access_time: Some(0),
        sd: Some(to_thrift_storage(&partition.sd)),
        parameters: to_params(&partition.parameters),
        ..Default::default()
    }
}

fn from_thrift_partition(partition: &hive_metastore::Partition) -> HivePartition {
    HivePartition {
        db_name: opt_string(&partition.db_name).unwrap_or_default(),
        table_name: opt_string(&partition.table_name).unwrap_or_default(),
        values: partition
            .values
            .as_ref()
            .map(|v| v.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default(),
        create_time: partition.create_time,
        sd: from_thrift_storage(&partition.sd),
        parameters: from_params(&partition.parameters),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_thrift_uri() {
        let (host, port) = parse_thrift_uri("thrift://localhost:9083").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 9083);

        let (host, port) = parse_thrift_uri("metastore.example.com:9083").unwrap();
        assert_eq!(host, "metastore.example.com");
        assert_eq!(port, 9083);

        let endpoints = parse_thrift_uris("thrift://a:9083, thrift://b:9084,").unwrap();
        assert_eq!(endpoints, vec![("a".to_string(), 9083), ("b".to_string(), 9084)]);
    }

    #[test]
    fn test_parse_thrift_uri_invalid() {
        assert!(parse_thrift_uri("localhost").is_err());
        assert!(parse_thrift_uri("localhost:invalid").is_err());
        assert!(parse_thrift_uri("thrift://:9083").is_err());
        assert!(parse_thrift_uris(" , ").is_err());
        assert!(parse_thrift_uris("thrift://a:9083,thrift://b").is_err());
    }

    #[tokio::test]
    async fn test_unresolvable_endpoint_fails_over() {
        let client = ThriftMetastoreClient::connect(
            "failover",
            "thrift://no-such-host.invalid:9083,thrift://127.0.0.1:9083",
        )
        .await
        .unwrap();
        // The bad host is skipped during connection, the client does not dial until a call
        assert_eq!(client.endpoint(), "127.0.0.1:9083");
        assert!(client.client.read().is_some());

        client.fail_over();
        assert_eq!(client.endpoint(), "no-such-host.invalid:9083");
        assert!(client.client.read().is_none());
    }

    #[test]
    fn test_table_conversion_keeps_storage_and_keys() {
        let mut table = HiveTable {
            db_name: "sales".into(),
            table_name: "orders".into(),
            owner: Some("etl".into()),
            create_time: Some(1_700_000_000),
            table_type: Some("EXTERNAL_TABLE".into()),
            ..Default::default()
        };
        table.sd.location = Some("s3://bucket/sales/orders".into());
        table.sd.cols = vec![HiveColumn::new("id", "bigint")];
        table.partition_keys = vec![HiveColumn::new("dateint", "int")];
        table.parameters.insert("EXTERNAL".into(), "TRUE".into());

        let back = from_thrift_table(&to_thrift_table(&table));
        assert_eq!(back, table);
    }

    #[tokio::test]
    #[ignore = "requires Hive Metastore Docker container"]
    async fn test_thrift_client_lists_databases() {
        let client = ThriftMetastoreClient::connect("it", "thrift://localhost:9083")
            .await
            .unwrap();
        let databases = client.get_all_databases().await.unwrap();
        assert!(databases.contains(&"default".to_string()));
    }
}
