//! Hive metastore client abstraction.
//!
//! The services talk to the metastore through [`MetastoreClient`], which
//! speaks in the metastore's own vocabulary (databases, tables, partitions
//! with storage descriptors). The production implementation is
//! [`super::thrift::ThriftMetastoreClient`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors as the metastore reports them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetastoreError {
    #[error("NoSuchObjectException: {0}")]
    NoSuchObject(String),

    #[error("AlreadyExistsException: {0}")]
    AlreadyExists(String),

    #[error("InvalidObjectException: {0}")]
    InvalidObject(String),

    #[error("InvalidOperationException: {0}")]
    InvalidOperation(String),

    #[error("MetaException: {0}")]
    Meta(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl MetastoreError {
    /// Classify an exception by the name the metastore gives it.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("NoSuchObjectException") {
            MetastoreError::NoSuchObject(message)
        } else if message.contains("AlreadyExistsException") {
            MetastoreError::AlreadyExists(message)
        } else if message.contains("InvalidObjectException") {
            MetastoreError::InvalidObject(message)
        } else if message.contains("InvalidOperationException") {
            MetastoreError::InvalidOperation(message)
        } else {
            MetastoreError::Meta(message)
        }
    }
}

pub type MetastoreResult<T> = std::result::Result<T, MetastoreError>;

/// A column as the metastore stores it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HiveColumn {
    pub name: String,
    pub type_name: String,
    pub comment: Option<String>,
}

impl HiveColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            comment: None,
        }
    }
}

/// Storage descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HiveStorage {
    pub location: Option<String>,
    pub input_format: Option<String>,
    pub output_format: Option<String>,
    pub serialization_lib: Option<String>,
    pub serde_parameters: BTreeMap<String, String>,
    pub cols: Vec<HiveColumn>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HiveDatabase {
    pub name: String,
    pub description: Option<String>,
    pub location_uri: Option<String>,
    pub owner_name: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HiveTable {
    pub db_name: String,
    pub table_name: String,
    pub owner: Option<String>,
    /// Seconds since the epoch.
    pub create_time: Option<i32>,
    pub table_type: Option<String>,
    pub sd: HiveStorage,
    pub partition_keys: Vec<HiveColumn>,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HivePartition {
    pub db_name: String,
    pub table_name: String,
    pub values: Vec<String>,
    pub create_time: Option<i32>,
    pub sd: HiveStorage,
    pub parameters: BTreeMap<String, String>,
}

/// Operations the connector needs from a Hive metastore.
#[async_trait]
pub trait MetastoreClient: Send + Sync {
    async fn get_all_databases(&self) -> MetastoreResult<Vec<String>>;

    async fn get_database(&self, db: &str) -> MetastoreResult<HiveDatabase>;

    async fn create_database(&self, database: &HiveDatabase) -> MetastoreResult<()>;

    async fn alter_database(&self, db: &str, database: &HiveDatabase) -> MetastoreResult<()>;

    /// Drop an empty database without deleting data.
    async fn drop_database(&self, db: &str) -> MetastoreResult<()>;

    async fn get_all_tables(&self, db: &str) -> MetastoreResult<Vec<String>>;

    async fn get_table(&self, db: &str, table: &str) -> MetastoreResult<HiveTable>;

    async fn create_table(&self, table: &HiveTable) -> MetastoreResult<()>;

    /// Replace a table definition. A different name in `table` renames it.
    async fn alter_table(&self, db: &str, name: &str, table: &HiveTable) -> MetastoreResult<()>;

    async fn drop_table(&self, db: &str, table: &str) -> MetastoreResult<()>;

    async fn get_partition_names(&self, db: &str, table: &str) -> MetastoreResult<Vec<String>>;

    async fn get_partitions(&self, db: &str, table: &str) -> MetastoreResult<Vec<HivePartition>>;

    async fn get_partition_by_name(
        &self,
        db: &str,
        table: &str,
        partition_name: &str,
    ) -> MetastoreResult<HivePartition>;

    async fn add_partitions(&self, partitions: &[HivePartition]) -> MetastoreResult<()>;

    async fn alter_partitions(
        &self,
        db: &str,
        table: &str,
        partitions: &[HivePartition],
    ) -> MetastoreResult<()>;

    async fn drop_partition_by_name(
        &self,
        db: &str,
        table: &str,
        partition_name: &str,
    ) -> MetastoreResult<()>;

    /// Release the connection.
    async fn close(&self) {}
}
