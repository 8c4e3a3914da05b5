//! Hierarchical catalog names.
//!
//! A [`QualifiedName`] addresses a catalog, a database inside it, a table
//! inside that, or a single partition of a table. The string form is
//! `catalog/database/table/partition`; the partition segment may itself
//! contain `/` (for example `dateint=20240101/hour=01`), so parsing splits
//! into at most four segments.

use crate::error::{CatalogError, CatalogResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Depth of a [`QualifiedName`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NameDepth {
    Catalog,
    Database,
    Table,
    Partition,
}

impl fmt::Display for NameDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NameDepth::Catalog => "catalog",
            NameDepth::Database => "database",
            NameDepth::Table => "table",
            NameDepth::Partition => "partition",
        };
        f.write_str(s)
    }
}

/// Immutable identifier of a catalog entity.
///
/// Equality and hashing are structural. Segments are kept exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    catalog: String,
    database: Option<String>,
    table: Option<String>,
    partition: Option<String>,
}

fn check_segment(kind: &str, value: &str) -> CatalogResult<()> {
    if value.is_empty() {
        return Err(CatalogError::InvalidRequest(format!(
            "{} name must not be empty",
            kind
        )));
    }
    Ok(())
}

fn check_plain_segment(kind: &str, value: &str) -> CatalogResult<()> {
    check_segment(kind, value)?;
    if value.contains('/') {
        return Err(CatalogError::InvalidRequest(format!(
            "{} name '{}' must not contain '/'",
            kind, value
        )));
    }
    Ok(())
}

impl QualifiedName {
    /// Name of a whole catalog.
    pub fn of_catalog(catalog: impl Into<String>) -> CatalogResult<Self> {
        let catalog = catalog.into();
        check_plain_segment("catalog", &catalog)?;
        Ok(Self {
            catalog,
            database: None,
            table: None,
            partition: None,
        })
    }

    /// Name of a database.
    pub fn of_database(
        catalog: impl Into<String>,
        database: impl Into<String>,
    ) -> CatalogResult<Self> {
        let mut name = Self::of_catalog(catalog)?;
        let database = database.into();
        check_plain_segment("database", &database)?;
        name.database = Some(database);
        Ok(name)
    }

    /// Name of a table.
    pub fn of_table(
        catalog: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> CatalogResult<Self> {
        let mut name = Self::of_database(catalog, database)?;
        let table = table.into();
        check_plain_segment("table", &table)?;
        name.table = Some(table);
        Ok(name)
    }

    /// Name of a partition. The partition segment may contain `/`.
    pub fn of_partition(
        catalog: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
        partition: impl Into<String>,
    ) -> CatalogResult<Self> {
        let mut name = Self::of_table(catalog, database, table)?;
        let partition = partition.into();
        check_segment("partition", &partition)?;
        name.partition = Some(partition);
        Ok(name)
    }

    /// Catalog segment.
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    /// Database segment, if present.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Table segment, if present.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Partition segment, if present.
    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    /// How deep this name reaches.
    pub fn depth(&self) -> NameDepth {
        if self.partition.is_some() {
            NameDepth::Partition
        } else if self.table.is_some() {
            NameDepth::Table
        } else if self.database.is_some() {
            NameDepth::Database
        } else {
            NameDepth::Catalog
        }
    }

    pub fn is_catalog(&self) -> bool {
        self.depth() == NameDepth::Catalog
    }

    pub fn is_database(&self) -> bool {
        self.depth() == NameDepth::Database
    }

    pub fn is_table(&self) -> bool {
        self.depth() == NameDepth::Table
    }

    pub fn is_partition(&self) -> bool {
        self.depth() == NameDepth::Partition
    }

    /// Fail with `InvalidRequest` unless the name has exactly `depth`.
    pub fn require(&self, depth: NameDepth) -> CatalogResult<()> {
        if self.depth() != depth {
            return Err(CatalogError::InvalidRequest(format!(
                "'{}' is a {} name, expected a {} name",
                self,
                self.depth(),
                depth
            )));
        }
        Ok(())
    }

    /// The database this name lives in, truncating deeper segments.
    pub fn database_name(&self) -> Option<QualifiedName> {
        self.database.as_ref().map(|db| QualifiedName {
            catalog: self.catalog.clone(),
            database: Some(db.clone()),
            table: None,
            partition: None,
        })
    }

    /// The table this name lives in, truncating the partition segment.
    pub fn table_name(&self) -> Option<QualifiedName> {
        match (&self.database, &self.table) {
            (Some(db), Some(table)) => Some(QualifiedName {
                catalog: self.catalog.clone(),
                database: Some(db.clone()),
                table: Some(table.clone()),
                partition: None,
            }),
            _ => None,
        }
    }

    /// Child partition of a table name.
    pub fn partition_child(&self, partition: impl Into<String>) -> CatalogResult<QualifiedName> {
        self.require(NameDepth::Table)?;
        let partition = partition.into();
        check_segment("partition", &partition)?;
        Ok(QualifiedName {
            partition: Some(partition),
            ..self.clone()
        })
    }

    /// Child table of a database name.
    pub fn table_child(&self, table: impl Into<String>) -> CatalogResult<QualifiedName> {
        self.require(NameDepth::Database)?;
        let table = table.into();
        check_plain_segment("table", &table)?;
        Ok(QualifiedName {
            table: Some(table),
            ..self.clone()
        })
    }

    /// Child database of a catalog name.
    pub fn database_child(&self, database: impl Into<String>) -> CatalogResult<QualifiedName> {
        self.require(NameDepth::Catalog)?;
        let database = database.into();
        check_plain_segment("database", &database)?;
        Ok(QualifiedName {
            database: Some(database),
            ..self.clone()
        })
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.catalog)?;
        for segment in [&self.database, &self.table, &self.partition]
            .into_iter()
            .flatten()
        {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for QualifiedName {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(4, '/');
        let catalog = parts.next().unwrap_or_default();
        match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => Self::of_catalog(catalog),
            (Some(db), None, _) => Self::of_database(catalog, db),
            (Some(db), Some(table), None) => Self::of_table(catalog, db, table),
            (Some(db), Some(table), Some(partition)) => {
                Self::of_partition(catalog, db, table, partition)
            }
        }
    }
}

impl Serialize for QualifiedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QualifiedName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
