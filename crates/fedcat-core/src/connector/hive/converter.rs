//! Hive type and info converters.

use super::client::{HiveColumn, HiveDatabase, HivePartition, HiveStorage, HiveTable};
use crate::connector::ConnectorTypeConverter;
use crate::error::{CatalogError, CatalogResult};
use crate::model::{AuditInfo, DatabaseInfo, FieldInfo, PartitionInfo, StorageInfo, TableInfo};
use crate::name::QualifiedName;
use crate::types::{split_top_level, type_args_with, CanonicalType, RowField};
use chrono::{DateTime, TimeZone, Utc};

/// Hive's default decimal when no precision is given.
const DEFAULT_DECIMAL: CanonicalType = CanonicalType::Decimal {
    precision: 10,
    scale: 0,
};

/// Converts Hive type strings (`array<struct<a:int>>`) to canonical types.
#[derive(Debug, Clone, Copy, Default)]
pub struct HiveTypeConverter;

impl ConnectorTypeConverter for HiveTypeConverter {
    fn to_canonical(&self, native: &str) -> CanonicalType {
        let s = native.trim();
        match s.to_ascii_lowercase().as_str() {
            "boolean" => return CanonicalType::Boolean,
            "tinyint" => return CanonicalType::TinyInt,
            "smallint" => return CanonicalType::SmallInt,
            "int" | "integer" => return CanonicalType::Int,
            "bigint" => return CanonicalType::BigInt,
            "float" => return CanonicalType::Float,
            "double" | "double precision" => return CanonicalType::Double,
            "decimal" => return DEFAULT_DECIMAL,
            "string" => return CanonicalType::String,
            "varchar" => return CanonicalType::Varchar(None),
            "binary" => return CanonicalType::Binary,
            "date" => return CanonicalType::Date,
            "timestamp" => return CanonicalType::Timestamp,
            _ => {}
        }

        if let Some(args) = type_args_with(s, "decimal", '(', ')') {
            if let [p, sc] = split_top_level(args).as_slice() {
                if let (Ok(precision), Ok(scale)) = (p.trim().parse(), sc.trim().parse()) {
                    return CanonicalType::Decimal { precision, scale };
                }
            }
        } else if let Some(args) = type_args_with(s, "char", '(', ')') {
            if let Ok(n) = args.trim().parse() {
                return CanonicalType::Char(n);
            }
        } else if let Some(args) = type_args_with(s, "varchar", '(', ')') {
            if let Ok(n) = args.trim().parse() {
                return CanonicalType::Varchar(Some(n));
            }
        } else if let Some(args) = type_args_with(s, "array", '<', '>') {
            return CanonicalType::Array(Box::new(self.to_canonical(args)));
        } else if let Some(args) = type_args_with(s, "map", '<', '>') {
            if let [k, v] = split_top_level(args).as_slice() {
                return CanonicalType::Map(
                    Box::new(self.to_canonical(k)),
                    Box::new(self.to_canonical(v)),
                );
            }
        } else if let Some(args) = type_args_with(s, "struct", '<', '>') {
            let mut fields = Vec::new();
            for part in split_top_level(args) {
                match part.split_once(':') {
                    Some((name, ty)) => {
                        fields.push(RowField::new(name.trim(), self.to_canonical(ty)))
                    }
                    None => return CanonicalType::Unknown(s.to_string()),
                }
            }
            return CanonicalType::Row(fields);
        }

        CanonicalType::Unknown(s.to_string())
    }

    fn from_canonical(&self, canonical: &CanonicalType) -> CatalogResult<String> {
        Ok(match canonical {
            CanonicalType::Boolean => "boolean".into(),
            CanonicalType::TinyInt => "tinyint".into(),
            CanonicalType::SmallInt => "smallint".into(),
            CanonicalType::Int => "int".into(),
            CanonicalType::BigInt => "bigint".into(),
            CanonicalType::Float => "float".into(),
            CanonicalType::Double => "double".into(),
            CanonicalType::Decimal { precision, scale } => format!("decimal({},{})", precision, scale),
            CanonicalType::Char(n) => format!("char({})", n),
            CanonicalType::Varchar(Some(n)) => format!("varchar({})", n),
            CanonicalType::Varchar(None) | CanonicalType::String | CanonicalType::Uuid => {
                "string".into()
            }
            CanonicalType::Binary | CanonicalType::Fixed(_) => "binary".into(),
            CanonicalType::Date => "date".into(),
            CanonicalType::Timestamp | CanonicalType::TimestampTz => "timestamp".into(),
            CanonicalType::Time => {
                return Err(CatalogError::constraint("Hive has no time type"));
            }
            CanonicalType::Array(element) => format!("array<{}>", self.from_canonical(element)?),
            CanonicalType::Map(k, v) => format!(
                "map<{},{}>",
                self.from_canonical(k)?,
                self.from_canonical(v)?
            ),
            CanonicalType::Row(fields) => {
                let parts = fields
                    .iter()
                    .map(|f| Ok(format!("{}:{}", f.name, self.from_canonical(&f.field_type)?)))
                    .collect::<CatalogResult<Vec<_>>>()?;
                format!("struct<{}>", parts.join(","))
            }
            CanonicalType::Unknown(raw) => raw.clone(),
        })
    }
}

// Partition names

/// Characters Hive escapes in partition names.
fn needs_escape(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '\u{7f}' | '{' | '[' | ']' | '^'
        )
}

fn escape_path_name(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", b));
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn unescape_path_name(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Build `k1=v1/k2=v2` from partition keys and values.
pub fn make_partition_name(keys: &[HiveColumn], values: &[String]) -> CatalogResult<String> {
    if keys.len() != values.len() {
        return Err(CatalogError::InvalidRequest(format!(
            "expected {} partition values, got {}",
            keys.len(),
            values.len()
        )));
    }
    Ok(keys
        .iter()
        .zip(values)
        .map(|(k, v)| format!("{}={}", escape_path_name(&k.name), escape_path_name(v)))
        .collect::<Vec<_>>()
        .join("/"))
}

/// Values of a `k1=v1/k2=v2` name in key order.
pub fn partition_values(keys: &[HiveColumn], name: &str) -> CatalogResult<Vec<String>> {
    let mut pairs = Vec::new();
    for segment in name.split('/') {
        let (k, v) = segment.split_once('=').ok_or_else(|| {
            CatalogError::InvalidRequest(format!("malformed partition name '{}'", name))
        })?;
        pairs.push((unescape_path_name(k), unescape_path_name(v)));
    }
    if pairs.len() != keys.len() {
        return Err(CatalogError::InvalidRequest(format!(
            "partition name '{}' does not match {} partition keys",
            name,
            keys.len()
        )));
    }
    keys.iter()
        .map(|key| {
            pairs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(&key.name))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| {
                    CatalogError::InvalidRequest(format!(
                        "partition name '{}' is missing key '{}'",
                        name, key.name
                    ))
                })
        })
        .collect()
}

// Info conversion

fn epoch_seconds(t: Option<i32>) -> Option<DateTime<Utc>> {
    t.filter(|s| *s > 0)
        .and_then(|s| Utc.timestamp_opt(i64::from(s), 0).single())
}

fn to_epoch_seconds(t: Option<DateTime<Utc>>) -> Option<i32> {
    t.and_then(|t| i32::try_from(t.timestamp()).ok())
}

fn storage_info(sd: &HiveStorage) -> StorageInfo {
    StorageInfo {
        uri: sd.location.clone(),
        input_format: sd.input_format.clone(),
        output_format: sd.output_format.clone(),
        serialization_lib: sd.serialization_lib.clone(),
        parameters: sd.serde_parameters.clone(),
    }
}

fn hive_storage(storage: &StorageInfo, cols: Vec<HiveColumn>) -> HiveStorage {
    HiveStorage {
        location: storage.uri.clone(),
        input_format: storage.input_format.clone(),
        output_format: storage.output_format.clone(),
        serialization_lib: storage.serialization_lib.clone(),
        serde_parameters: storage.parameters.clone(),
        cols,
    }
}

pub fn database_info(catalog: &str, db: &HiveDatabase) -> CatalogResult<DatabaseInfo> {
    let mut info = DatabaseInfo::new(QualifiedName::of_database(catalog, &db.name)?);
    info.owner = db.owner_name.clone();
    info.uri = db.location_uri.clone();
    info.properties = db.parameters.clone();
    if let Some(description) = &db.description {
        info.properties
            .insert("comment".into(), description.clone());
    }
    Ok(info)
}

pub fn hive_database(info: &DatabaseInfo) -> CatalogResult<HiveDatabase> {
    let name = info
        .name
        .database()
        .ok_or_else(|| CatalogError::InvalidRequest(format!("'{}' is not a database", info.name)))?;
    let mut parameters = info.properties.clone();
    let description = parameters.remove("comment");
    Ok(HiveDatabase {
        name: name.to_string(),
        description,
        location_uri: info.uri.clone(),
        owner_name: info.owner.clone(),
        parameters,
    })
}

pub fn table_info(
    catalog: &str,
    table: &HiveTable,
    converter: &HiveTypeConverter,
) -> CatalogResult<TableInfo> {
    let mut info = TableInfo::new(QualifiedName::of_table(catalog, &table.db_name, &table.table_name)?);
    info.owner = table.owner.clone();
    let columns = table
        .sd
        .cols
        .iter()
        .map(|c| (c, false))
        .chain(table.partition_keys.iter().map(|c| (c, true)));
    info.fields = columns
        .enumerate()
        .map(|(pos, (col, partition_key))| FieldInfo {
            name: col.name.clone(),
            type_name: converter.to_canonical(&col.type_name),
            source_type: Some(col.type_name.clone()),
            nullable: true,
            comment: col.comment.clone(),
            partition_key,
            pos: pos as u32,
        })
        .collect();
    info.storage = storage_info(&table.sd);
    info.properties = table.parameters.clone();
    if let Some(table_type) = &table.table_type {
        info.properties
            .entry("table_type".into())
            .or_insert_with(|| table_type.clone());
    }
    info.audit = AuditInfo {
        created_by: table.owner.clone(),
        created_at: epoch_seconds(table.create_time),
        ..Default::default()
    };
    Ok(info)
}

fn hive_column(field: &FieldInfo, converter: &HiveTypeConverter) -> CatalogResult<HiveColumn> {
    let type_name = match &field.source_type {
        Some(source) if converter.to_canonical(source) == field.type_name => source.clone(),
        _ => converter.from_canonical(&field.type_name)?,
    };
    Ok(HiveColumn {
        name: field.name.clone(),
        type_name,
        comment: field.comment.clone(),
    })
}

pub fn hive_table(info: &TableInfo, converter: &HiveTypeConverter) -> CatalogResult<HiveTable> {
    let (db, table) = match (info.name.database(), info.name.table()) {
        (Some(db), Some(table)) => (db, table),
        _ => {
            return Err(CatalogError::InvalidRequest(format!(
                "'{}' is not a table",
                info.name
            )))
        }
    };
    let mut cols = Vec::new();
    let mut partition_keys = Vec::new();
    for field in &info.fields {
        let col = hive_column(field, converter)?;
        if field.partition_key {
            partition_keys.push(col);
        } else {
            cols.push(col);
        }
    }
    let mut parameters = info.properties.clone();
    let table_type = parameters
        .remove("table_type")
        .filter(|t| t == "EXTERNAL_TABLE" || t == "MANAGED_TABLE" || t == "VIRTUAL_VIEW")
        .or_else(|| Some("EXTERNAL_TABLE".to_string()));
    if table_type.as_deref() == Some("EXTERNAL_TABLE") {
        parameters.insert("EXTERNAL".into(), "TRUE".into());
    }
    Ok(HiveTable {
        db_name: db.to_string(),
        table_name: table.to_string(),
        owner: info.owner.clone(),
        create_time: to_epoch_seconds(info.audit.created_at)
            .or_else(|| to_epoch_seconds(Some(Utc::now()))),
        table_type,
        sd: hive_storage(&info.storage, cols),
        partition_keys,
        parameters,
    })
}

pub fn partition_info(
    table_name: &QualifiedName,
    table: &HiveTable,
    partition: &HivePartition,
) -> CatalogResult<PartitionInfo> {
    let name = make_partition_name(&table.partition_keys, &partition.values)?;
    let mut info = PartitionInfo::new(table_name.partition_child(name)?);
    info.values = partition.values.clone();
    info.storage = storage_info(&partition.sd);
    info.properties = partition.parameters.clone();
    info.audit.created_at = epoch_seconds(partition.create_time);
    Ok(info)
}

/// Build the metastore partition for `info`, inheriting unset storage from the table.
pub fn hive_partition(table: &HiveTable, info: &PartitionInfo) -> CatalogResult<HivePartition> {
    let values = partition_values(&table.partition_keys, info.partition_name())?;
    let mut sd = hive_storage(&info.storage, table.sd.cols.clone());
    if sd.location.is_none() {
        if let Some(base) = &table.sd.location {
            sd.location = Some(format!("{}/{}", base.trim_end_matches('/'), info.partition_name()));
        }
    }
    sd.input_format = sd.input_format.or_else(|| table.sd.input_format.clone());
    sd.output_format = sd.output_format.or_else(|| table.sd.output_format.clone());
    sd.serialization_lib = sd
        .serialization_lib
        .or_else(|| table.sd.serialization_lib.clone());
    Ok(HivePartition {
        db_name: table.db_name.clone(),
        table_name: table.table_name.clone(),
        values,
        create_time: to_epoch_seconds(info.audit.created_at)
            .or_else(|| to_epoch_seconds(Some(Utc::now()))),
        sd,
        parameters: info.properties.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hive_primitives() {
        let c = HiveTypeConverter;
        assert_eq!(c.to_canonical("BIGINT"), CanonicalType::BigInt);
        assert_eq!(c.to_canonical("integer"), CanonicalType::Int);
        assert_eq!(c.to_canonical("decimal"), DEFAULT_DECIMAL);
        assert_eq!(
            c.to_canonical("decimal(12,4)"),
            CanonicalType::Decimal {
                precision: 12,
                scale: 4
            }
        );
        assert_eq!(c.to_canonical("varchar(64)"), CanonicalType::Varchar(Some(64)));
        assert_eq!(c.to_canonical("char(2)"), CanonicalType::Char(2));
    }

    #[test]
    fn test_hive_nested_types() {
        let c = HiveTypeConverter;
        let native = "map<string,array<struct<id:bigint,tags:array<string>>>>";
        let canonical = c.to_canonical(native);
        assert!(canonical.is_nested());
        assert_eq!(c.from_canonical(&canonical).unwrap(), native);
    }

    #[test]
    fn test_hive_unsupported_types() {
        let c = HiveTypeConverter;
        assert!(c.from_canonical(&CanonicalType::Time).is_err());
        assert_eq!(c.from_canonical(&CanonicalType::Uuid).unwrap(), "string");
        assert_eq!(
            c.to_canonical("uniontype<int,string>"),
            CanonicalType::Unknown("uniontype<int,string>".into())
        );
    }

    #[test]
    fn test_partition_names() {
        let keys = vec![HiveColumn::new("dateint", "int"), HiveColumn::new("hour", "int")];
        let name = make_partition_name(&keys, &["20240101".into(), "01".into()]).unwrap();
        assert_eq!(name, "dateint=20240101/hour=01");
        assert_eq!(
            partition_values(&keys, "hour=01/dateint=20240101").unwrap(),
            vec!["20240101".to_string(), "01".to_string()]
        );
        assert!(partition_values(&keys, "dateint=20240101").is_err());
    }

    #[test]
    fn test_partition_name_escaping() {
        let keys = vec![HiveColumn::new("path", "string")];
        let name = make_partition_name(&keys, &["a/b=c".into()]).unwrap();
        assert_eq!(name, "path=a%2Fb%3Dc");
        assert_eq!(partition_values(&keys, &name).unwrap(), vec!["a/b=c".to_string()]);
    }

    #[test]
    fn test_table_info_round_trip() {
        let c = HiveTypeConverter;
        let mut table = HiveTable {
            db_name: "sales".into(),
            table_name: "orders".into(),
            owner: Some("etl".into()),
            create_time: Some(1_700_000_000),
            table_type: Some("EXTERNAL_TABLE".into()),
            ..Default::default()
        };
        table.sd.location = Some("s3://bucket/orders".into());
        table.sd.cols = vec![HiveColumn::new("id", "bigint"), HiveColumn::new("amount", "decimal(10,2)")];
        table.partition_keys = vec![HiveColumn::new("dateint", "int")];
        table.parameters.insert("EXTERNAL".into(), "TRUE".into());

        let info = table_info("prodhive", &table, &c).unwrap();
        assert_eq!(info.name.to_string(), "prodhive/sales/orders");
        assert_eq!(info.fields.len(), 3);
        assert!(info.fields[2].partition_key);
        assert_eq!(info.storage.uri.as_deref(), Some("s3://bucket/orders"));
        assert!(info.audit.created_at.is_some());

        let back = hive_table(&info, &c).unwrap();
        assert_eq!(back.sd.cols, table.sd.cols);
        assert_eq!(back.partition_keys, table.partition_keys);
        assert_eq!(back.table_type.as_deref(), Some("EXTERNAL_TABLE"));
        assert_eq!(back.create_time, Some(1_700_000_000));
    }

    #[test]
    fn test_partition_inherits_table_storage() {
        let mut table = HiveTable {
            db_name: "sales".into(),
            table_name: "orders".into(),
            ..Default::default()
        };
        table.sd.location = Some("s3://bucket/orders/".into());
        table.sd.input_format = Some("parquet-in".into());
        table.partition_keys = vec![HiveColumn::new("dateint", "int")];

        let name = QualifiedName::of_partition("c", "sales", "orders", "dateint=20240101").unwrap();
        let partition = hive_partition(&table, &PartitionInfo::new(name)).unwrap();
        assert_eq!(partition.values, vec!["20240101".to_string()]);
        assert_eq!(
            partition.sd.location.as_deref(),
            Some("s3://bucket/orders/dateint=20240101")
        );
        assert_eq!(partition.sd.input_format.as_deref(), Some("parquet-in"));
    }
}
