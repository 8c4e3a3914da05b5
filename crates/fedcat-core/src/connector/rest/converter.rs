//! Iceberg type and info converters.

use super::api;
use crate::connector::ConnectorTypeConverter;
use crate::error::{CatalogError, CatalogResult};
use crate::model::{DatabaseInfo, FieldInfo, StorageInfo, TableInfo};
use crate::name::QualifiedName;
use crate::types::{split_top_level, type_args_with, CanonicalType, RowField};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Properties derived from metadata rather than stored as table properties.
pub const TABLE_TYPE_PROPERTY: &str = "table_type";
pub const METADATA_LOCATION_PROPERTY: &str = "metadata_location";
const OWNER_PROPERTY: &str = "owner";
const LOCATION_PROPERTY: &str = "location";

/// Converts Iceberg types: primitive strings and nested JSON objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcebergTypeConverter;

impl ConnectorTypeConverter for IcebergTypeConverter {
    fn to_canonical(&self, native: &str) -> CanonicalType {
        let s = native.trim();
        if s.starts_with('{') {
            return match serde_json::from_str::<Value>(s) {
                Ok(v) => self.json_to_canonical(&v),
                Err(_) => CanonicalType::Unknown(s.to_string()),
            };
        }
        match s.to_ascii_lowercase().as_str() {
            "boolean" => CanonicalType::Boolean,
            "int" => CanonicalType::Int,
            "long" => CanonicalType::BigInt,
            "float" => CanonicalType::Float,
            "double" => CanonicalType::Double,
            "date" => CanonicalType::Date,
            "time" => CanonicalType::Time,
            "timestamp" => CanonicalType::Timestamp,
            "timestamptz" => CanonicalType::TimestampTz,
            "string" => CanonicalType::String,
            "uuid" => CanonicalType::Uuid,
            "binary" => CanonicalType::Binary,
            _ => {
                if let Some(args) = type_args_with(s, "decimal", '(', ')') {
                    if let [p, sc] = split_top_level(args).as_slice() {
                        if let (Ok(precision), Ok(scale)) = (p.trim().parse(), sc.trim().parse()) {
                            return CanonicalType::Decimal { precision, scale };
                        }
                    }
                } else if let Some(args) = type_args_with(s, "fixed", '[', ']') {
                    if let Ok(n) = args.trim().parse() {
                        return CanonicalType::Fixed(n);
                    }
                }
                CanonicalType::Unknown(s.to_string())
            }
        }
    }

    fn from_canonical(&self, canonical: &CanonicalType) -> CatalogResult<String> {
        if canonical.is_nested() {
            let value = self.canonical_to_json(canonical, &mut FieldIds::starting_at(1))?;
            return serde_json::to_string(&value)
                .map_err(|e| CatalogError::constraint(format!("cannot encode type: {}", e)));
        }
        primitive_name(canonical)
    }
}

fn primitive_name(canonical: &CanonicalType) -> CatalogResult<String> {
    Ok(match canonical {
        CanonicalType::Boolean => "boolean".to_string(),
        CanonicalType::TinyInt | CanonicalType::SmallInt | CanonicalType::Int => "int".to_string(),
        CanonicalType::BigInt => "long".to_string(),
        CanonicalType::Float => "float".to_string(),
        CanonicalType::Double => "double".to_string(),
        CanonicalType::Decimal { precision, scale } => format!("decimal({},{})", precision, scale),
        CanonicalType::Char(_) | CanonicalType::Varchar(_) | CanonicalType::String => {
            "string".to_string()
        }
        CanonicalType::Binary => "binary".to_string(),
        CanonicalType::Fixed(n) => format!("fixed[{}]", n),
        CanonicalType::Date => "date".to_string(),
        CanonicalType::Time => "time".to_string(),
        CanonicalType::Timestamp => "timestamp".to_string(),
        CanonicalType::TimestampTz => "timestamptz".to_string(),
        CanonicalType::Uuid => "uuid".to_string(),
        other => {
            return Err(CatalogError::constraint(format!(
                "type '{}' has no Iceberg equivalent",
                other
            )))
        }
    })
}

/// Allocator for Iceberg field ids.
#[derive(Debug, Clone, Copy)]
pub struct FieldIds {
    next: i32,
}

impl FieldIds {
    pub fn starting_at(next: i32) -> Self {
        Self { next }
    }

    fn take(&mut self) -> i32 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn last_assigned(&self) -> i32 {
        self.next - 1
    }
}

impl IcebergTypeConverter {
    pub fn json_to_canonical(&self, value: &Value) -> CanonicalType {
        match value {
            Value::String(s) => self.to_canonical(s),
            Value::Object(obj) => match obj.get("type").and_then(Value::as_str) {
                Some("list") => CanonicalType::Array(Box::new(
                    self.json_to_canonical(obj.get("element").unwrap_or(&Value::Null)),
                )),
                Some("map") => CanonicalType::Map(
                    Box::new(self.json_to_canonical(obj.get("key").unwrap_or(&Value::Null))),
                    Box::new(self.json_to_canonical(obj.get("value").unwrap_or(&Value::Null))),
                ),
                Some("struct") => CanonicalType::Row(
                    obj.get("fields")
                        .and_then(Value::as_array)
                        .map(|fields| {
                            fields
                                .iter()
                                .map(|f| {
                                    RowField::new(
                                        f.get("name").and_then(Value::as_str).unwrap_or_default(),
                                        self.json_to_canonical(f.get("type").unwrap_or(&Value::Null)),
                                    )
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                ),
                _ => CanonicalType::Unknown(value.to_string()),
            },
            other => CanonicalType::Unknown(other.to_string()),
        }
    }

    /// Iceberg JSON type for `canonical`, assigning nested field ids from `ids`.
    pub fn canonical_to_json(
        &self,
        canonical: &CanonicalType,
        ids: &mut FieldIds,
    ) -> CatalogResult<Value> {
        Ok(match canonical {
            CanonicalType::Array(element) => {
                let element_id = ids.take();
                json!({
                    "type": "list",
                    "element-id": element_id,
                    "element": self.canonical_to_json(element, ids)?,
                    "element-required": false,
                })
            }
            CanonicalType::Map(key, value) => {
                let key_id = ids.take();
                let value_id = ids.take();
                json!({
                    "type": "map",
                    "key-id": key_id,
                    "key": self.canonical_to_json(key, ids)?,
                    "value-id": value_id,
                    "value": self.canonical_to_json(value, ids)?,
                    "value-required": false,
                })
            }
            CanonicalType::Row(fields) => {
                let ids_for_fields: Vec<i32> = fields.iter().map(|_| ids.take()).collect();
                let mut out = Vec::with_capacity(fields.len());
                for (field, id) in fields.iter().zip(ids_for_fields) {
                    out.push(json!({
                        "id": id,
                        "name": field.name,
                        "required": false,
                        "type": self.canonical_to_json(&field.field_type, ids)?,
                    }));
                }
                json!({"type": "struct", "fields": out})
            }
            primitive => Value::String(primitive_name(primitive)?),
        })
    }
}

fn source_type(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn epoch_millis(ms: Option<i64>) -> Option<chrono::DateTime<Utc>> {
    ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

pub fn database_info(name: &QualifiedName, namespace: &api::NamespaceResponse) -> DatabaseInfo {
    let mut info = DatabaseInfo::new(name.clone());
    let mut properties: BTreeMap<String, String> = namespace.properties.clone().into_iter().collect();
    info.uri = properties.remove(LOCATION_PROPERTY);
    info.owner = properties.remove(OWNER_PROPERTY);
    info.properties = properties;
    info
}

pub fn namespace_request(info: &DatabaseInfo) -> CatalogResult<api::CreateNamespaceRequest> {
    let database = info
        .name
        .database()
        .ok_or_else(|| CatalogError::InvalidRequest(format!("'{}' is not a database name", info.name)))?;
    Ok(api::CreateNamespaceRequest {
        namespace: vec![database.to_string()],
        properties: namespace_properties(info),
    })
}

pub fn namespace_properties(info: &DatabaseInfo) -> HashMap<String, String> {
    let mut properties: HashMap<String, String> = info.properties.clone().into_iter().collect();
    if let Some(uri) = &info.uri {
        properties.insert(LOCATION_PROPERTY.to_string(), uri.clone());
    }
    if let Some(owner) = &info.owner {
        properties.insert(OWNER_PROPERTY.to_string(), owner.clone());
    }
    properties
}

pub fn table_info(
    name: &QualifiedName,
    response: &api::LoadTableResponse,
    converter: &IcebergTypeConverter,
) -> TableInfo {
    let metadata = &response.metadata;
    let partition_sources: HashSet<i32> = metadata
        .default_partition_spec()
        .map(|spec| {
            spec.fields
                .iter()
                .filter(|f| f.transform == "identity")
                .map(|f| f.source_id)
                .collect()
        })
        .unwrap_or_default();

    let mut info = TableInfo::new(name.clone());
    if let Some(schema) = metadata.current_schema() {
        info.fields = schema
            .fields
            .iter()
            .enumerate()
            .map(|(pos, f)| FieldInfo {
                name: f.name.clone(),
                type_name: converter.json_to_canonical(&f.field_type),
                source_type: Some(source_type(&f.field_type)),
                nullable: !f.required,
                comment: f.doc.clone(),
                partition_key: partition_sources.contains(&f.id),
                pos: pos as u32,
            })
            .collect();
    }
    info.storage = StorageInfo::with_uri(metadata.location.clone());
    let mut properties: BTreeMap<String, String> = metadata.properties.clone().into_iter().collect();
    info.owner = properties.get(OWNER_PROPERTY).cloned();
    properties.insert(TABLE_TYPE_PROPERTY.to_string(), "ICEBERG".to_string());
    if let Some(location) = &response.metadata_location {
        properties.insert(METADATA_LOCATION_PROPERTY.to_string(), location.clone());
    }
    info.properties = properties;
    info.audit.last_modified_at = epoch_millis(metadata.last_updated_ms);
    info
}

/// Table properties as the catalog stores them.
fn stored_properties(info: &TableInfo) -> HashMap<String, String> {
    let mut properties: HashMap<String, String> = info
        .properties
        .iter()
        .filter(|(k, _)| k.as_str() != TABLE_TYPE_PROPERTY && k.as_str() != METADATA_LOCATION_PROPERTY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(owner) = &info.owner {
        properties.insert(OWNER_PROPERTY.to_string(), owner.clone());
    }
    properties
}

/// Build a schema for `fields`, keeping ids of columns present in `current`.
fn build_schema(
    fields: &[FieldInfo],
    schema_id: i32,
    current: Option<&api::Schema>,
    converter: &IcebergTypeConverter,
) -> CatalogResult<(api::Schema, i32)> {
    let existing: HashMap<&str, i32> = current
        .map(|s| s.fields.iter().map(|f| (f.name.as_str(), f.id)).collect())
        .unwrap_or_default();
    let max_existing = current.map(max_field_id).unwrap_or(0);
    let mut top_ids = FieldIds::starting_at(max_existing + 1);
    let assigned: Vec<i32> = fields
        .iter()
        .map(|f| existing.get(f.name.as_str()).copied().unwrap_or_else(|| top_ids.take()))
        .collect();
    let mut nested_ids = FieldIds::starting_at(top_ids.last_assigned().max(max_existing) + 1);

    let mut out = Vec::with_capacity(fields.len());
    for (field, id) in fields.iter().zip(assigned) {
        out.push(api::SchemaField {
            id,
            name: field.name.clone(),
            field_type: converter.canonical_to_json(&field.type_name, &mut nested_ids)?,
            required: !field.nullable,
            doc: field.comment.clone(),
        });
    }
    let last_column_id = nested_ids.last_assigned().max(top_ids.last_assigned()).max(max_existing);
    Ok((
        api::Schema {
            schema_id,
            r#type: "struct".to_string(),
            fields: out,
            identifier_field_ids: Vec::new(),
        },
        last_column_id,
    ))
}

/// Highest field id in `schema`, nested ids included.
fn max_field_id(schema: &api::Schema) -> i32 {
    fn walk(value: &Value) -> i32 {
        match value {
            Value::Object(obj) => obj
                .iter()
                .map(|(k, v)| match (k.as_str(), v.as_i64()) {
                    ("id" | "element-id" | "key-id" | "value-id", Some(id)) => id as i32,
                    _ => walk(v),
                })
                .max()
                .unwrap_or(0),
            Value::Array(items) => items.iter().map(walk).max().unwrap_or(0),
            _ => 0,
        }
    }
    schema
        .fields
        .iter()
        .map(|f| f.id.max(walk(&f.field_type)))
        .max()
        .unwrap_or(0)
}

fn identity_spec(schema: &api::Schema, fields: &[FieldInfo]) -> Option<api::PartitionSpec> {
    let keys: Vec<api::PartitionField> = fields
        .iter()
        .filter(|f| f.partition_key)
        .filter_map(|f| schema.fields.iter().find(|s| s.name == f.name))
        .map(|s| api::PartitionField {
            source_id: s.id,
            field_id: None,
            name: s.name.clone(),
            transform: "identity".to_string(),
        })
        .collect();
    if keys.is_empty() {
        None
    } else {
        Some(api::PartitionSpec {
            spec_id: 0,
            fields: keys,
        })
    }
}

pub fn create_request(
    info: &TableInfo,
    converter: &IcebergTypeConverter,
) -> CatalogResult<api::CreateTableRequest> {
    let table = info
        .name
        .table()
        .ok_or_else(|| CatalogError::InvalidRequest(format!("'{}' is not a table name", info.name)))?;
    let (schema, _) = build_schema(&info.fields, 0, None, converter)?;
    Ok(api::CreateTableRequest {
        name: table.to_string(),
        location: info.storage.uri.clone(),
        partition_spec: identity_spec(&schema, &info.fields),
        schema,
        properties: stored_properties(info),
    })
}

/// Commit turning the table in `current` into `info`.
pub fn commit_request(
    current: &api::LoadTableResponse,
    info: &TableInfo,
    converter: &IcebergTypeConverter,
) -> CatalogResult<api::CommitTableRequest> {
    let metadata = &current.metadata;
    let mut requirements = Vec::new();
    if let Some(uuid) = &metadata.table_uuid {
        requirements.push(api::TableRequirement::AssertTableUuid { uuid: uuid.clone() });
    }

    let mut updates = Vec::new();
    let current_info = table_info(&info.name, current, converter);
    if schema_differs(&current_info.fields, &info.fields) {
        let next_schema_id = metadata
            .schemas
            .iter()
            .map(|s| s.schema_id)
            .chain(metadata.schema.iter().map(|s| s.schema_id))
            .max()
            .map_or(0, |id| id + 1);
        let (schema, last_column_id) =
            build_schema(&info.fields, next_schema_id, metadata.current_schema(), converter)?;
        updates.push(api::TableUpdate::AddSchema {
            schema,
            last_column_id: Some(last_column_id),
        });
        updates.push(api::TableUpdate::SetCurrentSchema { schema_id: -1 });
    }

    if let Some(location) = &info.storage.uri {
        if location != &metadata.location {
            updates.push(api::TableUpdate::SetLocation {
                location: location.clone(),
            });
        }
    }

    let desired = stored_properties(info);
    let changed: HashMap<String, String> = desired
        .iter()
        .filter(|(k, v)| metadata.properties.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !changed.is_empty() {
        updates.push(api::TableUpdate::SetProperties { updates: changed });
    }
    let mut removals: Vec<String> = metadata
        .properties
        .keys()
        .filter(|k| !desired.contains_key(*k))
        .cloned()
        .collect();
    if !removals.is_empty() {
        removals.sort();
        updates.push(api::TableUpdate::RemoveProperties { removals });
    }

    Ok(api::CommitTableRequest {
        identifier: None,
        requirements,
        updates,
    })
}

fn schema_differs(current: &[FieldInfo], desired: &[FieldInfo]) -> bool {
    current.len() != desired.len()
        || current.iter().zip(desired).any(|(a, b)| {
            a.name != b.name
                || a.type_name != b.type_name
                || a.nullable != b.nullable
                || a.comment != b.comment
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_response() -> api::LoadTableResponse {
        serde_json::from_value(json!({
            "metadata-location": "s3://wh/db/events/metadata/00001.json",
            "metadata": {
                "format-version": 2,
                "table-uuid": "9c1d",
                "location": "s3://wh/db/events",
                "last-updated-ms": 1_700_000_000_000i64,
                "current-schema-id": 0,
                "schemas": [{"schema-id": 0, "type": "struct", "fields": [
                    {"id": 1, "name": "id", "type": "long", "required": true},
                    {"id": 2, "name": "day", "type": "date", "required": false},
                    {"id": 3, "name": "tags", "required": false, "type":
                        {"type": "list", "element-id": 4, "element": "string", "element-required": false}}
                ]}],
                "default-spec-id": 0,
                "partition-specs": [{"spec-id": 0, "fields": [
                    {"source-id": 2, "field-id": 1000, "name": "day", "transform": "identity"}
                ]}],
                "properties": {"owner": "etl", "write.format.default": "parquet"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_iceberg_primitives() {
        let c = IcebergTypeConverter;
        assert_eq!(c.to_canonical("long"), CanonicalType::BigInt);
        assert_eq!(c.to_canonical("timestamptz"), CanonicalType::TimestampTz);
        assert_eq!(c.to_canonical("fixed[16]"), CanonicalType::Fixed(16));
        assert_eq!(
            c.to_canonical("decimal(9, 2)"),
            CanonicalType::Decimal {
                precision: 9,
                scale: 2
            }
        );
        assert_eq!(c.from_canonical(&CanonicalType::SmallInt).unwrap(), "int");
        assert_eq!(c.from_canonical(&CanonicalType::Fixed(4)).unwrap(), "fixed[4]");
        assert!(c
            .from_canonical(&CanonicalType::Unknown("interval".into()))
            .is_err());
    }

    #[test]
    fn test_iceberg_nested_json() {
        let c = IcebergTypeConverter;
        let native = r#"{"type":"map","key-id":5,"key":"string","value-id":6,"value":{"type":"struct","fields":[{"id":7,"name":"n","required":false,"type":"int"}]},"value-required":false}"#;
        let canonical = c.to_canonical(native);
        assert_eq!(
            canonical,
            CanonicalType::Map(
                Box::new(CanonicalType::String),
                Box::new(CanonicalType::Row(vec![RowField::new("n", CanonicalType::Int)]))
            )
        );
        let encoded = c.from_canonical(&canonical).unwrap();
        assert_eq!(c.to_canonical(&encoded), canonical);
    }

    #[test]
    fn test_table_info_from_metadata() {
        let name = QualifiedName::of_table("lake", "db", "events").unwrap();
        let info = table_info(&name, &load_response(), &IcebergTypeConverter);
        assert_eq!(info.fields.len(), 3);
        assert!(!info.fields[0].nullable);
        assert!(info.fields[1].partition_key);
        assert_eq!(
            info.fields[2].type_name,
            CanonicalType::Array(Box::new(CanonicalType::String))
        );
        assert_eq!(info.owner.as_deref(), Some("etl"));
        assert_eq!(info.properties[TABLE_TYPE_PROPERTY], "ICEBERG");
        assert_eq!(info.storage.uri.as_deref(), Some("s3://wh/db/events"));
        assert!(info.audit.last_modified_at.is_some());
    }

    #[test]
    fn test_create_request_partition_spec() {
        let name = QualifiedName::of_table("lake", "db", "events").unwrap();
        let info = table_info(&name, &load_response(), &IcebergTypeConverter);
        let request = create_request(&info, &IcebergTypeConverter).unwrap();
        assert_eq!(request.name, "events");
        assert_eq!(request.schema.fields.len(), 3);
        let spec = request.partition_spec.unwrap();
        assert_eq!(spec.fields[0].name, "day");
        assert!(!request.properties.contains_key(TABLE_TYPE_PROPERTY));
        assert_eq!(request.properties[OWNER_PROPERTY], "etl");
    }

    #[test]
    fn test_commit_request_only_changes() {
        let name = QualifiedName::of_table("lake", "db", "events").unwrap();
        let current = load_response();
        let unchanged = table_info(&name, &current, &IcebergTypeConverter);
        let commit = commit_request(&current, &unchanged, &IcebergTypeConverter).unwrap();
        assert!(commit.updates.is_empty());

        let mut changed = unchanged.clone();
        changed.fields.push(FieldInfo::new("note", CanonicalType::String));
        changed.properties.remove("write.format.default");
        let commit = commit_request(&current, &changed, &IcebergTypeConverter).unwrap();
        match &commit.updates[0] {
            api::TableUpdate::AddSchema { schema, .. } => {
                assert_eq!(schema.schema_id, 1);
                assert_eq!(schema.fields[0].id, 1);
                assert_eq!(schema.fields[3].name, "note");
                // Element id 4 of `tags` is taken.
                assert_eq!(schema.fields[3].id, 5);
            }
            other => panic!("unexpected update {:?}", other),
        }
        assert_eq!(commit.updates[1], api::TableUpdate::SetCurrentSchema { schema_id: -1 });
        assert!(commit
            .updates
            .contains(&api::TableUpdate::RemoveProperties {
                removals: vec!["write.format.default".to_string()]
            }));
    }
}
