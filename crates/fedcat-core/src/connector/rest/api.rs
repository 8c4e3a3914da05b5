//! Iceberg REST catalog wire types.
//!
//! The subset of the REST catalog API the connector speaks.
//! See: https://iceberg.apache.org/spec/#iceberg-rest-catalog-api

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `GET /v1/config` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigResponse {
    #[serde(default)]
    pub defaults: HashMap<String, String>,
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListNamespacesResponse {
    pub namespaces: Vec<Vec<String>>,
    #[serde(default, rename = "next-page-token", skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNamespaceRequest {
    pub namespace: Vec<String>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceResponse {
    pub namespace: Vec<String>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNamespacePropertiesRequest {
    #[serde(default)]
    pub removals: Vec<String>,
    #[serde(default)]
    pub updates: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTablesResponse {
    pub identifiers: Vec<TableIdentifier>,
    #[serde(default, rename = "next-page-token", skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableIdentifier {
    pub namespace: Vec<String>,
    pub name: String,
}

impl TableIdentifier {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: vec![namespace.to_string()],
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub name: String,
    /// Catalog assigns one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub schema: Schema,
    #[serde(skip_serializing_if = "Option::is_none", rename = "partition-spec")]
    pub partition_spec: Option<PartitionSpec>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTableResponse {
    #[serde(default, rename = "metadata-location")]
    pub metadata_location: Option<String>,
    pub metadata: TableMetadata,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// Table metadata, lenient across format versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(rename = "format-version")]
    pub format_version: i32,
    #[serde(default, rename = "table-uuid")]
    pub table_uuid: Option<String>,
    pub location: String,
    #[serde(default, rename = "last-updated-ms")]
    pub last_updated_ms: Option<i64>,
    /// Current schema in format version 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(default)]
    pub schemas: Vec<Schema>,
    #[serde(default, rename = "current-schema-id")]
    pub current_schema_id: Option<i32>,
    #[serde(default, rename = "partition-specs")]
    pub partition_specs: Vec<PartitionSpec>,
    #[serde(default, rename = "default-spec-id")]
    pub default_spec_id: Option<i32>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default, rename = "current-snapshot-id")]
    pub current_snapshot_id: Option<i64>,
}

impl TableMetadata {
    pub fn current_schema(&self) -> Option<&Schema> {
        match self.current_schema_id {
            Some(id) => self
                .schemas
                .iter()
                .find(|s| s.schema_id == id)
                .or(self.schema.as_ref()),
            None => self.schema.as_ref().or_else(|| self.schemas.last()),
        }
    }

    pub fn default_partition_spec(&self) -> Option<&PartitionSpec> {
        match self.default_spec_id {
            Some(id) => self.partition_specs.iter().find(|s| s.spec_id == id),
            None => self.partition_specs.last(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, rename = "schema-id")]
    pub schema_id: i32,
    #[serde(rename = "type", default = "default_struct_type")]
    pub r#type: String,
    pub fields: Vec<SchemaField>,
    #[serde(default, rename = "identifier-field-ids", skip_serializing_if = "Vec::is_empty")]
    pub identifier_field_ids: Vec<i32>,
}

fn default_struct_type() -> String {
    "struct".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub id: i32,
    pub name: String,
    /// Primitive type string or nested type object.
    #[serde(rename = "type")]
    pub field_type: serde_json::Value,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSpec {
    #[serde(default, rename = "spec-id")]
    pub spec_id: i32,
    #[serde(default)]
    pub fields: Vec<PartitionField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionField {
    #[serde(rename = "source-id")]
    pub source_id: i32,
    #[serde(default, rename = "field-id", skip_serializing_if = "Option::is_none")]
    pub field_id: Option<i32>,
    pub name: String,
    pub transform: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameTableRequest {
    pub source: TableIdentifier,
    pub destination: TableIdentifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitTableRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<TableIdentifier>,
    pub requirements: Vec<TableRequirement>,
    pub updates: Vec<TableUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TableRequirement {
    #[serde(rename = "assert-table-uuid")]
    AssertTableUuid { uuid: String },
    #[serde(rename = "assert-current-schema-id")]
    AssertCurrentSchemaId {
        #[serde(rename = "current-schema-id")]
        current_schema_id: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum TableUpdate {
    #[serde(rename = "add-schema")]
    AddSchema {
        schema: Schema,
        #[serde(rename = "last-column-id", skip_serializing_if = "Option::is_none")]
        last_column_id: Option<i32>,
    },
    /// `-1` selects the schema added last in the same commit.
    #[serde(rename = "set-current-schema")]
    SetCurrentSchema {
        #[serde(rename = "schema-id")]
        schema_id: i32,
    },
    #[serde(rename = "set-location")]
    SetLocation { location: String },
    #[serde(rename = "set-properties")]
    SetProperties { updates: HashMap<String, String> },
    #[serde(rename = "remove-properties")]
    RemoveProperties { removals: Vec<String> },
}

/// Error body: `{"error": {"message", "type", "code"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorModel {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}
