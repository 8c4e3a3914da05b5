//! Canonical info DTOs and request plumbing.
//!
//! Connectors convert their native descriptors into these types; nothing
//! backend-specific crosses the connector boundary.

use crate::name::QualifiedName;
use crate::types::CanonicalType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Audit timestamps and principals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<DateTime<Utc>>,
}

/// Physical storage of a table or partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serialization_lib: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl StorageInfo {
    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,
    /// Canonical type.
    pub type_name: CanonicalType,
    /// Native type string as the backend stores it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub partition_key: bool,
    #[serde(default)]
    pub pos: u32,
}

fn default_nullable() -> bool {
    true
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, type_name: CanonicalType) -> Self {
        Self {
            name: name.into(),
            type_name,
            source_type: None,
            nullable: true,
            comment: None,
            partition_key: false,
            pos: 0,
        }
    }

    pub fn partition_key(mut self) -> Self {
        self.partition_key = true;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A database (or namespace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: QualifiedName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub audit: AuditInfo,
}

impl DatabaseInfo {
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            owner: None,
            uri: None,
            properties: BTreeMap::new(),
            audit: AuditInfo::default(),
        }
    }
}

/// A table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub name: QualifiedName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
    #[serde(default)]
    pub storage: StorageInfo,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub audit: AuditInfo,
}

impl TableInfo {
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            owner: None,
            fields: Vec::new(),
            storage: StorageInfo::default(),
            properties: BTreeMap::new(),
            audit: AuditInfo::default(),
        }
    }

    /// Partition key columns in declaration order.
    pub fn partition_keys(&self) -> Vec<&FieldInfo> {
        self.fields.iter().filter(|f| f.partition_key).collect()
    }

    /// Same table under another name.
    pub fn renamed(&self, name: QualifiedName) -> TableInfo {
        TableInfo {
            name,
            ..self.clone()
        }
    }
}

/// A partition of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub name: QualifiedName,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub storage: StorageInfo,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub audit: AuditInfo,
}

impl PartitionInfo {
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            values: Vec::new(),
            storage: StorageInfo::default(),
            properties: BTreeMap::new(),
            audit: AuditInfo::default(),
        }
    }

    /// The partition segment of the name (`k1=v1/k2=v2`).
    pub fn partition_name(&self) -> &str {
        self.name.partition().unwrap_or_default()
    }
}

/// Outcome of saving a batch of partitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionsSaveResponse {
    /// Partition names that did not exist before.
    pub added: Vec<String>,
    /// Partition names that existed and were overwritten.
    pub updated: Vec<String>,
}

/// Who issued a request and how long it may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            user_id: None,
            client_id: None,
            api_host: None,
            scheme: None,
            trace_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            deadline: None,
        }
    }
}

impl RequestContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Time left before the deadline, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Paging and filtering for list calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Only entries whose last name segment starts with this prefix.
    pub prefix: Option<String>,
    /// Opaque token from a previous page.
    pub page_token: Option<String>,
    /// Page size; `None` returns everything remaining.
    pub limit: Option<usize>,
}

impl ListRequest {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }
}

/// One page of list results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// Page over items the backend returned in full.
    ///
    /// Applies the prefix filter to `key`, then slices by the numeric offset
    /// carried in the page token.
    pub fn from_all<F>(mut items: Vec<T>, request: &ListRequest, key: F) -> crate::CatalogResult<Self>
    where
        F: Fn(&T) -> &str,
    {
        if let Some(prefix) = request.prefix.as_deref() {
            items.retain(|item| key(item).starts_with(prefix));
        }
        let offset = match request.page_token.as_deref() {
            Some(token) => token.parse::<usize>().map_err(|_| {
                crate::CatalogError::InvalidRequest(format!("invalid page token '{}'", token))
            })?,
            None => 0,
        };
        let remaining: Vec<T> = items.into_iter().skip(offset).collect();
        match request.limit {
            Some(limit) if limit > 0 && remaining.len() > limit => {
                let mut items = remaining;
                items.truncate(limit);
                Ok(Page {
                    items,
                    next_page_token: Some((offset + limit).to_string()),
                })
            }
            _ => Ok(Page {
                items: remaining,
                next_page_token: None,
            }),
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_token: self.next_page_token,
        }
    }
}
