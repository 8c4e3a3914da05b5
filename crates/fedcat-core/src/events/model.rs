//! Catalog mutation events.

use crate::model::{DatabaseInfo, PartitionInfo, PartitionsSaveResponse, RequestContext, TableInfo};
use crate::name::QualifiedName;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Kind of mutation an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventType {
    DatabaseCreated,
    DatabaseUpdated,
    DatabaseDeleted,
    TableCreated,
    TableUpdated,
    TableRenamed,
    TableDeleted,
    PartitionsAdded,
    PartitionsDeleted,
}

impl EventType {
    /// Message type used on the wire and as the metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DatabaseCreated => "database.create",
            EventType::DatabaseUpdated => "database.update",
            EventType::DatabaseDeleted => "database.delete",
            EventType::TableCreated => "table.create",
            EventType::TableUpdated => "table.update",
            EventType::TableRenamed => "table.rename",
            EventType::TableDeleted => "table.delete",
            EventType::PartitionsAdded => "partition.add",
            EventType::PartitionsDeleted => "partition.delete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What changed, per event type.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    DatabaseCreated(DatabaseInfo),
    DatabaseUpdated(DatabaseInfo),
    DatabaseDeleted,
    TableCreated(TableInfo),
    TableUpdated {
        old: TableInfo,
        new: TableInfo,
    },
    TableRenamed {
        old: TableInfo,
        new: TableInfo,
    },
    TableDeleted(TableInfo),
    /// Only partitions that did not exist before are listed; the response
    /// carries both added and updated names.
    PartitionsAdded {
        partitions: Vec<PartitionInfo>,
        response: PartitionsSaveResponse,
    },
    PartitionsDeleted {
        partition_names: Vec<String>,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::DatabaseCreated(_) => EventType::DatabaseCreated,
            EventPayload::DatabaseUpdated(_) => EventType::DatabaseUpdated,
            EventPayload::DatabaseDeleted => EventType::DatabaseDeleted,
            EventPayload::TableCreated(_) => EventType::TableCreated,
            EventPayload::TableUpdated { .. } => EventType::TableUpdated,
            EventPayload::TableRenamed { .. } => EventType::TableRenamed,
            EventPayload::TableDeleted(_) => EventType::TableDeleted,
            EventPayload::PartitionsAdded { .. } => EventType::PartitionsAdded,
            EventPayload::PartitionsDeleted { .. } => EventType::PartitionsDeleted,
        }
    }
}

/// Immutable record of one successful catalog mutation.
///
/// The event type is derived from the payload, so the two cannot disagree.
#[derive(Debug, Clone)]
pub struct CatalogEvent {
    id: Uuid,
    name: QualifiedName,
    context: RequestContext,
    payload: EventPayload,
    timestamp: DateTime<Utc>,
    constructed: Instant,
}

impl CatalogEvent {
    pub fn new(name: QualifiedName, context: &RequestContext, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            context: context.clone(),
            payload,
            timestamp: Utc::now(),
            constructed: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Name the mutation was applied to. For renames this is the old name.
    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Monotonic construction time, for publish delay.
    pub fn constructed(&self) -> Instant {
        self.constructed
    }
}
