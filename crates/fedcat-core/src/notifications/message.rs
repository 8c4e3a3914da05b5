//! Wire messages and the expansion of events into them.

use super::diff::{diff, PatchOperation};
use crate::error::NotificationError;
use crate::events::{CatalogEvent, EventPayload};
use crate::model::{RequestContext, TableInfo};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

/// Message type of the per-batch summary sent alongside partition messages.
pub const PARTITIONS_UPDATED: &str = "table.partitions.updated";

/// Logical channel a message is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    TableEvents,
    PartitionEvents,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::TableEvents => f.write_str("table-events"),
            Destination::PartitionEvents => f.write_str("partition-events"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    pub api_host: Option<String>,
    pub scheme: Option<String>,
    pub trace_id: String,
}

impl From<&RequestContext> for MessageContext {
    fn from(ctx: &RequestContext) -> Self {
        Self {
            user_id: ctx.user_id.clone(),
            client_id: ctx.client_id.clone(),
            api_host: ctx.api_host.clone(),
            scheme: ctx.scheme.clone(),
            trace_id: ctx.trace_id.clone(),
        }
    }
}

/// One published message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub id: String,
    pub event_type: String,
    pub qualified_name: String,
    pub request_context: MessageContext,
    /// Event construction time, epoch millis
    pub timestamp: i64,
    pub payload: Value,
}

/// A message bound for a destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub destination: Destination,
    pub message: NotificationMessage,
}

impl Outbound {
    pub fn message_type(&self) -> &str {
        &self.message.event_type
    }

    /// Partition key: the qualified name, so messages for one entity stay ordered per partition.
    pub fn key(&self) -> &str {
        &self.message.qualified_name
    }
}

struct Builder<'a> {
    event: &'a CatalogEvent,
    context: MessageContext,
}

impl<'a> Builder<'a> {
    fn message(&self, event_type: &str, qualified_name: String, payload: Value) -> NotificationMessage {
        NotificationMessage {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            qualified_name,
            request_context: self.context.clone(),
            timestamp: self.event.timestamp().timestamp_millis(),
            payload,
        }
    }

    fn table(&self, payload: Value) -> Outbound {
        Outbound {
            destination: Destination::TableEvents,
            message: self.message(
                self.event.event_type().as_str(),
                self.event.name().to_string(),
                payload,
            ),
        }
    }

    fn summary(&self, added: usize, updated: usize, deleted: usize) -> Outbound {
        Outbound {
            destination: Destination::TableEvents,
            message: self.message(
                PARTITIONS_UPDATED,
                self.event.name().to_string(),
                json!({
                    "partitionsAdded": added,
                    "partitionsUpdated": updated,
                    "partitionsDeleted": deleted,
                }),
            ),
        }
    }
}

fn change(old: &TableInfo, new: &TableInfo) -> Result<Value, NotificationError> {
    let old_value = serde_json::to_value(old)?;
    let new_value = serde_json::to_value(new)?;
    let ops: Vec<PatchOperation> = diff(&old_value, &new_value);
    Ok(json!({
        "previous": old_value,
        "current": new_value,
        "diff": ops,
    }))
}

/// Expand one event into its messages, in publish order.
///
/// Partition events become one message per partition on the partition
/// destination, followed by a single summary on the table destination.
pub fn expand(event: &CatalogEvent) -> Result<Vec<Outbound>, NotificationError> {
    let builder = Builder {
        event,
        context: MessageContext::from(event.context()),
    };

    let messages = match event.payload() {
        EventPayload::DatabaseCreated(db) | EventPayload::DatabaseUpdated(db) => {
            vec![builder.table(json!({ "database": serde_json::to_value(db)? }))]
        }
        EventPayload::DatabaseDeleted => vec![builder.table(json!({}))],
        EventPayload::TableCreated(table) | EventPayload::TableDeleted(table) => {
            vec![builder.table(json!({ "table": serde_json::to_value(table)? }))]
        }
        EventPayload::TableUpdated { old, new } | EventPayload::TableRenamed { old, new } => {
            vec![builder.table(change(old, new)?)]
        }
        EventPayload::PartitionsAdded {
            partitions,
            response,
        } => {
            let mut out = Vec::with_capacity(partitions.len() + 1);
            for partition in partitions {
                out.push(Outbound {
                    destination: Destination::PartitionEvents,
                    message: builder.message(
                        event.event_type().as_str(),
                        partition.name.to_string(),
                        json!({ "partition": serde_json::to_value(partition)? }),
                    ),
                });
            }
            out.push(builder.summary(response.added.len(), response.updated.len(), 0));
            out
        }
        EventPayload::PartitionsDeleted { partition_names } => {
            let mut out = Vec::with_capacity(partition_names.len() + 1);
            for partition_name in partition_names {
                out.push(Outbound {
                    destination: Destination::PartitionEvents,
                    message: builder.message(
                        event.event_type().as_str(),
                        format!("{}/{}", event.name(), partition_name),
                        json!({ "partitionName": partition_name }),
                    ),
                });
            }
            out.push(builder.summary(0, 0, partition_names.len()));
            out
        }
    };
    Ok(messages)
}
