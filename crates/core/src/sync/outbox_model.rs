//! Outbox items: the pending remote mutations queued by local writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Record;
use crate::tables::TableName;

/// Supported outbox operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxOperation {
    Insert,
    Update,
    Delete,
}

impl OutboxOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxOperation::Insert => "insert",
            OutboxOperation::Update => "update",
            OutboxOperation::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<OutboxOperation> {
        match value {
            "insert" => Some(OutboxOperation::Insert),
            "update" => Some(OutboxOperation::Update),
            "delete" => Some(OutboxOperation::Delete),
            _ => None,
        }
    }
}

/// What the remote side needs to apply the mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboxPayload {
    /// Full record snapshot, for inserts and updates.
    Snapshot { record: Record },
    /// Identifier of the removed record.
    Deleted { id: String },
}

impl OutboxPayload {
    /// Identifier of the record the mutation targets.
    pub fn entity_id(&self) -> &str {
        match self {
            OutboxPayload::Snapshot { record } => record.id(),
            OutboxPayload::Deleted { id } => id,
        }
    }
}

/// One queued mutation, as read back from the store.
///
/// `id` is assigned by the store on insertion, strictly increasing and never
/// reused; ascending `id` is the order mutations were committed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxItem {
    pub id: i64,
    pub entity_type: TableName,
    pub operation: OutboxOperation,
    pub payload: OutboxPayload,
    pub created_at: DateTime<Utc>,
}

impl OutboxItem {
    pub fn entity_id(&self) -> &str {
        self.payload.entity_id()
    }

    /// Key the remote side deduplicates on.
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.entity_type,
            self.operation.as_str(),
            self.entity_id(),
            self.id
        )
    }
}

/// An outbox item before the store has assigned its id.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxWriteRequest {
    pub entity_type: TableName,
    pub operation: OutboxOperation,
    pub payload: OutboxPayload,
    pub created_at: DateTime<Utc>,
}

impl OutboxWriteRequest {
    pub fn insert(record: Record) -> Self {
        Self::snapshot(OutboxOperation::Insert, record)
    }

    pub fn update(record: Record) -> Self {
        Self::snapshot(OutboxOperation::Update, record)
    }

    pub fn delete(table: TableName, id: impl Into<String>) -> Self {
        Self {
            entity_type: table,
            operation: OutboxOperation::Delete,
            payload: OutboxPayload::Deleted { id: id.into() },
            created_at: Utc::now(),
        }
    }

    fn snapshot(operation: OutboxOperation, record: Record) -> Self {
        Self {
            entity_type: record.table(),
            operation,
            payload: OutboxPayload::Snapshot { record },
            created_at: Utc::now(),
        }
    }

    pub fn into_item(self, id: i64) -> OutboxItem {
        OutboxItem {
            id,
            entity_type: self.entity_type,
            operation: self.operation,
            payload: self.payload,
            created_at: self.created_at,
        }
    }
}

/// A local record change paired with the outbox item describing it. The
/// store applies both in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Upsert {
        record: Record,
        operation: OutboxOperation,
    },
    Delete {
        table: TableName,
        id: String,
    },
}

impl Mutation {
    pub fn insert(record: Record) -> Self {
        Mutation::Upsert {
            record,
            operation: OutboxOperation::Insert,
        }
    }

    pub fn update(record: Record) -> Self {
        Mutation::Upsert {
            record,
            operation: OutboxOperation::Update,
        }
    }

    pub fn delete(table: TableName, id: impl Into<String>) -> Self {
        Mutation::Delete {
            table,
            id: id.into(),
        }
    }

    pub fn table(&self) -> TableName {
        match self {
            Mutation::Upsert { record, .. } => record.table(),
            Mutation::Delete { table, .. } => *table,
        }
    }

    /// The outbox item this mutation must enqueue.
    pub fn outbox_request(&self) -> OutboxWriteRequest {
        match self {
            Mutation::Upsert { record, operation } => {
                OutboxWriteRequest::snapshot(*operation, record.clone())
            }
            Mutation::Delete { table, id } => OutboxWriteRequest::delete(*table, id.clone()),
        }
    }
}
