//! Database rows for the outbox table.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use inventra_core::errors::{DatabaseError, Error, Result};
use inventra_core::sync::{OutboxItem, OutboxOperation, OutboxWriteRequest};
use inventra_core::tables::TableName;

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::outbox)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OutboxItemDB {
    pub id: i64,
    pub entity_type: String,
    pub operation: String,
    pub payload: String,
    pub created_at: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::outbox)]
pub struct NewOutboxItemDB {
    pub entity_type: String,
    pub operation: String,
    pub payload: String,
    pub created_at: String,
}

fn corrupt(message: String) -> Error {
    Error::Database(DatabaseError::Internal(message))
}

impl TryFrom<&OutboxWriteRequest> for NewOutboxItemDB {
    type Error = Error;

    fn try_from(request: &OutboxWriteRequest) -> Result<Self> {
        Ok(Self {
            entity_type: request.entity_type.as_str().to_string(),
            operation: request.operation.as_str().to_string(),
            payload: serde_json::to_string(&request.payload)?,
            created_at: request.created_at.to_rfc3339(),
        })
    }
}

impl TryFrom<OutboxItemDB> for OutboxItem {
    type Error = Error;

    fn try_from(row: OutboxItemDB) -> Result<Self> {
        let entity_type = TableName::parse(&row.entity_type).ok_or_else(|| {
            corrupt(format!(
                "Outbox item {} has unknown entity type '{}'",
                row.id, row.entity_type
            ))
        })?;
        let operation = OutboxOperation::parse(&row.operation).ok_or_else(|| {
            corrupt(format!(
                "Outbox item {} has unknown operation '{}'",
                row.id, row.operation
            ))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                corrupt(format!(
                    "Outbox item {} has invalid created_at '{}': {}",
                    row.id, row.created_at, e
                ))
            })?;

        Ok(OutboxItem {
            id: row.id,
            entity_type,
            operation,
            payload: serde_json::from_str(&row.payload)?,
            created_at,
        })
    }
}
