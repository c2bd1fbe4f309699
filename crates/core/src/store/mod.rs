//! Contract of the local persistent store.
//!
//! Implementations must make every write call atomic: a call either commits
//! all of its effects or none of them. [`LocalStoreTrait::commit`] is the
//! write the facade relies on, applying a record change and enqueuing its
//! outbox item in a single transaction.

mod memory;
mod snapshot;

use async_trait::async_trait;

use crate::entities::Record;
use crate::errors::Result;
use crate::sync::{Mutation, OutboxItem, OutboxWriteRequest, SyncStatus};
use crate::tables::TableName;

pub use memory::MemoryStore;
pub use snapshot::{DataSnapshot, TableSnapshot};

#[async_trait]
pub trait LocalStoreTrait: Send + Sync {
    /// Opens the underlying medium if it is not open yet. Idempotent; every
    /// other operation calls it first.
    async fn initialize(&self) -> Result<()>;

    /// Releases the medium. A later call opens it again.
    async fn close(&self) -> Result<()>;

    /// Reads every table and the outbox.
    async fn load_all(&self) -> Result<DataSnapshot>;

    /// Replaces the full contents of every table in `data` in one transaction.
    async fn save_all(&self, data: TableSnapshot) -> Result<()>;

    /// Insert-or-replace by key. Sync fields are persisted exactly as given.
    async fn upsert(&self, record: Record) -> Result<()>;

    /// Removes one record; absent ids are not an error.
    async fn delete(&self, table: TableName, id: &str) -> Result<()>;

    /// Appends one item and returns the id assigned to it.
    async fn add_to_outbox(&self, request: OutboxWriteRequest) -> Result<i64>;

    /// Pending items, oldest first (ascending id).
    async fn get_outbox(&self) -> Result<Vec<OutboxItem>>;

    /// Removes one item; absent ids are not an error.
    async fn remove_from_outbox(&self, id: i64) -> Result<()>;

    /// Empties one table. Never touches the outbox.
    async fn clear_table(&self, table: TableName) -> Result<()>;

    /// All records of one table, ordered by id.
    async fn list(&self, table: TableName) -> Result<Vec<Record>>;

    async fn get(&self, table: TableName, id: &str) -> Result<Option<Record>>;

    /// Applies `mutation` and enqueues its outbox item atomically.
    ///
    /// Deleting an id that does not exist fails with `NotFound` and enqueues
    /// nothing.
    async fn commit(&self, mutation: Mutation) -> Result<OutboxItem>;

    /// Writes back the sync fields of one record without touching anything
    /// else and without enqueuing. Returns false when the record is gone.
    async fn set_sync_status(
        &self,
        table: TableName,
        id: &str,
        status: SyncStatus,
        error: Option<String>,
    ) -> Result<bool>;
}
