//! In-process implementation of [`LocalStoreTrait`].
//!
//! Each write clones the state, applies the change to the copy and swaps it
//! in only on success, which gives every call the same all-or-nothing
//! behaviour as a database transaction. Independent instances share
//! nothing, so tests can each use their own.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;

use super::{DataSnapshot, LocalStoreTrait, TableSnapshot};
use crate::entities::Record;
use crate::errors::{DatabaseError, Error, Result};
use crate::sync::{Mutation, OutboxItem, OutboxOperation, OutboxWriteRequest, SyncStatus};
use crate::tables::TableName;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: BTreeMap<TableName, BTreeMap<String, Record>>,
    outbox: BTreeMap<i64, OutboxItem>,
    last_outbox_id: i64,
}

impl MemoryState {
    fn table_mut(&mut self, table: TableName) -> &mut BTreeMap<String, Record> {
        self.tables.entry(table).or_default()
    }

    fn upsert(&mut self, record: Record) {
        let id = record.id().to_string();
        self.table_mut(record.table()).insert(id, record);
    }

    fn enqueue(&mut self, request: OutboxWriteRequest) -> OutboxItem {
        self.last_outbox_id += 1;
        let item = request.into_item(self.last_outbox_id);
        self.outbox.insert(item.id, item.clone());
        item
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    open: AtomicBool,
    unavailable: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose medium can never be opened.
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.unavailable.store(true, Ordering::SeqCst);
        store
    }

    /// While set, every write aborts before committing.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Database(DatabaseError::StorageUnavailable(
                "in-memory store is marked unavailable".to_string(),
            )));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "In-memory store state is poisoned".to_string(),
            ))
        })
    }

    fn read<T>(&self, job: impl FnOnce(&MemoryState) -> T) -> Result<T> {
        self.ensure_open()?;
        let state = self.lock()?;
        Ok(job(&state))
    }

    /// Runs `job` against a copy of the state and keeps the copy only when
    /// the job succeeds.
    fn write<T>(&self, job: impl FnOnce(&mut MemoryState) -> Result<T>) -> Result<T> {
        self.ensure_open()?;
        let mut state = self.lock()?;
        let mut working = state.clone();
        let value = job(&mut working)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Database(DatabaseError::TransactionAborted(
                "write failure injected".to_string(),
            )));
        }
        *state = working;
        Ok(value)
    }
}

#[async_trait]
impl LocalStoreTrait for MemoryStore {
    async fn initialize(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn load_all(&self) -> Result<DataSnapshot> {
        self.read(|state| {
            let mut tables = TableSnapshot::new();
            for table in TableName::ALL {
                let records = state
                    .tables
                    .get(&table)
                    .map(|rows| rows.values().cloned().collect())
                    .unwrap_or_default();
                tables.insert(table, records);
            }
            DataSnapshot {
                tables,
                outbox: state.outbox.values().cloned().collect(),
            }
        })
    }

    async fn save_all(&self, data: TableSnapshot) -> Result<()> {
        data.validate()?;
        self.write(|state| {
            for (table, records) in data.tables() {
                let rows = state.table_mut(table);
                rows.clear();
                for record in records {
                    if !table.is_settings() && rows.contains_key(record.id()) {
                        return Err(Error::Database(DatabaseError::TransactionAborted(
                            format!("duplicate id '{}' in table '{}'", record.id(), table),
                        )));
                    }
                    rows.insert(record.id().to_string(), record.clone());
                }
            }
            Ok(())
        })
    }

    async fn upsert(&self, record: Record) -> Result<()> {
        self.write(|state| {
            state.upsert(record);
            Ok(())
        })
    }

    async fn delete(&self, table: TableName, id: &str) -> Result<()> {
        self.write(|state| {
            state.table_mut(table).remove(id);
            Ok(())
        })
    }

    async fn add_to_outbox(&self, request: OutboxWriteRequest) -> Result<i64> {
        self.write(|state| Ok(state.enqueue(request).id))
    }

    async fn get_outbox(&self) -> Result<Vec<OutboxItem>> {
        self.read(|state| state.outbox.values().cloned().collect())
    }

    async fn remove_from_outbox(&self, id: i64) -> Result<()> {
        self.write(|state| {
            state.outbox.remove(&id);
            Ok(())
        })
    }

    async fn clear_table(&self, table: TableName) -> Result<()> {
        self.write(|state| {
            state.table_mut(table).clear();
            Ok(())
        })
    }

    async fn list(&self, table: TableName) -> Result<Vec<Record>> {
        self.read(|state| {
            state
                .tables
                .get(&table)
                .map(|rows| rows.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn get(&self, table: TableName, id: &str) -> Result<Option<Record>> {
        self.read(|state| state.tables.get(&table).and_then(|rows| rows.get(id)).cloned())
    }

    async fn commit(&self, mutation: Mutation) -> Result<OutboxItem> {
        let request = mutation.outbox_request();
        self.write(|state| {
            match mutation {
                Mutation::Upsert { record, operation } => {
                    if operation == OutboxOperation::Insert
                        && state.table_mut(record.table()).contains_key(record.id())
                    {
                        return Err(Error::Database(DatabaseError::AlreadyExists(format!(
                            "{}/{}",
                            record.table(),
                            record.id()
                        ))));
                    }
                    state.upsert(record)
                }
                Mutation::Delete { table, id } => {
                    if state.table_mut(table).remove(&id).is_none() {
                        return Err(Error::Database(DatabaseError::NotFound(format!(
                            "{}/{}",
                            table, id
                        ))));
                    }
                }
            }
            let item = state.enqueue(request);
            debug!("Queued outbox item {} for {}", item.id, item.entity_type);
            Ok(item)
        })
    }

    async fn set_sync_status(
        &self,
        table: TableName,
        id: &str,
        status: SyncStatus,
        error: Option<String>,
    ) -> Result<bool> {
        self.write(|state| {
            let Some(record) = state.table_mut(table).get_mut(id) else {
                return Ok(false);
            };
            let meta = record.sync_meta_mut();
            meta.sync_status = Some(status);
            meta.sync_error = error;
            Ok(true)
        })
    }
}
