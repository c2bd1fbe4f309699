//! SQLite-backed [`LocalStoreTrait`].

use std::sync::Arc;

use async_trait::async_trait;
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::{debug, info};
use tokio::sync::RwLock;

use inventra_core::entities::Record;
use inventra_core::errors::{DatabaseError, Error, Result};
use inventra_core::store::{DataSnapshot, LocalStoreTrait, TableSnapshot};
use inventra_core::sync::{
    Mutation, OutboxItem, OutboxOperation, OutboxWriteRequest, SyncMeta, SyncStatus,
};
use inventra_core::tables::TableName;

use crate::db::{
    create_pool, get_connection, init, run_migrations, write_actor::spawn_writer, DbPool,
    StoreConfig, WriteHandle,
};
use crate::errors::StorageError;
use crate::outbox::{delete_outbox_item, load_outbox, write_outbox_item};
use crate::records::{
    clear_records, delete_record, find_record, insert_record, load_records, update_sync_fields,
    upsert_record,
};

struct StoreHandles {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

fn unavailable(err: Error) -> Error {
    if err.is_storage_unavailable() {
        err
    } else {
        Error::Database(DatabaseError::StorageUnavailable(err.to_string()))
    }
}

fn open(config: &StoreConfig) -> Result<StoreHandles> {
    let db_path = init(config)?;
    run_migrations(&db_path)?;
    let pool = create_pool(&db_path, config)?;
    let writer = spawn_writer(pool.as_ref().clone());
    info!("Opened local store at {}", db_path);
    Ok(StoreHandles { pool, writer })
}

/// Local store on a single SQLite file.
///
/// Opening is lazy: the first operation (or an explicit `initialize`)
/// creates the directory, migrates the schema, builds the pool and starts
/// the writer. `close` drops all of that; the next operation opens again.
pub struct SqliteLocalStore {
    config: StoreConfig,
    handles: RwLock<Option<Arc<StoreHandles>>>,
}

impl SqliteLocalStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            handles: RwLock::new(None),
        }
    }

    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn handles(&self) -> Result<Arc<StoreHandles>> {
        if let Some(handles) = self.handles.read().await.as_ref() {
            return Ok(Arc::clone(handles));
        }

        let mut guard = self.handles.write().await;
        if let Some(handles) = guard.as_ref() {
            return Ok(Arc::clone(handles));
        }

        let config = self.config.clone();
        let opened = tokio::task::spawn_blocking(move || open(&config))
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::StorageUnavailable(format!(
                    "Opening the local store failed: {}",
                    e
                )))
            })?
            .map_err(unavailable)?;

        let handles = Arc::new(opened);
        *guard = Some(Arc::clone(&handles));
        Ok(handles)
    }

    /// Runs `job` on a pooled connection off the async runtime.
    async fn read<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.handles().await?.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            job(&mut *conn)
        })
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::Internal(format!(
                "Database read worker failed: {}",
                e
            )))
        })?
    }

    async fn write<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let handles = self.handles().await?;
        handles.writer.exec(job).await
    }
}

#[async_trait]
impl LocalStoreTrait for SqliteLocalStore {
    async fn initialize(&self) -> Result<()> {
        self.handles().await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        if self.handles.write().await.take().is_some() {
            info!("Closed local store at {}", self.config.db_path());
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<DataSnapshot> {
        self.read(|conn| {
            conn.transaction::<_, StorageError, _>(|tx| {
                let mut tables = TableSnapshot::new();
                for table in TableName::ALL {
                    tables.insert(table, load_records(tx, table)?);
                }
                let outbox = load_outbox(tx)?;
                Ok(DataSnapshot { tables, outbox })
            })
            .map_err(Error::from)
        })
        .await
    }

    async fn save_all(&self, data: TableSnapshot) -> Result<()> {
        data.validate()?;
        self.write(move |conn| {
            for (table, records) in data.tables() {
                let removed = clear_records(conn, table)?;
                for record in records {
                    insert_record(conn, record)?;
                }
                debug!(
                    "Replaced {} ({} removed, {} written)",
                    table,
                    removed,
                    records.len()
                );
            }
            Ok(())
        })
        .await
    }

    async fn upsert(&self, record: Record) -> Result<()> {
        self.write(move |conn| upsert_record(conn, &record)).await
    }

    async fn delete(&self, table: TableName, id: &str) -> Result<()> {
        let id = id.to_string();
        self.write(move |conn| delete_record(conn, table, &id).map(|_| ()))
            .await
    }

    async fn add_to_outbox(&self, request: OutboxWriteRequest) -> Result<i64> {
        self.write(move |conn| write_outbox_item(conn, request).map(|item| item.id))
            .await
    }

    async fn get_outbox(&self) -> Result<Vec<OutboxItem>> {
        self.read(load_outbox).await
    }

    async fn remove_from_outbox(&self, id: i64) -> Result<()> {
        self.write(move |conn| delete_outbox_item(conn, id).map(|_| ()))
            .await
    }

    async fn clear_table(&self, table: TableName) -> Result<()> {
        self.write(move |conn| clear_records(conn, table).map(|_| ()))
            .await
    }

    async fn list(&self, table: TableName) -> Result<Vec<Record>> {
        self.read(move |conn| load_records(conn, table)).await
    }

    async fn get(&self, table: TableName, id: &str) -> Result<Option<Record>> {
        let id = id.to_string();
        self.read(move |conn| find_record(conn, table, &id)).await
    }

    async fn commit(&self, mutation: Mutation) -> Result<OutboxItem> {
        self.write(move |conn| {
            let request = mutation.outbox_request();
            match mutation {
                Mutation::Upsert { record, operation } => {
                    if operation == OutboxOperation::Insert {
                        if find_record(conn, record.table(), record.id())?.is_some() {
                            return Err(Error::Database(DatabaseError::AlreadyExists(format!(
                                "{}/{}",
                                record.table(),
                                record.id()
                            ))));
                        }
                        insert_record(conn, &record)?;
                    } else {
                        upsert_record(conn, &record)?;
                    }
                }
                Mutation::Delete { table, id } => {
                    if delete_record(conn, table, &id)? == 0 {
                        return Err(Error::Database(DatabaseError::NotFound(format!(
                            "{}/{}",
                            table, id
                        ))));
                    }
                }
            }
            write_outbox_item(conn, request)
        })
        .await
    }

    async fn set_sync_status(
        &self,
        table: TableName,
        id: &str,
        status: SyncStatus,
        error: Option<String>,
    ) -> Result<bool> {
        let id = id.to_string();
        let sync = SyncMeta {
            sync_status: Some(status),
            sync_error: error,
        };
        self.write(move |conn| update_sync_fields(conn, table, &id, &sync).map(|n| n > 0))
            .await
    }
}
