//! Single writer for the database.
//!
//! SQLite allows one writer at a time, so every write goes through one
//! dedicated thread that owns one pooled connection. Each job runs inside
//! its own `IMMEDIATE` transaction: it commits as a whole or not at all.

use diesel::sqlite::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use inventra_core::errors::{DatabaseError, Error};
use inventra_core::Result;

use super::{get_connection, DbPool};
use crate::errors::{write_job_error, StorageError};

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

const QUEUE_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<Job>,
}

impl WriteHandle {
    /// Runs `job` on the writer thread inside a transaction and waits for
    /// it to commit or roll back.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let wrapped: Job = Box::new(move |conn: &mut SqliteConnection| {
            let result = conn
                .immediate_transaction::<T, StorageError, _>(|tx| {
                    job(tx).map_err(StorageError::from)
                })
                .map_err(write_job_error);
            let _ = reply_tx.send(result);
        });

        self.tx.send(wrapped).await.map_err(|_| {
            Error::Database(DatabaseError::StorageUnavailable(
                "Database writer is not running".to_string(),
            ))
        })?;

        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::TransactionAborted(
                "Database writer stopped before replying".to_string(),
            ))
        })?
    }
}

/// Starts the writer thread. It stops once every [`WriteHandle`] is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);

    std::thread::spawn(move || {
        let mut conn = match get_connection(&pool) {
            Ok(conn) => conn,
            Err(e) => {
                error!("Database writer could not get a connection: {}", e);
                return;
            }
        };
        debug!("Database writer started");
        while let Some(job) = rx.blocking_recv() {
            job(&mut *conn);
        }
        debug!("Database writer stopped");
    });

    WriteHandle { tx }
}
