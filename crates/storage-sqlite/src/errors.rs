//! Storage-level errors and their conversion into core errors.

use inventra_core::errors::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i32, supported: i32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query(diesel::result::Error::NotFound) => {
                Error::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            StorageError::Query(e) => Error::Database(DatabaseError::QueryFailed(e.to_string())),
            StorageError::Connection(e) => {
                Error::Database(DatabaseError::StorageUnavailable(e.to_string()))
            }
            StorageError::Pool(e) => {
                Error::Database(DatabaseError::StorageUnavailable(e.to_string()))
            }
            err @ (StorageError::Migration(_)
            | StorageError::SchemaTooNew { .. }
            | StorageError::Io(_)) => {
                Error::Database(DatabaseError::StorageUnavailable(err.to_string()))
            }
            StorageError::Core(e) => e,
        }
    }
}

/// Maps the failure of a write job to what the caller sees: anything that
/// went wrong while statements ran means the transaction did not commit.
pub(crate) fn write_job_error(err: StorageError) -> Error {
    match err {
        StorageError::Query(e) => Error::Database(DatabaseError::TransactionAborted(e.to_string())),
        StorageError::Core(Error::Database(DatabaseError::QueryFailed(message))) => {
            Error::Database(DatabaseError::TransactionAborted(message))
        }
        other => Error::from(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_failures_mean_storage_unavailable() {
        let err = Error::from(StorageError::Migration("disk full".to_string()));
        assert!(err.is_storage_unavailable());

        let err = Error::from(StorageError::SchemaTooNew {
            found: 9,
            supported: 2,
        });
        assert!(err.is_storage_unavailable());
    }

    #[test]
    fn failed_statements_inside_write_jobs_abort_the_transaction() {
        let err = write_job_error(StorageError::Query(diesel::result::Error::RollbackTransaction));
        assert!(err.is_transaction_aborted());

        let err = write_job_error(StorageError::Core(Error::Database(
            DatabaseError::QueryFailed("UNIQUE constraint failed".to_string()),
        )));
        assert!(err.is_transaction_aborted());
    }

    #[test]
    fn domain_errors_pass_through_write_jobs() {
        let err = write_job_error(StorageError::Core(Error::Database(DatabaseError::NotFound(
            "customers/c1".to_string(),
        ))));
        assert!(err.is_not_found());
    }
}
