//! Error types shared by the Inventra crates.

use thiserror::Error;

/// Result type alias used across the core and storage crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by store and facade operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Local persistence failed.
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    /// The validation collaborator rejected the input.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A record payload could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Failures of the local storage medium.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The medium could not be opened or initialized. Not retried internally.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A write transaction did not commit; every table it touched was rolled back.
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// An insert targeted an id that is already stored.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// A bulk write carried records that do not belong to the table they were filed under.
    #[error("Invalid bulk write: {0}")]
    InvalidBulkWrite(String),

    /// A statement failed. Inside a write job this becomes `TransactionAborted`.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Field-level rejection produced by an [`EntityValidator`](crate::data::EntityValidator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity}: {}", format_field_errors(.errors))]
pub struct ValidationError {
    pub entity: String,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            errors: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// True when the failure means the storage medium itself is not usable.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Error::Database(DatabaseError::StorageUnavailable(_)))
    }

    /// True when the caller should retry the whole logical operation.
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, Error::Database(DatabaseError::TransactionAborted(_)))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Database(DatabaseError::NotFound(_)))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Database(DatabaseError::AlreadyExists(_)))
    }
}
