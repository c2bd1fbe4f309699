//! Outbox, sync status and the drain loop a synchronizer runs.

mod drain;
mod outbox_model;
mod retry;
mod sync_status;

pub use drain::{DrainReport, OutboxDrainer, RemoteSyncError, SyncTarget};
pub use outbox_model::{Mutation, OutboxItem, OutboxOperation, OutboxPayload, OutboxWriteRequest};
pub use retry::{RetryPolicy, SyncRetryClass};
pub use sync_status::{SyncMeta, SyncStatus};
