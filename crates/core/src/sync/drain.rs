//! Outbox drain loop: delivers queued mutations to a remote target and
//! records the outcome on each record's sync fields.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::retry::{RetryPolicy, SyncRetryClass};
use super::{OutboxItem, SyncStatus};
use crate::errors::Result;
use crate::store::LocalStoreTrait;
use crate::tables::TableName;

/// Remote rejection or transport failure for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSyncError {
    pub class: SyncRetryClass,
    pub message: String,
}

impl RemoteSyncError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            class: SyncRetryClass::Retryable,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            class: SyncRetryClass::Permanent,
            message: message.into(),
        }
    }

    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            class: SyncRetryClass::from_http_status(status),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RemoteSyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.class, self.message)
    }
}

impl std::error::Error for RemoteSyncError {}

/// Remote side of synchronization. Applying the same item twice must be
/// harmless: delivery is at-least-once.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    async fn push(&self, item: &OutboxItem) -> std::result::Result<(), RemoteSyncError>;
}

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub pushed: usize,
    pub rejected: usize,
    /// Rejected items dropped because a newer item for the same record was
    /// queued behind them.
    pub superseded: usize,
    /// Set when the cycle stopped early on a transport failure.
    pub retry_after_secs: Option<i64>,
}

pub struct OutboxDrainer {
    store: Arc<dyn LocalStoreTrait>,
    target: Arc<dyn SyncTarget>,
    retry_policy: RetryPolicy,
    consecutive_failures: AtomicU32,
}

impl OutboxDrainer {
    pub fn new(store: Arc<dyn LocalStoreTrait>, target: Arc<dyn SyncTarget>) -> Self {
        Self {
            store,
            target,
            retry_policy: RetryPolicy::default(),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Pushes pending items oldest first.
    ///
    /// Accepted items are removed and their record marked `Synced` unless a
    /// newer item for it is still queued. A permanent rejection marks the
    /// record `Error` and keeps the item so the failure stays visible, until a
    /// newer item for the same record is queued: that item carries the
    /// corrected state, so the rejected one is dropped and delivery moves on.
    /// A transport failure ends the cycle with a backoff hint; statuses stay
    /// `Pending`.
    pub async fn drain(&self) -> Result<DrainReport> {
        let items = self.store.get_outbox().await?;
        let mut report = DrainReport::default();

        for item in &items {
            let key = (item.entity_type, item.entity_id().to_string());
            match self.target.push(item).await {
                Ok(()) => {
                    self.store.remove_from_outbox(item.id).await?;
                    report.pushed += 1;
                    if !self.has_queued_items_for(&key).await? {
                        self.store
                            .set_sync_status(key.0, &key.1, SyncStatus::Synced, None)
                            .await?;
                    }
                }
                Err(err) if err.class.rejects_record() => {
                    warn!(
                        "Remote rejected outbox item {} ({}/{}): {}",
                        item.id, key.0, key.1, err.message
                    );
                    report.rejected += 1;
                    if self.has_newer_items_for(&key, item.id).await? {
                        debug!(
                            "Dropping rejected outbox item {}, superseded by a newer change",
                            item.id
                        );
                        self.store.remove_from_outbox(item.id).await?;
                        report.superseded += 1;
                        continue;
                    }
                    self.store
                        .set_sync_status(key.0, &key.1, SyncStatus::Error, Some(err.message))
                        .await?;
                }
                Err(err) => {
                    let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
                    let retry_after = self.retry_policy.delay_secs(failures);
                    warn!(
                        "Outbox drain stopped at item {}: {}; retrying in {}s",
                        item.id, err, retry_after
                    );
                    report.retry_after_secs = Some(retry_after);
                    return Ok(report);
                }
            }
        }

        self.consecutive_failures.store(0, Ordering::SeqCst);
        if report.pushed > 0 || report.rejected > 0 {
            info!(
                "Outbox drain finished: {} pushed, {} rejected, {} superseded",
                report.pushed, report.rejected, report.superseded
            );
        } else {
            debug!("Outbox drain found nothing to deliver");
        }
        Ok(report)
    }

    async fn has_queued_items_for(&self, key: &(TableName, String)) -> Result<bool> {
        let pending = self.store.get_outbox().await?;
        Ok(pending
            .iter()
            .any(|item| item.entity_type == key.0 && item.entity_id() == key.1))
    }

    async fn has_newer_items_for(&self, key: &(TableName, String), after: i64) -> Result<bool> {
        let pending = self.store.get_outbox().await?;
        Ok(pending.iter().any(|item| {
            item.id > after && item.entity_type == key.0 && item.entity_id() == key.1
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataService;
    use crate::entities::{Customer, Entity};
    use crate::store::MemoryStore;
    use crate::sync::{Mutation, OutboxOperation, OutboxPayload};
    use std::sync::Mutex;

    /// Records every push attempt and answers with scripted outcomes.
    #[derive(Default)]
    struct ScriptedTarget {
        pushed: Mutex<Vec<(TableName, OutboxOperation, String)>>,
        attempted_names: Mutex<Vec<String>>,
        reject_ids: Vec<String>,
        reject_names: Vec<String>,
        offline: bool,
    }

    #[async_trait]
    impl SyncTarget for ScriptedTarget {
        async fn push(&self, item: &OutboxItem) -> std::result::Result<(), RemoteSyncError> {
            if self.offline {
                return Err(RemoteSyncError::from_http_status(503, "unavailable"));
            }
            if self.reject_ids.iter().any(|id| id == item.entity_id()) {
                return Err(RemoteSyncError::permanent("phone already registered"));
            }
            if let OutboxPayload::Snapshot { record } = &item.payload {
                if let Some(customer) = Customer::from_record(record.clone()) {
                    self.attempted_names.lock().unwrap().push(customer.name.clone());
                    if self.reject_names.contains(&customer.name) {
                        return Err(RemoteSyncError::from_http_status(422, "name rejected"));
                    }
                }
            }
            self.pushed.lock().unwrap().push((
                item.entity_type,
                item.operation,
                item.entity_id().to_string(),
            ));
            Ok(())
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, name) in [("c1", "Ali"), ("c2", "Sara")] {
            let mut customer = Customer::new(id, name);
            customer.sync.mark_pending();
            store
                .commit(Mutation::insert(customer.into_record()))
                .await
                .expect("seed");
        }
        store
    }

    async fn customer_status(store: &MemoryStore, id: &str) -> (SyncStatus, Option<String>) {
        let record = store
            .get(TableName::Customers, id)
            .await
            .expect("get")
            .expect("present");
        let meta = record.sync_meta();
        (meta.status(), meta.sync_error.clone())
    }

    #[tokio::test]
    async fn accepted_items_are_removed_and_marked_synced() {
        let store = seeded_store().await;
        let target = Arc::new(ScriptedTarget::default());
        let drainer = OutboxDrainer::new(store.clone(), target.clone());

        let report = drainer.drain().await.expect("drain");

        assert_eq!(report.pushed, 2);
        assert!(store.get_outbox().await.expect("outbox").is_empty());
        assert_eq!(customer_status(&store, "c1").await.0, SyncStatus::Synced);
        let pushed = target.pushed.lock().unwrap().clone();
        assert_eq!(pushed[0].2, "c1");
        assert_eq!(pushed[1].2, "c2");
    }

    #[tokio::test]
    async fn rejection_marks_error_and_keeps_item() {
        let store = seeded_store().await;
        let target = Arc::new(ScriptedTarget {
            reject_ids: vec!["c1".to_string()],
            ..Default::default()
        });
        let drainer = OutboxDrainer::new(store.clone(), target);

        let report = drainer.drain().await.expect("drain");

        assert_eq!(report.rejected, 1);
        assert_eq!(report.superseded, 0);
        assert_eq!(report.pushed, 1);
        let (status, message) = customer_status(&store, "c1").await;
        assert_eq!(status, SyncStatus::Error);
        assert_eq!(message.as_deref(), Some("phone already registered"));

        let remaining = store.get_outbox().await.expect("outbox");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entity_id(), "c1");
    }

    #[tokio::test]
    async fn rejected_item_is_dropped_once_a_newer_change_is_queued() {
        let store = seeded_store().await;
        let mut updated = Customer::new("c1", "Ali Hassan");
        updated.sync.mark_pending();
        store
            .commit(Mutation::update(updated.into_record()))
            .await
            .expect("update");

        let target = Arc::new(ScriptedTarget {
            reject_ids: vec!["c1".to_string()],
            ..Default::default()
        });
        let drainer = OutboxDrainer::new(store.clone(), target);
        let report = drainer.drain().await.expect("drain");

        assert_eq!(report.rejected, 2);
        assert_eq!(report.superseded, 1);
        assert_eq!(report.pushed, 1);
        assert_eq!(customer_status(&store, "c1").await.0, SyncStatus::Error);

        let remaining = store.get_outbox().await.expect("outbox");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].operation, OutboxOperation::Update);
    }

    #[tokio::test]
    async fn corrected_record_recovers_from_rejection() {
        let store = Arc::new(MemoryStore::new());
        let service = DataService::new(store.clone());
        let target = Arc::new(ScriptedTarget {
            reject_names: vec!["Bad".to_string()],
            ..Default::default()
        });
        let drainer = OutboxDrainer::new(store.clone(), target.clone());

        service
            .add_customer(Customer::new("c1", "Bad"))
            .await
            .expect("add");
        drainer.drain().await.expect("first drain");
        let (status, message) = customer_status(&store, "c1").await;
        assert_eq!(status, SyncStatus::Error);
        assert_eq!(message.as_deref(), Some("name rejected"));

        service
            .update_customer("c1", |c| c.name = "Good".to_string())
            .await
            .expect("update");
        assert_eq!(customer_status(&store, "c1").await, (SyncStatus::Pending, None));

        let report = drainer.drain().await.expect("second drain");
        assert_eq!(report.superseded, 1);
        assert_eq!(report.pushed, 1);
        assert_eq!(customer_status(&store, "c1").await, (SyncStatus::Synced, None));
        assert!(store.get_outbox().await.expect("outbox").is_empty());

        let again = drainer.drain().await.expect("third drain");
        assert_eq!(again, DrainReport::default());
        assert_eq!(
            *target.attempted_names.lock().unwrap(),
            vec!["Bad".to_string(), "Bad".to_string(), "Good".to_string()]
        );
    }

    #[tokio::test]
    async fn transport_failure_stops_cycle_without_touching_statuses() {
        let store = seeded_store().await;
        let target = Arc::new(ScriptedTarget {
            offline: true,
            ..Default::default()
        });
        let drainer = OutboxDrainer::new(store.clone(), target);

        let first = drainer.drain().await.expect("drain");
        let second = drainer.drain().await.expect("drain");

        assert_eq!(first.retry_after_secs, Some(5));
        assert_eq!(second.retry_after_secs, Some(10));
        assert_eq!(store.get_outbox().await.expect("outbox").len(), 2);
        assert_eq!(customer_status(&store, "c2").await.0, SyncStatus::Pending);
    }
}
