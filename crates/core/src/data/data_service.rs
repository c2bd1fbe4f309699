use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ledger::{self, CustomerWithBalance, ProductWithStock, StatementLine, SupplierWithBalance};
use super::validation::{EntityValidator, NoOpValidator};
use crate::entities::{
    Batch, CashTransaction, Customer, DailyClosing, Entity, Invoice, PendingAdjustment, Product,
    PurchaseInvoice, PurchaseOrder, Record, Representative, Settings, Supplier, Warehouse,
};
use crate::errors::{DatabaseError, Error, Result, ValidationError};
use crate::store::{DataSnapshot, LocalStoreTrait};
use crate::sync::{Mutation, OutboxItem};
use crate::tables::TableName;

/// Per-row outcome of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: Vec<String>,
    /// Zero-based row index and the error it failed with.
    pub failed: Vec<(usize, String)>,
}

/// The single entry point the application uses for data access.
///
/// Every mutation validates first, then commits the record change and its
/// outbox item in one store transaction, and only then returns. Reads are
/// plain table reads or pure projections over them.
pub struct DataService {
    store: Arc<dyn LocalStoreTrait>,
    validator: Arc<dyn EntityValidator>,
}

impl DataService {
    pub fn new(store: Arc<dyn LocalStoreTrait>) -> Self {
        Self {
            store,
            validator: Arc::new(NoOpValidator),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn EntityValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub async fn initialize(&self) -> Result<()> {
        self.store.initialize().await
    }

    /// Full hydration at application start.
    pub async fn load_all(&self) -> Result<DataSnapshot> {
        self.store.load_all().await
    }

    pub async fn list<E: Entity>(&self) -> Result<Vec<E>> {
        let records = self.store.list(E::TABLE).await?;
        Ok(records.into_iter().filter_map(E::from_record).collect())
    }

    pub async fn find<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        let record = self.store.get(E::TABLE, id).await?;
        Ok(record.and_then(E::from_record))
    }

    async fn require<E: Entity>(&self, id: &str) -> Result<E> {
        self.find(id)
            .await?
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(format!("{}/{}", E::TABLE, id))))
    }

    fn validate(&self, record: &Record) -> Result<()> {
        self.validator.validate(record).map_err(|err| {
            debug!("Rejected {} '{}': {}", record.table(), record.id(), err);
            Error::Validation(err)
        })
    }

    async fn commit<E: Entity>(&self, mutation: Mutation) -> Result<(E, OutboxItem)> {
        let record = match &mutation {
            Mutation::Upsert { record, .. } => record.clone(),
            Mutation::Delete { .. } => {
                return Err(Error::Unexpected(
                    "delete mutations carry no record".to_string(),
                ))
            }
        };
        let item = self.store.commit(mutation).await?;
        let entity = E::from_record(record).ok_or_else(|| {
            Error::Unexpected(format!("record is not a {}", E::TABLE))
        })?;
        Ok((entity, item))
    }

    /// Creates a record. An empty id is replaced by a new UUID; an id that is
    /// already taken is rejected. The store checks the id inside the commit,
    /// so concurrent adds of one id cannot overwrite each other.
    pub async fn add<E: Entity>(&self, mut entity: E) -> Result<E> {
        if entity.id().trim().is_empty() {
            entity.set_id(Uuid::new_v4().to_string());
        }
        entity.sync_meta_mut().mark_pending();
        let record = entity.into_record();
        self.validate(&record)?;

        let table = record.table();
        let (entity, item) = match self.commit::<E>(Mutation::insert(record)).await {
            Err(err) if err.is_already_exists() => {
                debug!("Rejected {} insert: {}", table, err);
                return Err(Error::Validation(
                    ValidationError::new(table.as_str()).with_field("id", "already exists"),
                ));
            }
            other => other?,
        };
        debug!(
            "Added {} '{}' (outbox item {})",
            E::TABLE,
            entity.id(),
            item.id
        );
        Ok(entity)
    }

    /// Applies `change` to the stored record. Fields the closure does not
    /// touch are kept as stored; the id cannot be changed.
    pub async fn update<E, F>(&self, id: &str, change: F) -> Result<E>
    where
        E: Entity,
        F: FnOnce(&mut E) + Send,
    {
        let mut entity = self.require::<E>(id).await?;
        change(&mut entity);
        entity.set_id(id.to_string());
        entity.sync_meta_mut().mark_pending();
        let record = entity.into_record();
        self.validate(&record)?;

        let (entity, item) = self.commit::<E>(Mutation::update(record)).await?;
        debug!("Updated {} '{}' (outbox item {})", E::TABLE, id, item.id);
        Ok(entity)
    }

    pub async fn remove<E: Entity>(&self, id: &str) -> Result<()> {
        let item = self.store.commit(Mutation::delete(E::TABLE, id)).await?;
        debug!("Deleted {} '{}' (outbox item {})", E::TABLE, id, item.id);
        Ok(())
    }

    /// Adds rows one at a time; a failing row does not undo earlier rows.
    pub async fn import<E: Entity>(&self, rows: Vec<E>) -> ImportReport {
        let mut report = ImportReport::default();
        for (index, row) in rows.into_iter().enumerate() {
            match self.add(row).await {
                Ok(entity) => report.imported.push(entity.id().to_string()),
                Err(err) => {
                    warn!("Import of {} row {} failed: {}", E::TABLE, index, err);
                    report.failed.push((index, err.to_string()));
                }
            }
        }
        report
    }

    /// Queues the current state of a record again, e.g. after a rejection.
    pub async fn resync<E: Entity>(&self, id: &str) -> Result<E> {
        let mut entity = self.require::<E>(id).await?;
        entity.sync_meta_mut().mark_pending();
        let (entity, _) = self
            .commit::<E>(Mutation::update(entity.into_record()))
            .await?;
        Ok(entity)
    }

    /// Stored settings, or defaults when none were saved yet.
    pub async fn get_settings(&self) -> Result<Settings> {
        Ok(self
            .find::<Settings>(crate::tables::SETTINGS_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Saves the settings record. The first save is queued as an `insert`,
    /// later ones as `update`.
    pub async fn update_settings(&self, mut settings: Settings) -> Result<Settings> {
        settings.sync.mark_pending();
        let record = settings.into_record();
        self.validate(&record)?;

        let exists = self
            .store
            .get(TableName::Settings, record.id())
            .await?
            .is_some();
        if exists {
            let (settings, _) = self.commit::<Settings>(Mutation::update(record)).await?;
            return Ok(settings);
        }
        match self.commit::<Settings>(Mutation::insert(record.clone())).await {
            Err(err) if err.is_already_exists() => {
                let (settings, _) = self.commit::<Settings>(Mutation::update(record)).await?;
                Ok(settings)
            }
            other => Ok(other?.0),
        }
    }

    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.store.get_outbox().await?.len())
    }

    pub async fn customers_with_balance(&self) -> Result<Vec<CustomerWithBalance>> {
        let customers = self.list::<Customer>().await?;
        let invoices = self.list::<Invoice>().await?;
        let cash = self.list::<CashTransaction>().await?;
        Ok(ledger::customers_with_balance(customers, &invoices, &cash))
    }

    pub async fn suppliers_with_balance(&self) -> Result<Vec<SupplierWithBalance>> {
        let suppliers = self.list::<Supplier>().await?;
        let purchases = self.list::<PurchaseInvoice>().await?;
        let cash = self.list::<CashTransaction>().await?;
        Ok(ledger::suppliers_with_balance(suppliers, &purchases, &cash))
    }

    pub async fn products_with_stock(&self) -> Result<Vec<ProductWithStock>> {
        let products = self.list::<Product>().await?;
        let batches = self.list::<Batch>().await?;
        let settings = self.get_settings().await?;
        Ok(ledger::products_with_stock(products, &batches, &settings))
    }

    pub async fn customer_statement(&self, customer_id: &str) -> Result<Vec<StatementLine>> {
        let customer = self.require::<Customer>(customer_id).await?;
        let invoices = self.list::<Invoice>().await?;
        let cash = self.list::<CashTransaction>().await?;
        Ok(ledger::customer_statement(&customer, &invoices, &cash))
    }

    pub async fn clear_table(&self, table: TableName) -> Result<()> {
        self.store.clear_table(table).await
    }
}

macro_rules! facade_methods {
    ($($ty:ident: $get_all:ident, $get_one:ident, $add:ident, $update:ident, $delete:ident, $import:ident;)*) => {
        impl DataService {
            $(
                pub async fn $get_all(&self) -> Result<Vec<$ty>> {
                    self.list::<$ty>().await
                }

                pub async fn $get_one(&self, id: &str) -> Result<Option<$ty>> {
                    self.find::<$ty>(id).await
                }

                pub async fn $add(&self, entity: $ty) -> Result<$ty> {
                    self.add(entity).await
                }

                pub async fn $update<F>(&self, id: &str, change: F) -> Result<$ty>
                where
                    F: FnOnce(&mut $ty) + Send,
                {
                    self.update::<$ty, F>(id, change).await
                }

                pub async fn $delete(&self, id: &str) -> Result<()> {
                    self.remove::<$ty>(id).await
                }

                pub async fn $import(&self, rows: Vec<$ty>) -> ImportReport {
                    self.import(rows).await
                }
            )*
        }
    };
}

facade_methods! {
    Product: get_products, get_product, add_product, update_product, delete_product, import_products;
    Batch: get_batches, get_batch, add_batch, update_batch, delete_batch, import_batches;
    Customer: get_customers, get_customer, add_customer, update_customer, delete_customer, import_customers;
    Supplier: get_suppliers, get_supplier, add_supplier, update_supplier, delete_supplier, import_suppliers;
    Invoice: get_invoices, get_invoice, add_invoice, update_invoice, delete_invoice, import_invoices;
    PurchaseInvoice: get_purchase_invoices, get_purchase_invoice, add_purchase_invoice, update_purchase_invoice, delete_purchase_invoice, import_purchase_invoices;
    CashTransaction: get_cash_transactions, get_cash_transaction, add_cash_transaction, update_cash_transaction, delete_cash_transaction, import_cash_transactions;
    Warehouse: get_warehouses, get_warehouse, add_warehouse, update_warehouse, delete_warehouse, import_warehouses;
    Representative: get_representatives, get_representative, add_representative, update_representative, delete_representative, import_representatives;
    DailyClosing: get_daily_closings, get_daily_closing, add_daily_closing, update_daily_closing, delete_daily_closing, import_daily_closings;
    PendingAdjustment: get_pending_adjustments, get_pending_adjustment, add_pending_adjustment, update_pending_adjustment, delete_pending_adjustment, import_pending_adjustments;
    PurchaseOrder: get_purchase_orders, get_purchase_order, add_purchase_order, update_purchase_order, delete_purchase_order, import_purchase_orders;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BasicValidator;
    use crate::store::MemoryStore;
    use crate::sync::{OutboxOperation, OutboxPayload, SyncStatus};
    use rust_decimal_macros::dec;

    fn service() -> (Arc<MemoryStore>, DataService) {
        let store = Arc::new(MemoryStore::new());
        let service = DataService::new(store.clone());
        (store, service)
    }

    fn ali() -> Customer {
        Customer {
            opening_balance: dec!(100),
            ..Customer::new("c1", "Ali")
        }
    }

    #[tokio::test]
    async fn add_customer_persists_and_queues_insert() {
        let (store, service) = service();

        let added = service.add_customer(ali()).await.expect("add customer");
        assert_eq!(added.sync_status(), SyncStatus::Pending);

        let stored = service.get_customer("c1").await.expect("get").expect("present");
        assert_eq!(stored.name, "Ali");
        assert_eq!(stored.opening_balance, dec!(100));

        let outbox = store.get_outbox().await.expect("outbox");
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].entity_type, TableName::Customers);
        assert_eq!(outbox[0].operation, OutboxOperation::Insert);
        assert_eq!(outbox[0].entity_id(), "c1");
    }

    #[tokio::test]
    async fn update_then_delete_appends_items_in_order() {
        let (store, service) = service();
        service.add_customer(ali()).await.expect("add");

        let updated = service
            .update_customer("c1", |c| c.opening_balance = dec!(150))
            .await
            .expect("update");
        assert_eq!(updated.opening_balance, dec!(150));
        assert_eq!(updated.name, "Ali");

        service.delete_customer("c1").await.expect("delete");

        let ops: Vec<_> = store
            .get_outbox()
            .await
            .expect("outbox")
            .iter()
            .map(|item| item.operation)
            .collect();
        assert_eq!(
            ops,
            vec![
                OutboxOperation::Insert,
                OutboxOperation::Update,
                OutboxOperation::Delete
            ]
        );
        assert_eq!(service.get_customer("c1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn update_payload_carries_full_snapshot() {
        let (store, service) = service();
        service.add_customer(ali()).await.expect("add");
        service
            .update_customer("c1", |c| c.phone = Some("0791234567".to_string()))
            .await
            .expect("update");

        let outbox = store.get_outbox().await.expect("outbox");
        match &outbox[1].payload {
            OutboxPayload::Snapshot {
                record: Record::Customer(c),
            } => {
                assert_eq!(c.phone.as_deref(), Some("0791234567"));
                assert_eq!(c.opening_balance, dec!(100));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn update_cannot_change_id() {
        let (_store, service) = service();
        service.add_customer(ali()).await.expect("add");
        let updated = service
            .update_customer("c1", |c| c.id = "c2".to_string())
            .await
            .expect("update");
        assert_eq!(updated.id, "c1");
        assert_eq!(service.get_customer("c2").await.expect("get"), None);
    }

    #[tokio::test]
    async fn missing_record_update_and_delete_enqueue_nothing() {
        let (store, service) = service();
        let update = service.update_customer("ghost", |c| c.name = "x".into()).await;
        assert!(update.expect_err("missing").is_not_found());
        let delete = service.delete_customer("ghost").await;
        assert!(delete.expect_err("missing").is_not_found());
        assert!(store.get_outbox().await.expect("outbox").is_empty());
    }

    #[tokio::test]
    async fn rejected_validation_writes_nothing() {
        let (store, service) = service();
        let service = service.with_validator(Arc::new(BasicValidator));

        let result = service.add_customer(Customer::new("c1", "")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(store.get_outbox().await.expect("outbox").is_empty());
        assert_eq!(service.get_customer("c1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn aborted_commit_leaves_no_partial_state() {
        let (store, service) = service();
        store.set_fail_writes(true);
        let result = service.add_customer(ali()).await;
        assert!(result.expect_err("aborted").is_transaction_aborted());
        store.set_fail_writes(false);

        assert!(service.get_customers().await.expect("list").is_empty());
        assert!(store.get_outbox().await.expect("outbox").is_empty());
    }

    #[tokio::test]
    async fn storage_unavailable_propagates_to_caller() {
        let service = DataService::new(Arc::new(MemoryStore::unavailable()));
        let err = service.add_customer(ali()).await.expect_err("unavailable");
        assert!(err.is_storage_unavailable());
    }

    #[tokio::test]
    async fn add_assigns_id_when_missing_and_rejects_duplicates() {
        let (store, service) = service();
        let product = service
            .add_product(Product::new("", "Olive oil 1L"))
            .await
            .expect("add");
        assert!(!product.id.is_empty());

        let mut other = Product::new(product.id.clone(), "Olive oil 5L");
        other.sync.mark_synced();
        let duplicate = service.add_product(other).await;
        assert!(matches!(duplicate, Err(Error::Validation(_))));

        let stored = service
            .get_product(&product.id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(stored.name, "Olive oil 1L");
        assert_eq!(store.get_outbox().await.expect("outbox").len(), 1);
    }

    #[tokio::test]
    async fn update_after_error_returns_to_pending() {
        let (store, service) = service();
        service.add_customer(ali()).await.expect("add");
        store
            .set_sync_status(
                TableName::Customers,
                "c1",
                SyncStatus::Error,
                Some("rejected".to_string()),
            )
            .await
            .expect("mark error");

        let errored = service.get_customer("c1").await.expect("get").expect("present");
        assert_eq!(errored.sync_status(), SyncStatus::Error);
        assert_eq!(errored.sync.sync_error.as_deref(), Some("rejected"));

        let updated = service
            .update_customer("c1", |c| c.notes = Some("called".to_string()))
            .await
            .expect("update");
        assert_eq!(updated.sync_status(), SyncStatus::Pending);
        assert_eq!(updated.sync.sync_error, None);
    }

    #[tokio::test]
    async fn resync_queues_current_snapshot() {
        let (store, service) = service();
        service.add_customer(ali()).await.expect("add");
        service.resync::<Customer>("c1").await.expect("resync");
        let outbox = store.get_outbox().await.expect("outbox");
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox[1].operation, OutboxOperation::Update);
    }

    #[tokio::test]
    async fn bulk_import_adds_each_row() {
        let (store, service) = service();
        let rows: Vec<Customer> = (0..50)
            .map(|i| Customer::new(format!("c{i}"), format!("Customer {i}")))
            .collect();

        let report = service.import_customers(rows).await;

        assert_eq!(report.imported.len(), 50);
        assert!(report.failed.is_empty());
        assert_eq!(service.get_customers().await.expect("list").len(), 50);
        assert_eq!(store.get_outbox().await.expect("outbox").len(), 50);
    }

    #[tokio::test]
    async fn import_continues_past_failing_rows() {
        let (_store, service) = service();
        let service = service.with_validator(Arc::new(BasicValidator));
        let rows = vec![
            Customer::new("c1", "Ali"),
            Customer::new("c2", ""),
            Customer::new("c3", "Sara"),
        ];
        let report = service.import_customers(rows).await;
        assert_eq!(report.imported, vec!["c1".to_string(), "c3".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 1);
    }

    #[tokio::test]
    async fn settings_default_until_saved() {
        let (store, service) = service();
        assert_eq!(service.get_settings().await.expect("settings"), Settings::default());

        let saved = service
            .update_settings(Settings {
                company_name: "Al Noor Trading".to_string(),
                ..Settings::default()
            })
            .await
            .expect("update settings");
        assert_eq!(saved.sync_status(), SyncStatus::Pending);
        assert_eq!(
            service.get_settings().await.expect("settings").company_name,
            "Al Noor Trading"
        );
        service
            .update_settings(Settings {
                company_name: "Al Noor Trading Co.".to_string(),
                ..Settings::default()
            })
            .await
            .expect("second save");

        let outbox = store.get_outbox().await.expect("outbox");
        assert_eq!(outbox.len(), 2);
        assert!(outbox.iter().all(|item| item.entity_type == TableName::Settings));
        assert_eq!(outbox[0].operation, OutboxOperation::Insert);
        assert_eq!(outbox[1].operation, OutboxOperation::Update);
    }

    #[tokio::test]
    async fn derived_reads_leave_outbox_and_status_alone() {
        let (store, service) = service();
        service.add_customer(ali()).await.expect("add");
        let before = store.get_outbox().await.expect("outbox");

        let balances = service.customers_with_balance().await.expect("balances");
        assert_eq!(balances[0].balance, dec!(100));
        let statement = service.customer_statement("c1").await.expect("statement");
        assert_eq!(statement.len(), 1);

        assert_eq!(store.get_outbox().await.expect("outbox"), before);
        let customer = service.get_customer("c1").await.expect("get").expect("present");
        assert_eq!(customer.sync_status(), SyncStatus::Pending);
    }
}
