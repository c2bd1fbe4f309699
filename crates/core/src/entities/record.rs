//! Closed sum type over every entity kind, and the trait that ties each
//! concrete entity type to its table.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    Batch, CashTransaction, Customer, DailyClosing, Invoice, PendingAdjustment, Product,
    PurchaseInvoice, PurchaseOrder, Representative, Settings, Supplier, Warehouse,
};
use crate::errors::{DatabaseError, Error, Result};
use crate::sync::{SyncMeta, SyncStatus};
use crate::tables::{TableName, SETTINGS_KEY};

const SYNC_STATUS_FIELD: &str = "sync_status";
const SYNC_ERROR_FIELD: &str = "sync_error";

/// A concrete entity type stored in exactly one table.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    const TABLE: TableName;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn sync_meta(&self) -> &SyncMeta;
    fn sync_meta_mut(&mut self) -> &mut SyncMeta;
    fn into_record(self) -> Record;
    fn from_record(record: Record) -> Option<Self>;

    fn sync_status(&self) -> SyncStatus {
        self.sync_meta().status()
    }
}

macro_rules! entity_records {
    ($($variant:ident($ty:ident) => $table:ident, $name:literal;)*) => {
        /// One record of any table. Serialized as `{"entityType": <table>, "data": {..}}`.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "entityType", content = "data")]
        pub enum Record {
            $(
                #[serde(rename = $name)]
                $variant($ty),
            )*
            #[serde(rename = "settings")]
            Settings(Settings),
        }

        impl Record {
            pub fn table(&self) -> TableName {
                match self {
                    $(Record::$variant(_) => TableName::$table,)*
                    Record::Settings(_) => TableName::Settings,
                }
            }

            /// Storage key. Settings always answer the fixed key.
            pub fn id(&self) -> &str {
                match self {
                    $(Record::$variant(e) => &e.id,)*
                    Record::Settings(_) => SETTINGS_KEY,
                }
            }

            pub fn sync_meta(&self) -> &SyncMeta {
                match self {
                    $(Record::$variant(e) => &e.sync,)*
                    Record::Settings(e) => &e.sync,
                }
            }

            pub fn sync_meta_mut(&mut self) -> &mut SyncMeta {
                match self {
                    $(Record::$variant(e) => &mut e.sync,)*
                    Record::Settings(e) => &mut e.sync,
                }
            }

            /// The entity's own JSON, without the `entityType` envelope.
            pub fn data_json(&self) -> Result<Value> {
                let value = match self {
                    $(Record::$variant(e) => serde_json::to_value(e)?,)*
                    Record::Settings(e) => serde_json::to_value(e)?,
                };
                Ok(value)
            }

            /// Decodes an entity's JSON as the variant belonging to `table`.
            pub fn from_json(table: TableName, value: Value) -> Result<Record> {
                let record = match table {
                    $(TableName::$table => Record::$variant(serde_json::from_value(value)?),)*
                    TableName::Settings => Record::Settings(serde_json::from_value(value)?),
                };
                Ok(record)
            }
        }

        $(
            impl Entity for $ty {
                const TABLE: TableName = TableName::$table;

                fn id(&self) -> &str {
                    &self.id
                }

                fn set_id(&mut self, id: String) {
                    self.id = id;
                }

                fn sync_meta(&self) -> &SyncMeta {
                    &self.sync
                }

                fn sync_meta_mut(&mut self) -> &mut SyncMeta {
                    &mut self.sync
                }

                fn into_record(self) -> Record {
                    Record::$variant(self)
                }

                fn from_record(record: Record) -> Option<Self> {
                    match record {
                        Record::$variant(e) => Some(e),
                        _ => None,
                    }
                }
            }
        )*
    };
}

entity_records! {
    Product(Product) => Products, "products";
    Batch(Batch) => Batches, "batches";
    Customer(Customer) => Customers, "customers";
    Supplier(Supplier) => Suppliers, "suppliers";
    Invoice(Invoice) => Invoices, "invoices";
    PurchaseInvoice(PurchaseInvoice) => PurchaseInvoices, "purchaseInvoices";
    CashTransaction(CashTransaction) => CashTransactions, "cashTransactions";
    Warehouse(Warehouse) => Warehouses, "warehouses";
    Representative(Representative) => Representatives, "representatives";
    DailyClosing(DailyClosing) => DailyClosings, "dailyClosings";
    PendingAdjustment(PendingAdjustment) => PendingAdjustments, "pendingAdjustments";
    PurchaseOrder(PurchaseOrder) => PurchaseOrders, "purchaseOrders";
}

impl Entity for Settings {
    const TABLE: TableName = TableName::Settings;

    fn id(&self) -> &str {
        SETTINGS_KEY
    }

    fn set_id(&mut self, _id: String) {}

    fn sync_meta(&self) -> &SyncMeta {
        &self.sync
    }

    fn sync_meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.sync
    }

    fn into_record(self) -> Record {
        Record::Settings(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Settings(e) => Some(e),
            _ => None,
        }
    }
}

/// Storage form of a record: payload JSON without the sync fields, plus the
/// sync fields on their own so the store can keep them in dedicated columns.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub payload: String,
    pub sync: SyncMeta,
}

impl Record {
    pub fn to_stored(&self) -> Result<StoredRecord> {
        let mut value = self.data_json()?;
        if let Value::Object(map) = &mut value {
            map.remove(SYNC_STATUS_FIELD);
            map.remove(SYNC_ERROR_FIELD);
        }
        Ok(StoredRecord {
            id: self.id().to_string(),
            payload: serde_json::to_string(&value)?,
            sync: self.sync_meta().clone(),
        })
    }

    /// Rebuilds a record from its payload and sync columns, verbatim.
    pub fn from_stored(table: TableName, payload: &str, sync: SyncMeta) -> Result<Record> {
        let mut value: Value = serde_json::from_str(payload)?;
        let map = value.as_object_mut().ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "Stored payload for table '{}' is not a JSON object",
                table
            )))
        })?;
        if let Some(status) = sync.sync_status {
            map.insert(
                SYNC_STATUS_FIELD.to_string(),
                Value::String(status.as_str().to_string()),
            );
        }
        if let Some(message) = sync.sync_error {
            map.insert(SYNC_ERROR_FIELD.to_string(), Value::String(message));
        }
        Record::from_json(table, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn customer(id: &str) -> Customer {
        Customer {
            opening_balance: dec!(100),
            ..Customer::new(id, "Ali")
        }
    }

    #[test]
    fn record_envelope_uses_table_name_as_tag() {
        let record = customer("c1").into_record();
        let encoded = serde_json::to_value(&record).expect("encode record");
        assert_eq!(encoded["entityType"], "customers");
        assert_eq!(encoded["data"]["id"], "c1");
        assert_eq!(encoded["data"]["name"], "Ali");
    }

    #[test]
    fn settings_record_always_uses_fixed_key() {
        let record = Settings::default().into_record();
        assert_eq!(record.id(), SETTINGS_KEY);
        assert_eq!(record.table(), TableName::Settings);
    }

    #[test]
    fn from_record_rejects_other_variants() {
        let record = customer("c1").into_record();
        assert!(Supplier::from_record(record.clone()).is_none());
        assert_eq!(Customer::from_record(record), Some(customer("c1")));
    }

    #[test]
    fn stored_form_keeps_sync_fields_out_of_payload() {
        let mut entity = customer("c1");
        entity.sync.mark_error("remote rejected");
        let stored = entity.clone().into_record().to_stored().expect("to stored");

        assert!(!stored.payload.contains("sync_status"));
        assert!(!stored.payload.contains("sync_error"));
        assert_eq!(stored.sync, entity.sync);

        let restored = Record::from_stored(TableName::Customers, &stored.payload, stored.sync)
            .expect("from stored");
        assert_eq!(restored, entity.into_record());
    }

    #[test]
    fn amounts_keep_full_precision_through_storage() {
        let entity = Customer {
            opening_balance: dec!(12345678901234.5678),
            credit_limit: Some(dec!(0.000000000000000001)),
            ..Customer::new("c1", "Ali")
        };
        let stored = entity.clone().into_record().to_stored().expect("to stored");
        assert!(stored.payload.contains(r#""opening_balance":"12345678901234.5678""#));

        let restored = Record::from_stored(TableName::Customers, &stored.payload, stored.sync)
            .expect("from stored");
        assert_eq!(Customer::from_record(restored), Some(entity));
    }

    #[test]
    fn numeric_amounts_in_older_payloads_still_decode() {
        let restored = Record::from_stored(
            TableName::Customers,
            r#"{"id":"c3","name":"Omar","opening_balance":250.5}"#,
            SyncMeta::default(),
        )
        .expect("decode");
        let customer = Customer::from_record(restored).expect("customer");
        assert_eq!(customer.opening_balance, dec!(250.5));
    }

    #[test]
    fn stored_record_without_status_reads_as_synced() {
        let restored = Record::from_stored(
            TableName::Customers,
            r#"{"id":"c2","name":"Sara"}"#,
            SyncMeta::default(),
        )
        .expect("decode");
        assert_eq!(restored.sync_meta().status(), SyncStatus::Synced);
        assert_eq!(restored.id(), "c2");
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let result = Record::from_stored(TableName::Products, "[1,2]", SyncMeta::default());
        assert!(result.is_err());
    }
}
