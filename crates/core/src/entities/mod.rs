//! Business entities managed by the local store.

mod cash;
mod inventory;
mod invoices;
mod parties;
mod record;
mod settings;

pub use cash::{CashTransaction, CashTransactionKind, DailyClosing};
pub use inventory::{
    Batch, PendingAdjustment, Product, PurchaseOrder, PurchaseOrderLine, PurchaseOrderStatus,
    Warehouse,
};
pub use invoices::{Invoice, InvoiceLine, PaymentType, PurchaseInvoice};
pub use parties::{Customer, Representative, Supplier};
pub use record::{Entity, Record, StoredRecord};
pub use settings::Settings;
