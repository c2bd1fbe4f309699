use crate::entities::Record;
use crate::errors::ValidationError;

/// Shape validation run by the facade before any write. A rejected record
/// never reaches the store and never produces an outbox item.
pub trait EntityValidator: Send + Sync {
    fn validate(&self, record: &Record) -> Result<(), ValidationError>;
}

/// Accepts everything; used when no validator is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpValidator;

impl EntityValidator for NoOpValidator {
    fn validate(&self, _record: &Record) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Minimal built-in rules: named parties and products need a name, and
/// monetary totals cannot be negative.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicValidator;

impl EntityValidator for BasicValidator {
    fn validate(&self, record: &Record) -> Result<(), ValidationError> {
        let mut err = ValidationError::new(record.table().as_str());
        let name = match record {
            Record::Customer(e) => Some(&e.name),
            Record::Supplier(e) => Some(&e.name),
            Record::Product(e) => Some(&e.name),
            Record::Warehouse(e) => Some(&e.name),
            Record::Representative(e) => Some(&e.name),
            _ => None,
        };
        if name.is_some_and(|n| n.trim().is_empty()) {
            err = err.with_field("name", "is required");
        }

        match record {
            Record::Invoice(inv) => {
                if inv.customer_id.trim().is_empty() {
                    err = err.with_field("customer_id", "is required");
                }
                if inv.total.is_sign_negative() {
                    err = err.with_field("total", "must not be negative");
                }
                if inv.paid_amount > inv.total {
                    err = err.with_field("paid_amount", "must not exceed total");
                }
            }
            Record::PurchaseInvoice(inv) => {
                if inv.supplier_id.trim().is_empty() {
                    err = err.with_field("supplier_id", "is required");
                }
                if inv.total.is_sign_negative() {
                    err = err.with_field("total", "must not be negative");
                }
            }
            Record::CashTransaction(tx) => {
                if !tx.amount.is_sign_positive() || tx.amount.is_zero() {
                    err = err.with_field("amount", "must be greater than zero");
                }
            }
            _ => {}
        }

        if err.is_empty() {
            Ok(())
        } else {
            Err(err)
        }
    }
}
