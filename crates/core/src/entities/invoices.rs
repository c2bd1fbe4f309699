//! Sales and purchase invoices.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::sync::SyncMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    #[default]
    Cash,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceLine {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
}

impl InvoiceLine {
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price - self.discount
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Invoice {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    pub customer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representative_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
    pub date: NaiveDate,
    pub items: Vec<InvoiceLine>,
    pub discount: Decimal,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub payment_type: PaymentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub sync: SyncMeta,
}

impl Invoice {
    /// Amount still owed on this invoice.
    pub fn outstanding(&self) -> Decimal {
        self.total - self.paid_amount
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PurchaseInvoice {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    pub supplier_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
    pub date: NaiveDate,
    pub items: Vec<InvoiceLine>,
    pub total: Decimal,
    pub paid_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub sync: SyncMeta,
}

impl PurchaseInvoice {
    pub fn outstanding(&self) -> Decimal {
        self.total - self.paid_amount
    }
}
