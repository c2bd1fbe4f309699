//! Cash book entries and end-of-day closings.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::sync::SyncMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashTransactionKind {
    /// Money received, e.g. a customer settling an invoice.
    #[default]
    Receipt,
    /// Money paid out to a party, e.g. a supplier or a customer refund.
    Payment,
    Expense,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CashTransaction {
    pub id: String,
    pub date: NaiveDate,
    pub kind: CashTransactionKind,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representative_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub sync: SyncMeta,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyClosing {
    pub id: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representative_id: Option<String>,
    pub opening_cash: Decimal,
    pub total_sales: Decimal,
    pub total_receipts: Decimal,
    pub total_expenses: Decimal,
    pub closing_cash: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub sync: SyncMeta,
}
