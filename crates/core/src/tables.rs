//! Logical table names of the local store.

use serde::{Deserialize, Serialize};

/// Current schema version. Bumped whenever a migration adds tables.
pub const SCHEMA_VERSION: i32 = 2;

/// Fixed key the singleton settings record is stored under.
pub const SETTINGS_KEY: &str = "app";

/// Every keyed collection the store manages, excluding the outbox.
///
/// The outbox is not listed: it is reachable only through the outbox
/// operations, never through generic table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableName {
    Products,
    Batches,
    Customers,
    Suppliers,
    Invoices,
    PurchaseInvoices,
    CashTransactions,
    Warehouses,
    Representatives,
    DailyClosings,
    PendingAdjustments,
    PurchaseOrders,
    Settings,
}

impl TableName {
    /// Entity tables in schema order, settings last.
    pub const ALL: [TableName; 13] = [
        TableName::Products,
        TableName::Batches,
        TableName::Customers,
        TableName::Suppliers,
        TableName::Invoices,
        TableName::PurchaseInvoices,
        TableName::CashTransactions,
        TableName::Warehouses,
        TableName::Representatives,
        TableName::DailyClosings,
        TableName::PendingAdjustments,
        TableName::PurchaseOrders,
        TableName::Settings,
    ];

    /// Logical name, as used in outbox items and by the remote backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Products => "products",
            TableName::Batches => "batches",
            TableName::Customers => "customers",
            TableName::Suppliers => "suppliers",
            TableName::Invoices => "invoices",
            TableName::PurchaseInvoices => "purchaseInvoices",
            TableName::CashTransactions => "cashTransactions",
            TableName::Warehouses => "warehouses",
            TableName::Representatives => "representatives",
            TableName::DailyClosings => "dailyClosings",
            TableName::PendingAdjustments => "pendingAdjustments",
            TableName::PurchaseOrders => "purchaseOrders",
            TableName::Settings => "settings",
        }
    }

    /// Physical SQL table name.
    pub fn sql_name(&self) -> &'static str {
        match self {
            TableName::Products => "products",
            TableName::Batches => "batches",
            TableName::Customers => "customers",
            TableName::Suppliers => "suppliers",
            TableName::Invoices => "invoices",
            TableName::PurchaseInvoices => "purchase_invoices",
            TableName::CashTransactions => "cash_transactions",
            TableName::Warehouses => "warehouses",
            TableName::Representatives => "representatives",
            TableName::DailyClosings => "daily_closings",
            TableName::PendingAdjustments => "pending_adjustments",
            TableName::PurchaseOrders => "purchase_orders",
            TableName::Settings => "settings",
        }
    }

    pub fn is_settings(&self) -> bool {
        matches!(self, TableName::Settings)
    }

    pub fn parse(value: &str) -> Option<TableName> {
        TableName::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_matches_logical_names() {
        for table in TableName::ALL {
            let encoded = serde_json::to_string(&table).expect("serialize table name");
            assert_eq!(encoded, format!("\"{}\"", table.as_str()));
        }
    }

    #[test]
    fn parse_round_trips_logical_names() {
        assert_eq!(
            TableName::parse("purchaseInvoices"),
            Some(TableName::PurchaseInvoices)
        );
        assert_eq!(TableName::parse("outbox"), None);
    }

    #[test]
    fn sql_names_are_snake_case() {
        assert_eq!(TableName::CashTransactions.sql_name(), "cash_transactions");
        assert_eq!(TableName::DailyClosings.sql_name(), "daily_closings");
    }
}
