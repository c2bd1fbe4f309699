//! Data access facade and the derived read models it serves.

mod data_service;
mod ledger;
mod validation;

pub use data_service::{DataService, ImportReport};
pub use ledger::{
    customer_balance, customer_statement, customers_with_balance, products_with_stock,
    supplier_balance, suppliers_with_balance, CustomerWithBalance, ProductWithStock,
    StatementLine, SupplierWithBalance,
};
pub use validation::{BasicValidator, EntityValidator, NoOpValidator};
