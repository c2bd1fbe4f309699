//! Derived read models computed from already-loaded tables.
//!
//! Everything here is a pure function of its inputs: no store access, no
//! sync status changes, no outbox writes.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::{
    Batch, CashTransaction, CashTransactionKind, Customer, Invoice, Product, PurchaseInvoice,
    Settings, Supplier,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerWithBalance {
    pub customer: Customer,
    /// Positive = the customer owes us.
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierWithBalance {
    pub supplier: Supplier,
    /// Positive = we owe the supplier.
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductWithStock {
    pub product: Product,
    pub quantity: Decimal,
    pub is_low_stock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementLine {
    pub date: Option<NaiveDate>,
    pub description: String,
    pub reference_id: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Running balance after this line.
    pub balance: Decimal,
}

fn cash_effect_on_customer(tx: &CashTransaction) -> Decimal {
    match tx.kind {
        CashTransactionKind::Receipt => -tx.amount,
        CashTransactionKind::Payment => tx.amount,
        CashTransactionKind::Expense => Decimal::ZERO,
    }
}

fn cash_effect_on_supplier(tx: &CashTransaction) -> Decimal {
    match tx.kind {
        CashTransactionKind::Payment => -tx.amount,
        CashTransactionKind::Receipt => tx.amount,
        CashTransactionKind::Expense => Decimal::ZERO,
    }
}

pub fn customer_balance(
    customer: &Customer,
    invoices: &[Invoice],
    cash_transactions: &[CashTransaction],
) -> Decimal {
    let invoiced: Decimal = invoices
        .iter()
        .filter(|inv| inv.customer_id == customer.id)
        .map(Invoice::outstanding)
        .sum();
    let cash: Decimal = cash_transactions
        .iter()
        .filter(|tx| tx.customer_id.as_deref() == Some(customer.id.as_str()))
        .map(cash_effect_on_customer)
        .sum();
    customer.opening_balance + invoiced + cash
}

pub fn customers_with_balance(
    customers: Vec<Customer>,
    invoices: &[Invoice],
    cash_transactions: &[CashTransaction],
) -> Vec<CustomerWithBalance> {
    customers
        .into_iter()
        .map(|customer| {
            let balance = customer_balance(&customer, invoices, cash_transactions);
            CustomerWithBalance { customer, balance }
        })
        .collect()
}

pub fn supplier_balance(
    supplier: &Supplier,
    purchase_invoices: &[PurchaseInvoice],
    cash_transactions: &[CashTransaction],
) -> Decimal {
    let invoiced: Decimal = purchase_invoices
        .iter()
        .filter(|inv| inv.supplier_id == supplier.id)
        .map(PurchaseInvoice::outstanding)
        .sum();
    let cash: Decimal = cash_transactions
        .iter()
        .filter(|tx| tx.supplier_id.as_deref() == Some(supplier.id.as_str()))
        .map(cash_effect_on_supplier)
        .sum();
    supplier.opening_balance + invoiced + cash
}

pub fn suppliers_with_balance(
    suppliers: Vec<Supplier>,
    purchase_invoices: &[PurchaseInvoice],
    cash_transactions: &[CashTransaction],
) -> Vec<SupplierWithBalance> {
    suppliers
        .into_iter()
        .map(|supplier| {
            let balance = supplier_balance(&supplier, purchase_invoices, cash_transactions);
            SupplierWithBalance { supplier, balance }
        })
        .collect()
}

/// On-hand quantity per product, summed over its batches.
pub fn products_with_stock(
    products: Vec<Product>,
    batches: &[Batch],
    settings: &Settings,
) -> Vec<ProductWithStock> {
    let mut quantities: HashMap<&str, Decimal> = HashMap::new();
    for batch in batches {
        *quantities.entry(batch.product_id.as_str()).or_default() += batch.quantity;
    }

    products
        .into_iter()
        .map(|product| {
            let quantity = quantities
                .get(product.id.as_str())
                .copied()
                .unwrap_or_default();
            let threshold = product.min_stock.unwrap_or(settings.low_stock_threshold);
            ProductWithStock {
                is_low_stock: quantity < threshold,
                quantity,
                product,
            }
        })
        .collect()
}

/// Chronological account statement for one customer, starting with the
/// opening balance. The last line's balance equals [`customer_balance`].
pub fn customer_statement(
    customer: &Customer,
    invoices: &[Invoice],
    cash_transactions: &[CashTransaction],
) -> Vec<StatementLine> {
    // (date, order within a day, line without balance)
    let mut entries: Vec<(NaiveDate, u8, StatementLine)> = Vec::new();

    for invoice in invoices.iter().filter(|inv| inv.customer_id == customer.id) {
        let label = invoice.invoice_number.as_deref().unwrap_or(&invoice.id);
        entries.push((
            invoice.date,
            0,
            StatementLine {
                date: Some(invoice.date),
                description: format!("Invoice {}", label),
                reference_id: Some(invoice.id.clone()),
                debit: invoice.total,
                credit: invoice.paid_amount,
                balance: Decimal::ZERO,
            },
        ));
    }

    for tx in cash_transactions
        .iter()
        .filter(|tx| tx.customer_id.as_deref() == Some(customer.id.as_str()))
    {
        let effect = cash_effect_on_customer(tx);
        if effect.is_zero() {
            continue;
        }
        let description = tx.description.clone().unwrap_or_else(|| match tx.kind {
            CashTransactionKind::Payment => "Payment".to_string(),
            _ => "Receipt".to_string(),
        });
        entries.push((
            tx.date,
            1,
            StatementLine {
                date: Some(tx.date),
                description,
                reference_id: Some(tx.id.clone()),
                debit: effect.max(Decimal::ZERO),
                credit: (-effect).max(Decimal::ZERO),
                balance: Decimal::ZERO,
            },
        ));
    }

    entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let mut balance = customer.opening_balance;
    let mut lines = vec![StatementLine {
        date: None,
        description: "Opening balance".to_string(),
        reference_id: None,
        debit: Decimal::ZERO,
        credit: Decimal::ZERO,
        balance,
    }];
    for (_, _, mut line) in entries {
        balance += line.debit - line.credit;
        line.balance = balance;
        lines.push(line);
    }
    lines
}
