use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::sync::SyncMeta;

/// Global application settings. The store holds at most one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub company_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Decimal>,
    pub invoice_prefix: String,
    /// Fallback low-stock threshold for products without their own `min_stock`.
    pub low_stock_threshold: Decimal,
    #[serde(flatten)]
    pub sync: SyncMeta,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            company_name: String::new(),
            phone: None,
            address: None,
            currency: "USD".to_string(),
            tax_rate: None,
            invoice_prefix: "INV-".to_string(),
            low_stock_threshold: Decimal::from(5),
            sync: SyncMeta::default(),
        }
    }
}
