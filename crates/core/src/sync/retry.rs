//! How the drain loop reacts to a failed push.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    /// Transport or server trouble; the same item is tried again later.
    Retryable,
    /// The remote refused this record. Retrying it unchanged cannot succeed.
    Permanent,
    /// Credentials are missing or expired; nothing can be pushed until the
    /// user signs in again.
    ReauthRequired,
}

impl SyncRetryClass {
    /// Conflicts and validation failures (409, 422, ...) reject the record
    /// itself, so they are permanent for that item.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => SyncRetryClass::ReauthRequired,
            408 | 423 | 425 | 429 | 500..=599 => SyncRetryClass::Retryable,
            _ => SyncRetryClass::Permanent,
        }
    }

    /// Whether the failure is about the record rather than the connection.
    pub fn rejects_record(&self) -> bool {
        matches!(self, SyncRetryClass::Permanent)
    }
}

/// Exponential backoff between drain cycles that stopped on a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay_secs: i64,
    pub max_exponent: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 5,
            max_exponent: 8,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next cycle; doubles per consecutive failure up to
    /// `base_delay_secs * 2^max_exponent`.
    pub fn delay_secs(&self, consecutive_failures: u32) -> i64 {
        let exponent = consecutive_failures.min(self.max_exponent);
        self.base_delay_secs
            .saturating_mul(2_i64.saturating_pow(exponent))
    }
}
