//! Per-record sync status fields.

use serde::{Deserialize, Serialize};

/// Whether the last local mutation of a record has been acknowledged remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    #[default]
    Synced,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<SyncStatus> {
        match value {
            "pending" => Some(SyncStatus::Pending),
            "synced" => Some(SyncStatus::Synced),
            "error" => Some(SyncStatus::Error),
            _ => None,
        }
    }
}

/// The two cross-cutting fields every entity carries.
///
/// Both are flattened into the entity's JSON. An absent `sync_status` reads
/// as [`SyncStatus::Synced`]; `sync_error` is only meaningful with `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

impl SyncMeta {
    pub fn pending() -> Self {
        Self {
            sync_status: Some(SyncStatus::Pending),
            sync_error: None,
        }
    }

    /// Effective status, defaulting an absent value to `Synced`.
    pub fn status(&self) -> SyncStatus {
        self.sync_status.unwrap_or_default()
    }

    /// Local mutation: `Synced | Error -> Pending`.
    pub fn mark_pending(&mut self) {
        self.sync_status = Some(SyncStatus::Pending);
        self.sync_error = None;
    }

    pub fn mark_synced(&mut self) {
        self.sync_status = Some(SyncStatus::Synced);
        self.sync_error = None;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.sync_status = Some(SyncStatus::Error);
        self.sync_error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_status_reads_as_synced() {
        let meta: SyncMeta = serde_json::from_str("{}").expect("decode empty meta");
        assert_eq!(meta.status(), SyncStatus::Synced);
        assert_eq!(meta.sync_error, None);
    }

    #[test]
    fn error_then_local_mutation_returns_to_pending() {
        let mut meta = SyncMeta::default();
        meta.mark_error("rejected: duplicate phone");
        assert_eq!(meta.status(), SyncStatus::Error);

        meta.mark_pending();
        assert_eq!(meta.status(), SyncStatus::Pending);
        assert_eq!(meta.sync_error, None);
    }

    #[test]
    fn absent_fields_are_not_serialized() {
        let encoded = serde_json::to_string(&SyncMeta::default()).expect("encode");
        assert_eq!(encoded, "{}");
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Error] {
            assert_eq!(SyncStatus::parse(status.as_str()), Some(status));
        }
    }
}
