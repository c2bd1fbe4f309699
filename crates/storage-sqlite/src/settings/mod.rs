//! SQLite persistence for the singleton settings record.

mod model;
mod repository;

pub use model::SettingsDB;
pub use repository::{clear_settings, load_settings, update_settings_sync, upsert_settings};
