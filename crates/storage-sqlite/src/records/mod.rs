//! SQLite persistence for the entity tables.

mod repository;

pub use repository::{
    clear_records, delete_record, find_record, insert_record, load_records, sync_columns,
    sync_meta_from_columns, update_sync_fields, upsert_record,
};
