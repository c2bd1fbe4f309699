//! SQLite storage for Inventra: schema migrations, the single-writer
//! actor and the [`SqliteLocalStore`] implementation of the core store
//! contract.

pub mod db;
pub mod errors;
mod local_store;
pub mod outbox;
pub mod records;
pub mod schema;
pub mod settings;

pub use db::StoreConfig;
pub use errors::StorageError;
pub use local_store::SqliteLocalStore;
