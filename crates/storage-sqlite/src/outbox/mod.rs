//! SQLite persistence for the outbox queue.

mod model;
mod repository;

pub use model::{NewOutboxItemDB, OutboxItemDB};
pub use repository::{delete_outbox_item, load_outbox, write_outbox_item};
