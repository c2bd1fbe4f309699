//! Outbox reads and writes. The write functions take the caller's
//! connection so they can share a transaction with the record change.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::debug;

use inventra_core::sync::{OutboxItem, OutboxWriteRequest};
use inventra_core::Result;

use super::model::{NewOutboxItemDB, OutboxItemDB};
use crate::errors::StorageError;
use crate::schema::outbox;

/// Appends one item. The id comes from `AUTOINCREMENT`, so it is larger
/// than every id ever handed out before, including removed ones.
pub fn write_outbox_item(
    conn: &mut SqliteConnection,
    request: OutboxWriteRequest,
) -> Result<OutboxItem> {
    let row = NewOutboxItemDB::try_from(&request)?;
    let id = diesel::insert_into(outbox::table)
        .values(&row)
        .returning(outbox::id)
        .get_result::<i64>(conn)
        .map_err(StorageError::from)?;
    debug!(
        "Queued outbox item {} ({} {})",
        id,
        request.operation.as_str(),
        request.entity_type
    );
    Ok(request.into_item(id))
}

pub fn load_outbox(conn: &mut SqliteConnection) -> Result<Vec<OutboxItem>> {
    let rows = outbox::table
        .order(outbox::id.asc())
        .select(OutboxItemDB::as_select())
        .load::<OutboxItemDB>(conn)
        .map_err(StorageError::from)?;
    rows.into_iter().map(OutboxItem::try_from).collect()
}

pub fn delete_outbox_item(conn: &mut SqliteConnection, item_id: i64) -> Result<usize> {
    let removed = diesel::delete(outbox::table.find(item_id))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(removed)
}
