//! Generic access to the entity tables.
//!
//! Every entity table has the same four columns, so one set of statements
//! serves all of them with the table name filled in at runtime. Table names
//! only ever come from [`TableName::sql_name`], never from callers.

use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use diesel::sqlite::SqliteConnection;

use inventra_core::entities::Record;
use inventra_core::errors::{DatabaseError, Error, Result};
use inventra_core::sync::{SyncMeta, SyncStatus};
use inventra_core::tables::TableName;

use crate::errors::StorageError;
use crate::settings::{clear_settings, load_settings, update_settings_sync, upsert_settings};

#[derive(QueryableByName, Debug)]
struct RecordRow {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    payload: String,
    #[diesel(sql_type = Nullable<Text>)]
    sync_status: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    sync_error: Option<String>,
}

fn quote_identifier(value: &str) -> String {
    format!("`{}`", value.replace('`', "``"))
}

fn table_ident(table: TableName) -> String {
    quote_identifier(table.sql_name())
}

/// Splits sync fields into their column values.
pub fn sync_columns(sync: &SyncMeta) -> (Option<String>, Option<String>) {
    (
        sync.sync_status.map(|status| status.as_str().to_string()),
        sync.sync_error.clone(),
    )
}

pub fn sync_meta_from_columns(
    sync_status: Option<String>,
    sync_error: Option<String>,
) -> Result<SyncMeta> {
    let sync_status = match sync_status {
        Some(value) => Some(SyncStatus::parse(&value).ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "Unknown sync status '{}'",
                value
            )))
        })?),
        None => None,
    };
    Ok(SyncMeta {
        sync_status,
        sync_error,
    })
}

fn to_record(table: TableName, row: RecordRow) -> Result<Record> {
    let sync = sync_meta_from_columns(row.sync_status, row.sync_error)?;
    Record::from_stored(table, &row.payload, sync).map_err(|e| {
        Error::Database(DatabaseError::Internal(format!(
            "Stored record {}/{} cannot be decoded: {}",
            table, row.id, e
        )))
    })
}

/// All records of `table`, ordered by id.
pub fn load_records(conn: &mut SqliteConnection, table: TableName) -> Result<Vec<Record>> {
    if table.is_settings() {
        return Ok(load_settings(conn)?.into_iter().collect());
    }

    let sql = format!(
        "SELECT id, payload, sync_status, sync_error FROM {} ORDER BY id",
        table_ident(table)
    );
    let rows = diesel::sql_query(sql)
        .load::<RecordRow>(conn)
        .map_err(StorageError::from)?;
    rows.into_iter().map(|row| to_record(table, row)).collect()
}

pub fn find_record(
    conn: &mut SqliteConnection,
    table: TableName,
    id: &str,
) -> Result<Option<Record>> {
    if table.is_settings() {
        return load_settings(conn);
    }

    let sql = format!(
        "SELECT id, payload, sync_status, sync_error FROM {} WHERE id = ?",
        table_ident(table)
    );
    let row = diesel::sql_query(sql)
        .bind::<Text, _>(id)
        .get_result::<RecordRow>(conn)
        .optional()
        .map_err(StorageError::from)?;
    row.map(|row| to_record(table, row)).transpose()
}

fn write_record(conn: &mut SqliteConnection, record: &Record, replace: bool) -> Result<()> {
    if record.table().is_settings() {
        return upsert_settings(conn, record);
    }

    let stored = record.to_stored()?;
    let (sync_status, sync_error) = sync_columns(&stored.sync);
    let conflict = if replace {
        " ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, \
         sync_status = excluded.sync_status, sync_error = excluded.sync_error"
    } else {
        ""
    };
    let sql = format!(
        "INSERT INTO {} (id, payload, sync_status, sync_error) VALUES (?, ?, ?, ?){}",
        table_ident(record.table()),
        conflict
    );
    diesel::sql_query(sql)
        .bind::<Text, _>(&stored.id)
        .bind::<Text, _>(&stored.payload)
        .bind::<Nullable<Text>, _>(sync_status)
        .bind::<Nullable<Text>, _>(sync_error)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

/// Insert-or-replace by key, sync columns included as given.
pub fn upsert_record(conn: &mut SqliteConnection, record: &Record) -> Result<()> {
    write_record(conn, record, true)
}

/// Plain insert; a taken id fails the statement.
pub fn insert_record(conn: &mut SqliteConnection, record: &Record) -> Result<()> {
    write_record(conn, record, false)
}

pub fn delete_record(conn: &mut SqliteConnection, table: TableName, id: &str) -> Result<usize> {
    if table.is_settings() {
        return clear_settings(conn);
    }

    let sql = format!("DELETE FROM {} WHERE id = ?", table_ident(table));
    let removed = diesel::sql_query(sql)
        .bind::<Text, _>(id)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(removed)
}

pub fn clear_records(conn: &mut SqliteConnection, table: TableName) -> Result<usize> {
    if table.is_settings() {
        return clear_settings(conn);
    }

    let removed = diesel::sql_query(format!("DELETE FROM {}", table_ident(table)))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(removed)
}

/// Rewrites only the two sync columns of one record.
pub fn update_sync_fields(
    conn: &mut SqliteConnection,
    table: TableName,
    id: &str,
    sync: &SyncMeta,
) -> Result<usize> {
    if table.is_settings() {
        return update_settings_sync(conn, sync);
    }

    let (sync_status, sync_error) = sync_columns(sync);
    let sql = format!(
        "UPDATE {} SET sync_status = ?, sync_error = ? WHERE id = ?",
        table_ident(table)
    );
    let updated = diesel::sql_query(sql)
        .bind::<Nullable<Text>, _>(sync_status)
        .bind::<Nullable<Text>, _>(sync_error)
        .bind::<Text, _>(id)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(updated)
}
