use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use inventra_core::entities::Record;
use inventra_core::sync::SyncMeta;
use inventra_core::tables::{TableName, SETTINGS_KEY};
use inventra_core::Result;

use super::model::SettingsDB;
use crate::errors::StorageError;
use crate::records::{sync_columns, sync_meta_from_columns};
use crate::schema::settings;

pub fn load_settings(conn: &mut SqliteConnection) -> Result<Option<Record>> {
    let row = settings::table
        .find(SETTINGS_KEY)
        .select(SettingsDB::as_select())
        .first::<SettingsDB>(conn)
        .optional()
        .map_err(StorageError::from)?;

    row.map(|row| {
        let sync = sync_meta_from_columns(row.sync_status, row.sync_error)?;
        Record::from_stored(TableName::Settings, &row.payload, sync)
    })
    .transpose()
}

/// Writes the singleton settings record under the fixed key.
pub fn upsert_settings(conn: &mut SqliteConnection, record: &Record) -> Result<()> {
    let stored = record.to_stored()?;
    let (sync_status, sync_error) = sync_columns(&stored.sync);
    let row = SettingsDB {
        key: SETTINGS_KEY.to_string(),
        payload: stored.payload,
        sync_status,
        sync_error,
    };

    diesel::insert_into(settings::table)
        .values(&row)
        .on_conflict(settings::key)
        .do_update()
        .set(&row)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

pub fn clear_settings(conn: &mut SqliteConnection) -> Result<usize> {
    let removed = diesel::delete(settings::table)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(removed)
}

pub fn update_settings_sync(conn: &mut SqliteConnection, sync: &SyncMeta) -> Result<usize> {
    let (sync_status, sync_error) = sync_columns(sync);
    let updated = diesel::update(settings::table.find(SETTINGS_KEY))
        .set((
            settings::sync_status.eq(sync_status),
            settings::sync_error.eq(sync_error),
        ))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(updated)
}
