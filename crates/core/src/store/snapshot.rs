use std::collections::BTreeMap;

use crate::entities::{Entity, Record, Settings};
use crate::errors::{DatabaseError, Error, Result};
use crate::sync::OutboxItem;
use crate::tables::TableName;

/// Full contents of some or all tables, keyed by table.
///
/// Used both as the result of a full load and as the input of a bulk
/// replace. There is no slot for the outbox: the outbox only grows through
/// `add_to_outbox` and only shrinks through `remove_from_outbox`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSnapshot {
    tables: BTreeMap<TableName, Vec<Record>>,
}

impl TableSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableName, records: Vec<Record>) -> Self {
        self.insert(table, records);
        self
    }

    pub fn with_entities<E: Entity>(self, entities: Vec<E>) -> Self {
        let records = entities.into_iter().map(Entity::into_record).collect();
        self.with_table(E::TABLE, records)
    }

    pub fn with_settings(self, settings: Settings) -> Self {
        self.with_table(TableName::Settings, vec![settings.into_record()])
    }

    pub fn insert(&mut self, table: TableName, records: Vec<Record>) {
        self.tables.insert(table, records);
    }

    /// Records of one table; empty when the table is not part of the snapshot.
    pub fn get(&self, table: TableName) -> &[Record] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, table: TableName) -> bool {
        self.tables.contains_key(&table)
    }

    /// Typed copy of one table.
    pub fn entities<E: Entity>(&self) -> Vec<E> {
        self.get(E::TABLE)
            .iter()
            .cloned()
            .filter_map(E::from_record)
            .collect()
    }

    pub fn settings(&self) -> Option<Settings> {
        self.entities::<Settings>().into_iter().next()
    }

    pub fn tables(&self) -> impl Iterator<Item = (TableName, &[Record])> {
        self.tables
            .iter()
            .map(|(table, records)| (*table, records.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Checks that every record is filed under its own table and that
    /// settings carries at most one record.
    pub fn validate(&self) -> Result<()> {
        for (table, records) in &self.tables {
            if let Some(stray) = records.iter().find(|r| r.table() != *table) {
                return Err(Error::Database(DatabaseError::InvalidBulkWrite(format!(
                    "record '{}' of table '{}' filed under '{}'",
                    stray.id(),
                    stray.table(),
                    table
                ))));
            }
            if table.is_settings() && records.len() > 1 {
                return Err(Error::Database(DatabaseError::InvalidBulkWrite(format!(
                    "settings holds at most one record, got {}",
                    records.len()
                ))));
            }
        }
        Ok(())
    }
}

/// Everything the store holds, as returned by a full load at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSnapshot {
    pub tables: TableSnapshot,
    /// Pending outbox items in ascending id order.
    pub outbox: Vec<OutboxItem>,
}

impl DataSnapshot {
    pub fn entities<E: Entity>(&self) -> Vec<E> {
        self.tables.entities()
    }

    pub fn settings(&self) -> Option<Settings> {
        self.tables.settings()
    }
}
