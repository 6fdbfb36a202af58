//! Base-table storage layer.
//!
//! [`Database`] is the explicit context object owning every base table's
//! value buffer plus per-table primary-key indices. Composite tables read
//! through it and receive one [`ChangeBatch`] per logical mutation; there is
//! no ambient global state and no concurrent writer.
//!
//! Buffers are column-major: one `Vec<Value>` per column, all the same
//! length, indexed by [`StorageRow`].

use std::collections::{HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};
use crate::index::StorageRow;
use crate::schema::{ColumnId, Schema, TableId};
use crate::value::Value;

// ============================================================================
// Change notifications
// ============================================================================

/// Whether a row was inserted into or removed from the storage buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowChange {
    Added,
    Removed,
}

/// One batch of changes produced by a single logical mutation.
///
/// Delivered to every composite table anchored on `table` before the next
/// read. Row changes carry the storage position at which the buffer was
/// modified, in application order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub table: TableId,
    /// Base columns whose cell contents changed.
    pub changed_columns: HashSet<ColumnId>,
    pub row_changes: Vec<(StorageRow, RowChange)>,
}

impl ChangeBatch {
    pub fn has_row_changes(&self) -> bool {
        !self.row_changes.is_empty()
    }
}

/// Receiver of change batches, registered per anchor table by the owner of
/// the composite tables. One `notify` per mutation, before the next read.
pub trait ChangeObserver {
    fn notify(&mut self, db: &Database, batch: &ChangeBatch);
}

// ============================================================================
// Database
// ============================================================================

#[derive(Debug, Clone, Default)]
struct TableBuffer {
    /// One value vector per column, all of equal length.
    columns: Vec<Vec<Value>>,
    /// Primary-key value -> storage position (normal tables only).
    key_index: HashMap<i64, usize>,
}

impl TableBuffer {
    fn row_count(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }
}

/// Owns all base-table buffers and serves the lookups breadcrumb traversal
/// relies on.
#[derive(Debug, Clone)]
pub struct Database {
    schema: Schema,
    buffers: Vec<TableBuffer>,
}

impl Database {
    pub fn new(schema: Schema) -> Self {
        let buffers = schema
            .tables()
            .map(|(_, def)| TableBuffer {
                columns: vec![Vec::new(); def.columns.len()],
                key_index: HashMap::new(),
            })
            .collect();
        Database { schema, buffers }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self, table: TableId) -> usize {
        self.buffers[table.get()].row_count()
    }

    /// Raw cell read. Panics on an out-of-bounds row (caller contract).
    pub fn value_at(&self, column: ColumnId, row: StorageRow) -> &Value {
        &self.buffers[column.table.get()].columns[column.index][row.get()]
    }

    /// Cell read addressed by the owning table's primary key.
    pub fn value_for_key(&self, column: ColumnId, key: i64) -> Option<&Value> {
        let row = self.row_for_primary_key(column.table, key)?;
        Some(self.value_at(column, row))
    }

    /// Storage position of a normal table's row with the given primary key.
    pub fn row_for_primary_key(&self, table: TableId, key: i64) -> Option<StorageRow> {
        self.buffers[table.get()]
            .key_index
            .get(&key)
            .copied()
            .map(StorageRow::new)
    }

    /// Unique-result lookup: the row whose key columns hold the key values.
    ///
    /// Used for forward breadcrumb hops; an unmatched key yields `None`.
    pub fn matching_row(&self, key_columns: &[ColumnId], key_values: &[Value]) -> Option<StorageRow> {
        debug_assert_eq!(key_columns.len(), key_values.len());
        if key_columns.is_empty() {
            return None;
        }
        // Fast path: single-column primary key.
        if key_columns.len() == 1 {
            let column = key_columns[0];
            if self.schema.primary_column(column.table) == Some(column) {
                return key_values[0]
                    .as_int()
                    .and_then(|key| self.row_for_primary_key(column.table, key));
            }
        }
        let table = key_columns[0].table;
        let buffer = &self.buffers[table.get()];
        (0..buffer.row_count()).map(StorageRow::new).find(|&row| {
            key_columns
                .iter()
                .zip(key_values)
                .all(|(col, val)| self.value_at(*col, row) == val)
        })
    }

    /// Multi-result lookup: every row whose column equals the value.
    ///
    /// Used for backward breadcrumb hops; may return zero, one or many rows.
    pub fn matching_rows(&self, column: ColumnId, value: &Value) -> Vec<StorageRow> {
        let buffer = &self.buffers[column.table.get()];
        buffer.columns[column.index]
            .iter()
            .enumerate()
            .filter(|(_, v)| *v == value)
            .map(|(i, _)| StorageRow::new(i))
            .collect()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a row, returning the change batch for observers.
    pub fn insert_row(&mut self, table: TableId, values: Vec<Value>) -> Result<ChangeBatch> {
        let at = StorageRow::new(self.row_count(table));
        self.insert_row_at(table, at, values)
    }

    /// Insert a row at a storage position, shifting later rows up.
    pub fn insert_row_at(
        &mut self,
        table: TableId,
        at: StorageRow,
        values: Vec<Value>,
    ) -> Result<ChangeBatch> {
        let column_count = self.schema.column_count(table);
        if values.len() != column_count {
            return Err(ViewError::Value {
                message: format!(
                    "table '{}' expects {} values, got {}",
                    self.schema.table(table).name,
                    column_count,
                    values.len()
                ),
            });
        }
        let buffer = &mut self.buffers[table.get()];
        if at.get() > buffer.row_count() {
            return Err(ViewError::Value {
                message: format!("insert position {} out of bounds", at.get()),
            });
        }
        for (column, value) in buffer.columns.iter_mut().zip(values) {
            column.insert(at.get(), value);
        }
        self.rebuild_key_index(table);
        debug!(
            "inserted row at {} into table {}",
            at.get(),
            self.schema.table(table).name
        );
        Ok(ChangeBatch {
            table,
            changed_columns: self.all_columns(table),
            row_changes: vec![(at, RowChange::Added)],
        })
    }

    /// Remove the row at a storage position, shifting later rows down.
    pub fn remove_row(&mut self, table: TableId, at: StorageRow) -> Result<ChangeBatch> {
        let buffer = &mut self.buffers[table.get()];
        if at.get() >= buffer.row_count() {
            return Err(ViewError::Value {
                message: format!("remove position {} out of bounds", at.get()),
            });
        }
        for column in &mut buffer.columns {
            column.remove(at.get());
        }
        self.rebuild_key_index(table);
        debug!(
            "removed row {} from table {}",
            at.get(),
            self.schema.table(table).name
        );
        Ok(ChangeBatch {
            table,
            changed_columns: self.all_columns(table),
            row_changes: vec![(at, RowChange::Removed)],
        })
    }

    /// Update individual cells of one row. No row changes are reported.
    pub fn update_cells(
        &mut self,
        row: StorageRow,
        updates: Vec<(ColumnId, Value)>,
    ) -> Result<ChangeBatch> {
        let table = match updates.first() {
            Some((column, _)) => column.table,
            None => {
                return Err(ViewError::Value {
                    message: "empty cell update".to_string(),
                })
            }
        };
        let mut changed_columns = HashSet::new();
        for (column, value) in updates {
            if column.table != table {
                return Err(ViewError::Value {
                    message: "cell update spans multiple tables".to_string(),
                });
            }
            let buffer = &mut self.buffers[table.get()];
            if row.get() >= buffer.row_count() {
                return Err(ViewError::Value {
                    message: format!("update position {} out of bounds", row.get()),
                });
            }
            buffer.columns[column.index][row.get()] = value;
            changed_columns.insert(column);
        }
        self.rebuild_key_index(table);
        Ok(ChangeBatch {
            table,
            changed_columns,
            row_changes: Vec::new(),
        })
    }

    /// Drop every row of every table, keeping the schema.
    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            for column in &mut buffer.columns {
                column.clear();
            }
            buffer.key_index.clear();
        }
    }

    fn all_columns(&self, table: TableId) -> HashSet<ColumnId> {
        (0..self.schema.column_count(table))
            .map(|index| ColumnId { table, index })
            .collect()
    }

    fn rebuild_key_index(&mut self, table: TableId) {
        let primary = match self.schema.primary_column(table) {
            Some(column) => column,
            None => return, // associative: no single-column key index
        };
        let buffer = &mut self.buffers[table.get()];
        let keys: Vec<Option<i64>> = buffer.columns[primary.index]
            .iter()
            .map(Value::as_int)
            .collect();
        buffer.key_index.clear();
        for (row, key) in keys.into_iter().enumerate() {
            if let Some(key) = key {
                buffer.key_index.insert(key, row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, SchemaBuilder, TableKind};
    use crate::value::ContentType;

    fn peaks_db() -> (Database, TableId, ColumnId, ColumnId) {
        let mut b = SchemaBuilder::new();
        let peaks = b.table("peaks", TableKind::Normal);
        let pk = b.column(peaks, ColumnDef::primary("peak_id", "Peak ID"));
        let name = b.column(
            peaks,
            ColumnDef::value("name", "Name", ContentType::String),
        );
        let mut db = Database::new(b.finish().unwrap());
        db.insert_row(
            peaks,
            vec![Value::Int(10), Value::Str("Rigi".to_string())],
        )
        .unwrap();
        db.insert_row(
            peaks,
            vec![Value::Int(20), Value::Str("Pilatus".to_string())],
        )
        .unwrap();
        (db, peaks, pk, name)
    }

    #[test]
    fn test_insert_and_lookup() {
        let (db, peaks, _pk, name) = peaks_db();
        assert_eq!(db.row_count(peaks), 2);
        let row = db.row_for_primary_key(peaks, 20).unwrap();
        assert_eq!(db.value_at(name, row).as_str(), Some("Pilatus"));
        assert_eq!(db.value_for_key(name, 10).unwrap().as_str(), Some("Rigi"));
        assert!(db.row_for_primary_key(peaks, 99).is_none());
    }

    #[test]
    fn test_positional_insert_shifts_keys() {
        let (mut db, peaks, _pk, name) = peaks_db();
        let batch = db
            .insert_row_at(
                peaks,
                StorageRow::new(0),
                vec![Value::Int(30), Value::Str("Titlis".to_string())],
            )
            .unwrap();
        assert_eq!(batch.row_changes, vec![(StorageRow::new(0), RowChange::Added)]);
        // Existing keys moved down one storage slot.
        assert_eq!(db.row_for_primary_key(peaks, 10), Some(StorageRow::new(1)));
        assert_eq!(db.value_at(name, StorageRow::new(0)).as_str(), Some("Titlis"));
    }

    #[test]
    fn test_remove_row() {
        let (mut db, peaks, _pk, _name) = peaks_db();
        let batch = db.remove_row(peaks, StorageRow::new(0)).unwrap();
        assert_eq!(
            batch.row_changes,
            vec![(StorageRow::new(0), RowChange::Removed)]
        );
        assert_eq!(db.row_count(peaks), 1);
        assert!(db.row_for_primary_key(peaks, 10).is_none());
        assert_eq!(db.row_for_primary_key(peaks, 20), Some(StorageRow::new(0)));
    }

    #[test]
    fn test_update_cells_batch() {
        let (mut db, _peaks, _pk, name) = peaks_db();
        let batch = db
            .update_cells(
                StorageRow::new(1),
                vec![(name, Value::Str("Pilatus Kulm".to_string()))],
            )
            .unwrap();
        assert!(!batch.has_row_changes());
        assert_eq!(batch.changed_columns.len(), 1);
        assert!(batch.changed_columns.contains(&name));
    }

    #[test]
    fn test_matching_rows_multi() {
        let mut b = SchemaBuilder::new();
        let regions = b.table("regions", TableKind::Normal);
        let region_pk = b.column(regions, ColumnDef::primary("region_id", "Region"));
        let peaks = b.table("peaks", TableKind::Normal);
        b.column(peaks, ColumnDef::primary("peak_id", "Peak"));
        let fk = b.column(peaks, ColumnDef::foreign("region_id", "Region", region_pk));
        let mut db = Database::new(b.finish().unwrap());
        db.insert_row(regions, vec![Value::Int(1)]).unwrap();
        db.insert_row(peaks, vec![Value::Int(10), Value::Int(1)]).unwrap();
        db.insert_row(peaks, vec![Value::Int(11), Value::Int(1)]).unwrap();
        db.insert_row(peaks, vec![Value::Int(12), Value::Empty]).unwrap();

        let rows = db.matching_rows(fk, &Value::Int(1));
        assert_eq!(rows.len(), 2);
        assert!(db.matching_rows(fk, &Value::Int(7)).is_empty());
    }

    #[test]
    fn test_value_count_mismatch() {
        let (mut db, peaks, _, _) = peaks_db();
        assert!(db.insert_row(peaks, vec![Value::Int(1)]).is_err());
    }
}
