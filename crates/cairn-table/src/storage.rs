//! In-memory table contents.
//!
//! Rows live in numbered heap slots. Deleting a row empties its slot but
//! never reuses or compacts it, so sequential scans see the hole and index
//! positions held by open cursors stay meaningful.

use std::collections::BTreeSet;
use std::sync::Arc;

use cairn_common::error::{CairnError, CairnResult};
use cairn_common::types::{Key, Row};

use crate::catalog::TableDef;
use crate::encoder::KeyEncoder;

/// An ordered index: encoded key plus heap slot.
pub type IndexTree = BTreeSet<(Key, usize)>;

/// Rows and indexes of one table.
#[derive(Debug)]
pub struct TableData {
    def: Arc<TableDef>,
    slots: Vec<Option<Row>>,
    indexes: Vec<IndexTree>,
    live: usize,
    crashed: bool,
}

impl TableData {
    /// Creates empty contents for `def`.
    pub fn new(def: Arc<TableDef>) -> Self {
        let indexes = vec![IndexTree::new(); def.indexes.len()];
        Self {
            def,
            slots: Vec::new(),
            indexes,
            live: 0,
            crashed: false,
        }
    }

    /// Rebuilds contents for a changed definition from existing rows.
    pub fn rebuild(def: Arc<TableDef>, rows: impl IntoIterator<Item = Row>) -> CairnResult<Self> {
        let mut data = Self::new(def);
        for row in rows {
            data.insert(row)?;
        }
        Ok(data)
    }

    /// Returns the definition these contents follow.
    pub fn def(&self) -> &Arc<TableDef> {
        &self.def
    }

    /// Inserts a row, returning its heap slot.
    ///
    /// Values are converted to the column types. Unique indexes reject
    /// duplicate keys.
    pub fn insert(&mut self, row: Row) -> CairnResult<usize> {
        if row.num_columns() != self.def.columns.len() {
            return Err(CairnError::invalid_argument(format!(
                "{} expects {} columns, got {}",
                self.def.ident,
                self.def.columns.len(),
                row.num_columns()
            )));
        }

        let mut values = Vec::with_capacity(row.num_columns());
        for (value, column) in row.values().iter().zip(&self.def.columns) {
            if value.is_null() && !column.nullable {
                return Err(CairnError::invalid_argument(format!(
                    "column '{}' cannot be NULL",
                    column.name
                )));
            }
            let stored = value.coerce_to(column.ty).ok_or_else(|| {
                CairnError::invalid_argument(format!(
                    "value '{}' cannot be stored in column '{}' ({})",
                    value, column.name, column.ty
                ))
            })?;
            values.push(stored);
        }
        let row = Row::new(values);

        let keys: Vec<Key> = (0..self.indexes.len())
            .filter_map(|keyno| KeyEncoder::new(&self.def, keyno))
            .map(|enc| enc.encode_row(&row))
            .collect();

        for (keyno, key) in keys.iter().enumerate() {
            if self.def.indexes[keyno].unique && self.find_exact(keyno, key).is_some() {
                return Err(CairnError::invalid_argument(format!(
                    "duplicate entry {} for key '{}'",
                    row, self.def.indexes[keyno].name
                )));
            }
        }

        let slot = self.slots.len();
        for (tree, key) in self.indexes.iter_mut().zip(keys) {
            tree.insert((key, slot));
        }
        self.slots.push(Some(row));
        self.live += 1;
        Ok(slot)
    }

    /// Deletes every row matching `predicate`, returning how many went.
    pub fn delete_where(&mut self, mut predicate: impl FnMut(&Row) -> bool) -> usize {
        let mut deleted = 0;
        for slot in 0..self.slots.len() {
            let matches = self.slots[slot].as_ref().map_or(false, &mut predicate);
            if !matches {
                continue;
            }
            if let Some(row) = self.slots[slot].take() {
                for keyno in 0..self.indexes.len() {
                    if let Some(enc) = KeyEncoder::new(&self.def, keyno) {
                        self.indexes[keyno].remove(&(enc.encode_row(&row), slot));
                    }
                }
                self.live -= 1;
                deleted += 1;
            }
        }
        deleted
    }

    /// Returns the row in `slot`, or `None` for a deleted or missing slot.
    pub fn row(&self, slot: usize) -> Option<&Row> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Returns the number of heap slots, including deleted ones.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of live rows.
    pub fn live_rows(&self) -> usize {
        self.live
    }

    /// Returns live rows in slot order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.slots.iter().flatten()
    }

    /// Returns the tree of index `keyno`.
    pub fn index(&self, keyno: usize) -> Option<&IndexTree> {
        self.indexes.get(keyno)
    }

    /// Returns true if the contents were marked crashed.
    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    /// Marks or clears the crashed flag.
    pub fn set_crashed(&mut self, crashed: bool) {
        self.crashed = crashed;
    }

    fn find_exact(&self, keyno: usize, key: &Key) -> Option<usize> {
        self.indexes[keyno]
            .range((key.clone(), 0)..)
            .next()
            .filter(|(k, _)| k == key)
            .map(|&(_, slot)| slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_common::types::{ColumnType, Datum, TableIdent};

    fn data() -> TableData {
        let def = TableDef::new(TableIdent::new("test", "t"))
            .column("id", ColumnType::Int)
            .column("name", ColumnType::Text)
            .index("PRIMARY", vec![0], true);
        TableData::new(Arc::new(def))
    }

    fn row(id: i64, name: &str) -> Row {
        Row::new(vec![Datum::Int(id), Datum::text(name)])
    }

    #[test]
    fn test_insert_and_index() {
        let mut data = data();
        data.insert(row(2, "b")).unwrap();
        data.insert(row(1, "a")).unwrap();

        let slots: Vec<usize> = data.index(0).unwrap().iter().map(|(_, s)| *s).collect();
        assert_eq!(slots, vec![1, 0]);
        assert_eq!(data.live_rows(), 2);
    }

    #[test]
    fn test_unique_violation() {
        let mut data = data();
        data.insert(row(1, "a")).unwrap();
        assert!(data.insert(row(1, "again")).is_err());
        assert_eq!(data.live_rows(), 1);
    }

    #[test]
    fn test_delete_leaves_hole() {
        let mut data = data();
        for i in 0..4 {
            data.insert(row(i, "x")).unwrap();
        }
        let deleted = data.delete_where(|r| r.get(0).and_then(Datum::as_int) == Some(1));
        assert_eq!(deleted, 1);
        assert_eq!(data.slot_count(), 4);
        assert_eq!(data.live_rows(), 3);
        assert!(data.row(1).is_none());
        assert_eq!(data.index(0).unwrap().len(), 3);
    }

    #[test]
    fn test_coerces_on_insert() {
        let mut data = data();
        let slot = data
            .insert(Row::new(vec![Datum::text("5"), Datum::Int(9)]))
            .unwrap();
        assert_eq!(data.row(slot), Some(&row(5, "9")));
        assert!(data.insert(Row::new(vec![Datum::Int(1)])).is_err());
    }
}
