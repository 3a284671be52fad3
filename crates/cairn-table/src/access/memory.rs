//! Access method over [`TableData`].
//!
//! The cursor remembers the `(key, slot)` entry it last landed on rather
//! than an offset, so rows inserted or deleted between reads do not shift
//! it. Heap scans remember the next slot to read.

use std::ops::Bound;

use cairn_common::types::{Key, Row};

use super::{AccessError, AccessKind, AccessMethod, ComparisonMode, CursorState};
use crate::catalog::EngineKind;
use crate::storage::{IndexTree, TableData};

/// Cursor over in-memory table data.
#[derive(Debug)]
pub struct MemoryAccess {
    engine: EngineKind,
    kind: AccessKind,
    state: CursorState,
    /// Index entry the cursor is positioned on.
    position: Option<(Key, usize)>,
    /// Next heap slot for sequential scans.
    next_slot: usize,
    held_by_handle: bool,
}

impl MemoryAccess {
    /// Creates an uninitialized cursor for a table served by `engine`.
    pub fn new(engine: EngineKind) -> Self {
        Self {
            engine,
            kind: AccessKind::None,
            state: CursorState::Uninitialized,
            position: None,
            next_slot: 0,
            held_by_handle: false,
        }
    }

    /// Returns true once the instance was prepared for a handle.
    pub fn is_held_by_handle(&self) -> bool {
        self.held_by_handle
    }

    fn index_tree<'d>(&self, data: &'d TableData) -> Result<&'d IndexTree, AccessError> {
        if data.is_crashed() {
            return Err(AccessError::Crashed);
        }
        match self.kind {
            AccessKind::Index(keyno) => data.index(keyno).ok_or(AccessError::WrongIndex { keyno }),
            _ => Err(AccessError::NotInitialized),
        }
    }

    /// Lands on `entry`, or records `miss` and fails with `err`.
    fn land(
        &mut self,
        data: &TableData,
        entry: Option<&(Key, usize)>,
        miss: CursorState,
        err: AccessError,
    ) -> Result<Row, AccessError> {
        match entry {
            Some((key, slot)) => {
                self.position = Some((key.clone(), *slot));
                self.state = CursorState::Valid;
                data.row(*slot).cloned().ok_or(AccessError::RecordDeleted)
            }
            None => {
                self.state = miss;
                Err(err)
            }
        }
    }
}

impl AccessMethod for MemoryAccess {
    fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    fn supports_handle_cursor(&self) -> bool {
        self.engine.supports_handle_cursor()
    }

    fn prepare_for_handle(&mut self) {
        self.end_access();
        self.held_by_handle = true;
    }

    fn access_kind(&self) -> AccessKind {
        self.kind
    }

    fn cursor_state(&self) -> CursorState {
        self.state
    }

    fn index_init(&mut self, data: &TableData, keyno: usize) -> Result<(), AccessError> {
        if data.index(keyno).is_none() {
            return Err(AccessError::WrongIndex { keyno });
        }
        self.kind = AccessKind::Index(keyno);
        self.state = CursorState::Uninitialized;
        self.position = None;
        Ok(())
    }

    fn rnd_init(&mut self, _data: &TableData) -> Result<(), AccessError> {
        self.kind = AccessKind::Sequential;
        self.state = CursorState::Uninitialized;
        self.next_slot = 0;
        Ok(())
    }

    fn end_access(&mut self) {
        self.kind = AccessKind::None;
        self.state = CursorState::Uninitialized;
        self.position = None;
        self.next_slot = 0;
    }

    fn index_first(&mut self, data: &TableData) -> Result<Row, AccessError> {
        let tree = self.index_tree(data)?;
        self.land(data, tree.iter().next(), CursorState::AtEnd, AccessError::EndOfFile)
    }

    fn index_last(&mut self, data: &TableData) -> Result<Row, AccessError> {
        let tree = self.index_tree(data)?;
        self.land(
            data,
            tree.iter().next_back(),
            CursorState::BeforeStart,
            AccessError::EndOfFile,
        )
    }

    fn index_next(&mut self, data: &TableData) -> Result<Row, AccessError> {
        let tree = self.index_tree(data)?;
        let entry = match (self.state, &self.position) {
            (CursorState::Valid, Some(pos)) => tree
                .range((Bound::Excluded(pos.clone()), Bound::Unbounded))
                .next(),
            (CursorState::AtEnd, _) => return Err(AccessError::EndOfFile),
            _ => tree.iter().next(),
        };
        self.land(data, entry, CursorState::AtEnd, AccessError::EndOfFile)
    }

    fn index_prev(&mut self, data: &TableData) -> Result<Row, AccessError> {
        let tree = self.index_tree(data)?;
        let entry = match (self.state, &self.position) {
            (CursorState::Valid, Some(pos)) => tree.range(..pos.clone()).next_back(),
            (CursorState::BeforeStart, _) => return Err(AccessError::EndOfFile),
            _ => tree.iter().next_back(),
        };
        self.land(data, entry, CursorState::BeforeStart, AccessError::EndOfFile)
    }

    fn index_read(
        &mut self,
        data: &TableData,
        key: &Key,
        mode: ComparisonMode,
    ) -> Result<Row, AccessError> {
        let tree = self.index_tree(data)?;
        let at = (key.clone(), 0usize);
        let past = (key.successor(), 0usize);
        let prefixed = |entry: &&(Key, usize)| entry.0.starts_with(key);

        let entry = match mode {
            ComparisonMode::Exact | ComparisonMode::Prefix => {
                tree.range(at..).next().filter(prefixed)
            }
            ComparisonMode::KeyOrNext => tree.range(at..).next(),
            ComparisonMode::AfterKey => tree.range(past..).next(),
            ComparisonMode::KeyOrPrev | ComparisonMode::PrefixLastOrPrev => {
                tree.range(..past).next_back()
            }
            ComparisonMode::BeforeKey => tree.range(..at).next_back(),
            ComparisonMode::PrefixLast => tree.range(..past).next_back().filter(prefixed),
        };

        let miss = if mode.is_backward() {
            CursorState::BeforeStart
        } else {
            CursorState::AtEnd
        };
        self.land(data, entry, miss, AccessError::KeyNotFound)
    }

    fn index_next_same(&mut self, data: &TableData, key: &Key) -> Result<Row, AccessError> {
        let tree = self.index_tree(data)?;
        let entry = match (self.state, &self.position) {
            (CursorState::Valid, Some(pos)) => tree
                .range((Bound::Excluded(pos.clone()), Bound::Unbounded))
                .next()
                .filter(|entry| entry.0.starts_with(key)),
            _ => return Err(AccessError::EndOfFile),
        };
        self.land(data, entry, CursorState::AtEnd, AccessError::EndOfFile)
    }

    fn rnd_next(&mut self, data: &TableData) -> Result<Row, AccessError> {
        if data.is_crashed() {
            return Err(AccessError::Crashed);
        }
        if self.kind != AccessKind::Sequential {
            return Err(AccessError::NotInitialized);
        }
        if self.next_slot >= data.slot_count() {
            self.state = CursorState::AtEnd;
            return Err(AccessError::EndOfFile);
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.state = CursorState::Valid;
        data.row(slot).cloned().ok_or(AccessError::RecordDeleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableDef;
    use crate::encoder::KeyEncoder;
    use cairn_common::types::{ColumnType, Datum, TableIdent};
    use std::sync::Arc;

    /// Rows (a, b) for a in 1..=3 and b in 1..=2, indexed on (a, b).
    fn data() -> TableData {
        let def = TableDef::new(TableIdent::new("test", "t"))
            .column("a", ColumnType::Int)
            .column("b", ColumnType::Int)
            .index("ab", vec![0, 1], true);
        let mut data = TableData::new(Arc::new(def));
        for a in (1..=3).rev() {
            for b in 1..=2 {
                data.insert(Row::new(vec![Datum::Int(a), Datum::Int(b)])).unwrap();
            }
        }
        data
    }

    fn key(data: &TableData, values: &[i64]) -> Key {
        let values: Vec<Datum> = values.iter().map(|&v| Datum::Int(v)).collect();
        KeyEncoder::new(data.def(), 0)
            .unwrap()
            .encode_values(&values)
            .unwrap()
    }

    fn pair(row: Row) -> (i64, i64) {
        let v = row.values();
        (v[0].as_int().unwrap(), v[1].as_int().unwrap())
    }

    fn cursor(data: &TableData) -> MemoryAccess {
        let mut access = MemoryAccess::new(EngineKind::Memory);
        access.index_init(data, 0).unwrap();
        access
    }

    #[test]
    fn test_forward_and_backward() {
        let data = data();
        let mut access = cursor(&data);

        assert_eq!(pair(access.index_first(&data).unwrap()), (1, 1));
        assert_eq!(pair(access.index_next(&data).unwrap()), (1, 2));
        assert_eq!(pair(access.index_prev(&data).unwrap()), (1, 1));
        assert_eq!(access.index_prev(&data), Err(AccessError::EndOfFile));
        assert_eq!(access.cursor_state(), CursorState::BeforeStart);
        assert_eq!(pair(access.index_next(&data).unwrap()), (1, 1));

        assert_eq!(pair(access.index_last(&data).unwrap()), (3, 2));
        assert_eq!(access.index_next(&data), Err(AccessError::EndOfFile));
        assert_eq!(pair(access.index_prev(&data).unwrap()), (3, 2));
    }

    #[test]
    fn test_key_lookups() {
        let data = data();
        let mut access = cursor(&data);

        let k2 = key(&data, &[2]);
        let read = |access: &mut MemoryAccess, mode| access.index_read(&data, &k2, mode).map(pair);

        assert_eq!(read(&mut access, ComparisonMode::Exact), Ok((2, 1)));
        assert_eq!(read(&mut access, ComparisonMode::KeyOrNext), Ok((2, 1)));
        assert_eq!(read(&mut access, ComparisonMode::AfterKey), Ok((3, 1)));
        assert_eq!(read(&mut access, ComparisonMode::KeyOrPrev), Ok((2, 2)));
        assert_eq!(read(&mut access, ComparisonMode::BeforeKey), Ok((1, 2)));
        assert_eq!(read(&mut access, ComparisonMode::PrefixLast), Ok((2, 2)));

        let k9 = key(&data, &[9]);
        assert_eq!(
            access.index_read(&data, &k9, ComparisonMode::Exact),
            Err(AccessError::KeyNotFound)
        );
        assert_eq!(
            access
                .index_read(&data, &k9, ComparisonMode::PrefixLastOrPrev)
                .map(pair),
            Ok((3, 2))
        );
    }

    #[test]
    fn test_next_same() {
        let data = data();
        let mut access = cursor(&data);
        let k2 = key(&data, &[2]);

        assert_eq!(
            access.index_read(&data, &k2, ComparisonMode::Exact).map(pair),
            Ok((2, 1))
        );
        assert_eq!(access.index_next_same(&data, &k2).map(pair), Ok((2, 2)));
        assert_eq!(
            access.index_next_same(&data, &k2),
            Err(AccessError::EndOfFile)
        );
    }

    #[test]
    fn test_sequential_reports_deleted_slots() {
        let mut data = data();
        data.delete_where(|r| r.get(0).and_then(Datum::as_int) == Some(3));

        let mut access = MemoryAccess::new(EngineKind::Memory);
        access.rnd_init(&data).unwrap();

        let mut live = 0;
        let mut deleted = 0;
        loop {
            match access.rnd_next(&data) {
                Ok(_) => live += 1,
                Err(AccessError::RecordDeleted) => deleted += 1,
                Err(AccessError::EndOfFile) => break,
                Err(e) => panic!("unexpected {e}"),
            }
        }
        assert_eq!((live, deleted), (4, 2));
    }

    #[test]
    fn test_crashed_and_uninitialized() {
        let mut data = data();
        let mut access = MemoryAccess::new(EngineKind::Memory);
        assert_eq!(access.index_first(&data), Err(AccessError::NotInitialized));
        assert_eq!(access.rnd_next(&data), Err(AccessError::NotInitialized));
        assert_eq!(access.index_init(&data, 4), Err(AccessError::WrongIndex { keyno: 4 }));

        access.index_init(&data, 0).unwrap();
        data.set_crashed(true);
        assert_eq!(access.index_first(&data), Err(AccessError::Crashed));
    }

    #[test]
    fn test_prepare_for_handle_resets() {
        let data = data();
        let mut access = cursor(&data);
        access.index_first(&data).unwrap();
        access.prepare_for_handle();
        assert!(access.is_held_by_handle());
        assert_eq!(access.access_kind(), AccessKind::None);
        assert!(!MemoryAccess::new(EngineKind::Archive).supports_handle_cursor());
    }
}
