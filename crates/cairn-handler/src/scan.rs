//! Scan engine.
//!
//! A read call names a [`ReadMode`]. Together with whether the handle's
//! access method is already initialized for the requested index, the mode
//! determines the [`EffectiveAction`] performed for the first row and the
//! mode every following row continues with. The mapping is a plain table in
//! [`transition`], independent of any table state.
//!
//! ```text
//! requested   initialized   action         next mode
//! NEXT        yes           Forward        NEXT
//! NEXT        no            First          NEXT
//! FIRST       -             First          NEXT
//! PREV        yes           Backward       PREV
//! PREV        no            Last           PREV
//! LAST        -             Last           PREV
//! NEXT_SAME   -             ForwardSame    NEXT_SAME
//! KEY(c)      -             Lookup(c)      next_mode_after_lookup(c)
//! ```

use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;

use cairn_common::error::{CairnError, CairnResult};
use cairn_common::types::{Datum, Row};
use cairn_table::{
    AccessError, AccessKind, ColumnDef, ComparisonMode, CursorState, KeyEncoder, MdlContext,
    TableCache, TableDef, TableLock,
};
use tracing::{debug, error, trace};

use crate::descriptor::HandleDescriptor;
use crate::stats::HandlerStats;

/// Read mode requested by a read call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Restart at the first row.
    First,
    /// Continue forward, or start at the first row.
    Next,
    /// Continue backward, or start at the last row.
    Prev,
    /// Restart at the last row.
    Last,
    /// Position by key lookup.
    Key(ComparisonMode),
    /// Continue within the run of rows matching the last looked-up key.
    NextSame,
}

impl ReadMode {
    /// Returns true if the mode can only be served by an index.
    pub fn requires_index(&self) -> bool {
        !matches!(self, ReadMode::First | ReadMode::Next)
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadMode::First => f.write_str("FIRST"),
            ReadMode::Next => f.write_str("NEXT"),
            ReadMode::Prev => f.write_str("PREV"),
            ReadMode::Last => f.write_str("LAST"),
            ReadMode::Key(cmp) => write!(f, "KEY {cmp}"),
            ReadMode::NextSame => f.write_str("NEXT_SAME"),
        }
    }
}

/// Concrete cursor operation a read performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectiveAction {
    /// Initialize access and position on the first row.
    First,
    /// Initialize access and position on the last row.
    Last,
    /// Advance one row.
    Forward,
    /// Step back one row.
    Backward,
    /// Advance one row if it still matches the retained key.
    ForwardSame,
    /// Initialize indexed access and position by key.
    Lookup(ComparisonMode),
}

/// Returns the mode a scan continues with after a key lookup.
pub fn next_mode_after_lookup(cmp: ComparisonMode) -> ReadMode {
    match cmp {
        ComparisonMode::Exact => ReadMode::NextSame,
        ComparisonMode::KeyOrNext | ComparisonMode::AfterKey | ComparisonMode::Prefix => {
            ReadMode::Next
        }
        ComparisonMode::KeyOrPrev
        | ComparisonMode::BeforeKey
        | ComparisonMode::PrefixLast
        | ComparisonMode::PrefixLastOrPrev => ReadMode::Prev,
    }
}

/// Returns the action for `requested` and the mode to continue with.
pub fn transition(requested: ReadMode, initialized: bool) -> (EffectiveAction, ReadMode) {
    match requested {
        ReadMode::Next if initialized => (EffectiveAction::Forward, ReadMode::Next),
        ReadMode::Next | ReadMode::First => (EffectiveAction::First, ReadMode::Next),
        ReadMode::Prev if initialized => (EffectiveAction::Backward, ReadMode::Prev),
        ReadMode::Prev | ReadMode::Last => (EffectiveAction::Last, ReadMode::Prev),
        ReadMode::NextSame => (EffectiveAction::ForwardSame, ReadMode::NextSame),
        ReadMode::Key(cmp) => (EffectiveAction::Lookup(cmp), next_mode_after_lookup(cmp)),
    }
}

type RowPredicate<'a> = Box<dyn FnMut(&Row) -> CairnResult<bool> + 'a>;

/// Arguments of one read call.
pub struct ReadRequest<'a> {
    mode: ReadMode,
    index: Option<String>,
    key: Vec<Datum>,
    predicate: Option<RowPredicate<'a>>,
    row_limit: usize,
    offset: usize,
}

impl<'a> ReadRequest<'a> {
    /// Creates a request for one row in `mode` over a sequential scan.
    pub fn new(mode: ReadMode) -> Self {
        Self {
            mode,
            index: None,
            key: Vec::new(),
            predicate: None,
            row_limit: 1,
            offset: 0,
        }
    }

    /// Reads through the named index.
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    /// Sets the key values for a key lookup, one per leading key part.
    pub fn key(mut self, values: impl IntoIterator<Item = Datum>) -> Self {
        self.key = values.into_iter().collect();
        self
    }

    /// Sets the maximum number of rows returned.
    pub fn limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// Skips the first `offset` qualifying rows.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Only returns rows for which `predicate` holds.
    pub fn filter(mut self, predicate: impl FnMut(&Row) -> CairnResult<bool> + 'a) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Returns the requested mode.
    pub fn mode(&self) -> ReadMode {
        self.mode
    }
}

impl fmt::Debug for ReadRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadRequest")
            .field("mode", &self.mode)
            .field("index", &self.index)
            .field("key", &self.key)
            .field("filtered", &self.predicate.is_some())
            .field("row_limit", &self.row_limit)
            .field("offset", &self.offset)
            .finish()
    }
}

/// Rows produced by one read call.
///
/// The cursor holds the table lock until it is exhausted or dropped. It is
/// finite and cannot be restarted; read again for more rows.
pub struct ReadCursor<'s> {
    desc: &'s mut HandleDescriptor,
    handler_mdl: &'s mut MdlContext,
    cache: &'s TableCache,
    stats: &'s HandlerStats,
    lock: Option<TableLock>,
    def: Arc<TableDef>,
    target: AccessKind,
    mode: ReadMode,
    predicate: Option<RowPredicate<'s>>,
    skip: usize,
    limit: usize,
    emitted: usize,
    done: bool,
}

impl<'s> ReadCursor<'s> {
    /// Validates `request` against the open descriptor and prepares the scan.
    ///
    /// Argument errors leave the descriptor open and untouched.
    pub(crate) fn start(
        desc: &'s mut HandleDescriptor,
        handler_mdl: &'s mut MdlContext,
        cache: &'s TableCache,
        stats: &'s HandlerStats,
        lock: TableLock,
        request: ReadRequest<'s>,
    ) -> CairnResult<Self> {
        let def = match desc.table() {
            Some(table) => Arc::clone(table.def()),
            None => return Err(CairnError::internal("read on a closed handle")),
        };

        let target = match &request.index {
            Some(name) => match def.find_index(name) {
                Some(keyno) => AccessKind::Index(keyno),
                None => {
                    return Err(CairnError::UnknownIndex {
                        index: name.clone(),
                        table: def.ident.table.clone(),
                    })
                }
            },
            None if request.mode.requires_index() => {
                return Err(CairnError::IndexRequired {
                    mode: request.mode.to_string(),
                })
            }
            None => AccessKind::Sequential,
        };

        match (request.mode, target) {
            (ReadMode::Key(_), AccessKind::Index(keyno)) => {
                let encoder = KeyEncoder::new(&def, keyno)
                    .ok_or_else(|| CairnError::internal("resolved index vanished"))?;
                let key = encoder.encode_values(&request.key)?;
                desc.scan_mut().key_buffer = Some(key);
            }
            (ReadMode::First | ReadMode::Last, _) => desc.scan_mut().key_buffer = None,
            _ => {}
        }

        debug!(
            handle = desc.name(),
            mode = %request.mode,
            index = request.index.as_deref().unwrap_or("<heap>"),
            limit = request.row_limit,
            offset = request.offset,
            "handle read"
        );

        Ok(Self {
            desc,
            handler_mdl,
            cache,
            stats,
            lock: Some(lock),
            def,
            target,
            mode: request.mode,
            predicate: request.predicate,
            skip: request.offset,
            limit: request.row_limit,
            emitted: 0,
            done: false,
        })
    }

    /// Returns the columns of every row produced.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.def.columns
    }

    /// Returns the number of rows produced so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Returns true if the access method is set up for this scan's target
    /// and has been positioned.
    fn initialized(&self) -> bool {
        self.desc.table().is_some_and(|table| {
            let access = table.access();
            access.access_kind() == self.target
                && access.cursor_state() != CursorState::Uninitialized
        })
    }

    fn fetch(&mut self, action: EffectiveAction) -> Result<Row, AccessError> {
        let key = self.desc.key_buffer().cloned();
        let target = self.target;
        let Some(table) = self.desc.table_mut() else {
            return Err(AccessError::NotInitialized);
        };

        table.with_access(|access, data| match (action, target) {
            (EffectiveAction::First, AccessKind::Index(keyno)) => {
                access.index_init(data, keyno)?;
                access.index_first(data)
            }
            (EffectiveAction::First, AccessKind::Sequential) => {
                access.rnd_init(data)?;
                access.rnd_next(data)
            }
            (EffectiveAction::Last, AccessKind::Index(keyno)) => {
                access.index_init(data, keyno)?;
                access.index_last(data)
            }
            (EffectiveAction::Forward, AccessKind::Index(_)) => access.index_next(data),
            (EffectiveAction::Forward, AccessKind::Sequential) => access.rnd_next(data),
            (EffectiveAction::Backward, AccessKind::Index(_)) => access.index_prev(data),
            (EffectiveAction::ForwardSame, AccessKind::Index(_)) => match &key {
                Some(key) => access.index_next_same(data, key),
                None => Err(AccessError::EndOfFile),
            },
            (EffectiveAction::Lookup(cmp), AccessKind::Index(keyno)) => match &key {
                Some(key) => {
                    access.index_init(data, keyno)?;
                    access.index_read(data, key, cmp)
                }
                None => Err(AccessError::NotInitialized),
            },
            _ => Err(AccessError::NotInitialized),
        })
    }

    fn finish(&mut self) {
        self.done = true;
        self.lock = None;
    }

    /// Ends the scan on an access failure and closes the descriptor.
    fn fail(&mut self, err: AccessError) -> CairnError {
        self.finish();
        let table = self.desc.target().table.to_string();
        error!(
            handle = self.desc.name(),
            table = %table,
            code = err.code(),
            error = %err,
            "handle read failed"
        );
        self.desc.close(self.cache, self.handler_mdl);
        CairnError::ScanFailed {
            table,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl Iterator for ReadCursor<'_> {
    type Item = CairnResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if self.emitted >= self.limit {
                self.finish();
                return None;
            }

            let initialized = self.initialized();
            let (action, next_mode) = transition(self.mode, initialized);
            if action == EffectiveAction::ForwardSame && !initialized {
                self.finish();
                return None;
            }

            let result = self.fetch(action);
            self.mode = next_mode;
            self.desc.scan_mut().mode = Some(next_mode);

            let row = match result {
                Ok(row) => row,
                Err(e) if e.is_end_of_data() => {
                    self.finish();
                    return None;
                }
                Err(AccessError::RecordDeleted) => {
                    trace!(handle = self.desc.name(), "skipping deleted record");
                    continue;
                }
                Err(e) => return Some(Err(self.fail(e))),
            };

            if let Some(predicate) = self.predicate.as_mut() {
                match predicate(&row) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        self.finish();
                        return Some(Err(e));
                    }
                }
            }

            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }

            self.emitted += 1;
            self.stats.record_row_sent();
            return Some(Ok(row));
        }
    }
}

impl FusedIterator for ReadCursor<'_> {}

impl fmt::Debug for ReadCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCursor")
            .field("handle", &self.desc.name())
            .field("mode", &self.mode)
            .field("target", &self.target)
            .field("emitted", &self.emitted)
            .field("limit", &self.limit)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use EffectiveAction as A;

        assert_eq!(transition(ReadMode::Next, true), (A::Forward, ReadMode::Next));
        assert_eq!(transition(ReadMode::Next, false), (A::First, ReadMode::Next));
        assert_eq!(transition(ReadMode::First, true), (A::First, ReadMode::Next));
        assert_eq!(transition(ReadMode::First, false), (A::First, ReadMode::Next));
        assert_eq!(transition(ReadMode::Prev, true), (A::Backward, ReadMode::Prev));
        assert_eq!(transition(ReadMode::Prev, false), (A::Last, ReadMode::Prev));
        assert_eq!(transition(ReadMode::Last, true), (A::Last, ReadMode::Prev));
        assert_eq!(transition(ReadMode::Last, false), (A::Last, ReadMode::Prev));
        for initialized in [true, false] {
            assert_eq!(
                transition(ReadMode::NextSame, initialized),
                (A::ForwardSame, ReadMode::NextSame)
            );
        }
    }

    #[test]
    fn test_lookup_next_modes() {
        let expected = [
            (ComparisonMode::Exact, ReadMode::NextSame),
            (ComparisonMode::KeyOrNext, ReadMode::Next),
            (ComparisonMode::KeyOrPrev, ReadMode::Prev),
            (ComparisonMode::AfterKey, ReadMode::Next),
            (ComparisonMode::BeforeKey, ReadMode::Prev),
            (ComparisonMode::Prefix, ReadMode::Next),
            (ComparisonMode::PrefixLast, ReadMode::Prev),
            (ComparisonMode::PrefixLastOrPrev, ReadMode::Prev),
        ];
        for (cmp, next) in expected {
            assert_eq!(next_mode_after_lookup(cmp), next, "{cmp}");
            for initialized in [true, false] {
                assert_eq!(
                    transition(ReadMode::Key(cmp), initialized),
                    (EffectiveAction::Lookup(cmp), next)
                );
            }
        }
    }

    #[test]
    fn test_requires_index() {
        assert!(!ReadMode::First.requires_index());
        assert!(!ReadMode::Next.requires_index());
        assert!(ReadMode::Prev.requires_index());
        assert!(ReadMode::Last.requires_index());
        assert!(ReadMode::NextSame.requires_index());
        assert!(ReadMode::Key(ComparisonMode::Exact).requires_index());
    }

    #[test]
    fn test_request_builder() {
        let request = ReadRequest::new(ReadMode::Key(ComparisonMode::Exact))
            .index("PRIMARY")
            .key([Datum::Int(3)])
            .limit(5)
            .offset(2)
            .filter(|_| Ok(true));
        assert_eq!(request.mode(), ReadMode::Key(ComparisonMode::Exact));
        let debug = format!("{request:?}");
        assert!(debug.contains("PRIMARY"));
        assert!(debug.contains("filtered: true"));
    }
}
