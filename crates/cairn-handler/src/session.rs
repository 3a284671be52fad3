//! Sessions.
//!
//! A [`Session`] is one client's view of the handle layer. It owns the
//! handle registry, the metadata locks its handles hold, and the ordinary
//! open-table state of its statements. The two kinds of open tables are
//! kept in separate fields and only meet while a handle is being opened.

use std::sync::Arc;

use cairn_common::config::HandlerConfig;
use cairn_common::error::{CairnError, CairnResult};
use cairn_common::types::{SessionId, TableIdent, TablePattern};
use cairn_table::{
    MdlContext, NeedsRetry, OpenContext, OpenTable, TableCache, TableDef, TableLock, TableRequest,
};
use tracing::{debug, info, warn};

use crate::coordinator::open_for_handle;
use crate::descriptor::{HandleDescriptor, HandleTarget};
use crate::registry::HandleRegistry;
use crate::scan::{ReadCursor, ReadRequest};
use crate::stats::HandlerStats;
use crate::sweep::sweep_registry;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session accepts operations.
    Active,
    /// Session was cleaned up.
    Closed,
}

/// A client session holding named table handles.
#[derive(Debug)]
pub struct Session {
    /// Session ID.
    id: SessionId,
    /// Session state.
    state: SessionState,
    /// Configuration.
    config: HandlerConfig,
    /// Global table cache.
    cache: Arc<TableCache>,
    /// Ordinary open tables and their metadata locks.
    ctx: OpenContext,
    /// Metadata locks held by open handles.
    handler_mdl: MdlContext,
    /// Named handles.
    registry: HandleRegistry,
    /// Lock over the ordinary tables while tables are locked.
    statement_lock: Option<TableLock>,
    /// Counters.
    stats: HandlerStats,
}

impl Session {
    /// Creates a new session.
    pub fn new(id: SessionId, cache: Arc<TableCache>, config: HandlerConfig) -> Self {
        let ctx = OpenContext::new(id, Arc::clone(cache.mdl()));
        let handler_mdl = MdlContext::new(Arc::clone(cache.mdl()), id);
        let registry = HandleRegistry::with_capacity(config.registry_capacity);
        debug!(session = %id, "session created");
        Self {
            id,
            state: SessionState::Active,
            config,
            cache,
            ctx,
            handler_mdl,
            registry,
            statement_lock: None,
            stats: HandlerStats::new(),
        }
    }

    /// Returns the session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Returns the table cache.
    pub fn cache(&self) -> &Arc<TableCache> {
        &self.cache
    }

    /// Returns the handle statistics.
    pub fn stats(&self) -> &HandlerStats {
        &self.stats
    }

    /// Returns the handle registry.
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Returns the descriptor of handle `name`.
    pub fn descriptor(&self, name: &str) -> Option<&HandleDescriptor> {
        self.registry.lookup(name)
    }

    /// Returns true if handle `name` is registered and currently open.
    pub fn is_open(&self, name: &str) -> bool {
        self.registry.lookup(name).is_some_and(HandleDescriptor::is_open)
    }

    /// Returns the ordinary open-table state.
    pub fn ctx(&self) -> &OpenContext {
        &self.ctx
    }

    /// Returns the metadata locks held by handles.
    pub fn handler_mdl(&self) -> &MdlContext {
        &self.handler_mdl
    }

    fn ensure_active(&self) -> CairnResult<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Closed => Err(CairnError::invalid_state("session is closed")),
        }
    }

    fn ensure_not_locked(&self, operation: &str) -> CairnResult<()> {
        if self.ctx.locked_tables_mode() {
            return Err(CairnError::invalid_state(format!(
                "cannot {operation} while tables are locked"
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Handles
    // =========================================================================

    /// Opens a handle named `name` on `target`.
    pub fn open(&mut self, name: &str, target: HandleTarget) -> CairnResult<()> {
        self.ensure_active()?;
        self.begin_statement();
        self.ensure_not_locked("open a handle")?;
        HandleRegistry::validate_name(name)?;

        self.registry
            .register(HandleDescriptor::new(name, target.clone()))?;

        let table = match open_for_handle(
            &self.cache,
            &mut self.ctx,
            &mut self.handler_mdl,
            name,
            &target,
            false,
        ) {
            Ok(table) => table,
            Err(e) => {
                self.registry.remove(name, &self.cache, &mut self.handler_mdl);
                return Err(e);
            }
        };

        match self.registry.lookup_mut(name) {
            Some(desc) => desc.attach(table),
            None => {
                self.discard(table);
                return Err(CairnError::internal("registered handle vanished"));
            }
        }
        self.stats.record_open();
        Ok(())
    }

    fn discard(&mut self, table: OpenTable) {
        let ticket = table.ticket();
        if self.cache.close_table(table) {
            self.cache.broadcast_refresh();
        }
        self.handler_mdl.release_lock(ticket);
    }

    /// Closes handle `name` and forgets it.
    pub fn close(&mut self, name: &str) -> CairnResult<()> {
        self.ensure_active()?;
        self.ensure_not_locked("close a handle")?;
        if !self.registry.remove(name, &self.cache, &mut self.handler_mdl) {
            return Err(CairnError::UnknownHandle {
                name: name.to_string(),
            });
        }
        self.stats.record_closes(1);
        info!(session = %self.id, handle = name, "handle removed");
        Ok(())
    }

    /// Reads from handle `name`.
    ///
    /// A handle closed by a sweep is reopened first. If the table is
    /// invalidated between reopening and locking it, the handle is closed
    /// and the sequence restarts, up to the configured number of attempts.
    pub fn read<'s>(
        &'s mut self,
        name: &str,
        request: ReadRequest<'s>,
    ) -> CairnResult<ReadCursor<'s>> {
        self.ensure_active()?;
        self.begin_statement();
        self.ensure_not_locked("read a handle")?;

        let max_attempts = self.config.max_open_retries.max(1);
        let mut attempts = 0;
        let lock = loop {
            attempts += 1;
            let desc = self
                .registry
                .lookup_mut(name)
                .ok_or_else(|| CairnError::UnknownHandle {
                    name: name.to_string(),
                })?;

            if !desc.is_open() {
                let table = open_for_handle(
                    &self.cache,
                    &mut self.ctx,
                    &mut self.handler_mdl,
                    desc.name(),
                    desc.target(),
                    true,
                )?;
                desc.attach(table);
                self.stats.record_reopen();
            }

            let Some(table) = desc.table() else {
                return Err(CairnError::internal("handle not open after reopen"));
            };
            match self.cache.lock_tables(&mut self.ctx, &[table]) {
                Ok(lock) => break lock,
                Err(NeedsRetry) => {
                    desc.close(&self.cache, &mut self.handler_mdl);
                    self.ctx.set_some_tables_deleted(false);
                    self.stats.record_retry();
                    if attempts >= max_attempts {
                        warn!(session = %self.id, handle = name, attempts, "giving up reopening handle");
                        return Err(CairnError::RetryLimitExceeded {
                            name: name.to_string(),
                            attempts,
                        });
                    }
                    debug!(session = %self.id, handle = name, attempts, "handle invalidated, retrying");
                }
            }
        };

        let desc = self
            .registry
            .lookup_mut(name)
            .ok_or_else(|| CairnError::UnknownHandle {
                name: name.to_string(),
            })?;
        ReadCursor::start(
            desc,
            &mut self.handler_mdl,
            &self.cache,
            &self.stats,
            lock,
            request,
        )
    }

    /// Closes and forgets every handle whose table matches one of
    /// `patterns`. Returns the number removed.
    pub fn close_all_matching(&mut self, patterns: &[TablePattern]) -> usize {
        let removed = self
            .registry
            .remove_matching(patterns, &self.cache, &mut self.handler_mdl);
        if removed > 0 {
            self.stats.record_closes(removed);
            debug!(session = %self.id, removed, "handles removed by pattern");
        }
        removed
    }

    /// Closes, without forgetting, every open handle that must give up its
    /// table. Returns the number closed.
    pub fn sweep_on_invalidation(&mut self) -> usize {
        let closed = sweep_registry(&mut self.registry, &self.cache, &mut self.handler_mdl);
        if closed > 0 {
            self.stats.record_sweep_closes(closed);
            debug!(session = %self.id, closed, "invalidation sweep closed handles");
        }
        closed
    }

    /// Runs the invalidation sweep over the session's open handles. Returns
    /// the number of handles closed.
    ///
    /// Called at the start of every open and read when
    /// [`HandlerConfig::sweep_on_statement`] is set. Every open handle is
    /// checked each time: a conflicting request may be waiting on a lock
    /// that was granted past it without any wait of its own.
    pub fn begin_statement(&mut self) -> usize {
        if !self.config.sweep_on_statement || !self.registry.iter().any(|d| d.is_open()) {
            return 0;
        }
        self.sweep_on_invalidation()
    }

    /// Closes and forgets every handle, closes ordinary tables and releases
    /// every lock. The session cannot be used afterwards.
    pub fn cleanup(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let removed = self.registry.clear(&self.cache, &mut self.handler_mdl);
        self.stats.record_closes(removed);
        self.handler_mdl.release_all();

        self.statement_lock = None;
        self.ctx.set_locked_tables_mode(false);
        self.cache.close_thread_tables(&mut self.ctx);
        self.ctx.mdl_mut().release_all();

        self.state = SessionState::Closed;
        info!(session = %self.id, removed, "session cleaned up");
    }

    // =========================================================================
    // Ordinary Tables
    // =========================================================================

    /// Opens tables for the current statement.
    ///
    /// On failure, tables opened so far stay open until
    /// [`close_statement_tables`](Self::close_statement_tables).
    pub fn open_statement_tables(&mut self, requests: &[TableRequest]) -> CairnResult<usize> {
        self.ensure_active()?;
        self.cache.open_tables(&mut self.ctx, requests)
    }

    /// Closes the current statement's tables.
    ///
    /// Metadata locks are released too unless tables are locked. Returns
    /// the number of tables closed.
    pub fn close_statement_tables(&mut self) -> usize {
        if self.ctx.locked_tables_mode() {
            return 0;
        }
        self.statement_lock = None;
        let closed = self.cache.close_thread_tables(&mut self.ctx);
        self.ctx.mdl_mut().release_all();
        closed
    }

    /// Opens and locks `requests` until [`unlock_tables`](Self::unlock_tables).
    ///
    /// While tables are locked, handles cannot be opened, read or closed.
    pub fn lock_tables(&mut self, requests: &[TableRequest]) -> CairnResult<()> {
        self.ensure_active()?;
        self.ensure_not_locked("lock tables")?;

        let max_attempts = self.config.max_open_retries.max(1);
        let mut attempts = 0;
        let lock = loop {
            attempts += 1;
            if let Err(e) = self.cache.open_tables(&mut self.ctx, requests) {
                self.close_statement_tables();
                return Err(e);
            }

            let tables = std::mem::take(self.ctx.open_tables_mut());
            let refs: Vec<&OpenTable> = tables.iter().collect();
            let result = self.cache.lock_tables(&mut self.ctx, &refs);
            drop(refs);
            *self.ctx.open_tables_mut() = tables;

            match result {
                Ok(lock) => break lock,
                Err(NeedsRetry) => {
                    self.close_statement_tables();
                    self.ctx.set_some_tables_deleted(false);
                    if attempts >= max_attempts {
                        return Err(CairnError::invalid_state(
                            "tables kept being invalidated while locking",
                        ));
                    }
                }
            }
        };

        self.statement_lock = Some(lock);
        self.ctx.set_locked_tables_mode(true);
        debug!(session = %self.id, tables = self.ctx.open_tables().len(), "tables locked");
        Ok(())
    }

    /// Leaves locked-tables mode and closes the locked tables.
    pub fn unlock_tables(&mut self) -> usize {
        self.ctx.set_locked_tables_mode(false);
        self.close_statement_tables()
    }

    // =========================================================================
    // Flush / DDL
    // =========================================================================

    /// Flushes `targets`, or every table when `None`.
    ///
    /// The session's own handles on flushed tables are closed, to reopen on
    /// their next read. With `wait`, blocks until every session has closed
    /// its old instances. Returns the number of tables flushed.
    pub fn flush_tables(&mut self, targets: Option<&[TableIdent]>, wait: bool) -> CairnResult<usize> {
        self.ensure_active()?;
        self.ensure_not_locked("flush tables")?;

        self.close_statement_tables();
        let marked = self.cache.mark_for_reopen(targets);
        self.sweep_on_invalidation();
        if wait {
            self.cache
                .wait_for_old_versions(targets, self.cache.config().flush_wait_timeout())?;
        }
        Ok(marked)
    }

    /// Alters `ident`, first forgetting the session's own handles on it.
    pub fn alter_table(
        &mut self,
        ident: &TableIdent,
        alter: impl FnOnce(&mut TableDef) -> CairnResult<()>,
    ) -> CairnResult<()> {
        self.ensure_active()?;
        self.ensure_not_locked("alter a table")?;
        self.close_all_matching(&[TablePattern::from(ident)]);
        self.close_statement_tables();
        self.cache.alter_table(&mut self.ctx, ident, alter)
    }

    /// Drops `ident`, first forgetting the session's own handles on it.
    pub fn drop_table(&mut self, ident: &TableIdent) -> CairnResult<()> {
        self.ensure_active()?;
        self.ensure_not_locked("drop a table")?;
        self.close_all_matching(&[TablePattern::from(ident)]);
        self.close_statement_tables();
        self.cache.drop_table(&mut self.ctx, ident)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ReadMode;
    use cairn_common::config::CairnConfig;
    use cairn_common::types::{ColumnType, Datum, Row};
    use cairn_table::{ComparisonMode, EngineKind};

    fn t(name: &str) -> TableIdent {
        TableIdent::new("test", name)
    }

    fn cache() -> Arc<TableCache> {
        let cache = Arc::new(TableCache::with_config(&CairnConfig::for_testing()));
        cache
            .create_table(
                TableDef::new(t("t1"))
                    .column("a", ColumnType::Int)
                    .column("b", ColumnType::Text)
                    .index("PRIMARY", vec![0], true),
            )
            .unwrap();
        cache
            .insert_rows(
                &t("t1"),
                (1..=5).map(|i| Row::new(vec![Datum::Int(i), Datum::text(format!("r{i}"))])),
            )
            .unwrap();
        cache
    }

    fn session(cache: &Arc<TableCache>) -> Session {
        Session::new(SessionId::new(1), Arc::clone(cache), HandlerConfig::default())
    }

    fn ints(rows: Vec<Row>) -> Vec<i64> {
        rows.iter().map(|r| r.get(0).unwrap().as_int().unwrap()).collect()
    }

    fn read(session: &mut Session, name: &str, request: ReadRequest<'_>) -> CairnResult<Vec<i64>> {
        let rows: Vec<Row> = session.read(name, request)?.collect::<CairnResult<_>>()?;
        Ok(ints(rows))
    }

    #[test]
    fn test_open_read_close() {
        let cache = cache();
        let mut s = session(&cache);
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();

        let desc = s.descriptor("h1").unwrap();
        assert!(desc.is_open());
        assert_eq!(desc.table_ref().is_some(), desc.lock_ticket().is_some());

        assert_eq!(read(&mut s, "h1", ReadRequest::new(ReadMode::First)).unwrap(), vec![1]);
        assert_eq!(read(&mut s, "h1", ReadRequest::new(ReadMode::Next)).unwrap(), vec![2]);
        assert_eq!(
            read(&mut s, "h1", ReadRequest::new(ReadMode::Next).limit(10)).unwrap(),
            vec![3, 4, 5]
        );
        assert!(read(&mut s, "h1", ReadRequest::new(ReadMode::Next)).unwrap().is_empty());

        s.close("h1").unwrap();
        assert!(s.descriptor("h1").is_none());
        assert_eq!(cache.total_open_instances(), 0);
        assert_eq!(cache.mdl().granted_count(&t("t1")), 0);
    }

    #[test]
    fn test_duplicate_and_unknown_names() {
        let cache = cache();
        let mut s = session(&cache);
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();

        let err = s.open("H1", HandleTarget::new(t("t1"))).unwrap_err();
        assert!(matches!(err, CairnError::AlreadyExists { .. }));
        assert_eq!(cache.open_instances(&t("t1")), 1);

        assert!(matches!(
            s.close("nope").unwrap_err(),
            CairnError::UnknownHandle { .. }
        ));
        assert!(matches!(
            s.read("nope", ReadRequest::new(ReadMode::First)).unwrap_err(),
            CairnError::UnknownHandle { .. }
        ));

        s.close("h1").unwrap();
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();
    }

    #[test]
    fn test_failed_open_leaves_no_entry() {
        let cache = cache();
        let mut s = session(&cache);
        let err = s.open("h1", HandleTarget::new(t("missing"))).unwrap_err();
        assert!(matches!(err, CairnError::OpenFailed { .. }));
        assert!(s.descriptor("h1").is_none());
        assert!(s.handler_mdl().is_empty());
    }

    #[test]
    fn test_index_reads() {
        let cache = cache();
        let mut s = session(&cache);
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();

        let last = ReadRequest::new(ReadMode::Last).index("primary").limit(2);
        assert_eq!(read(&mut s, "h1", last).unwrap(), vec![5, 4]);
        let prev = ReadRequest::new(ReadMode::Prev).index("PRIMARY");
        assert_eq!(read(&mut s, "h1", prev).unwrap(), vec![3]);

        let key = ReadRequest::new(ReadMode::Key(ComparisonMode::KeyOrNext))
            .index("PRIMARY")
            .key([Datum::Int(4)])
            .limit(10);
        assert_eq!(read(&mut s, "h1", key).unwrap(), vec![4, 5]);
        assert_eq!(s.descriptor("h1").unwrap().scan_mode(), Some(ReadMode::Next));
    }

    #[test]
    fn test_read_argument_errors_keep_handle_open() {
        let cache = cache();
        let mut s = session(&cache);
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();

        let err = s.read("h1", ReadRequest::new(ReadMode::Last)).unwrap_err();
        assert!(matches!(err, CairnError::IndexRequired { .. }));

        let err = s
            .read("h1", ReadRequest::new(ReadMode::First).index("nope"))
            .unwrap_err();
        assert!(matches!(err, CairnError::UnknownIndex { .. }));

        let too_many = ReadRequest::new(ReadMode::Key(ComparisonMode::Exact))
            .index("PRIMARY")
            .key([Datum::Int(1), Datum::Int(2)]);
        assert!(matches!(
            s.read("h1", too_many).unwrap_err(),
            CairnError::TooManyKeyParts { max: 1 }
        ));

        let wrong = ReadRequest::new(ReadMode::Key(ComparisonMode::Exact))
            .index("PRIMARY")
            .key([Datum::text("abc")]);
        assert!(matches!(
            s.read("h1", wrong).unwrap_err(),
            CairnError::WrongArguments { .. }
        ));

        assert!(s.is_open("h1"));
    }

    #[test]
    fn test_filter_and_offset() {
        let cache = cache();
        let mut s = session(&cache);
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();

        let odd = ReadRequest::new(ReadMode::First)
            .filter(|row| Ok(row.get(0).and_then(Datum::as_int).is_some_and(|v| v % 2 == 1)))
            .offset(1)
            .limit(10);
        assert_eq!(read(&mut s, "h1", odd).unwrap(), vec![3, 5]);
        assert_eq!(s.stats().rows_sent(), 2);

        let failing = ReadRequest::new(ReadMode::First)
            .filter(|_| Err(CairnError::invalid_argument("bad condition")));
        let mut cursor = s.read("h1", failing).unwrap();
        assert!(matches!(
            cursor.next(),
            Some(Err(CairnError::InvalidArgument { .. }))
        ));
        assert!(cursor.next().is_none());
        drop(cursor);
        assert!(s.is_open("h1"));
    }

    #[test]
    fn test_scan_failure_closes_but_keeps_name() {
        let cache = cache();
        let mut s = session(&cache);
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();

        cache.mark_crashed(&t("t1"), true).unwrap();
        let mut cursor = s.read("h1", ReadRequest::new(ReadMode::First)).unwrap();
        match cursor.next() {
            Some(Err(CairnError::ScanFailed { code, .. })) => assert_eq!(code, 126),
            other => panic!("expected scan failure, got {other:?}"),
        }
        drop(cursor);

        assert!(!s.is_open("h1"));
        assert!(s.descriptor("h1").is_some());
        assert!(s.handler_mdl().is_empty());

        cache.mark_crashed(&t("t1"), false).unwrap();
        assert_eq!(read(&mut s, "h1", ReadRequest::new(ReadMode::First)).unwrap(), vec![1]);
        assert_eq!(s.stats().reopens(), 1);
    }

    #[test]
    fn test_retry_limit() {
        let cache = cache();
        let config = HandlerConfig {
            max_open_retries: 1,
            sweep_on_statement: false,
            ..HandlerConfig::default()
        };
        let mut s = Session::new(SessionId::new(1), Arc::clone(&cache), config);
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();

        cache.mark_for_reopen(None);
        let err = s.read("h1", ReadRequest::new(ReadMode::First)).unwrap_err();
        assert!(matches!(err, CairnError::RetryLimitExceeded { attempts: 1, .. }));
        assert!(!s.is_open("h1"));
        assert!(!s.ctx().some_tables_deleted());
        assert_eq!(s.stats().retries(), 1);

        assert_eq!(read(&mut s, "h1", ReadRequest::new(ReadMode::First)).unwrap(), vec![1]);
    }

    #[test]
    fn test_retry_recovers() {
        let cache = cache();
        let config = HandlerConfig {
            max_open_retries: 2,
            sweep_on_statement: false,
            ..HandlerConfig::default()
        };
        let mut s = Session::new(SessionId::new(1), Arc::clone(&cache), config);
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();

        cache.mark_for_reopen(None);
        assert_eq!(read(&mut s, "h1", ReadRequest::new(ReadMode::First)).unwrap(), vec![1]);
        assert_eq!(s.stats().retries(), 1);
        assert_eq!(s.stats().reopens(), 1);
    }

    #[test]
    fn test_locked_tables_mode() {
        let cache = cache();
        let mut s = session(&cache);
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();
        s.lock_tables(&[TableRequest::new(t("t1"))]).unwrap();

        assert!(matches!(
            s.open("h2", HandleTarget::new(t("t1"))).unwrap_err(),
            CairnError::InvalidState { .. }
        ));
        assert!(matches!(
            s.read("h1", ReadRequest::new(ReadMode::First)).unwrap_err(),
            CairnError::InvalidState { .. }
        ));
        assert!(matches!(s.close("h1").unwrap_err(), CairnError::InvalidState { .. }));

        assert_eq!(s.unlock_tables(), 1);
        s.close("h1").unwrap();
    }

    #[test]
    fn test_unsupported_engine() {
        let cache = cache();
        cache
            .create_table(
                TableDef::new(t("log"))
                    .column("a", ColumnType::Int)
                    .engine(EngineKind::Archive),
            )
            .unwrap();
        let mut s = session(&cache);
        let err = s.open("h1", HandleTarget::new(t("log"))).unwrap_err();
        assert!(matches!(err, CairnError::UnsupportedForHandle { .. }));
        assert_eq!(cache.open_instances(&t("log")), 0);
        assert_eq!(cache.mdl().granted_count(&t("log")), 0);
    }

    #[test]
    fn test_cleanup_releases_everything() {
        let cache = cache();
        let mut s = session(&cache);
        s.open("h1", HandleTarget::new(t("t1"))).unwrap();
        s.open("h2", HandleTarget::new(t("t1"))).unwrap();
        s.open_statement_tables(&[TableRequest::new(t("t1"))]).unwrap();

        s.cleanup();
        assert_eq!(s.state(), SessionState::Closed);
        assert!(s.registry().is_empty());
        assert_eq!(cache.total_open_instances(), 0);
        assert_eq!(cache.mdl().granted_count(&t("t1")), 0);
        assert!(matches!(
            s.open("h3", HandleTarget::new(t("t1"))).unwrap_err(),
            CairnError::InvalidState { .. }
        ));
    }
}
