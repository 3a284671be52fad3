//! Global table cache.
//!
//! The cache owns one [`TableShare`] per table and hands out [`OpenTable`]
//! instances to sessions. Each share carries a version. Flushes and schema
//! changes advance it, and instances opened at an older version must be
//! closed and reopened before they are locked again.
//!
//! # Versions
//!
//! ```text
//!  open (v3) ──► lock ok ──► ... ──► FLUSH (share now v4)
//!                                        │
//!                                        ▼
//!                            lock ──► NeedsRetry
//!                            close (old version) ──► broadcast refresh
//! ```
//!
//! Waiters for old instances to drain park on one condition variable that
//! is broadcast whenever an old instance closes.

mod context;
mod table;

pub use context::{OpenContext, TableRequest};
pub use table::{NeedsRetry, OpenTable, TableLock, TableShare};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cairn_common::config::{CairnConfig, TableCacheConfig};
use cairn_common::error::{CairnError, CairnResult, OpenFailure};
use cairn_common::types::{InstanceId, Row, TableIdent};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace};

use crate::access::MemoryAccess;
use crate::catalog::{TableDef, TableKind};
use crate::mdl::{MdlMode, MetadataLockManager};
use crate::storage::TableData;

/// Statistics about the table cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Instances opened.
    pub opens: AtomicU64,
    /// Instances closed.
    pub closes: AtomicU64,
    /// Flushes performed.
    pub flushes: AtomicU64,
    /// Refresh broadcasts sent.
    pub refresh_broadcasts: AtomicU64,
    /// Lock attempts that found an invalidated table.
    pub lock_retries: AtomicU64,
}

impl CacheStats {
    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Returns the number of instances opened.
    pub fn opens(&self) -> u64 {
        self.opens.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of instances closed.
    pub fn closes(&self) -> u64 {
        self.closes.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of refresh broadcasts.
    pub fn refresh_broadcasts(&self) -> u64 {
        self.refresh_broadcasts.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of lock attempts that needed a retry.
    pub fn lock_retries(&self) -> u64 {
        self.lock_retries.load(AtomicOrdering::Relaxed)
    }
}

#[derive(Debug)]
struct ShareEntry {
    share: Arc<TableShare>,
    version: u64,
    /// Open instance count per version they were opened at.
    instances: HashMap<u64, usize>,
}

impl ShareEntry {
    fn old_instances(&self) -> usize {
        self.instances
            .iter()
            .filter(|(&v, _)| v != self.version)
            .map(|(_, &n)| n)
            .sum()
    }

    fn total_instances(&self) -> usize {
        self.instances.values().sum()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    shares: HashMap<TableIdent, ShareEntry>,
    refresh_version: u64,
    open_instances: usize,
}

impl CacheState {
    fn is_stale(&self, table: &OpenTable) -> bool {
        self.shares.get(table.ident()).map_or(true, |entry| {
            entry.version != table.version() || !Arc::ptr_eq(&entry.share, table.share())
        })
    }
}

/// The process-wide table cache.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use cairn_common::config::CairnConfig;
/// use cairn_common::types::{ColumnType, SessionId, TableIdent};
/// use cairn_table::cache::{OpenContext, TableCache, TableRequest};
/// use cairn_table::catalog::TableDef;
///
/// let cache = TableCache::with_config(&CairnConfig::default());
/// let t1 = TableIdent::new("test", "t1");
/// cache.create_table(TableDef::new(t1.clone()).column("a", ColumnType::Int)).unwrap();
///
/// let mut ctx = OpenContext::new(SessionId::new(1), Arc::clone(cache.mdl()));
/// cache.open_tables(&mut ctx, &[TableRequest::new(t1)]).unwrap();
/// assert_eq!(ctx.open_tables().len(), 1);
///
/// cache.close_thread_tables(&mut ctx);
/// ctx.mdl_mut().release_all();
/// ```
#[derive(Debug)]
pub struct TableCache {
    state: Mutex<CacheState>,
    /// Broadcast when an old-version instance closes.
    refresh: Condvar,
    mdl: Arc<MetadataLockManager>,
    config: TableCacheConfig,
    next_instance: AtomicU64,
    stats: CacheStats,
}

impl TableCache {
    /// Creates a table cache sharing `mdl`.
    pub fn new(config: TableCacheConfig, mdl: Arc<MetadataLockManager>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                refresh_version: 1,
                ..CacheState::default()
            }),
            refresh: Condvar::new(),
            mdl,
            config,
            next_instance: AtomicU64::new(1),
            stats: CacheStats::default(),
        }
    }

    /// Creates a table cache and its lock manager from `config`.
    pub fn with_config(config: &CairnConfig) -> Self {
        let mdl = Arc::new(MetadataLockManager::new(config.lock.clone()));
        Self::new(config.table_cache.clone(), mdl)
    }

    /// Returns the metadata lock manager.
    pub fn mdl(&self) -> &Arc<MetadataLockManager> {
        &self.mdl
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TableCacheConfig {
        &self.config
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Returns the current global refresh version.
    pub fn refresh_version(&self) -> u64 {
        self.state.lock().refresh_version
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Creates a table.
    pub fn create_table(&self, def: TableDef) -> CairnResult<()> {
        def.validate()?;
        let mut state = self.state.lock();
        if state.shares.contains_key(&def.ident) {
            return Err(CairnError::TableExists {
                table: def.ident.to_string(),
            });
        }

        let ident = def.ident.clone();
        let def = Arc::new(def);
        let data = TableData::new(Arc::clone(&def));
        let version = state.refresh_version;
        state.shares.insert(
            ident.clone(),
            ShareEntry {
                share: Arc::new(TableShare::new(def, data)),
                version,
                instances: HashMap::new(),
            },
        );
        info!(table = %ident, "table created");
        Ok(())
    }

    /// Returns the definition of `ident`.
    pub fn table_def(&self, ident: &TableIdent) -> Option<Arc<TableDef>> {
        let state = self.state.lock();
        state
            .shares
            .get(ident)
            .map(|entry| Arc::clone(entry.share.def()))
    }

    /// Inserts rows into `ident`, returning how many were inserted.
    pub fn insert_rows(
        &self,
        ident: &TableIdent,
        rows: impl IntoIterator<Item = Row>,
    ) -> CairnResult<usize> {
        let share = self.current_share(ident)?;
        let mut data = share.data().write();
        let mut inserted = 0;
        for row in rows {
            data.insert(row)?;
            inserted += 1;
        }
        trace!(table = %ident, inserted, "rows inserted");
        Ok(inserted)
    }

    /// Deletes rows of `ident` matching `predicate`.
    pub fn delete_rows(
        &self,
        ident: &TableIdent,
        predicate: impl FnMut(&Row) -> bool,
    ) -> CairnResult<usize> {
        let share = self.current_share(ident)?;
        let deleted = share.data().write().delete_where(predicate);
        trace!(table = %ident, deleted, "rows deleted");
        Ok(deleted)
    }

    /// Marks the contents of `ident` crashed, or repaired.
    ///
    /// Crashed tables refuse new opens and fail reads on open instances.
    pub fn mark_crashed(&self, ident: &TableIdent, crashed: bool) -> CairnResult<()> {
        let share = self.current_share(ident)?;
        share.data().write().set_crashed(crashed);
        info!(table = %ident, crashed, "table crash flag changed");
        Ok(())
    }

    fn current_share(&self, ident: &TableIdent) -> CairnResult<Arc<TableShare>> {
        let state = self.state.lock();
        state
            .shares
            .get(ident)
            .map(|entry| Arc::clone(&entry.share))
            .ok_or_else(|| CairnError::open_failed(ident, OpenFailure::NoSuchTable))
    }

    // =========================================================================
    // Open / Close
    // =========================================================================

    /// Opens the requested tables, appending instances to `ctx`.
    ///
    /// Opening a merge table also opens each of its children, so the
    /// number of instances appended can exceed the number of requests.
    /// Returns that number. On failure, instances already appended stay in
    /// `ctx` for the caller to close.
    pub fn open_tables(&self, ctx: &mut OpenContext, requests: &[TableRequest]) -> CairnResult<usize> {
        let mut queue: VecDeque<TableRequest> = requests.iter().cloned().collect();
        let mut opened = 0;

        while let Some(request) = queue.pop_front() {
            let table = self.open_one(ctx, &request)?;
            if let TableKind::Merge { children } = &table.def().kind {
                queue.extend(children.iter().cloned().map(TableRequest::new));
            }
            ctx.open_tables_mut().push(table);
            opened += 1;
        }

        Ok(opened)
    }

    fn open_one(&self, ctx: &mut OpenContext, request: &TableRequest) -> CairnResult<OpenTable> {
        let ident = &request.ident;
        let ticket = ctx
            .mdl_mut()
            .acquire(ident, request.mdl_mode)
            .map_err(|e| match e {
                CairnError::LockTimeout { waited_ms, .. } => {
                    CairnError::open_failed(ident, OpenFailure::LockTimeout { waited_ms })
                }
                other => other,
            })?;

        let result = {
            let mut state = self.state.lock();
            self.admit(&mut state, request)
        };

        match result {
            Ok((share, version)) => {
                let id = InstanceId::new(self.next_instance.fetch_add(1, AtomicOrdering::Relaxed));
                let access = Box::new(MemoryAccess::new(share.def().engine));
                CacheStats::record(&self.stats.opens);
                debug!(session = %ctx.session_id(), table = %ident, instance = %id, version, "table opened");
                Ok(OpenTable::new(id, share, version, ticket, access))
            }
            Err(e) => {
                ctx.mdl_mut().release_lock(ticket);
                Err(e)
            }
        }
    }

    /// Checks a request against the share and registers the new instance.
    fn admit(
        &self,
        state: &mut CacheState,
        request: &TableRequest,
    ) -> CairnResult<(Arc<TableShare>, u64)> {
        let ident = &request.ident;
        let limit = self.config.max_open_instances;
        if state.open_instances >= limit {
            return Err(CairnError::open_failed(ident, OpenFailure::TooManyOpen { limit }));
        }

        let entry = state
            .shares
            .get_mut(ident)
            .ok_or_else(|| CairnError::open_failed(ident, OpenFailure::NoSuchTable))?;

        let def = entry.share.def();
        if request.base_table_only
            && matches!(def.kind, TableKind::View | TableKind::Temporary)
        {
            return Err(CairnError::open_failed(
                ident,
                OpenFailure::WrongObjectType {
                    actual: def.kind.to_string(),
                },
            ));
        }
        if entry.share.data().read().is_crashed() {
            return Err(CairnError::open_failed(
                ident,
                OpenFailure::EngineRefused {
                    message: "table is marked as crashed and should be repaired".to_string(),
                },
            ));
        }

        *entry.instances.entry(entry.version).or_insert(0) += 1;
        let admitted = (Arc::clone(&entry.share), entry.version);
        state.open_instances += 1;
        Ok(admitted)
    }

    /// Closes one instance.
    ///
    /// Returns true if the instance was opened at an older version than the
    /// share's current one, in which case the caller should
    /// [`broadcast_refresh`](Self::broadcast_refresh). The metadata lock
    /// ticket is not released here.
    pub fn close_table(&self, mut table: OpenTable) -> bool {
        table.access_mut().end_access();

        let mut state = self.state.lock();
        state.open_instances = state.open_instances.saturating_sub(1);
        let stale = state.is_stale(&table);
        if let Some(entry) = state.shares.get_mut(table.ident()) {
            if let Some(count) = entry.instances.get_mut(&table.version()) {
                *count -= 1;
                if *count == 0 {
                    entry.instances.remove(&table.version());
                }
            }
        }
        drop(state);

        CacheStats::record(&self.stats.closes);
        debug!(table = %table.ident(), instance = %table.id(), stale, "table closed");
        stale
    }

    /// Closes every instance in `ctx`'s open table list.
    ///
    /// Broadcasts a refresh if any of them was old. Metadata locks stay
    /// held. Returns the number of instances closed.
    pub fn close_thread_tables(&self, ctx: &mut OpenContext) -> usize {
        let tables = std::mem::take(ctx.open_tables_mut());
        let closed = tables.len();
        let mut any_stale = false;
        for table in tables {
            any_stale |= self.close_table(table);
        }
        if any_stale {
            self.broadcast_refresh();
        }
        closed
    }

    /// Wakes every waiter for old instances to drain.
    pub fn broadcast_refresh(&self) {
        CacheStats::record(&self.stats.refresh_broadcasts);
        self.refresh.notify_all();
    }

    /// Returns true if `table` was opened at a version that is no longer
    /// current, or its table no longer exists.
    pub fn needs_reopen(&self, table: &OpenTable) -> bool {
        self.state.lock().is_stale(table)
    }

    /// Locks open instances for a read.
    ///
    /// If any instance needs a reopen, sets `ctx`'s invalidated-table flag
    /// and fails with [`NeedsRetry`].
    pub fn lock_tables(
        &self,
        ctx: &mut OpenContext,
        tables: &[&OpenTable],
    ) -> Result<TableLock, NeedsRetry> {
        let state = self.state.lock();
        if let Some(stale) = tables.iter().find(|t| state.is_stale(t)) {
            drop(state);
            ctx.set_some_tables_deleted(true);
            CacheStats::record(&self.stats.lock_retries);
            debug!(session = %ctx.session_id(), table = %stale.ident(), "lock found invalidated table");
            return Err(NeedsRetry);
        }
        Ok(TableLock::new(
            tables.iter().map(|t| Arc::clone(t.share())).collect(),
        ))
    }

    /// Returns the number of open instances of `ident`.
    pub fn open_instances(&self, ident: &TableIdent) -> usize {
        self.state
            .lock()
            .shares
            .get(ident)
            .map_or(0, ShareEntry::total_instances)
    }

    /// Returns the number of open instances across all tables.
    pub fn total_open_instances(&self) -> usize {
        self.state.lock().open_instances
    }

    // =========================================================================
    // Flush / DDL
    // =========================================================================

    /// Advances the version of the targeted shares, or of every share when
    /// `targets` is `None`. Returns the number of shares marked.
    pub fn mark_for_reopen(&self, targets: Option<&[TableIdent]>) -> usize {
        let mut state = self.state.lock();
        state.refresh_version += 1;
        let version = state.refresh_version;

        let mut marked = 0;
        for (ident, entry) in state.shares.iter_mut() {
            if targets.map_or(true, |t| t.contains(ident)) {
                entry.version = version;
                marked += 1;
            }
        }
        drop(state);

        CacheStats::record(&self.stats.flushes);
        info!(marked, version, "tables flushed");
        self.refresh.notify_all();
        marked
    }

    /// Waits until no instance of the targeted tables is open at an old
    /// version.
    pub fn wait_for_old_versions(
        &self,
        targets: Option<&[TableIdent]>,
        timeout: Duration,
    ) -> CairnResult<()> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut state = self.state.lock();
        loop {
            let old: usize = state
                .shares
                .iter()
                .filter(|(ident, _)| targets.map_or(true, |t| t.contains(ident)))
                .map(|(_, entry)| entry.old_instances())
                .sum();
            if old == 0 {
                return Ok(());
            }

            trace!(old, "waiting for old table instances to close");
            if self.refresh.wait_until(&mut state, deadline).timed_out() {
                return Err(CairnError::LockTimeout {
                    resource: "table cache flush".to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
        }
    }

    /// Flushes the targeted tables, or all tables when `targets` is `None`.
    ///
    /// With `wait`, blocks until every old instance is closed.
    pub fn flush_tables(&self, targets: Option<&[TableIdent]>, wait: bool) -> CairnResult<usize> {
        let marked = self.mark_for_reopen(targets);
        if wait {
            self.wait_for_old_versions(targets, self.config.flush_wait_timeout())?;
        }
        Ok(marked)
    }

    /// Changes the definition of `ident` under an exclusive metadata lock.
    ///
    /// Existing rows are carried over to the new definition. Open instances
    /// elsewhere must be closed first; the lock waits for that.
    pub fn alter_table(
        &self,
        ctx: &mut OpenContext,
        ident: &TableIdent,
        alter: impl FnOnce(&mut TableDef) -> CairnResult<()>,
    ) -> CairnResult<()> {
        let ticket = ctx.mdl_mut().acquire(ident, MdlMode::Exclusive)?;
        let result = self.replace_definition(ident, alter);
        ctx.mdl_mut().release_lock(ticket);
        result?;

        self.broadcast_refresh();
        info!(table = %ident, "table altered");
        Ok(())
    }

    fn replace_definition(
        &self,
        ident: &TableIdent,
        alter: impl FnOnce(&mut TableDef) -> CairnResult<()>,
    ) -> CairnResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .shares
            .get(ident)
            .ok_or_else(|| CairnError::open_failed(ident, OpenFailure::NoSuchTable))?;

        let mut def = TableDef::clone(entry.share.def());
        alter(&mut def)?;
        def.ident = ident.clone();
        def.validate()?;

        let def = Arc::new(def);
        let rows: Vec<Row> = entry.share.data().read().rows().cloned().collect();
        let data = TableData::rebuild(Arc::clone(&def), rows)?;

        state.refresh_version += 1;
        let version = state.refresh_version;
        if let Some(entry) = state.shares.get_mut(ident) {
            entry.share = Arc::new(TableShare::new(def, data));
            entry.version = version;
        }
        Ok(())
    }

    /// Drops `ident` under an exclusive metadata lock.
    pub fn drop_table(&self, ctx: &mut OpenContext, ident: &TableIdent) -> CairnResult<()> {
        let ticket = ctx.mdl_mut().acquire(ident, MdlMode::Exclusive)?;
        let removed = {
            let mut state = self.state.lock();
            state.refresh_version += 1;
            state.shares.remove(ident)
        };
        ctx.mdl_mut().release_lock(ticket);

        if removed.is_none() {
            return Err(CairnError::open_failed(ident, OpenFailure::NoSuchTable));
        }
        self.broadcast_refresh();
        info!(table = %ident, "table dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EngineKind;
    use cairn_common::types::{ColumnType, Datum, SessionId};
    use std::thread;

    fn t(name: &str) -> TableIdent {
        TableIdent::new("test", name)
    }

    fn cache() -> Arc<TableCache> {
        let cache = Arc::new(TableCache::with_config(&CairnConfig::for_testing()));
        cache
            .create_table(
                TableDef::new(t("t1"))
                    .column("a", ColumnType::Int)
                    .index("PRIMARY", vec![0], true),
            )
            .unwrap();
        cache
            .insert_rows(&t("t1"), (1..=3).map(|i| Row::new(vec![Datum::Int(i)])))
            .unwrap();
        cache
    }

    fn ctx(cache: &TableCache, id: u64) -> OpenContext {
        OpenContext::new(SessionId::new(id), Arc::clone(cache.mdl()))
    }

    #[test]
    fn test_open_and_close() {
        let cache = cache();
        let mut ctx = ctx(&cache, 1);

        let opened = cache.open_tables(&mut ctx, &[TableRequest::new(t("t1"))]).unwrap();
        assert_eq!(opened, 1);
        assert_eq!(ctx.mdl().len(), 1);
        assert_eq!(cache.open_instances(&t("t1")), 1);

        assert_eq!(cache.close_thread_tables(&mut ctx), 1);
        assert_eq!(cache.open_instances(&t("t1")), 0);
        assert_eq!(cache.total_open_instances(), 0);
        ctx.mdl_mut().release_all();
        assert_eq!(cache.mdl().granted_count(&t("t1")), 0);
    }

    #[test]
    fn test_open_missing_releases_lock() {
        let cache = cache();
        let mut ctx = ctx(&cache, 1);
        let err = cache
            .open_tables(&mut ctx, &[TableRequest::new(t("nope"))])
            .unwrap_err();
        assert!(matches!(
            err,
            CairnError::OpenFailed {
                reason: OpenFailure::NoSuchTable,
                ..
            }
        ));
        assert!(ctx.mdl().is_empty());
    }

    #[test]
    fn test_view_refused_for_base_only() {
        let cache = cache();
        cache
            .create_table(TableDef::new(t("v1")).kind(TableKind::View))
            .unwrap();
        let mut ctx = ctx(&cache, 1);

        let err = cache
            .open_tables(&mut ctx, &[TableRequest::new(t("v1")).base_table_only()])
            .unwrap_err();
        assert!(matches!(
            err,
            CairnError::OpenFailed {
                reason: OpenFailure::WrongObjectType { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_merge_opens_children() {
        let cache = cache();
        cache
            .create_table(
                TableDef::new(t("m1"))
                    .column("a", ColumnType::Int)
                    .engine(EngineKind::Merge)
                    .kind(TableKind::Merge {
                        children: vec![t("t1")],
                    }),
            )
            .unwrap();
        let mut ctx = ctx(&cache, 1);
        let opened = cache.open_tables(&mut ctx, &[TableRequest::new(t("m1"))]).unwrap();
        assert_eq!(opened, 2);
        cache.close_thread_tables(&mut ctx);
    }

    #[test]
    fn test_flush_invalidates_lock() {
        let cache = cache();
        let mut ctx = ctx(&cache, 1);
        cache.open_tables(&mut ctx, &[TableRequest::new(t("t1"))]).unwrap();

        let table = ctx.open_tables_mut().pop().unwrap();
        let lock = cache.lock_tables(&mut ctx, &[&table]).unwrap();
        assert_eq!(table.share().active_locks(), 1);
        drop(lock);
        assert_eq!(table.share().active_locks(), 0);

        assert_eq!(cache.flush_tables(None, false).unwrap(), 1);
        assert!(cache.needs_reopen(&table));
        assert_eq!(cache.lock_tables(&mut ctx, &[&table]).unwrap_err(), NeedsRetry);
        assert!(ctx.some_tables_deleted());

        assert!(cache.close_table(table));
    }

    #[test]
    fn test_flush_wait_blocks_until_old_closed() {
        let cache = cache();
        let mut ctx = ctx(&cache, 1);
        cache.open_tables(&mut ctx, &[TableRequest::new(t("t1"))]).unwrap();
        cache.mark_for_reopen(Some(&[t("t1")]));

        let waiter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.wait_for_old_versions(Some(&[t("t1")]), Duration::from_secs(5))
            })
        };

        thread::sleep(Duration::from_millis(20));
        cache.close_thread_tables(&mut ctx);
        assert!(waiter.join().unwrap().is_ok());
        assert!(cache.stats().refresh_broadcasts() >= 1);
    }

    #[test]
    fn test_flush_wait_times_out() {
        let cache = cache();
        let mut ctx = ctx(&cache, 1);
        cache.open_tables(&mut ctx, &[TableRequest::new(t("t1"))]).unwrap();
        cache.mark_for_reopen(None);

        let err = cache
            .wait_for_old_versions(None, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, CairnError::LockTimeout { .. }));
        cache.close_thread_tables(&mut ctx);
    }

    #[test]
    fn test_alter_keeps_rows_and_invalidates() {
        let cache = cache();
        let mut reader = ctx(&cache, 1);
        cache.open_tables(&mut reader, &[TableRequest::new(t("t1"))]).unwrap();
        let table = reader.open_tables_mut().pop().unwrap();
        assert!(!cache.close_table(table));
        reader.mdl_mut().release_all();

        let mut ddl = ctx(&cache, 2);
        cache
            .alter_table(&mut ddl, &t("t1"), |def| {
                def.columns.push(crate::catalog::ColumnDef::new("b", ColumnType::Text));
                Ok(())
            })
            .unwrap_err();

        cache
            .alter_table(&mut ddl, &t("t1"), |def| {
                def.indexes.push(crate::catalog::IndexDef::new("second", vec![0], false));
                Ok(())
            })
            .unwrap();
        let def = cache.table_def(&t("t1")).unwrap();
        assert_eq!(def.indexes.len(), 2);
        assert!(ddl.mdl().is_empty());
    }

    #[test]
    fn test_drop_waits_for_shared_lock() {
        let cache = cache();
        let mut holder = ctx(&cache, 1);
        cache.open_tables(&mut holder, &[TableRequest::new(t("t1"))]).unwrap();

        let dropper = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let mut ddl = OpenContext::new(SessionId::new(2), Arc::clone(cache.mdl()));
                cache.drop_table(&mut ddl, &t("t1"))
            })
        };

        while cache.mdl().waiting_count(&t("t1")) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        let ticket = holder.open_tables()[0].ticket();
        assert!(holder.mdl().has_pending_conflicting_lock(ticket));

        cache.close_thread_tables(&mut holder);
        holder.mdl_mut().release_all();
        assert!(dropper.join().unwrap().is_ok());
        assert!(cache.table_def(&t("t1")).is_none());
    }

    #[test]
    fn test_crashed_table_refuses_open() {
        let cache = cache();
        cache.mark_crashed(&t("t1"), true).unwrap();
        let mut ctx = ctx(&cache, 1);
        let err = cache
            .open_tables(&mut ctx, &[TableRequest::new(t("t1"))])
            .unwrap_err();
        assert!(matches!(
            err,
            CairnError::OpenFailed {
                reason: OpenFailure::EngineRefused { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_instance_limit() {
        let mut config = CairnConfig::for_testing();
        config.table_cache.max_open_instances = 1;
        let cache = TableCache::with_config(&config);
        cache.create_table(TableDef::new(t("t1")).column("a", ColumnType::Int)).unwrap();

        let mut ctx = ctx(&cache, 1);
        cache.open_tables(&mut ctx, &[TableRequest::new(t("t1"))]).unwrap();
        let err = cache
            .open_tables(&mut ctx, &[TableRequest::new(t("t1"))])
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(ctx.mdl().len(), 1);
        cache.close_thread_tables(&mut ctx);
    }
}
