//! Metadata locks.
//!
//! Every opened table instance holds a shared metadata lock on its table
//! for as long as it stays open. Schema changes and drops take the lock
//! exclusively, so they wait until every instance is closed.
//!
//! # Compatibility Matrix
//!
//! ```text
//!          │ S  │ SH │ X  │
//! ─────────┼────┼────┼────┤
//!     S    │ ✓  │ ✓  │ ✗  │
//!     SH   │ ✓  │ ✓  │ ✗  │
//!     X    │ ✗  │ ✗  │ ✗  │
//! ```
//!
//! Locks held by the same owner never conflict with each other.
//!
//! # Fairness
//!
//! A shared request does not overtake an earlier exclusive request from
//! another owner, unless the requester already holds a grant on the same
//! table. High-priority shared requests (SH) always overtake.
//!
//! Holders learn about waiting exclusive requests through
//! [`MetadataLockManager::has_pending_conflicting_lock`] and are expected
//! to close what they hold.
//!
//! Waiters park on a single condition variable that is broadcast on every
//! release.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cairn_common::config::LockConfig;
use cairn_common::error::{CairnError, CairnResult};
use cairn_common::types::{SessionId, TableIdent, TicketId};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

/// Metadata lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MdlMode {
    /// Held by open table instances.
    Shared,
    /// Shared, but granted ahead of waiting exclusive requests.
    SharedHighPriority,
    /// Held by schema changes and drops.
    Exclusive,
}

impl MdlMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &MdlMode) -> bool {
        *self != MdlMode::Exclusive && *other != MdlMode::Exclusive
    }
}

impl fmt::Display for MdlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MdlMode::Shared => write!(f, "S"),
            MdlMode::SharedHighPriority => write!(f, "SH"),
            MdlMode::Exclusive => write!(f, "X"),
        }
    }
}

/// A granted metadata lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdlTicket {
    /// Ticket identity.
    pub id: TicketId,
    /// Locked table.
    pub key: TableIdent,
    /// Granted mode.
    pub mode: MdlMode,
    /// Owning session.
    pub owner: SessionId,
}

#[derive(Debug, Clone)]
struct Waiter {
    request: u64,
    owner: SessionId,
    mode: MdlMode,
}

#[derive(Debug, Default)]
struct MdlLock {
    granted: Vec<MdlTicket>,
    waiting: Vec<Waiter>,
}

impl MdlLock {
    fn can_grant(&self, owner: SessionId, mode: MdlMode, request: u64) -> bool {
        let others_compatible = self
            .granted
            .iter()
            .filter(|t| t.owner != owner)
            .all(|t| mode.is_compatible_with(&t.mode));
        if !others_compatible {
            return false;
        }

        if mode == MdlMode::SharedHighPriority || self.granted.iter().any(|t| t.owner == owner) {
            return true;
        }

        // Earlier conflicting waiters from other owners go first
        !self
            .waiting
            .iter()
            .any(|w| w.request < request && w.owner != owner && !mode.is_compatible_with(&w.mode))
    }

    fn is_free(&self) -> bool {
        self.granted.is_empty() && self.waiting.is_empty()
    }
}

/// Statistics about the metadata lock manager.
#[derive(Debug, Default)]
pub struct MdlStats {
    /// Total lock acquisitions.
    pub acquisitions: AtomicU64,
    /// Total lock releases.
    pub releases: AtomicU64,
    /// Total lock waits.
    pub waits: AtomicU64,
    /// Total timeouts.
    pub timeouts: AtomicU64,
}

impl MdlStats {
    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Returns the number of acquisitions.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of releases.
    pub fn releases(&self) -> u64 {
        self.releases.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of requests that had to wait.
    pub fn waits(&self) -> u64 {
        self.waits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of requests that timed out.
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(AtomicOrdering::Relaxed)
    }
}

/// Grants shared and exclusive table metadata locks.
#[derive(Debug)]
pub struct MetadataLockManager {
    /// All locks, keyed by table.
    locks: Mutex<HashMap<TableIdent, MdlLock>>,
    /// Broadcast on every release and abandoned wait.
    released: Condvar,
    next_ticket: AtomicU64,
    next_request: AtomicU64,
    config: LockConfig,
    stats: MdlStats,
}

impl MetadataLockManager {
    /// Creates a lock manager.
    pub fn new(config: LockConfig) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            next_ticket: AtomicU64::new(1),
            next_request: AtomicU64::new(1),
            config,
            stats: MdlStats::default(),
        }
    }

    /// Returns the default wait timeout.
    pub fn default_timeout(&self) -> Duration {
        self.config.lock_wait_timeout()
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &MdlStats {
        &self.stats
    }

    /// Acquires a lock, blocking until granted or `timeout` elapses.
    pub fn acquire(
        &self,
        owner: SessionId,
        key: &TableIdent,
        mode: MdlMode,
        timeout: Duration,
    ) -> CairnResult<MdlTicket> {
        let started = Instant::now();
        let deadline = started + timeout;
        let request = self.next_request.fetch_add(1, AtomicOrdering::Relaxed);
        let mut queued = false;

        let mut locks = self.locks.lock();
        loop {
            let lock = locks.entry(key.clone()).or_default();

            if lock.can_grant(owner, mode, request) {
                if queued {
                    lock.waiting.retain(|w| w.request != request);
                }
                let ticket = MdlTicket {
                    id: TicketId::new(self.next_ticket.fetch_add(1, AtomicOrdering::Relaxed)),
                    key: key.clone(),
                    mode,
                    owner,
                };
                lock.granted.push(ticket.clone());
                MdlStats::record(&self.stats.acquisitions);
                trace!(%owner, table = %key, %mode, ticket = %ticket.id, "metadata lock granted");
                return Ok(ticket);
            }

            if !queued {
                lock.waiting.push(Waiter {
                    request,
                    owner,
                    mode,
                });
                queued = true;
                MdlStats::record(&self.stats.waits);
                debug!(%owner, table = %key, %mode, "waiting for metadata lock");
            }

            if self.released.wait_until(&mut locks, deadline).timed_out() {
                let lock = locks.entry(key.clone()).or_default();
                if lock.can_grant(owner, mode, request) {
                    continue;
                }
                lock.waiting.retain(|w| w.request != request);
                if lock.is_free() {
                    locks.remove(key);
                }
                drop(locks);
                // Requests queued behind this one may now be grantable
                self.released.notify_all();

                MdlStats::record(&self.stats.timeouts);
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(%owner, table = %key, %mode, waited_ms, "metadata lock wait timed out");
                return Err(CairnError::LockTimeout {
                    resource: key.to_string(),
                    waited_ms,
                });
            }
        }
    }

    /// Releases a granted lock. Returns false if it was not held.
    pub fn release(&self, ticket: &MdlTicket) -> bool {
        let mut locks = self.locks.lock();
        let Some(lock) = locks.get_mut(&ticket.key) else {
            return false;
        };
        let before = lock.granted.len();
        lock.granted.retain(|t| t.id != ticket.id);
        let released = lock.granted.len() != before;
        if lock.is_free() {
            locks.remove(&ticket.key);
        }
        drop(locks);

        if released {
            MdlStats::record(&self.stats.releases);
            trace!(ticket = %ticket.id, table = %ticket.key, "metadata lock released");
            self.released.notify_all();
        }
        released
    }

    /// Returns true if another owner is waiting for a lock that conflicts
    /// with `ticket`.
    pub fn has_pending_conflicting_lock(&self, ticket: &MdlTicket) -> bool {
        let locks = self.locks.lock();
        locks.get(&ticket.key).map_or(false, |lock| {
            lock.waiting
                .iter()
                .any(|w| w.owner != ticket.owner && !w.mode.is_compatible_with(&ticket.mode))
        })
    }

    /// Returns the number of requests waiting on `key`.
    pub fn waiting_count(&self, key: &TableIdent) -> usize {
        self.locks.lock().get(key).map_or(0, |lock| lock.waiting.len())
    }

    /// Returns the number of grants held on `key`.
    pub fn granted_count(&self, key: &TableIdent) -> usize {
        self.locks.lock().get(key).map_or(0, |lock| lock.granted.len())
    }
}

/// The set of metadata locks one owner holds.
///
/// Dropping the context releases every lock still in it.
#[derive(Debug)]
pub struct MdlContext {
    manager: Arc<MetadataLockManager>,
    owner: SessionId,
    tickets: Vec<MdlTicket>,
}

impl MdlContext {
    /// Creates an empty context for `owner`.
    pub fn new(manager: Arc<MetadataLockManager>, owner: SessionId) -> Self {
        Self {
            manager,
            owner,
            tickets: Vec::new(),
        }
    }

    /// Returns the owning session.
    pub fn owner(&self) -> SessionId {
        self.owner
    }

    /// Returns the lock manager.
    pub fn manager(&self) -> &Arc<MetadataLockManager> {
        &self.manager
    }

    /// Acquires a lock with the manager's default timeout.
    pub fn acquire(&mut self, key: &TableIdent, mode: MdlMode) -> CairnResult<TicketId> {
        let timeout = self.manager.default_timeout();
        self.acquire_with_timeout(key, mode, timeout)
    }

    /// Acquires a lock, waiting at most `timeout`.
    pub fn acquire_with_timeout(
        &mut self,
        key: &TableIdent,
        mode: MdlMode,
        timeout: Duration,
    ) -> CairnResult<TicketId> {
        let ticket = self.manager.acquire(self.owner, key, mode, timeout)?;
        let id = ticket.id;
        self.tickets.push(ticket);
        Ok(id)
    }

    /// Releases one lock held in this context.
    pub fn release_lock(&mut self, id: TicketId) -> bool {
        match self.tickets.iter().position(|t| t.id == id) {
            Some(pos) => {
                let ticket = self.tickets.swap_remove(pos);
                self.manager.release(&ticket)
            }
            None => false,
        }
    }

    /// Releases every lock held in this context.
    pub fn release_all(&mut self) {
        for ticket in self.tickets.drain(..) {
            self.manager.release(&ticket);
        }
    }

    /// Moves every lock into a returned backup, leaving this context empty.
    pub fn backup_and_reset(&mut self) -> MdlContext {
        MdlContext {
            manager: Arc::clone(&self.manager),
            owner: self.owner,
            tickets: std::mem::take(&mut self.tickets),
        }
    }

    /// Restores locks saved by [`MdlContext::backup_and_reset`].
    ///
    /// Locks acquired since the backup are kept alongside the restored ones.
    pub fn restore_from_backup(&mut self, mut backup: MdlContext) {
        let acquired = std::mem::take(&mut self.tickets);
        self.tickets = std::mem::take(&mut backup.tickets);
        self.tickets.extend(acquired);
    }

    /// Moves every lock from `other` into this context.
    pub fn merge(&mut self, other: &mut MdlContext) {
        self.tickets.append(&mut other.tickets);
    }

    /// Returns true if another owner waits for a lock conflicting with `id`.
    pub fn has_pending_conflicting_lock(&self, id: TicketId) -> bool {
        self.ticket(id)
            .map_or(false, |t| self.manager.has_pending_conflicting_lock(t))
    }

    /// Returns the ticket for `id`, if held here.
    pub fn ticket(&self, id: TicketId) -> Option<&MdlTicket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    /// Returns true if `id` is held here.
    pub fn holds(&self, id: TicketId) -> bool {
        self.ticket(id).is_some()
    }

    /// Returns the held tickets.
    pub fn tickets(&self) -> &[MdlTicket] {
        &self.tickets
    }

    /// Returns the number of held locks.
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Returns true if no locks are held.
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

impl Drop for MdlContext {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn manager() -> Arc<MetadataLockManager> {
        Arc::new(MetadataLockManager::new(LockConfig::default()))
    }

    fn t1() -> TableIdent {
        TableIdent::new("test", "t1")
    }

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn test_lock_compatibility() {
        assert!(MdlMode::Shared.is_compatible_with(&MdlMode::Shared));
        assert!(!MdlMode::Shared.is_compatible_with(&MdlMode::Exclusive));
        assert!(!MdlMode::Exclusive.is_compatible_with(&MdlMode::Exclusive));
        assert!(MdlMode::SharedHighPriority.is_compatible_with(&MdlMode::Shared));
        assert!(!MdlMode::SharedHighPriority.is_compatible_with(&MdlMode::Exclusive));
    }

    #[test]
    fn test_shared_locks_coexist() {
        let mgr = manager();
        let a = mgr.acquire(SessionId::new(1), &t1(), MdlMode::Shared, SHORT).unwrap();
        let b = mgr.acquire(SessionId::new(2), &t1(), MdlMode::Shared, SHORT).unwrap();
        assert_eq!(mgr.granted_count(&t1()), 2);

        assert!(mgr.release(&a));
        assert!(mgr.release(&b));
        assert!(!mgr.release(&b));
        assert_eq!(mgr.granted_count(&t1()), 0);
    }

    #[test]
    fn test_exclusive_times_out() {
        let mgr = manager();
        let _shared = mgr.acquire(SessionId::new(1), &t1(), MdlMode::Shared, SHORT).unwrap();
        let err = mgr
            .acquire(SessionId::new(2), &t1(), MdlMode::Exclusive, SHORT)
            .unwrap_err();
        assert!(matches!(err, CairnError::LockTimeout { .. }));
        assert_eq!(mgr.waiting_count(&t1()), 0);
        assert_eq!(mgr.stats().timeouts(), 1);
    }

    #[test]
    fn test_same_owner_never_conflicts() {
        let mgr = manager();
        let owner = SessionId::new(1);
        let _s = mgr.acquire(owner, &t1(), MdlMode::Shared, SHORT).unwrap();
        assert!(mgr.acquire(owner, &t1(), MdlMode::Exclusive, SHORT).is_ok());
    }

    #[test]
    fn test_pending_exclusive_is_visible_and_granted_on_release() {
        let mgr = manager();
        let holder = mgr.acquire(SessionId::new(1), &t1(), MdlMode::Shared, SHORT).unwrap();

        let waiter = {
            let mgr = Arc::clone(&mgr);
            thread::spawn(move || {
                mgr.acquire(SessionId::new(2), &t1(), MdlMode::Exclusive, Duration::from_secs(5))
            })
        };

        while mgr.waiting_count(&t1()) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(mgr.has_pending_conflicting_lock(&holder));

        // A new shared request from a third owner queues behind the exclusive one
        assert!(mgr
            .acquire(SessionId::new(3), &t1(), MdlMode::Shared, SHORT)
            .is_err());
        let high = mgr
            .acquire(SessionId::new(4), &t1(), MdlMode::SharedHighPriority, SHORT)
            .unwrap();
        mgr.release(&high);

        mgr.release(&holder);
        let granted = waiter.join().unwrap().unwrap();
        assert_eq!(granted.mode, MdlMode::Exclusive);
    }

    #[test]
    fn test_context_backup_restore_merge() {
        let mgr = manager();
        let mut ctx = MdlContext::new(Arc::clone(&mgr), SessionId::new(1));
        let first = ctx.acquire(&t1(), MdlMode::Shared).unwrap();

        let backup = ctx.backup_and_reset();
        assert!(ctx.is_empty());

        let t2 = TableIdent::new("test", "t2");
        let second = ctx.acquire(&t2, MdlMode::Shared).unwrap();

        let mut handler = MdlContext::new(Arc::clone(&mgr), SessionId::new(1));
        handler.merge(&mut ctx);
        ctx.restore_from_backup(backup);

        assert!(ctx.holds(first));
        assert!(!ctx.holds(second));
        assert!(handler.holds(second));

        drop(handler);
        assert_eq!(mgr.granted_count(&t2), 0);
        assert!(ctx.release_lock(first));
        assert_eq!(mgr.granted_count(&t1()), 0);
    }
}
