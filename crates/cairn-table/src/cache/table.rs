//! Shares, opened instances and read locks.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use cairn_common::types::{InstanceId, TableIdent, TicketId};
use parking_lot::RwLock;
use thiserror::Error;

use crate::access::AccessMethod;
use crate::catalog::TableDef;
use crate::storage::TableData;

/// The shared state of one table, common to all its open instances.
#[derive(Debug)]
pub struct TableShare {
    def: Arc<TableDef>,
    data: RwLock<TableData>,
    active_locks: AtomicUsize,
}

impl TableShare {
    pub(crate) fn new(def: Arc<TableDef>, data: TableData) -> Self {
        Self {
            def,
            data: RwLock::new(data),
            active_locks: AtomicUsize::new(0),
        }
    }

    /// Returns the table definition.
    pub fn def(&self) -> &Arc<TableDef> {
        &self.def
    }

    /// Returns the table contents.
    pub fn data(&self) -> &RwLock<TableData> {
        &self.data
    }

    /// Returns the number of read locks currently held.
    pub fn active_locks(&self) -> usize {
        self.active_locks.load(AtomicOrdering::Acquire)
    }
}

/// One session's opened instance of a table.
///
/// An instance pins the share version it was opened at, the metadata
/// lock ticket acquired for it, and its own access method cursor.
pub struct OpenTable {
    id: InstanceId,
    pub(crate) share: Arc<TableShare>,
    version: u64,
    ticket: TicketId,
    pub(crate) access: Box<dyn AccessMethod>,
}

impl OpenTable {
    pub(crate) fn new(
        id: InstanceId,
        share: Arc<TableShare>,
        version: u64,
        ticket: TicketId,
        access: Box<dyn AccessMethod>,
    ) -> Self {
        Self {
            id,
            share,
            version,
            ticket,
            access,
        }
    }

    /// Returns the instance identity.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Returns the table identity.
    pub fn ident(&self) -> &TableIdent {
        &self.share.def.ident
    }

    /// Returns the table definition.
    pub fn def(&self) -> &Arc<TableDef> {
        &self.share.def
    }

    /// Returns the share this instance was opened from.
    pub fn share(&self) -> &Arc<TableShare> {
        &self.share
    }

    /// Returns the share version this instance was opened at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the metadata lock ticket protecting this instance.
    pub fn ticket(&self) -> TicketId {
        self.ticket
    }

    /// Returns the storage engine name.
    pub fn engine_name(&self) -> &'static str {
        self.access.engine_name()
    }

    /// Returns the access method.
    pub fn access(&self) -> &dyn AccessMethod {
        self.access.as_ref()
    }

    /// Returns the access method mutably.
    pub fn access_mut(&mut self) -> &mut dyn AccessMethod {
        self.access.as_mut()
    }

    /// Runs `f` with the access method and a read view of the contents.
    pub fn with_access<R>(&mut self, f: impl FnOnce(&mut dyn AccessMethod, &TableData) -> R) -> R {
        let data = self.share.data.read();
        f(self.access.as_mut(), &data)
    }
}

impl fmt::Debug for OpenTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenTable")
            .field("id", &self.id)
            .field("table", self.ident())
            .field("version", &self.version)
            .field("ticket", &self.ticket)
            .field("engine", &self.engine_name())
            .finish()
    }
}

/// Read lock over a set of open instances, released on drop.
#[derive(Debug)]
pub struct TableLock {
    shares: Vec<Arc<TableShare>>,
}

impl TableLock {
    pub(crate) fn new(shares: Vec<Arc<TableShare>>) -> Self {
        for share in &shares {
            share.active_locks.fetch_add(1, AtomicOrdering::AcqRel);
        }
        Self { shares }
    }

    /// Returns the number of locked tables.
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    /// Returns true if nothing is locked.
    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}

impl Drop for TableLock {
    fn drop(&mut self) {
        for share in &self.shares {
            share.active_locks.fetch_sub(1, AtomicOrdering::AcqRel);
        }
    }
}

/// A locked table was invalidated after it was opened.
///
/// The caller should close the affected instances and open them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("table was invalidated after it was opened")]
pub struct NeedsRetry;
