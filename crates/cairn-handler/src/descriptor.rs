//! Handle descriptors.
//!
//! A descriptor is the record of one named handle: what it targets and,
//! while open, the table instance it reads through. The instance carries
//! its own metadata lock ticket, so a descriptor is either fully open
//! (instance and ticket) or fully closed (neither).

use std::fmt;

use cairn_common::types::{InstanceId, Key, TableIdent, TicketId};
use cairn_table::{MdlContext, MdlMode, OpenTable, TableCache};
use tracing::debug;

use crate::scan::ReadMode;

/// How a handle locks its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// Shared metadata lock. Waits behind pending schema changes.
    #[default]
    Read,
    /// Shared metadata lock granted ahead of pending schema changes.
    HighPriorityRead,
}

impl AccessMode {
    /// Returns the metadata lock mode to request.
    pub fn mdl_mode(&self) -> MdlMode {
        match self {
            AccessMode::Read => MdlMode::Shared,
            AccessMode::HighPriorityRead => MdlMode::SharedHighPriority,
        }
    }
}

/// What a handle opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleTarget {
    /// Target table.
    pub table: TableIdent,
    /// Lock mode for the handle.
    pub access: AccessMode,
}

impl HandleTarget {
    /// Targets `table` for ordinary reads.
    pub fn new(table: TableIdent) -> Self {
        Self {
            table,
            access: AccessMode::Read,
        }
    }

    /// Sets the access mode.
    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }
}

impl fmt::Display for HandleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table)
    }
}

/// Cursor state kept between reads of one handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ScanState {
    /// Mode a following read in the same direction continues with.
    pub(crate) mode: Option<ReadMode>,
    /// Key of the last KEY positioning, for NEXT_SAME.
    pub(crate) key_buffer: Option<Key>,
}

/// One named handle in a session.
#[derive(Debug)]
pub struct HandleDescriptor {
    name: String,
    target: HandleTarget,
    table: Option<OpenTable>,
    scan: ScanState,
}

impl HandleDescriptor {
    /// Creates a closed descriptor.
    pub fn new(name: impl Into<String>, target: HandleTarget) -> Self {
        Self {
            name: name.into(),
            target,
            table: None,
            scan: ScanState::default(),
        }
    }

    /// Returns the name as given at open.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the target.
    pub fn target(&self) -> &HandleTarget {
        &self.target
    }

    /// Returns true while a table instance is attached.
    pub fn is_open(&self) -> bool {
        self.table.is_some()
    }

    /// Returns the attached table instance.
    pub fn table_ref(&self) -> Option<InstanceId> {
        self.table.as_ref().map(OpenTable::id)
    }

    /// Returns the metadata lock ticket of the attached instance.
    pub fn lock_ticket(&self) -> Option<TicketId> {
        self.table.as_ref().map(OpenTable::ticket)
    }

    /// Returns the mode the next read in the same direction continues with.
    pub fn scan_mode(&self) -> Option<ReadMode> {
        self.scan.mode
    }

    /// Returns the key retained from the last KEY positioning.
    pub fn key_buffer(&self) -> Option<&Key> {
        self.scan.key_buffer.as_ref()
    }

    pub(crate) fn table(&self) -> Option<&OpenTable> {
        self.table.as_ref()
    }

    pub(crate) fn table_mut(&mut self) -> Option<&mut OpenTable> {
        self.table.as_mut()
    }

    pub(crate) fn scan_mut(&mut self) -> &mut ScanState {
        &mut self.scan
    }

    /// Attaches a freshly opened instance.
    pub(crate) fn attach(&mut self, table: OpenTable) {
        debug_assert!(self.table.is_none(), "handle '{}' already open", self.name);
        self.scan = ScanState::default();
        self.table = Some(table);
    }

    /// Closes the attached instance and releases its lock.
    ///
    /// Returns false if the descriptor was already closed. Releasing the
    /// lock wakes every session waiting for a conflicting one.
    pub fn close(&mut self, cache: &TableCache, mdl: &mut MdlContext) -> bool {
        let Some(table) = self.table.take() else {
            return false;
        };
        self.scan = ScanState::default();

        let ticket = table.ticket();
        let instance = table.id();
        if cache.close_table(table) {
            cache.broadcast_refresh();
        }
        mdl.release_lock(ticket);
        debug!(handle = %self.name, %instance, "handle closed");
        true
    }
}
