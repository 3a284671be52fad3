//! A session's ordinary open-table state.

use std::sync::Arc;

use cairn_common::types::{SessionId, TableIdent};

use super::table::OpenTable;
use crate::mdl::{MdlContext, MdlMode, MetadataLockManager};

/// A request to open one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRequest {
    /// Table to open.
    pub ident: TableIdent,
    /// Metadata lock mode to take.
    pub mdl_mode: MdlMode,
    /// Refuse objects that are not base tables.
    pub base_table_only: bool,
}

impl TableRequest {
    /// Requests `ident` under a shared metadata lock.
    pub fn new(ident: TableIdent) -> Self {
        Self {
            ident,
            mdl_mode: MdlMode::Shared,
            base_table_only: false,
        }
    }

    /// Refuses views and other non-base objects.
    pub fn base_table_only(mut self) -> Self {
        self.base_table_only = true;
        self
    }
}

/// The tables and metadata locks a session holds for its statements.
#[derive(Debug)]
pub struct OpenContext {
    session: SessionId,
    open_tables: Vec<OpenTable>,
    mdl: MdlContext,
    locked_tables_mode: bool,
    some_tables_deleted: bool,
}

impl OpenContext {
    /// Creates an empty context.
    pub fn new(session: SessionId, manager: Arc<MetadataLockManager>) -> Self {
        Self {
            session,
            open_tables: Vec::new(),
            mdl: MdlContext::new(manager, session),
            locked_tables_mode: false,
            some_tables_deleted: false,
        }
    }

    /// Returns the owning session.
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Returns the open table list.
    pub fn open_tables(&self) -> &[OpenTable] {
        &self.open_tables
    }

    /// Returns the open table list mutably.
    pub fn open_tables_mut(&mut self) -> &mut Vec<OpenTable> {
        &mut self.open_tables
    }

    /// Returns the metadata lock context.
    pub fn mdl(&self) -> &MdlContext {
        &self.mdl
    }

    /// Returns the metadata lock context mutably.
    pub fn mdl_mut(&mut self) -> &mut MdlContext {
        &mut self.mdl
    }

    /// Returns true while explicit table locks are held.
    pub fn locked_tables_mode(&self) -> bool {
        self.locked_tables_mode
    }

    /// Enters or leaves locked-tables mode.
    pub fn set_locked_tables_mode(&mut self, on: bool) {
        self.locked_tables_mode = on;
    }

    /// Returns true if a lock attempt found an invalidated table.
    pub fn some_tables_deleted(&self) -> bool {
        self.some_tables_deleted
    }

    /// Sets or clears the invalidated-table flag.
    pub fn set_some_tables_deleted(&mut self, deleted: bool) {
        self.some_tables_deleted = deleted;
    }
}
