//! Opening tables for handles.
//!
//! The generic open routine works on a session's ordinary open-table list
//! and metadata lock context, and on failure closes whatever it finds
//! there. Handles must not disturb the session's unrelated open tables, so
//! a handle open first swaps both out for empty ones, opens the single
//! target, moves the result to the handle side and swaps the originals
//! back in.

use std::ops::{Deref, DerefMut};

use cairn_common::constants::SYSTEM_SCHEMA_NAME;
use cairn_common::error::{CairnError, CairnResult, OpenFailure};
use cairn_table::{MdlContext, OpenContext, OpenTable, TableCache, TableRequest};
use tracing::{debug, info, warn};

use crate::descriptor::HandleTarget;

/// The session's open context with its ordinary tables and locks set aside.
///
/// Dropping the guard puts them back, on every exit path.
pub(crate) struct IsolatedOpen<'a> {
    ctx: &'a mut OpenContext,
    saved_tables: Vec<OpenTable>,
    saved_mdl: Option<MdlContext>,
}

impl<'a> IsolatedOpen<'a> {
    pub(crate) fn begin(ctx: &'a mut OpenContext) -> Self {
        let saved_tables = std::mem::take(ctx.open_tables_mut());
        let saved_mdl = Some(ctx.mdl_mut().backup_and_reset());
        Self {
            ctx,
            saved_tables,
            saved_mdl,
        }
    }
}

impl Deref for IsolatedOpen<'_> {
    type Target = OpenContext;

    fn deref(&self) -> &OpenContext {
        self.ctx
    }
}

impl DerefMut for IsolatedOpen<'_> {
    fn deref_mut(&mut self) -> &mut OpenContext {
        self.ctx
    }
}

impl Drop for IsolatedOpen<'_> {
    fn drop(&mut self) {
        let leftover = std::mem::replace(
            self.ctx.open_tables_mut(),
            std::mem::take(&mut self.saved_tables),
        );
        debug_assert!(leftover.is_empty(), "isolated open left tables behind");
        self.ctx.open_tables_mut().extend(leftover);

        if let Some(saved) = self.saved_mdl.take() {
            self.ctx.mdl_mut().restore_from_backup(saved);
        }
    }
}

/// Closes everything the isolated open produced and releases its locks.
fn unwind(cache: &TableCache, scope: &mut IsolatedOpen<'_>) {
    cache.close_thread_tables(scope);
    scope.mdl_mut().release_all();
}

/// Opens `target` for handle `name`.
///
/// On success the instance is returned and its lock ticket has moved into
/// `handler_mdl`. On failure nothing stays open or locked, and `ctx` is
/// exactly as it was.
pub(crate) fn open_for_handle(
    cache: &TableCache,
    ctx: &mut OpenContext,
    handler_mdl: &mut MdlContext,
    name: &str,
    target: &HandleTarget,
    reopen: bool,
) -> CairnResult<OpenTable> {
    let ident = &target.table;
    if ident.db.eq_ignore_ascii_case(SYSTEM_SCHEMA_NAME) {
        return Err(CairnError::open_failed(
            ident,
            OpenFailure::WrongObjectType {
                actual: "SYSTEM VIEW".to_string(),
            },
        ));
    }

    let request = TableRequest {
        ident: ident.clone(),
        mdl_mode: target.access.mdl_mode(),
        base_table_only: true,
    };

    let mut table = {
        let mut scope = IsolatedOpen::begin(ctx);

        let opened = match cache.open_tables(&mut scope, &[request]) {
            Ok(opened) => opened,
            Err(e) => {
                unwind(cache, &mut scope);
                debug!(handle = name, table = %ident, error = %e, "handle open failed");
                return Err(e);
            }
        };

        if opened != 1 || scope.open_tables().len() != 1 {
            unwind(cache, &mut scope);
            warn!(handle = name, table = %ident, opened, "handle target opened more than one table");
            return Err(CairnError::IllegalHandleTarget {
                name: name.to_string(),
                table: ident.to_string(),
                opened,
            });
        }

        let Some(table) = scope.open_tables_mut().pop() else {
            unwind(cache, &mut scope);
            return Err(CairnError::internal("opened table vanished"));
        };
        handler_mdl.merge(scope.mdl_mut());
        table
    };

    if !table.access().supports_handle_cursor() {
        let engine = table.engine_name().to_string();
        let ticket = table.ticket();
        if cache.close_table(table) {
            cache.broadcast_refresh();
        }
        handler_mdl.release_lock(ticket);
        return Err(CairnError::UnsupportedForHandle {
            table: ident.to_string(),
            engine,
        });
    }

    table.access_mut().prepare_for_handle();

    if reopen {
        debug!(handle = name, table = %ident, instance = %table.id(), "handle reopened");
    } else {
        info!(handle = name, table = %ident, instance = %table.id(), "handle opened");
    }
    Ok(table)
}
