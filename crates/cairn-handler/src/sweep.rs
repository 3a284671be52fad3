//! Invalidation sweep.
//!
//! Closes, but never removes, open handles whose table another session is
//! waiting to lock exclusively or whose table the cache has marked for
//! reopen. The names stay registered and reopen on their next read.

use std::fmt;

use cairn_table::{MdlContext, TableCache};
use tracing::debug;

use crate::registry::HandleRegistry;

/// Why the sweep closed a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepReason {
    /// Another session is waiting for a lock that conflicts with the handle's.
    PendingConflictingLock,
    /// The table was flushed or altered since the handle opened it.
    NeedsReopen,
}

impl fmt::Display for SweepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepReason::PendingConflictingLock => f.write_str("pending conflicting lock"),
            SweepReason::NeedsReopen => f.write_str("needs reopen"),
        }
    }
}

/// Closes every open handle in `registry` that must give up its table.
///
/// Returns the number of handles closed.
pub(crate) fn sweep_registry(
    registry: &mut HandleRegistry,
    cache: &TableCache,
    mdl: &mut MdlContext,
) -> usize {
    let mut closed = 0;
    for desc in registry.for_each_open() {
        let reason = match (desc.table(), desc.lock_ticket()) {
            (_, Some(ticket)) if mdl.has_pending_conflicting_lock(ticket) => {
                SweepReason::PendingConflictingLock
            }
            (Some(table), _) if cache.needs_reopen(table) => SweepReason::NeedsReopen,
            _ => continue,
        };

        debug!(handle = desc.name(), table = %desc.target(), %reason, "sweep closing handle");
        if desc.close(cache, mdl) {
            closed += 1;
        }
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::open_for_handle;
    use crate::descriptor::{HandleDescriptor, HandleTarget};
    use cairn_common::config::CairnConfig;
    use cairn_common::types::{ColumnType, SessionId, TableIdent};
    use cairn_table::{MdlMode, OpenContext, TableDef};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn t(name: &str) -> TableIdent {
        TableIdent::new("test", name)
    }

    fn open_handle(
        cache: &TableCache,
        ctx: &mut OpenContext,
        mdl: &mut MdlContext,
        registry: &mut HandleRegistry,
        name: &str,
        table: &str,
    ) {
        let target = HandleTarget::new(t(table));
        let opened = open_for_handle(cache, ctx, mdl, name, &target, false).unwrap();
        let mut desc = HandleDescriptor::new(name, target);
        desc.attach(opened);
        registry.register(desc).unwrap();
    }

    fn setup() -> (Arc<TableCache>, OpenContext, MdlContext, HandleRegistry) {
        let cache = Arc::new(TableCache::with_config(&CairnConfig::for_testing()));
        for name in ["t1", "t2"] {
            cache
                .create_table(TableDef::new(t(name)).column("a", ColumnType::Int))
                .unwrap();
        }
        let session = SessionId::new(1);
        let ctx = OpenContext::new(session, Arc::clone(cache.mdl()));
        let mdl = MdlContext::new(Arc::clone(cache.mdl()), session);
        (cache, ctx, mdl, HandleRegistry::default())
    }

    #[test]
    fn test_flush_closes_but_keeps_names() {
        let (cache, mut ctx, mut mdl, mut registry) = setup();
        open_handle(&cache, &mut ctx, &mut mdl, &mut registry, "h1", "t1");
        open_handle(&cache, &mut ctx, &mut mdl, &mut registry, "h2", "t2");

        assert_eq!(sweep_registry(&mut registry, &cache, &mut mdl), 0);

        cache.mark_for_reopen(Some(&[t("t1")]));
        assert_eq!(sweep_registry(&mut registry, &cache, &mut mdl), 1);

        assert_eq!(registry.len(), 2);
        assert!(!registry.lookup("h1").unwrap().is_open());
        assert!(registry.lookup("h2").unwrap().is_open());
        assert_eq!(mdl.len(), 1);
        assert_eq!(cache.open_instances(&t("t1")), 0);

        registry.clear(&cache, &mut mdl);
    }

    #[test]
    fn test_pending_exclusive_lock_closes() {
        let (cache, mut ctx, mut mdl, mut registry) = setup();
        open_handle(&cache, &mut ctx, &mut mdl, &mut registry, "h1", "t1");

        let waiter = {
            let manager = Arc::clone(cache.mdl());
            thread::spawn(move || {
                let mut other = MdlContext::new(manager, SessionId::new(2));
                other
                    .acquire_with_timeout(&t("t1"), MdlMode::Exclusive, Duration::from_secs(5))
                    .is_ok()
            })
        };

        while cache.mdl().waiting_count(&t("t1")) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(sweep_registry(&mut registry, &cache, &mut mdl), 1);
        assert!(waiter.join().unwrap());
        assert!(registry.contains("h1"));
        assert!(mdl.is_empty());
    }
}
