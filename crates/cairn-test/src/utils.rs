//! Shared fixtures for integration tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use cairn_common::config::{CairnConfig, HandlerConfig};
use cairn_common::error::CairnResult;
use cairn_common::types::{ColumnType, Datum, Row, SessionId, TableIdent};
use cairn_handler::{ReadCursor, Session};
use cairn_table::{ColumnDef, TableCache, TableDef};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a test subscriber filtered by `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Creates a table cache with short lock and flush waits.
pub fn shared_cache() -> Arc<TableCache> {
    init_tracing();
    Arc::new(TableCache::with_config(&CairnConfig::for_testing()))
}

/// Creates `test.<name>` with `rows` rows and returns its identity.
///
/// Columns are `id INT NOT NULL`, `grp INT` and `label TEXT`. Row `i`
/// (1-based) has `id = i`, `grp = (i + 1) / 2` and `label = "row<i>"`.
/// Indexes are `PRIMARY (id)` and a non-unique `by_grp (grp)`.
pub fn numbers_table(cache: &TableCache, name: &str, rows: i64) -> TableIdent {
    let ident = TableIdent::new("test", name);
    let def = TableDef::new(ident.clone())
        .with_column(ColumnDef::new("id", ColumnType::Int).not_null())
        .column("grp", ColumnType::Int)
        .column("label", ColumnType::Text)
        .index("PRIMARY", vec![0], true)
        .index("by_grp", vec![1], false);
    cache.create_table(def).expect("create table");
    cache
        .insert_rows(
            &ident,
            (1..=rows).map(|i| {
                Row::new(vec![
                    Datum::Int(i),
                    Datum::Int((i + 1) / 2),
                    Datum::text(format!("row{i}")),
                ])
            }),
        )
        .expect("insert rows");
    ident
}

/// Drains a read cursor into the `id` column of every row.
pub fn collect_ids(cursor: ReadCursor<'_>) -> CairnResult<Vec<i64>> {
    cursor
        .map(|row| row.map(|r| r.get(0).and_then(Datum::as_int).unwrap_or(-1)))
        .collect()
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// A shared table cache and a source of sessions on it.
#[derive(Debug)]
pub struct TestCluster {
    cache: Arc<TableCache>,
    next_session: AtomicU64,
}

impl TestCluster {
    /// Creates a cluster over a fresh cache.
    pub fn new() -> Self {
        Self {
            cache: shared_cache(),
            next_session: AtomicU64::new(1),
        }
    }

    /// Returns the shared cache.
    pub fn cache(&self) -> &Arc<TableCache> {
        &self.cache
    }

    /// Creates a session with default handle configuration.
    pub fn session(&self) -> Session {
        self.session_with(HandlerConfig::default())
    }

    /// Creates a session with `config`.
    pub fn session_with(&self, config: HandlerConfig) -> Session {
        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed));
        Session::new(id, Arc::clone(&self.cache), config)
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}
