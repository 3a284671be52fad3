//! Benchmark utilities and helpers.

use std::sync::Arc;

use cairn_common::config::{CairnConfig, HandlerConfig};
use cairn_common::types::{ColumnType, Datum, Row, SessionId, TableIdent};
use cairn_handler::{HandleTarget, Session};
use cairn_table::{TableCache, TableDef};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generates random string data for benchmarks.
pub fn random_string(rng: &mut StdRng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generates `count` rows of `(id, score, name)` with sequential ids and
/// random scores in `0..1000`.
pub fn generate_rows(count: usize) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(42);
    (1..=count as i64)
        .map(|id| {
            let score = rng.gen_range(0..1000);
            let name = random_string(&mut rng, 12);
            Row::new(vec![Datum::Int(id), Datum::Int(score), Datum::text(name)])
        })
        .collect()
}

/// Generates random probe keys in `1..=count`.
pub fn generate_probe_keys(count: usize, probes: usize) -> Vec<i64> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..probes)
        .map(|_| rng.gen_range(1..=count as i64))
        .collect()
}

/// Creates `bench.<name>` with `PRIMARY (id)` and `by_score (score)`
/// indexes, filled with [`generate_rows`].
pub fn populated_cache(name: &str, rows: usize) -> (Arc<TableCache>, TableIdent) {
    let cache = Arc::new(TableCache::with_config(&CairnConfig::default()));
    let ident = TableIdent::new("bench", name);
    let def = TableDef::new(ident.clone())
        .column("id", ColumnType::Int)
        .column("score", ColumnType::Int)
        .column("name", ColumnType::Text)
        .index("PRIMARY", vec![0], true)
        .index("by_score", vec![1], false);
    cache.create_table(def).expect("create bench table");
    cache
        .insert_rows(&ident, generate_rows(rows))
        .expect("fill bench table");
    (cache, ident)
}

/// Creates a session with handle `h` open on `ident`.
pub fn session_with_handle(cache: &Arc<TableCache>, ident: &TableIdent) -> Session {
    let mut session = Session::new(SessionId::new(1), Arc::clone(cache), HandlerConfig::default());
    session
        .open("h", HandleTarget::new(ident.clone()))
        .expect("open bench handle");
    session
}
