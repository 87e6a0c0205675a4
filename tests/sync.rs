//! Integration tests for the reconciliation pass: cold start, steady-state
//! diffs, eviction handling, seeding callbacks and rate gating.

mod common;

use std::sync::Arc;

use common::{sample_raw_tx, test_engine, DiffLog, ScriptedBackend};
use mempool_data::TransactionExtended;
use mempool_sync::{MempoolCache, SyncConfig};

/// Cold start over a small pool: all three transactions are ingested in one
/// pass with derived fields fixed at ingest, and the engine reports in-sync.
#[tokio::test]
async fn cold_start_ingests_whole_pool() {
    let backend = Arc::new(ScriptedBackend::new(vec![vec!["a", "b", "c"]]));
    backend.insert_tx("a", 400, Some(100));
    backend.insert_tx("b", 800, Some(200));
    backend.insert_tx("c", 1200, Some(600));

    let log = DiffLog::new();
    let engine = test_engine(Arc::clone(&backend), SyncConfig::default());
    engine.set_observer(log.observer());

    engine.run_once().await.expect("pass should succeed");

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert!(engine.is_in_sync());

    assert_eq!(snapshot["a"].vsize, 100.0);
    assert_eq!(snapshot["a"].fee_per_vsize, 1.0);
    assert_eq!(snapshot["b"].vsize, 200.0);
    assert_eq!(snapshot["b"].fee_per_vsize, 1.0);
    assert_eq!(snapshot["c"].vsize, 300.0);
    assert_eq!(snapshot["c"].fee_per_vsize, 2.0);

    let events = log.events();
    assert_eq!(events.len(), 2, "seeding callback plus one change event");
    assert!(events[0].0.is_empty() && events[0].1.is_empty());
    assert_eq!(
        events[1].0,
        vec!["a", "b", "c"],
        "additions keep listing order"
    );
    assert!(events[1].1.is_empty());
}

/// Steady-state diff: one departure and two arrivals propagate in a single
/// pass and keep the engine in sync.
#[tokio::test]
async fn steady_state_diff_adds_and_removes() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        vec!["a", "b", "c"],
        vec!["b", "c", "d", "e"],
    ]));
    for txid in ["a", "b", "c", "d", "e"] {
        backend.insert_tx(txid, 800, Some(200));
    }

    let log = DiffLog::new();
    let engine = test_engine(Arc::clone(&backend), SyncConfig::default());
    engine.set_observer(log.observer());

    engine.run_once().await.expect("first pass should succeed");
    engine.run_once().await.expect("second pass should succeed");

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.len(), 4);
    assert!(snapshot.contains_key("b") && snapshot.contains_key("e"));
    assert!(!snapshot.contains_key("a"));
    assert!(engine.is_in_sync());

    let events = log.events();
    let last = events.last().expect("change event for second pass");
    assert_eq!(last.0, vec!["d", "e"]);
    assert_eq!(last.1, vec!["a"]);
}

/// A transaction evicted between listing and fetch is skipped without
/// failing the pass; sync follows once listing and cache agree.
#[tokio::test]
async fn eviction_between_listing_and_fetch_is_skipped() {
    let backend = Arc::new(ScriptedBackend::new(vec![vec!["a", "b"], vec!["a"]]));
    backend.insert_tx("a", 400, Some(100));
    // "b" is listed but never fetchable.

    let engine = test_engine(Arc::clone(&backend), SyncConfig::default());

    engine
        .run_once()
        .await
        .expect("pass should succeed despite eviction");
    assert_eq!(engine.snapshot().len(), 1);
    assert!(!engine.is_in_sync(), "listing size and cache size differ");

    engine.run_once().await.expect("second pass should succeed");
    assert!(engine.is_in_sync());
}

/// Rehydration round-trip: the snapshot comes back unchanged and both
/// `set_observer` and `set_snapshot` fire exactly one empty-diff seeding
/// callback.
#[tokio::test]
async fn set_snapshot_round_trips_and_seeds() {
    let backend = Arc::new(ScriptedBackend::new(vec![vec!["a"]]));
    let engine = test_engine(Arc::clone(&backend), SyncConfig::default());

    let log = DiffLog::new();
    engine.set_observer(log.observer());

    let mut cache = MempoolCache::new();
    cache.insert(
        "x".to_string(),
        TransactionExtended::from_raw(sample_raw_tx("x", 600, Some(300)), 1_700_000_000),
    );
    engine.set_snapshot(cache);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot["x"].first_seen, 1_700_000_000);

    let events = log.events();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|(added, removed)| added.is_empty() && removed.is_empty()));
}

/// `first_seen_of` returns a parallel array with 0 for ids the cache has
/// never held.
#[tokio::test]
async fn first_seen_reports_zero_for_unknown_ids() {
    let backend = Arc::new(ScriptedBackend::new(vec![vec!["a"]]));
    backend.insert_tx("a", 400, Some(100));

    let engine = test_engine(Arc::clone(&backend), SyncConfig::default());
    engine.run_once().await.expect("pass should succeed");

    let seen = engine.first_seen_of(&["a".to_string(), "nope".to_string()]);
    assert_eq!(seen.len(), 2);
    assert!(seen[0] > 0);
    assert_eq!(seen[1], 0);
}

/// A transaction is emitted as added exactly once while it stays upstream.
#[tokio::test]
async fn repeated_listings_do_not_re_add() {
    let backend = Arc::new(ScriptedBackend::new(vec![vec!["a"]]));
    backend.insert_tx("a", 400, Some(100));

    let log = DiffLog::new();
    let engine = test_engine(Arc::clone(&backend), SyncConfig::default());
    engine.set_observer(log.observer());

    for _ in 0..3 {
        engine.run_once().await.expect("pass should succeed");
    }

    let events = log.events();
    assert_eq!(events.len(), 2, "seeding callback plus a single change event");
}

/// No rate samples accrue for backlog ingested before the first sync; new
/// arrivals afterwards are counted.
#[tokio::test]
async fn rates_gate_on_initial_sync() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        vec!["a", "b", "c"],
        vec!["a", "b", "c", "d"],
    ]));
    for txid in ["a", "b", "c", "d"] {
        backend.insert_tx(txid, 400, Some(100));
    }

    let engine = test_engine(Arc::clone(&backend), SyncConfig::default());

    engine.run_once().await.expect("cold pass should succeed");
    engine.rate_tick();
    assert_eq!(
        engine.rates().tx_per_second,
        0.0,
        "backlog is not an arrival"
    );

    engine.run_once().await.expect("steady pass should succeed");
    engine.rate_tick();
    assert!(
        engine.rates().tx_per_second > 0.0,
        "post-sync arrival counts"
    );
}

/// The latest-arrivals list is newest-pass-first, keeps listing order within
/// a pass, and holds at most the configured capacity.
#[tokio::test]
async fn latest_arrivals_are_newest_first() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        vec!["a", "b", "c"],
        vec!["a", "b", "c", "d", "e"],
    ]));
    for txid in ["a", "b", "c", "d", "e"] {
        backend.insert_tx(txid, 400, Some(100));
    }

    let config = SyncConfig {
        latest_capacity: 4,
        ..SyncConfig::default()
    };
    let engine = test_engine(Arc::clone(&backend), config);

    engine.run_once().await.expect("first pass should succeed");
    engine.run_once().await.expect("second pass should succeed");

    let latest: Vec<String> = engine.latest().into_iter().map(|tx| tx.txid).collect();
    assert_eq!(latest, vec!["d", "e", "a", "b"]);
}

/// A failed listing aborts the pass with no state mutated; the next pass
/// recovers.
#[tokio::test]
async fn transient_listing_failure_leaves_state_unchanged() {
    let backend = Arc::new(ScriptedBackend::new(vec![vec!["a", "b"]]));
    backend.insert_tx("a", 400, Some(100));
    backend.insert_tx("b", 800, Some(200));

    let engine = test_engine(Arc::clone(&backend), SyncConfig::default());
    engine.run_once().await.expect("cold pass should succeed");
    assert!(engine.is_in_sync());

    backend.fail_next_listing();
    assert!(engine.run_once().await.is_err());
    assert_eq!(engine.snapshot().len(), 2);
    assert!(engine.is_in_sync());

    engine.run_once().await.expect("recovery pass should succeed");
    assert_eq!(engine.snapshot().len(), 2);
}
