//! Mempool reconciliation engine.
//!
//! Turns a stateless "list all pending ids" endpoint plus a per-id fetch
//! into a bounded-latency local replica. Each pass diffs the upstream
//! listing against the cache, fetches new arrivals, classifies deletions
//! through the flush-protection latch, and publishes a fresh snapshot to
//! the registered observer.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use eyre::{Context, Result};
use mempool_data::{MempoolBackend, MempoolInfo, TransactionExtended};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::latch::FlushLatch;
use crate::latest::LatestArrivals;
use crate::rate::{RateEstimate, RateTracker};

/// Snapshot mapping txid to cached transaction.
///
/// Published by reference; consumers must treat a snapshot as read-only
/// until the next observer callback.
pub type MempoolCache = HashMap<String, TransactionExtended>;

/// Change observer signature: `(snapshot, added, removed)`.
pub type ChangeObserver =
    Arc<dyn Fn(&Arc<MempoolCache>, &[TransactionExtended], &[TransactionExtended]) + Send + Sync>;

struct EngineState<T> {
    cache: Arc<MempoolCache>,
    info: MempoolInfo,
    in_sync: bool,
    latch: FlushLatch,
    rate: RateTracker,
    latest: LatestArrivals<T>,
}

/// One engine instance mirrors one network's pool.
///
/// Generic over the stripped-transaction shape `T` produced by the injected
/// strip function; the engine never inspects it.
pub struct MempoolSync<T> {
    backend: Arc<dyn MempoolBackend>,
    strip: Box<dyn Fn(&TransactionExtended) -> T + Send + Sync>,
    config: SyncConfig,
    state: Mutex<EngineState<T>>,
    observer: Mutex<Option<ChangeObserver>>,
}

impl<T: Clone + Send + 'static> MempoolSync<T> {
    /// Creates an engine for one network.
    ///
    /// # Errors
    /// Returns error when the configuration is invalid.
    pub fn new(
        backend: Arc<dyn MempoolBackend>,
        strip: impl Fn(&TransactionExtended) -> T + Send + Sync + 'static,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate().wrap_err("invalid sync configuration")?;

        Ok(Self {
            backend,
            strip: Box::new(strip),
            config,
            state: Mutex::new(EngineState {
                cache: Arc::new(MempoolCache::new()),
                info: MempoolInfo::default(),
                in_sync: false,
                latch: FlushLatch::new(config.flush_protection),
                rate: RateTracker::new(config.rate_window_seconds),
                latest: LatestArrivals::new(config.latest_capacity),
            }),
            observer: Mutex::new(None),
        })
    }

    /// The current snapshot reference.
    pub fn snapshot(&self) -> Arc<MempoolCache> {
        Arc::clone(&self.lock_state().cache)
    }

    /// Replaces the cache wholesale (process-start rehydration) and fires
    /// the empty-diff seeding callback.
    pub fn set_snapshot(&self, cache: MempoolCache) {
        let snapshot = {
            let mut state = self.lock_state();
            state.cache = Arc::new(cache);
            Arc::clone(&state.cache)
        };

        self.notify(&snapshot, &[], &[]);
    }

    /// Registers the single change observer, replacing any previous one,
    /// and fires the empty-diff seeding callback so it can seed itself.
    pub fn set_observer(
        &self,
        observer: impl Fn(&Arc<MempoolCache>, &[TransactionExtended], &[TransactionExtended])
            + Send
            + Sync
            + 'static,
    ) {
        *self.lock_observer() = Some(Arc::new(observer));

        let snapshot = self.snapshot();
        self.notify(&snapshot, &[], &[]);
    }

    /// Whether the cache has caught up with the upstream listing.
    pub fn is_in_sync(&self) -> bool {
        self.lock_state().in_sync
    }

    /// The last upstream pool summary.
    pub fn info(&self) -> MempoolInfo {
        self.lock_state().info
    }

    /// Fetches and stores a fresh upstream pool summary.
    pub async fn refresh_info(&self) -> Result<MempoolInfo> {
        let info = self
            .backend
            .get_mempool_info()
            .await
            .wrap_err("failed to refresh mempool info")?;

        self.lock_state().info = info;
        Ok(info)
    }

    /// The smoothed arrival rates as of the last tick.
    pub fn rates(&self) -> RateEstimate {
        self.lock_state().rate.estimate()
    }

    /// The latest-arrivals list, newest first.
    pub fn latest(&self) -> Vec<T> {
        self.lock_state().latest.items().to_vec()
    }

    /// First-seen timestamps for `ids`, parallel to the input; 0 for ids not
    /// in the cache.
    pub fn first_seen_of(&self, ids: &[String]) -> Vec<u64> {
        let state = self.lock_state();
        ids.iter()
            .map(|id| state.cache.get(id).map(|tx| tx.first_seen).unwrap_or(0))
            .collect()
    }

    /// Recomputes the smoothed rates. Driven at 1 Hz by [`MempoolSync::run`].
    pub fn rate_tick(&self) {
        self.lock_state().rate.tick(now_ms());
    }

    /// Executes one reconciliation pass.
    ///
    /// All upstream I/O happens on pass-local variables; engine state is
    /// mutated once, at the end, so an aborted pass leaves no trace.
    ///
    /// # Errors
    /// Returns error when the upstream listing or a transaction fetch fails
    /// with anything other than not-found.
    pub async fn run_once(&self) -> Result<()> {
        let started = Instant::now();
        let budget = Duration::from_millis(self.config.pass_budget_ms());
        let pass_start_ms = now_ms();

        let known = self.snapshot();
        let before_size = known.len();

        let upstream_ids = self
            .backend
            .list_pending_ids()
            .await
            .wrap_err("failed to list pending transaction ids")?;

        debug!(
            upstream = upstream_ids.len(),
            cached = before_size,
            "reconciliation pass started"
        );

        let mut added: Vec<TransactionExtended> = Vec::new();
        let mut fetched: HashSet<&str> = HashSet::new();

        for txid in &upstream_ids {
            if known.contains_key(txid) || fetched.contains(txid.as_str()) {
                continue;
            }

            match self
                .backend
                .get_transaction(txid)
                .await
                .wrap_err_with(|| format!("failed to fetch transaction {}", txid))?
            {
                Some(raw) => {
                    fetched.insert(txid);
                    added.push(TransactionExtended::from_raw(raw, now_seconds()));
                }
                None => debug!(%txid, "transaction evicted between listing and fetch"),
            }

            if started.elapsed() >= budget {
                warn!(
                    fetched = added.len(),
                    budget_ms = self.config.pass_budget_ms(),
                    "pass budget exhausted, deferring remaining arrivals"
                );
                break;
            }
        }

        self.merge_pass(pass_start_ms, before_size, &upstream_ids, added);
        Ok(())
    }

    /// Flush evaluation, classification, latest-arrivals update, sync
    /// detection and publish, under one lock acquisition.
    fn merge_pass(
        &self,
        pass_start_ms: u64,
        before_size: usize,
        upstream_ids: &[String],
        added: Vec<TransactionExtended>,
    ) {
        let mut removed: Vec<TransactionExtended> = Vec::new();

        let (snapshot, changed) = {
            let mut state = self.lock_state();

            state.latch.advance(pass_start_ms);

            // Arrivals only count toward rates once the mirror tracks
            // upstream in real time; the initial backlog is not an arrival.
            if state.in_sync {
                let sample_ms = now_ms();
                for tx in &added {
                    state.rate.record(sample_ms, tx.vsize);
                }
            }

            let membership: HashSet<&str> = upstream_ids.iter().map(String::as_str).collect();

            if state
                .latch
                .try_arm(pass_start_ms, before_size, membership.len())
            {
                state.in_sync = false;
                warn!(
                    before = before_size,
                    upstream = membership.len(),
                    "implausible upstream shrinkage, suppressing deletions"
                );
            }

            let mut next: MempoolCache;
            if state.latch.suppresses_deletions() {
                next = (*state.cache).clone();
            } else {
                next = MempoolCache::with_capacity(state.cache.len() + added.len());
                for (txid, tx) in state.cache.iter() {
                    if membership.contains(txid.as_str()) {
                        next.insert(txid.clone(), tx.clone());
                    } else {
                        removed.push(tx.clone());
                    }
                }
                state.latch.settle();
            }

            for tx in &added {
                next.insert(tx.txid.clone(), tx.clone());
            }

            if !added.is_empty() {
                let stripped: Vec<T> = added.iter().map(|tx| (self.strip)(tx)).collect();
                state.latest.prepend(stripped);
            }

            if !state.in_sync && membership.len() == next.len() {
                state.in_sync = true;
                info!(size = next.len(), "mempool cache in sync with upstream");
            }

            state.cache = Arc::new(next);
            let snapshot = Arc::clone(&state.cache);
            let changed = !added.is_empty() || !removed.is_empty();
            (snapshot, changed)
        };

        debug!(
            added = added.len(),
            removed = removed.len(),
            size = snapshot.len(),
            "reconciliation pass finished"
        );

        if changed {
            self.notify(&snapshot, &added, &removed);
        }
    }

    /// Drives reconciliation passes, the pool-summary refresh, and the 1 Hz
    /// rate tick until `shutdown` flips. A failed pass is logged at warn and
    /// retried on the next interval tick with no state mutated.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut passes = tokio::time::interval(Duration::from_millis(self.config.refresh_rate_ms));
        let mut rate_ticks = tokio::time::interval(Duration::from_secs(1));

        info!(
            refresh_rate_ms = self.config.refresh_rate_ms,
            "mempool sync started"
        );

        loop {
            tokio::select! {
                _ = passes.tick() => {
                    if let Err(error) = self.run_once().await {
                        warn!(%error, "reconciliation pass aborted, retrying next interval");
                        continue;
                    }
                    if let Err(error) = self.refresh_info().await {
                        warn!(%error, "mempool info refresh failed");
                    }
                }
                _ = rate_ticks.tick() => self.rate_tick(),
                _ = shutdown.changed() => {
                    info!("mempool sync shutting down");
                    return;
                }
            }
        }
    }

    fn notify(
        &self,
        snapshot: &Arc<MempoolCache>,
        added: &[TransactionExtended],
        removed: &[TransactionExtended],
    ) {
        let observer = self.lock_observer().clone();
        if let Some(observer) = observer {
            observer(snapshot, added, removed);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_observer(&self) -> MutexGuard<'_, Option<ChangeObserver>> {
        self.observer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
