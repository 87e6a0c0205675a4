//! Shared test helpers and doubles for the sync engine.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eyre::{eyre, Result};
use mempool_data::{
    MempoolBackend, MempoolInfo, RawTransaction, StrippedTransaction, TransactionExtended,
};
use mempool_sync::{MempoolCache, MempoolSync, SyncConfig};

/// Engine instantiation used throughout the integration tests.
pub type TestEngine = MempoolSync<StrippedTransaction>;

/// Scripted pool double. Each pass consumes the next listing; the final
/// listing repeats once the script is exhausted.
pub struct ScriptedBackend {
    listings: Mutex<VecDeque<Vec<String>>>,
    txs: Mutex<HashMap<String, RawTransaction>>,
    fetch_delay: Option<Duration>,
    fail_next_listing: Mutex<bool>,
}

impl ScriptedBackend {
    pub fn new<S: Into<String>>(listings: Vec<Vec<S>>) -> Self {
        let listings = listings
            .into_iter()
            .map(|listing| listing.into_iter().map(Into::into).collect())
            .collect();

        Self {
            listings: Mutex::new(listings),
            txs: Mutex::new(HashMap::new()),
            fetch_delay: None,
            fail_next_listing: Mutex::new(false),
        }
    }

    /// Makes the next listing call fail with a transient error.
    pub fn fail_next_listing(&self) {
        *self.fail_next_listing.lock().unwrap() = true;
    }

    /// Simulates per-fetch upstream latency.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Makes a transaction fetchable.
    pub fn insert_tx(&self, txid: &str, weight: u64, fee: Option<u64>) {
        self.txs
            .lock()
            .unwrap()
            .insert(txid.to_string(), sample_raw_tx(txid, weight, fee));
    }

    /// Makes a transaction unfetchable (evicted upstream).
    pub fn remove_tx(&self, txid: &str) {
        self.txs.lock().unwrap().remove(txid);
    }
}

#[async_trait]
impl MempoolBackend for ScriptedBackend {
    async fn list_pending_ids(&self) -> Result<Vec<String>> {
        let mut fail = self.fail_next_listing.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(eyre!("scripted listing failure"));
        }
        drop(fail);

        let mut listings = self.listings.lock().unwrap();
        if listings.len() > 1 {
            Ok(listings.pop_front().unwrap_or_default())
        } else {
            Ok(listings.front().cloned().unwrap_or_default())
        }
    }

    async fn get_transaction(&self, txid: &str) -> Result<Option<RawTransaction>> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.txs.lock().unwrap().get(txid).cloned())
    }

    async fn get_mempool_info(&self) -> Result<MempoolInfo> {
        let listings = self.listings.lock().unwrap();
        let size = listings.front().map(|listing| listing.len()).unwrap_or(0);
        Ok(MempoolInfo {
            size: size as u64,
            bytes: 0,
        })
    }
}

/// Creates a sample RawTransaction with a canned payload.
pub fn sample_raw_tx(txid: &str, weight: u64, fee: Option<u64>) -> RawTransaction {
    RawTransaction {
        txid: txid.to_string(),
        weight,
        fee,
        value: 50_000,
        payload: serde_json::json!({ "txid": txid, "weight": weight }),
    }
}

/// Builds an engine with the default stripped projection.
pub fn test_engine(backend: Arc<ScriptedBackend>, config: SyncConfig) -> TestEngine {
    MempoolSync::new(
        backend,
        |tx: &TransactionExtended| StrippedTransaction::from(tx),
        config,
    )
    .expect("test config should be valid")
}

/// Records every observer callback as `(added ids, removed ids)`.
#[derive(Clone, Default)]
pub struct DiffLog {
    events: Arc<Mutex<Vec<(Vec<String>, Vec<String>)>>>,
}

impl DiffLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer closure that appends to this log.
    pub fn observer(
        &self,
    ) -> impl Fn(&Arc<MempoolCache>, &[TransactionExtended], &[TransactionExtended])
           + Send
           + Sync
           + 'static {
        let events = Arc::clone(&self.events);
        move |_, added, removed| {
            events.lock().unwrap().push((
                added.iter().map(|tx| tx.txid.clone()).collect(),
                removed.iter().map(|tx| tx.txid.clone()).collect(),
            ));
        }
    }

    pub fn events(&self) -> Vec<(Vec<String>, Vec<String>)> {
        self.events.lock().unwrap().clone()
    }
}

/// Synthetic txids `prefix0..prefixN`, handy for large scripted pools.
pub fn synth_ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}{:04}", prefix, i)).collect()
}
