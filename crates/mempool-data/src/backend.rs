//! Upstream node contract consumed by the sync engine.
//!
//! The engine assumes no ordering or consistency guarantees across these
//! calls; upstream state may evolve while a pass is in flight.

use async_trait::async_trait;
use eyre::Result;

use crate::types::{MempoolInfo, RawTransaction};

/// Read-only view of a node's pending-transaction pool.
#[async_trait]
pub trait MempoolBackend: Send + Sync {
    /// Lists the ids of all currently pending transactions, unordered.
    async fn list_pending_ids(&self) -> Result<Vec<String>>;

    /// Fetches a single pending transaction.
    ///
    /// Returns `Ok(None)` when the transaction is no longer in the pool,
    /// which happens routinely between listing and fetch.
    async fn get_transaction(&self, txid: &str) -> Result<Option<RawTransaction>>;

    /// The pool's self-reported size summary.
    async fn get_mempool_info(&self) -> Result<MempoolInfo>;
}
