//! mempool-sync: live reconciliation of a node's pending-transaction pool.
//!
//! Polls a [`mempool_data::MempoolBackend`] for the current pending set,
//! maintains an in-memory mirror with arrival-rate statistics, and notifies
//! a registered observer about every change.

pub mod config;
pub mod engine;
pub mod latch;
pub mod latest;
pub mod rate;

pub use config::{FlushProtectionConfig, SyncConfig};
pub use engine::{ChangeObserver, MempoolCache, MempoolSync};
pub use rate::RateEstimate;
