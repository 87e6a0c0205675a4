//! Type definitions for mempool mirroring.

use serde::{Deserialize, Serialize};

/// Pending transaction as reported by the upstream node, before ingest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Transaction id (lowercase hex).
    pub txid: String,
    /// Consensus weight units.
    pub weight: u64,
    /// Fee in base units (None when the upstream omits it).
    pub fee: Option<u64>,
    /// Total output value in base units.
    pub value: u64,
    /// Opaque upstream JSON, passed through to consumers untouched.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Cached transaction with ingest-time derived fields.
///
/// `vsize` and `fee_per_vsize` are computed exactly once in
/// [`TransactionExtended::from_raw`] and never recomputed afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionExtended {
    /// Transaction id (lowercase hex).
    pub txid: String,
    /// Consensus weight units.
    pub weight: u64,
    /// Fee in base units (0 when the upstream omitted it).
    pub fee: u64,
    /// Virtual size: weight / 4.
    pub vsize: f64,
    /// Fee density in base units per virtual byte.
    pub fee_per_vsize: f64,
    /// Total output value in base units.
    pub value: u64,
    /// Local wall-clock seconds at ingest, not an upstream timestamp.
    pub first_seen: u64,
    /// Opaque upstream JSON, passed through to consumers untouched.
    pub payload: serde_json::Value,
}

impl TransactionExtended {
    /// Builds a cached transaction from the upstream shape.
    ///
    /// `fee_per_vsize` is 0 when the upstream omitted the fee or reported a
    /// zero weight.
    pub fn from_raw(raw: RawTransaction, first_seen: u64) -> Self {
        let vsize = raw.weight as f64 / 4.0;
        let fee = raw.fee.unwrap_or(0);
        let fee_per_vsize = if raw.fee.is_none() || raw.weight == 0 {
            0.0
        } else {
            fee as f64 / vsize
        };

        Self {
            txid: raw.txid,
            weight: raw.weight,
            fee,
            vsize,
            fee_per_vsize,
            value: raw.value,
            first_seen,
            payload: raw.payload,
        }
    }
}

/// Projection of a cached transaction kept in the latest-arrivals list and
/// handed to broadcast consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrippedTransaction {
    /// Transaction id (lowercase hex).
    pub txid: String,
    /// Fee in base units.
    pub fee: u64,
    /// Virtual size.
    pub vsize: f64,
    /// Total output value in base units.
    pub value: u64,
}

impl From<&TransactionExtended> for StrippedTransaction {
    fn from(tx: &TransactionExtended) -> Self {
        Self {
            txid: tx.txid.clone(),
            fee: tx.fee,
            vsize: tx.vsize,
            value: tx.value,
        }
    }
}

/// The pool's self-reported size summary, replaced atomically on refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolInfo {
    /// Number of pending transactions.
    pub size: u64,
    /// Pool virtual size in bytes.
    pub bytes: u64,
}
