//! Esplora REST backend for the mempool mirror.
//!
//! Talks to an esplora-compatible HTTP endpoint (`GET /mempool/txids`,
//! `GET /tx/:txid`, `GET /mempool`) and maps responses to mempool-data
//! schema types.

use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::backend::MempoolBackend;
use crate::types::{MempoolInfo, RawTransaction};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Esplora mempool summary (`GET /mempool`).
#[derive(Debug, Deserialize)]
struct EsploraMempool {
    count: u64,
    vsize: u64,
}

/// Fields read out of an esplora `GET /tx/:txid` body. The full body is kept
/// as the opaque payload.
#[derive(Debug, Deserialize)]
struct EsploraTx {
    txid: String,
    weight: u64,
    #[serde(default)]
    fee: Option<u64>,
    #[serde(default)]
    vout: Vec<EsploraVout>,
}

#[derive(Debug, Deserialize)]
struct EsploraVout {
    #[serde(default)]
    value: u64,
}

/// HTTP client for an esplora-compatible node endpoint.
pub struct EsploraBackend {
    client: reqwest::Client,
    base_url: String,
}

impl EsploraBackend {
    /// Creates a backend and probes the endpoint for connectivity.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or the probe request
    /// fails.
    #[tracing::instrument(skip_all, fields(base_url = %base_url))]
    pub async fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build HTTP client")?;

        let backend = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        };

        let info = backend
            .get_mempool_info()
            .await
            .wrap_err("failed to probe esplora endpoint")?;

        tracing::info!(
            base_url = %backend.base_url,
            pending = info.size,
            "esplora connection successful"
        );

        Ok(backend)
    }
}

/// Extracts the mirror's transaction shape from an esplora `/tx/:txid` body.
///
/// `value` is the sum of all output values. The body itself travels along as
/// the opaque payload.
fn raw_from_json(body: serde_json::Value) -> Result<RawTransaction> {
    let tx: EsploraTx = serde_json::from_value(body.clone())
        .wrap_err("unexpected transaction shape from esplora")?;

    let value = tx.vout.iter().map(|vout| vout.value).sum();

    Ok(RawTransaction {
        txid: tx.txid,
        weight: tx.weight,
        fee: tx.fee,
        value,
        payload: body,
    })
}

#[async_trait]
impl MempoolBackend for EsploraBackend {
    async fn list_pending_ids(&self) -> Result<Vec<String>> {
        let url = format!("{}/mempool/txids", self.base_url);

        let ids: Vec<String> = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err("failed to list pending transaction ids")?
            .error_for_status()
            .wrap_err("mempool txid listing returned an error status")?
            .json()
            .await
            .wrap_err("failed to decode mempool txid listing")?;

        Ok(ids)
    }

    async fn get_transaction(&self, txid: &str) -> Result<Option<RawTransaction>> {
        let url = format!("{}/tx/{}", self.base_url, txid);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err_with(|| format!("failed to fetch transaction {}", txid))?;

        // Evicted between listing and fetch.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: serde_json::Value = response
            .error_for_status()
            .wrap_err_with(|| format!("transaction fetch for {} returned an error status", txid))?
            .json()
            .await
            .wrap_err_with(|| format!("failed to decode transaction {}", txid))?;

        raw_from_json(body).map(Some)
    }

    async fn get_mempool_info(&self) -> Result<MempoolInfo> {
        let url = format!("{}/mempool", self.base_url);

        let summary: EsploraMempool = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err("failed to fetch mempool summary")?
            .error_for_status()
            .wrap_err("mempool summary returned an error status")?
            .json()
            .await
            .wrap_err("failed to decode mempool summary")?;

        Ok(MempoolInfo {
            size: summary.count,
            bytes: summary.vsize,
        })
    }
}
