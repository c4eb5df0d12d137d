//! Gateway speaking the BigchainDB HTTP API.

use std::time::Duration;

use futures::future::try_join_all;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::gateway::LedgerGateway;
use crate::model::{is_transaction_id, transaction_url, CommittedTx, SignedTx, TxBody};

/// Default number of asset matches fetched per search.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct AssetHit {
    id: String,
}

/// Ledger gateway over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: Client,
    base_url: String,
    search_limit: usize,
}

impl HttpLedger {
    /// Create a gateway for the node at `base_url`.
    ///
    /// `timeout` bounds every request, including waiting for commit.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable {
                reason: format!("failed to build HTTP client: {e}"),
                timed_out: false,
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
        })
    }

    /// Limit the number of asset matches fetched per search.
    #[must_use]
    pub const fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    /// The node's base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url)
    }

    async fn decode_body(response: Response) -> Result<CommittedTx> {
        let body: TxBody = response
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(format!("undecodable transaction: {e}")))?;
        CommittedTx::from_body(body)
    }
}

fn transport_error(err: &reqwest::Error) -> LedgerError {
    if err.is_decode() {
        return LedgerError::Malformed(err.to_string());
    }
    LedgerError::Unavailable {
        reason: err.to_string(),
        timed_out: err.is_timeout(),
    }
}

async fn status_error(response: Response, subject: &str) -> LedgerError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => LedgerError::NotFound(subject.to_string()),
        StatusCode::BAD_REQUEST => LedgerError::Rejected(text),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            LedgerError::Unavailable {
                reason: format!("{s}: {text}"),
                timed_out: s == StatusCode::GATEWAY_TIMEOUT,
            }
        }
        s => LedgerError::Malformed(format!("unexpected status {s}: {text}")),
    }
}

impl LedgerGateway for HttpLedger {
    async fn submit_and_await_commit(&self, tx: SignedTx) -> Result<CommittedTx> {
        let tx_id = tx.id().to_string();
        debug!(%tx_id, "submitting transaction");
        let response = self
            .client
            .post(self.endpoint("transactions"))
            .query(&[("mode", "commit")])
            .json(tx.body())
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            return Err(status_error(response, &tx_id).await);
        }
        let committed = Self::decode_body(response).await?;
        info!(
            tx_id = %committed.id,
            url = %transaction_url(&self.base_url, &committed.id),
            "transaction committed"
        );
        Ok(committed)
    }

    async fn retrieve(&self, tx_id: &str) -> Result<CommittedTx> {
        if !is_transaction_id(tx_id) {
            return Err(LedgerError::NotFound(tx_id.to_string()));
        }
        let response = self
            .client
            .get(self.endpoint(&format!("transactions/{tx_id}")))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            return Err(status_error(response, tx_id).await);
        }
        let committed = Self::decode_body(response).await?;
        if committed.id != tx_id {
            return Err(LedgerError::Malformed(format!(
                "asked for {tx_id}, ledger returned {}",
                committed.id
            )));
        }
        Ok(committed)
    }

    async fn search_assets(&self, query: &str) -> Result<Vec<CommittedTx>> {
        let limit = self.search_limit.to_string();
        let response = self
            .client
            .get(self.endpoint("assets"))
            .query(&[("search", query), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            return Err(status_error(response, query).await);
        }
        let hits: Vec<AssetHit> = response
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(format!("undecodable asset list: {e}")))?;
        debug!(query, matches = hits.len(), "asset search answered");

        try_join_all(hits.iter().map(|hit| self.retrieve(&hit.id))).await
    }
}
