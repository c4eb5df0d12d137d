//! In-process ledger.
//!
//! [`MemoryLedger`] validates and stores transactions like a ledger node
//! would, and exposes hooks to simulate outages, timeouts after commit and
//! tampering with anchored data.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::codec;
use crate::error::{LedgerError, Result};
use crate::gateway::LedgerGateway;
use crate::model::{CommittedTx, SignedTx, TxBody};

#[derive(Debug, Default)]
struct MemoryState {
    transactions: BTreeMap<String, TxBody>,
    order: Vec<String>,
    failing_submits: usize,
    failing_searches: usize,
    timeouts_after_commit: usize,
}

/// Ledger held in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    /// Whether no transaction has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject the next `count` submissions as unavailable without committing.
    pub fn fail_next_submits(&self, count: usize) {
        self.state.lock().failing_submits = count;
    }

    /// Fail the next `count` asset searches as unavailable.
    pub fn fail_next_searches(&self, count: usize) {
        self.state.lock().failing_searches = count;
    }

    /// Commit the next `count` submissions but report them as timed out.
    pub fn commit_then_time_out(&self, count: usize) {
        self.state.lock().timeouts_after_commit = count;
    }

    /// Overwrite a field of an anchored asset in place.
    ///
    /// Returns `false` if the transaction does not exist or carries no data.
    pub fn overwrite_asset_field(&self, tx_id: &str, key: &str, value: Value) -> bool {
        let mut state = self.state.lock();
        let Some(data) = state
            .transactions
            .get_mut(tx_id)
            .and_then(|body| body.asset.data.as_mut())
        else {
            return false;
        };
        data.insert(key.to_string(), value);
        true
    }

    /// Drop a transaction, as if it had never been committed.
    pub fn forget(&self, tx_id: &str) -> bool {
        let mut state = self.state.lock();
        state.order.retain(|id| id != tx_id);
        state.transactions.remove(tx_id).is_some()
    }

    fn commit(&self, body: TxBody) -> Result<CommittedTx> {
        codec::validate_signed(&body)?;
        let mut state = self.state.lock();
        if state.failing_submits > 0 {
            state.failing_submits -= 1;
            return Err(LedgerError::Unavailable {
                reason: "simulated outage".to_string(),
                timed_out: false,
            });
        }

        let committed = CommittedTx::from_body(body.clone())?;
        if state.transactions.contains_key(&committed.id) {
            return Err(LedgerError::Rejected(format!(
                "transaction {} already committed",
                committed.id
            )));
        }
        state.order.push(committed.id.clone());
        state.transactions.insert(committed.id.clone(), body);
        debug!(tx_id = %committed.id, "transaction committed in memory");

        if state.timeouts_after_commit > 0 {
            state.timeouts_after_commit -= 1;
            return Err(LedgerError::Unavailable {
                reason: "simulated timeout after commit".to_string(),
                timed_out: true,
            });
        }
        Ok(committed)
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        Value::Object(map) => map.values().any(|v| contains_text(v, needle)),
        Value::Number(n) => n.to_string().contains(needle),
        Value::Bool(_) | Value::Null => false,
    }
}

impl LedgerGateway for MemoryLedger {
    async fn submit_and_await_commit(&self, tx: SignedTx) -> Result<CommittedTx> {
        self.commit(tx.into_body())
    }

    async fn retrieve(&self, tx_id: &str) -> Result<CommittedTx> {
        let state = self.state.lock();
        let body = state
            .transactions
            .get(tx_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(tx_id.to_string()))?;
        CommittedTx::from_body(body)
    }

    async fn search_assets(&self, query: &str) -> Result<Vec<CommittedTx>> {
        let needle = query.to_lowercase();
        let mut state = self.state.lock();
        if state.failing_searches > 0 {
            state.failing_searches -= 1;
            return Err(LedgerError::Unavailable {
                reason: "simulated search outage".to_string(),
                timed_out: false,
            });
        }
        state
            .order
            .iter()
            .filter_map(|id| state.transactions.get(id))
            .filter(|body| {
                body.asset
                    .data
                    .as_ref()
                    .is_some_and(|data| data.values().any(|v| contains_text(v, &needle)))
            })
            .map(|body| CommittedTx::from_body(body.clone()))
            .collect()
    }
}
