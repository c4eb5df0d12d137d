//! The ledger gateway contract.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::codec;
use crate::error::Result;
use crate::model::{CommittedTx, Operation, SignedTx, UnsignedTx};
use crate::signer::TxSigner;

/// Narrow contract the attestation core needs from a ledger.
///
/// Preparation and fulfillment are local computations with default
/// implementations; submission, retrieval and search talk to the network.
/// Gateways never retry on their own.
pub trait LedgerGateway: Send + Sync {
    /// Build an unsigned transaction owned by `signer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation is unsupported.
    fn prepare(
        &self,
        operation: Operation,
        signer: &[u8; 32],
        asset: Map<String, Value>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<UnsignedTx> {
        codec::prepare(operation, signer, asset, metadata)
    }

    /// Sign `tx` through `signer` and assign its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the signer does not own the inputs or fails.
    fn fulfill(&self, tx: UnsignedTx, signer: &dyn TxSigner) -> Result<SignedTx> {
        codec::fulfill(tx, signer)
    }

    /// Submit `tx` and wait until the ledger reports it committed.
    fn submit_and_await_commit(
        &self,
        tx: SignedTx,
    ) -> impl Future<Output = Result<CommittedTx>> + Send;

    /// Fetch a committed transaction by id.
    fn retrieve(&self, tx_id: &str) -> impl Future<Output = Result<CommittedTx>> + Send;

    /// Full-text search over asset data; returns the matching transactions.
    fn search_assets(&self, query: &str) -> impl Future<Output = Result<Vec<CommittedTx>>> + Send;
}

impl<L: LedgerGateway + ?Sized> LedgerGateway for Arc<L> {
    fn prepare(
        &self,
        operation: Operation,
        signer: &[u8; 32],
        asset: Map<String, Value>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<UnsignedTx> {
        (**self).prepare(operation, signer, asset, metadata)
    }

    fn fulfill(&self, tx: UnsignedTx, signer: &dyn TxSigner) -> Result<SignedTx> {
        (**self).fulfill(tx, signer)
    }

    fn submit_and_await_commit(
        &self,
        tx: SignedTx,
    ) -> impl Future<Output = Result<CommittedTx>> + Send {
        (**self).submit_and_await_commit(tx)
    }

    fn retrieve(&self, tx_id: &str) -> impl Future<Output = Result<CommittedTx>> + Send {
        (**self).retrieve(tx_id)
    }

    fn search_assets(&self, query: &str) -> impl Future<Output = Result<Vec<CommittedTx>>> + Send {
        (**self).search_assets(query)
    }
}
