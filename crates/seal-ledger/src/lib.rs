//! # seal-ledger
//!
//! The narrow contract between the attestation core and the ledger network.
//!
//! This crate provides:
//!
//! - [`LedgerGateway`]: prepare, fulfill, submit, retrieve and search
//! - Transaction model: [`UnsignedTx`], [`SignedTx`], [`CommittedTx`]
//! - [`codec`]: BigchainDB 2.0 transaction ids, signing messages and
//!   Ed25519-SHA-256 crypto-conditions
//! - [`HttpLedger`]: gateway speaking the BigchainDB HTTP API
//! - [`MemoryLedger`]: in-process gateway for tests and offline use
//!
//! ## Quick Start
//!
//! ```rust
//! use ed25519_dalek::SigningKey;
//! use seal_ledger::{LedgerGateway, MemoryLedger, Operation, TxSigner};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), seal_ledger::LedgerError> {
//! let ledger = MemoryLedger::new();
//! let key = SigningKey::from_bytes(&[7u8; 32]);
//!
//! let asset = json!({"id": "batch-1", "sha": "00"});
//! let fields = asset.as_object().cloned().unwrap_or_default();
//! let unsigned = ledger.prepare(Operation::Create, &TxSigner::public_key(&key), fields, None)?;
//! let signed = ledger.fulfill(unsigned, &key)?;
//! let committed = ledger.submit_and_await_commit(signed).await?;
//!
//! let fetched = ledger.retrieve(&committed.id).await?;
//! assert_eq!(fetched.asset_str("id"), Some("batch-1"));
//! # Ok(())
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(demo()).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod gateway;
pub mod http;
pub mod memory;
pub mod model;
pub mod signer;

pub use error::{LedgerError, Result};
pub use gateway::LedgerGateway;
pub use http::HttpLedger;
pub use memory::MemoryLedger;
pub use model::{
    decode_public_key, encode_public_key, is_transaction_id, transaction_url, Asset,
    CommittedTx, Condition, Fulfills, Input, Operation, Output, SignedTx, TxBody, UnsignedTx,
};
pub use signer::TxSigner;
