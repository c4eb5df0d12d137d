//! # seal-attest
//!
//! Hardware-anchored attestation of data on a ledger.
//!
//! This crate provides:
//!
//! - [`IdentityManager`]: the device's single key pair on the secure element
//! - [`AttestationService`]: hashes a payload on the element, anchors the
//!   hash in a signed ledger transaction and keeps the payload locally
//! - [`VerificationEngine`]: three-way reconciliation of the local record,
//!   the ledger anchor and a freshly recomputed hash
//! - [`RecordStore`]: the append-only local record directory
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use seal_attest::{
//!     AttestRequest, AttestationService, IdentityManager, RecordStore, Regeneration,
//!     VerificationEngine,
//! };
//! use seal_element::{ElementSession, SimulatedElement};
//! use seal_ledger::MemoryLedger;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let session = Arc::new(ElementSession::open(SimulatedElement::new())?);
//! let identity = IdentityManager::new(Arc::clone(&session)).generate(Regeneration::Refuse)?;
//!
//! let ledger = Arc::new(MemoryLedger::new());
//! let records = RecordStore::open(dir.path())?;
//! let service = AttestationService::new(Arc::clone(&session), Arc::clone(&ledger), records.clone());
//! let record = service
//!     .attest(&identity, b"hello", AttestRequest::new("lot-1"))
//!     .await?;
//!
//! let engine = VerificationEngine::new(ledger, records, Arc::clone(&session));
//! let result = engine.verify(&record.tx_id).await?;
//! assert!(result.status.is_match());
//! assert_eq!(result.signer_public_key, identity.public_key);
//!
//! session.close()?;
//! # Ok(())
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(demo()).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attest;
pub mod device;
pub mod error;
pub mod hash;
pub mod identity;
pub mod record;
pub mod types;
pub mod verify;

pub use attest::{query_subject, AttestRequest, AttestationService, HASH_KEY, SUBJECT_KEY};
pub use device::{lookup_device, DeviceProfile, RegisteredDevice};
pub use error::{AttestError, Result, Stage};
pub use hash::{ContentHasher, HashAnchor, SoftwareHasher};
pub use identity::{ElementSigner, IdentityManager, Regeneration};
pub use record::{AttestationRecord, RecordStore, StoreError};
pub use types::{ContentHash, DeviceIdentity, KeyRef, PublicKey};
pub use verify::{
    CheckOutcome, Divergence, VerificationEngine, VerificationResult, VerificationStatus,
    DEFAULT_CHECK_CONCURRENCY,
};
