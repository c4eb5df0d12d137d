//! Error types for seal-attest.

use std::fmt;

use seal_element::ElementError;
use seal_ledger::LedgerError;
use serde::Serialize;
use thiserror::Error;

use crate::record::StoreError;

/// The step of an attestation or verification that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Creating a device key pair.
    Generate,
    /// Reading the device identity back.
    Load,
    /// Hashing a payload.
    Hash,
    /// Building the ledger transaction.
    Prepare,
    /// Signing the ledger transaction.
    Sign,
    /// Submitting to the ledger and waiting for commit.
    Submit,
    /// Writing the local record.
    Persist,
    /// Fetching a transaction from the ledger.
    Retrieve,
    /// Resolving a signer to a device or searching the ledger.
    Lookup,
}

impl Stage {
    /// Lowercase name of the stage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Load => "load",
            Self::Hash => "hash",
            Self::Prepare => "prepare",
            Self::Sign => "sign",
            Self::Submit => "submit",
            Self::Persist => "persist",
            Self::Retrieve => "retrieve",
            Self::Lookup => "lookup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in identity, attestation and verification.
///
/// A verification mismatch is not an error; it is reported through
/// [`VerificationStatus`](crate::VerificationStatus).
#[derive(Debug, Error)]
pub enum AttestError {
    /// The secure element failed; its state is suspect.
    #[error("secure element fault during {stage}: {reason}")]
    HardwareFault {
        /// Failing stage.
        stage: Stage,
        /// Element error text.
        reason: String,
    },

    /// No identity is stored on the element.
    #[error("no device identity: {0}")]
    IdentityNotFound(String),

    /// An identity exists and regeneration was not requested.
    #[error("device identity {public_key} already exists; regeneration must be requested explicitly")]
    IdentityExists {
        /// Base58 public key of the existing identity.
        public_key: String,
    },

    /// Stored key material does not form a consistent key pair.
    #[error("device identity is corrupt: {0}")]
    IdentityCorrupt(String),

    /// The ledger could not be reached or did not answer in time.
    ///
    /// When `tx_id` is set the transaction may have committed; re-query by
    /// content hash before resubmitting.
    #[error("ledger unavailable during {stage}{}: {reason}", pending_suffix(.tx_id.as_deref()))]
    LedgerUnavailable {
        /// Failing stage.
        stage: Stage,
        /// What went wrong.
        reason: String,
        /// Whether the request timed out.
        timed_out: bool,
        /// Transaction whose fate is unknown, if any.
        tx_id: Option<String>,
    },

    /// The ledger or the transaction builder refused the transaction.
    #[error("ledger rejected transaction during {stage}: {reason}")]
    LedgerRejected {
        /// Failing stage.
        stage: Stage,
        /// Rejection reason.
        reason: String,
    },

    /// The ledger committed but the local record could not be written.
    ///
    /// Ledger and local store have diverged and need manual reconciliation.
    #[error("transaction {tx_id} committed on the ledger but the local record was not persisted: {source}")]
    PartialCommit {
        /// Committed transaction.
        tx_id: String,
        /// Persistence failure.
        #[source]
        source: StoreError,
    },

    /// No ledger transaction with this id exists.
    #[error("transaction not found on ledger: {0}")]
    TransactionNotFound(String),

    /// A ledger transaction does not have the expected shape.
    #[error("malformed ledger transaction {tx_id}: {reason}")]
    MalformedTransaction {
        /// Offending transaction.
        tx_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The local record store failed.
    #[error("record store failure during {stage}: {source}")]
    Store {
        /// Failing stage.
        stage: Stage,
        /// Store error.
        #[source]
        source: StoreError,
    },
}

fn pending_suffix(tx_id: Option<&str>) -> String {
    tx_id.map_or_else(String::new, |id| format!(" (transaction {id} may have committed)"))
}

impl AttestError {
    /// Wrap an element error raised during `stage`.
    #[must_use]
    pub fn hardware(stage: Stage, err: &ElementError) -> Self {
        Self::HardwareFault {
            stage,
            reason: err.to_string(),
        }
    }

    /// Classify a ledger error raised during `stage`.
    ///
    /// `tx_id` names the transaction involved, if one exists yet.
    #[must_use]
    pub fn ledger(stage: Stage, err: LedgerError, tx_id: Option<&str>) -> Self {
        match err {
            LedgerError::Unavailable { reason, timed_out } => Self::LedgerUnavailable {
                stage,
                reason,
                timed_out,
                tx_id: tx_id.filter(|_| stage == Stage::Submit).map(str::to_string),
            },
            LedgerError::NotFound(id) => Self::TransactionNotFound(id),
            LedgerError::Rejected(reason) | LedgerError::Unsupported(reason) => {
                Self::LedgerRejected { stage, reason }
            }
            LedgerError::Malformed(reason) => Self::MalformedTransaction {
                tx_id: tx_id.unwrap_or("-").to_string(),
                reason,
            },
            LedgerError::Signer(reason) => Self::HardwareFault { stage, reason },
        }
    }

    /// Whether the caller may retry the operation.
    ///
    /// Only ledger outages are transient. Resubmitting after a timed-out
    /// submission needs a re-query first.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerUnavailable { .. })
    }

    /// Whether the process should stop using the element or the store.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::HardwareFault { .. } | Self::PartialCommit { .. })
    }

    /// The failing stage, when the error names one.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::HardwareFault { stage, .. }
            | Self::LedgerUnavailable { stage, .. }
            | Self::LedgerRejected { stage, .. }
            | Self::Store { stage, .. } => Some(*stage),
            Self::PartialCommit { .. } => Some(Stage::Persist),
            Self::IdentityNotFound(_) | Self::IdentityCorrupt(_) => Some(Stage::Load),
            Self::IdentityExists { .. } => Some(Stage::Generate),
            Self::TransactionNotFound(_) | Self::MalformedTransaction { .. } => {
                Some(Stage::Retrieve)
            }
        }
    }
}

/// Result type alias for attestation operations.
pub type Result<T> = std::result::Result<T, AttestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use seal_element::ElementOp;

    #[test]
    fn hardware_fault_names_stage() {
        let err = AttestError::hardware(
            Stage::Hash,
            &ElementError::Status {
                op: ElementOp::Hash,
                code: -1,
            },
        );
        assert!(err.to_string().starts_with("secure element fault during hash"));
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn submit_timeout_keeps_transaction_id() {
        let err = AttestError::ledger(
            Stage::Submit,
            LedgerError::Unavailable {
                reason: "deadline".to_string(),
                timed_out: true,
            },
            Some("abc"),
        );
        assert!(err.is_retryable());
        assert!(matches!(
            &err,
            AttestError::LedgerUnavailable { tx_id: Some(id), timed_out: true, .. } if id == "abc"
        ));
        assert!(err.to_string().contains("abc may have committed"));
    }

    #[test]
    fn ledger_not_found_is_transaction_not_found() {
        let err = AttestError::ledger(
            Stage::Retrieve,
            LedgerError::NotFound("nonexistent".to_string()),
            Some("nonexistent"),
        );
        assert!(matches!(err, AttestError::TransactionNotFound(id) if id == "nonexistent"));
    }

    #[test]
    fn signer_failure_is_hardware_fault() {
        let err = AttestError::ledger(Stage::Sign, LedgerError::Signer("closed".into()), None);
        assert_eq!(err.stage(), Some(Stage::Sign));
        assert!(err.is_fatal());
    }

    #[test]
    fn partial_commit_is_fatal_persist_failure() {
        let err = AttestError::PartialCommit {
            tx_id: "t1".to_string(),
            source: StoreError::AlreadyExists("t1".into()),
        };
        assert!(err.is_fatal());
        assert_eq!(err.stage(), Some(Stage::Persist));
    }
}
