//! Error types for seal-ledger.

use thiserror::Error;

/// Errors that can occur when talking to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger could not be reached or did not answer in time.
    ///
    /// A timed-out submission may still have committed.
    #[error("ledger unavailable{}: {reason}", timeout_suffix(.timed_out))]
    Unavailable {
        /// What went wrong.
        reason: String,
        /// Whether the request timed out rather than failed outright.
        timed_out: bool,
    },

    /// No transaction with this id exists on the ledger.
    #[error("transaction not found: {0}")]
    NotFound(String),

    /// The ledger refused the transaction.
    #[error("ledger rejected transaction: {0}")]
    Rejected(String),

    /// The ledger answered with data that does not match the transaction schema.
    #[error("malformed ledger data: {0}")]
    Malformed(String),

    /// The operation is not supported by this gateway.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The signer could not produce a signature.
    #[error("signing failed: {0}")]
    Signer(String),
}

fn timeout_suffix(timed_out: &bool) -> &'static str {
    if *timed_out { " (timed out)" } else { "" }
}

impl LedgerError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_display_mentions_timeout() {
        let err = LedgerError::Unavailable {
            reason: "no answer".to_string(),
            timed_out: true,
        };
        assert_eq!(err.to_string(), "ledger unavailable (timed out): no answer");

        let err = LedgerError::Unavailable {
            reason: "connection refused".to_string(),
            timed_out: false,
        };
        assert_eq!(err.to_string(), "ledger unavailable: connection refused");
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(LedgerError::Unavailable {
            reason: String::new(),
            timed_out: false
        }
        .is_transient());
        assert!(!LedgerError::NotFound("x".to_string()).is_transient());
        assert!(!LedgerError::Rejected("x".to_string()).is_transient());
    }
}
