//! CLI error types.

use std::fmt;

use seal_attest::AttestError;
use seal_element::ElementError;

/// Exit code of a successful run or a verified match.
pub const EXIT_SUCCESS: u8 = 0;

/// Exit code of a failed run.
pub const EXIT_FAILURE: u8 = 1;

/// Exit code when verification found a mismatch.
pub const EXIT_MISMATCH: u8 = 2;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Invalid configuration.
    Config(String),
    /// Invalid argument.
    InvalidArgument(String),
    /// Command refused to proceed.
    Command(String),
    /// The secure element could not be opened or closed.
    Element(ElementError),
    /// Identity, attestation or verification failed.
    Attest(AttestError),
    /// Verification completed and found mismatches.
    Mismatch(usize),
    /// Output formatting error.
    Format(String),
    /// IO error.
    Io(std::io::Error),
}

impl CliError {
    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Mismatch(_) => EXIT_MISMATCH,
            _ => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Command(msg) => write!(f, "command error: {msg}"),
            Self::Element(e) => write!(f, "secure element error: {e}"),
            Self::Attest(e) => write!(f, "{e}"),
            Self::Mismatch(1) => write!(f, "verification failed: 1 attestation does not match"),
            Self::Mismatch(n) => write!(f, "verification failed: {n} attestations do not match"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Element(e) => Some(e),
            Self::Attest(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ElementError> for CliError {
    fn from(err: ElementError) -> Self {
        Self::Element(err)
    }
}

impl From<AttestError> for CliError {
    fn from(err: AttestError) -> Self {
        Self::Attest(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_has_its_own_exit_code() {
        assert_eq!(CliError::Mismatch(3).exit_code(), EXIT_MISMATCH);
        assert_eq!(CliError::Config("x".into()).exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn mismatch_display_counts() {
        assert_eq!(
            CliError::Mismatch(1).to_string(),
            "verification failed: 1 attestation does not match"
        );
        assert_eq!(
            CliError::Mismatch(2).to_string(),
            "verification failed: 2 attestations do not match"
        );
    }

    #[test]
    fn attest_error_keeps_its_message() {
        let err = CliError::from(AttestError::TransactionNotFound("abc".into()));
        assert_eq!(err.to_string(), "transaction not found on ledger: abc");
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert!(matches!(CliError::from(io_err), CliError::Io(_)));
    }
}
