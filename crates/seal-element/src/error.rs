//! Error types for seal-element.

use thiserror::Error;

/// The secure element operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementOp {
    /// Opening the channel to the element.
    Init,
    /// Random number generation.
    Random,
    /// Storing the device key pair.
    SaveKeyPair,
    /// Reading the public key from its key slot.
    PublicKey,
    /// Reading protected storage.
    ReadProtected,
    /// Writing protected storage.
    WriteProtected,
    /// On-chip SHA-256.
    Hash,
    /// Releasing the channel.
    Close,
}

impl ElementOp {
    /// Get the operation as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Random => "get_random",
            Self::SaveKeyPair => "save_key_pair",
            Self::PublicKey => "get_public_key",
            Self::ReadProtected => "read_protected",
            Self::WriteProtected => "write_protected",
            Self::Hash => "hash",
            Self::Close => "close",
        }
    }
}

impl std::fmt::Display for ElementOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while talking to the secure element.
///
/// Every variant is a total failure of the call that produced it.
#[derive(Debug, Error)]
pub enum ElementError {
    /// The element returned a non-zero status.
    #[error("secure element {op} failed with status {code}")]
    Status {
        /// The failing operation.
        op: ElementOp,
        /// Raw status code reported by the element.
        code: i32,
    },

    /// The vendor library could not be loaded or is missing a symbol.
    #[error("secure element library unavailable: {0}")]
    Library(String),

    /// The session has already been released.
    #[error("secure element session is closed")]
    Closed,

    /// The input exceeds what the element accepts in a single call.
    #[error("secure element {op}: input of {len} bytes exceeds limit of {max}")]
    InputTooLong {
        /// The failing operation.
        op: ElementOp,
        /// Length that was requested.
        len: usize,
        /// Maximum the element accepts.
        max: usize,
    },

    /// The requested protected-storage range is outside the element's area.
    #[error("secure element {op}: range {offset}..{end} is out of bounds")]
    OutOfBounds {
        /// The failing operation.
        op: ElementOp,
        /// Start offset.
        offset: usize,
        /// Exclusive end offset.
        end: usize,
    },

    /// The element returned data of an unexpected shape.
    #[error("secure element {op} returned {actual} bytes, expected {expected}")]
    UnexpectedLength {
        /// The failing operation.
        op: ElementOp,
        /// Expected number of bytes.
        expected: usize,
        /// Number of bytes actually returned.
        actual: usize,
    },

    /// Persisted simulator state could not be read or written.
    #[error("simulator state error: {0}")]
    State(String),
}

/// Result type alias for secure element operations.
pub type Result<T> = std::result::Result<T, ElementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_names_operation() {
        let err = ElementError::Status {
            op: ElementOp::Hash,
            code: 3,
        };
        assert_eq!(err.to_string(), "secure element hash failed with status 3");
    }

    #[test]
    fn input_too_long_display() {
        let err = ElementError::InputTooLong {
            op: ElementOp::Hash,
            len: 300,
            max: 255,
        };
        assert_eq!(
            err.to_string(),
            "secure element hash: input of 300 bytes exceeds limit of 255"
        );
    }

    #[test]
    fn op_display_matches_as_str() {
        assert_eq!(ElementOp::SaveKeyPair.to_string(), "save_key_pair");
        assert_eq!(ElementOp::Random.to_string(), "get_random");
    }
}
