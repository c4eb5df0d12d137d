//! Content hashing.

use std::fmt;
use std::sync::Arc;

use seal_element::{ElementError, ElementSession, SecureKeyStore};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::ContentHash;

/// Which primitive produced a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAnchor {
    /// Computed on the secure element.
    Hardware,
    /// Computed in software with the same algorithm.
    Software,
}

impl fmt::Display for HashAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware => f.write_str("hardware"),
            Self::Software => f.write_str("software"),
        }
    }
}

/// SHA-256 over payload bytes.
pub trait ContentHasher: Send + Sync {
    /// The trust anchor of hashes produced here.
    fn anchor(&self) -> HashAnchor;

    /// Hash `data`.
    fn hash(&self, data: &[u8]) -> Result<ContentHash, ElementError>;
}

impl<S: SecureKeyStore> ContentHasher for ElementSession<S> {
    fn anchor(&self) -> HashAnchor {
        HashAnchor::Hardware
    }

    fn hash(&self, data: &[u8]) -> Result<ContentHash, ElementError> {
        self.sha256(data).map(ContentHash::from_bytes)
    }
}

/// Software SHA-256, used when the element is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareHasher;

impl ContentHasher for SoftwareHasher {
    fn anchor(&self) -> HashAnchor {
        HashAnchor::Software
    }

    fn hash(&self, data: &[u8]) -> Result<ContentHash, ElementError> {
        Ok(ContentHash::from_bytes(Sha256::digest(data).into()))
    }
}

impl<H: ContentHasher + ?Sized> ContentHasher for Arc<H> {
    fn anchor(&self) -> HashAnchor {
        (**self).anchor()
    }

    fn hash(&self, data: &[u8]) -> Result<ContentHash, ElementError> {
        (**self).hash(data)
    }
}

impl<H: ContentHasher + ?Sized> ContentHasher for Box<H> {
    fn anchor(&self) -> HashAnchor {
        (**self).anchor()
    }

    fn hash(&self, data: &[u8]) -> Result<ContentHash, ElementError> {
        (**self).hash(data)
    }
}
