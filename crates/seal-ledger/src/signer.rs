//! Transaction signing seam.

use ed25519_dalek::{Signer, SigningKey};

use crate::error::Result;

/// Something that can sign transaction messages for one public key.
///
/// Gateways only ever see this handle; how and where the private key is
/// held is up to the implementation.
pub trait TxSigner {
    /// The Ed25519 public key signatures verify against.
    fn public_key(&self) -> [u8; 32];

    /// Sign a 32-byte transaction message.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Signer`](crate::LedgerError::Signer) if no
    /// signature could be produced.
    fn sign(&self, message: &[u8]) -> Result<[u8; 64]>;
}

impl TxSigner for SigningKey {
    fn public_key(&self) -> [u8; 32] {
        self.verifying_key().to_bytes()
    }

    fn sign(&self, message: &[u8]) -> Result<[u8; 64]> {
        Ok(Signer::sign(self, message).to_bytes())
    }
}
