//! Device identity lifecycle on the secure element.

use std::sync::Arc;

use ed25519_dalek::{Signer, SigningKey};
use seal_element::{ElementError, ElementSession, SecureKeyStore, KEY_LEN};
use seal_ledger::{LedgerError, TxSigner};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{AttestError, Result, Stage};
use crate::types::{DeviceIdentity, KeyRef, PublicKey};

/// Whether [`IdentityManager::generate`] may replace an existing identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Regeneration {
    /// Fail with [`AttestError::IdentityExists`] if an identity is stored.
    #[default]
    Refuse,
    /// Overwrite the stored key pair. Signatures by the old key can no
    /// longer be produced.
    Overwrite,
}

/// Owns the device's identity on a shared element session.
#[derive(Debug)]
pub struct IdentityManager<S: SecureKeyStore> {
    session: Arc<ElementSession<S>>,
    key_ref: KeyRef,
}

impl<S: SecureKeyStore> IdentityManager<S> {
    /// Manage the identity held by `session`.
    #[must_use]
    pub fn new(session: Arc<ElementSession<S>>) -> Self {
        Self {
            session,
            key_ref: KeyRef::default(),
        }
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &Arc<ElementSession<S>> {
        &self.session
    }

    /// Create a new identity from 32 bytes of element randomness and store it.
    ///
    /// This is destructive under [`Regeneration::Overwrite`]. Under
    /// [`Regeneration::Refuse`] it only proceeds if no identity is stored.
    pub fn generate(&self, regeneration: Regeneration) -> Result<DeviceIdentity> {
        if regeneration == Regeneration::Refuse {
            self.ensure_vacant()?;
        } else {
            warn!("overwriting device identity on the secure element");
        }

        // The session rejects short reads, so the copy cannot fail.
        let raw = Zeroizing::new(
            self.session
                .random(KEY_LEN as u8)
                .map_err(|e| AttestError::hardware(Stage::Generate, &e))?,
        );
        let mut seed = Zeroizing::new([0u8; KEY_LEN]);
        seed.copy_from_slice(&raw);
        let signing_key = SigningKey::from_bytes(&seed);
        let public = signing_key.verifying_key().to_bytes();

        self.session
            .save_key_pair(&public, &seed)
            .map_err(|e| AttestError::hardware(Stage::Generate, &e))?;

        let identity = DeviceIdentity {
            public_key: PublicKey::from_bytes(public),
            key_ref: self.key_ref,
        };
        info!(public_key = %identity.public_key, "device identity generated");
        Ok(identity)
    }

    /// Reconstruct the stored identity without regenerating it.
    pub fn load(&self) -> Result<DeviceIdentity> {
        let private = self.read_private_key()?;
        if private.iter().all(|b| *b == 0) {
            return Err(AttestError::IdentityNotFound(
                "protected storage holds no private key".to_string(),
            ));
        }

        let stored = self.session.public_key().map_err(not_found)?;
        if stored == [0u8; KEY_LEN] {
            return Err(AttestError::IdentityNotFound(
                "key slot holds no public key".to_string(),
            ));
        }

        let derived = SigningKey::from_bytes(&private).verifying_key().to_bytes();
        if derived != stored {
            return Err(AttestError::IdentityCorrupt(format!(
                "private key derives {} but the key slot holds {}",
                PublicKey::from_bytes(derived),
                PublicKey::from_bytes(stored)
            )));
        }

        let identity = DeviceIdentity {
            public_key: PublicKey::from_bytes(stored),
            key_ref: self.key_ref,
        };
        debug!(public_key = %identity.public_key, "device identity loaded");
        Ok(identity)
    }

    /// A ledger signer for `identity` backed by this element.
    #[must_use]
    pub fn signer(&self, identity: &DeviceIdentity) -> ElementSigner<S> {
        ElementSigner::new(Arc::clone(&self.session), *identity)
    }

    /// Fails unless both key locations were read and hold only zeros.
    ///
    /// Read errors are hardware faults here, never an empty slot.
    fn ensure_vacant(&self) -> Result<()> {
        let fault = |e: ElementError| AttestError::hardware(Stage::Generate, &e);
        let private = read_private_key(&self.session, self.key_ref).map_err(fault)?;
        let public = self.session.public_key().map_err(fault)?;
        if private.iter().all(|b| *b == 0) && public == [0u8; KEY_LEN] {
            return Ok(());
        }
        match self.load() {
            Ok(existing) => Err(AttestError::IdentityExists {
                public_key: existing.public_key.to_base58(),
            }),
            Err(AttestError::IdentityNotFound(reason)) => Err(AttestError::IdentityCorrupt(
                format!("partial key material on the element: {reason}"),
            )),
            Err(other) => Err(other),
        }
    }

    fn read_private_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        read_private_key(&self.session, self.key_ref).map_err(not_found)
    }
}

fn read_private_key<S: SecureKeyStore>(
    session: &ElementSession<S>,
    key_ref: KeyRef,
) -> std::result::Result<Zeroizing<[u8; KEY_LEN]>, ElementError> {
    let bytes = Zeroizing::new(session.read_protected(key_ref.offset, KEY_LEN as u16)?);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn not_found(err: ElementError) -> AttestError {
    match err {
        ElementError::Closed => AttestError::hardware(Stage::Load, &err),
        other => AttestError::IdentityNotFound(other.to_string()),
    }
}

/// Signs ledger transactions with the identity's key on the element.
///
/// The private key is read into a zeroized buffer for each signature and
/// dropped right after.
#[derive(Debug)]
pub struct ElementSigner<S: SecureKeyStore> {
    session: Arc<ElementSession<S>>,
    identity: DeviceIdentity,
}

impl<S: SecureKeyStore> ElementSigner<S> {
    /// Sign as `identity` using the key stored in `session`.
    #[must_use]
    pub const fn new(session: Arc<ElementSession<S>>, identity: DeviceIdentity) -> Self {
        Self { session, identity }
    }
}

impl<S: SecureKeyStore> TxSigner for ElementSigner<S> {
    fn public_key(&self) -> [u8; 32] {
        *self.identity.public_key.as_bytes()
    }

    fn sign(&self, message: &[u8]) -> seal_ledger::Result<[u8; 64]> {
        let private = read_private_key(&self.session, self.identity.key_ref)
            .map_err(|e| LedgerError::Signer(e.to_string()))?;
        let key = SigningKey::from_bytes(&private);
        if key.verifying_key().as_bytes() != self.identity.public_key.as_bytes() {
            return Err(LedgerError::Signer(format!(
                "stored key does not belong to identity {}",
                self.identity.public_key
            )));
        }
        Ok(Signer::sign(&key, message).to_bytes())
    }
}
