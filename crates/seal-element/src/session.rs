//! Scoped access to the secure element.
//!
//! The element sits on an exclusive channel (typically an I2C bus), so a
//! process opens exactly one [`ElementSession`], shares it by reference and
//! releases it when done. Release happens through [`ElementSession::close`]
//! or, on any other exit path, when the session is dropped.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ElementError, Result};
use crate::store::{SecureKeyStore, DIGEST_LEN, KEY_LEN};

/// An open session on a secure element.
///
/// Every call locks the underlying store, so concurrent callers are
/// serialised and the store never sees reentrant use.
pub struct ElementSession<S: SecureKeyStore> {
    store: Mutex<Option<S>>,
}

impl<S: SecureKeyStore> ElementSession<S> {
    /// Initialise `store` and take ownership of it.
    ///
    /// # Errors
    ///
    /// Returns the element's error if `init` fails; the store is dropped
    /// without being closed since it was never opened.
    pub fn open(mut store: S) -> Result<Self> {
        store.init()?;
        info!("secure element session opened");
        Ok(Self {
            store: Mutex::new(Some(store)),
        })
    }

    /// Whether the session has not been closed yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.store.lock().is_some()
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        let mut guard = self.store.lock();
        let store = guard.as_mut().ok_or(ElementError::Closed)?;
        f(store)
    }

    /// Draw `len` random bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the element fails or the session is closed.
    pub fn random(&self, len: u8) -> Result<Vec<u8>> {
        let bytes = self.with_store(|s| s.random(len))?;
        if bytes.len() != usize::from(len) {
            return Err(ElementError::UnexpectedLength {
                op: crate::ElementOp::Random,
                expected: usize::from(len),
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    /// Store the device key pair, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the element fails or the session is closed.
    pub fn save_key_pair(&self, public: &[u8; KEY_LEN], private: &[u8; KEY_LEN]) -> Result<()> {
        self.with_store(|s| s.save_key_pair(public, private))
    }

    /// Read the device public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the element fails or the session is closed.
    pub fn public_key(&self) -> Result<[u8; KEY_LEN]> {
        self.with_store(SecureKeyStore::public_key)
    }

    /// Read protected storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the element fails or the session is closed.
    pub fn read_protected(&self, offset: u16, len: u16) -> Result<Vec<u8>> {
        let bytes = self.with_store(|s| s.read_protected(offset, len))?;
        if bytes.len() != usize::from(len) {
            return Err(ElementError::UnexpectedLength {
                op: crate::ElementOp::ReadProtected,
                expected: usize::from(len),
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    /// Write protected storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the element fails or the session is closed.
    pub fn write_protected(&self, offset: u16, data: &[u8]) -> Result<()> {
        self.with_store(|s| s.write_protected(offset, data))
    }

    /// Hash `data` on the element.
    ///
    /// # Errors
    ///
    /// Returns an error if the element fails or the session is closed.
    pub fn sha256(&self, data: &[u8]) -> Result<[u8; DIGEST_LEN]> {
        self.with_store(|s| s.sha256(data))
    }

    /// Release the element.
    ///
    /// Closing an already closed session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the element's error if releasing the channel fails. The
    /// session counts as closed either way.
    pub fn close(&self) -> Result<()> {
        let taken = self.store.lock().take();
        match taken {
            Some(mut store) => {
                store.close()?;
                info!("secure element session closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<S: SecureKeyStore> Drop for ElementSession<S> {
    fn drop(&mut self) {
        if let Some(mut store) = self.store.get_mut().take() {
            match store.close() {
                Ok(()) => debug!("secure element session released on drop"),
                Err(e) => warn!(error = %e, "failed to release secure element on drop"),
            }
        }
    }
}

impl<S: SecureKeyStore> std::fmt::Debug for ElementSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementSession")
            .field("open", &self.is_open())
            .finish()
    }
}
