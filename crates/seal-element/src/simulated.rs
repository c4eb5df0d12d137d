//! Software secure element for development and tests.
//!
//! [`SimulatedElement`] behaves like the hardware module: a key slot for
//! the public key, a zero-initialised protected area, an RNG and SHA-256.
//! State can optionally be persisted to a JSON file so identities survive
//! process restarts. A [`SimulatorControl`] handle injects faults and counts
//! lifecycle calls.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ElementError, ElementOp, Result};
use crate::store::{SecureKeyStore, DIGEST_LEN, KEY_LEN, PRIVATE_KEY_OFFSET};

/// Size of the simulated protected storage area in bytes.
pub const PROTECTED_SIZE: usize = 1024;

/// Status code reported for injected faults.
pub const FAULT_STATUS: i32 = -1;

/// Status code reported when the element is used before `init`.
pub const NOT_INITIALISED_STATUS: i32 = -2;

#[derive(Debug, Default)]
struct ControlInner {
    faults: Mutex<HashSet<ElementOp>>,
    init_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

/// Handle for steering a [`SimulatedElement`] after it has been moved into
/// a session.
#[derive(Debug, Clone, Default)]
pub struct SimulatorControl {
    inner: Arc<ControlInner>,
}

impl SimulatorControl {
    /// Make every subsequent call of `op` fail with [`FAULT_STATUS`].
    pub fn fail(&self, op: ElementOp) {
        self.inner.faults.lock().insert(op);
    }

    /// Stop failing `op`.
    pub fn recover(&self, op: ElementOp) {
        self.inner.faults.lock().remove(&op);
    }

    /// Number of `init` calls seen.
    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.inner.init_calls.load(Ordering::SeqCst)
    }

    /// Number of `close` calls seen.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    fn check(&self, op: ElementOp) -> Result<()> {
        if self.inner.faults.lock().contains(&op) {
            return Err(ElementError::Status {
                op,
                code: FAULT_STATUS,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    public_key: Option<String>,
    protected: String,
}

/// A software implementation of [`SecureKeyStore`].
#[derive(Debug)]
pub struct SimulatedElement {
    public_key: Option<[u8; KEY_LEN]>,
    protected: Vec<u8>,
    state_path: Option<PathBuf>,
    initialised: bool,
    control: SimulatorControl,
}

impl Default for SimulatedElement {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedElement {
    /// Create an ephemeral element with empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            public_key: None,
            protected: vec![0; PROTECTED_SIZE],
            state_path: None,
            initialised: false,
            control: SimulatorControl::default(),
        }
    }

    /// Create an element whose storage is loaded from and saved to `path`.
    ///
    /// The file is read on `init` and rewritten after every storage write.
    #[must_use]
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: Some(path.into()),
            ..Self::new()
        }
    }

    /// Get a control handle for fault injection and call counting.
    #[must_use]
    pub fn control(&self) -> SimulatorControl {
        self.control.clone()
    }

    fn ensure_ready(&self, op: ElementOp) -> Result<()> {
        self.control.check(op)?;
        if !self.initialised {
            return Err(ElementError::Status {
                op,
                code: NOT_INITIALISED_STATUS,
            });
        }
        Ok(())
    }

    fn range(op: ElementOp, offset: u16, len: usize) -> Result<std::ops::Range<usize>> {
        let start = usize::from(offset);
        let end = start + len;
        if end > PROTECTED_SIZE {
            return Err(ElementError::OutOfBounds {
                op,
                offset: start,
                end,
            });
        }
        Ok(start..end)
    }

    fn load_state(path: &Path) -> Result<Option<PersistedState>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            ElementError::State(format!("failed to read '{}': {e}", path.display()))
        })?;
        let state = serde_json::from_str(&content).map_err(|e| {
            ElementError::State(format!("invalid state in '{}': {e}", path.display()))
        })?;
        Ok(Some(state))
    }

    fn apply_state(&mut self, state: &PersistedState) -> Result<()> {
        let protected = hex::decode(&state.protected)
            .map_err(|e| ElementError::State(format!("invalid protected area: {e}")))?;
        if protected.len() != PROTECTED_SIZE {
            return Err(ElementError::State(format!(
                "protected area is {} bytes, expected {PROTECTED_SIZE}",
                protected.len()
            )));
        }
        let public_key = match &state.public_key {
            Some(encoded) => {
                let bytes = hex::decode(encoded)
                    .map_err(|e| ElementError::State(format!("invalid public key: {e}")))?;
                let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
                    ElementError::State("public key must be 32 bytes".to_string())
                })?;
                Some(key)
            }
            None => None,
        };
        self.protected = protected;
        self.public_key = public_key;
        Ok(())
    }

    fn save_state(&self) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let state = PersistedState {
            public_key: self.public_key.map(hex::encode),
            protected: hex::encode(&self.protected),
        };
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| ElementError::State(format!("failed to encode state: {e}")))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ElementError::State(format!("failed to create '{}': {e}", parent.display()))
                })?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, path))
            .map_err(|e| {
                ElementError::State(format!("failed to write '{}': {e}", path.display()))
            })?;
        debug!(path = %path.display(), "simulator state saved");
        Ok(())
    }
}

impl SecureKeyStore for SimulatedElement {
    fn init(&mut self) -> Result<()> {
        self.control.inner.init_calls.fetch_add(1, Ordering::SeqCst);
        self.control.check(ElementOp::Init)?;
        if let Some(path) = self.state_path.clone() {
            if let Some(state) = Self::load_state(&path)? {
                self.apply_state(&state)?;
                debug!(path = %path.display(), "simulator state loaded");
            }
        }
        self.initialised = true;
        Ok(())
    }

    fn random(&mut self, len: u8) -> Result<Vec<u8>> {
        self.ensure_ready(ElementOp::Random)?;
        let mut bytes = vec![0u8; usize::from(len)];
        OsRng.fill_bytes(&mut bytes);
        Ok(bytes)
    }

    fn save_key_pair(&mut self, public: &[u8; KEY_LEN], private: &[u8; KEY_LEN]) -> Result<()> {
        self.ensure_ready(ElementOp::SaveKeyPair)?;
        let range = Self::range(ElementOp::SaveKeyPair, PRIVATE_KEY_OFFSET, KEY_LEN)?;
        let previous_key = self.public_key.replace(*public);
        let previous_bytes = self.protected[range.clone()].to_vec();
        self.protected[range.clone()].copy_from_slice(private);
        if let Err(e) = self.save_state() {
            self.public_key = previous_key;
            self.protected[range].copy_from_slice(&previous_bytes);
            return Err(e);
        }
        Ok(())
    }

    fn public_key(&mut self) -> Result<[u8; KEY_LEN]> {
        self.ensure_ready(ElementOp::PublicKey)?;
        Ok(self.public_key.unwrap_or([0; KEY_LEN]))
    }

    fn read_protected(&mut self, offset: u16, len: u16) -> Result<Vec<u8>> {
        self.ensure_ready(ElementOp::ReadProtected)?;
        let range = Self::range(ElementOp::ReadProtected, offset, usize::from(len))?;
        Ok(self.protected[range].to_vec())
    }

    fn write_protected(&mut self, offset: u16, data: &[u8]) -> Result<()> {
        self.ensure_ready(ElementOp::WriteProtected)?;
        let range = Self::range(ElementOp::WriteProtected, offset, data.len())?;
        let previous = self.protected[range.clone()].to_vec();
        self.protected[range.clone()].copy_from_slice(data);
        if let Err(e) = self.save_state() {
            self.protected[range].copy_from_slice(&previous);
            return Err(e);
        }
        Ok(())
    }

    fn sha256(&mut self, data: &[u8]) -> Result<[u8; DIGEST_LEN]> {
        self.ensure_ready(ElementOp::Hash)?;
        Ok(Sha256::digest(data).into())
    }

    fn close(&mut self) -> Result<()> {
        self.control.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        self.control.check(ElementOp::Close)?;
        self.initialised = false;
        Ok(())
    }
}
