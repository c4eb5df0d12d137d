//! Append-only local attestation records.
//!
//! One `<tx_id>.json` file per attestation. Files appear fully written or
//! not at all, and are never rewritten.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use seal_ledger::is_transaction_id;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::ContentHash;

const RECORD_EXTENSION: &str = "json";

/// Errors of the local record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A record for this transaction already exists.
    #[error("record {0} already exists")]
    AlreadyExists(PathBuf),

    /// No record exists for this transaction.
    #[error("no local record for transaction {0}")]
    NotFound(String),

    /// The record file does not hold a valid record.
    #[error("record {path} is corrupt: {reason}")]
    Corrupt {
        /// Offending file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// The transaction id cannot name a record file.
    #[error("invalid transaction id '{0}'")]
    InvalidId(String),

    /// The record could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A locally stored attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationRecord {
    /// Ledger transaction anchoring this record; the join key.
    pub tx_id: String,
    /// Subject the payload is about.
    pub subject_id: String,
    /// The exact attested bytes.
    #[serde(skip)]
    pub subject_data: Vec<u8>,
    /// Hash of `subject_data` at attestation time.
    pub content_hash: ContentHash,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordFile {
    tx_id: String,
    subject_id: String,
    data: String,
    sha256: String,
    created_at: DateTime<Utc>,
}

/// Directory of attestation records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Open the store in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// The store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `tx_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidId`] unless `tx_id` is a transaction id.
    pub fn path_for(&self, tx_id: &str) -> Result<PathBuf, StoreError> {
        if !is_transaction_id(tx_id) {
            return Err(StoreError::InvalidId(tx_id.to_string()));
        }
        Ok(self.dir.join(format!("{tx_id}.{RECORD_EXTENSION}")))
    }

    /// Whether a record exists for `tx_id`.
    #[must_use]
    pub fn contains(&self, tx_id: &str) -> bool {
        self.path_for(tx_id).is_ok_and(|path| path.is_file())
    }

    /// Write a new record. Existing records are never replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if a record for the transaction
    /// exists, or [`StoreError::Io`] if writing fails.
    pub fn persist(&self, record: &AttestationRecord) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&record.tx_id)?;
        let file = RecordFile {
            tx_id: record.tx_id.clone(),
            subject_id: record.subject_id.clone(),
            data: STANDARD.encode(&record.subject_data),
            sha256: record.content_hash.to_hex(),
            created_at: record.created_at,
        };
        let encoded = serde_json::to_vec_pretty(&file)?;

        if path.exists() {
            return Err(StoreError::AlreadyExists(path));
        }

        // Written in full beside the target, then linked into place without
        // replacing anything. A failed write leaves only the temp file, which
        // is removed on drop.
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        let mut staged = tempfile::Builder::new()
            .prefix(".record-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(io_err)?;
        staged.write_all(&encoded).map_err(io_err)?;
        staged.as_file().sync_all().map_err(io_err)?;
        staged.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                StoreError::AlreadyExists(path.clone())
            } else {
                io_err(e.error)
            }
        })?;

        info!(tx_id = %record.tx_id, path = %path.display(), "attestation record persisted");
        Ok(path)
    }

    /// Load and validate the record for `tx_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no record and
    /// [`StoreError::Corrupt`] if the file is not a valid record for `tx_id`.
    pub fn load(&self, tx_id: &str) -> Result<AttestationRecord, StoreError> {
        let path = self.path_for(tx_id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(tx_id.to_string()));
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let corrupt = |reason: String| StoreError::Corrupt {
            path: path.clone(),
            reason,
        };
        let file: RecordFile =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if file.tx_id != tx_id {
            return Err(corrupt(format!("names transaction {}", file.tx_id)));
        }
        let subject_data = STANDARD
            .decode(&file.data)
            .map_err(|e| corrupt(format!("data is not base64: {e}")))?;
        let content_hash = file.sha256.parse().map_err(corrupt)?;

        debug!(tx_id, "attestation record loaded");
        Ok(AttestationRecord {
            tx_id: file.tx_id,
            subject_id: file.subject_id,
            subject_data,
            content_hash,
            created_at: file.created_at,
        })
    }

    /// Transaction ids of all records, sorted.
    ///
    /// Files whose name is not a transaction id are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_transaction_id(stem) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
