//! Three-way verification of attestations.
//!
//! A verification compares the hash stored in the local record, the hash
//! anchored on the ledger and a hash recomputed from the recorded payload.
//! All three must agree; any single divergence is a mismatch, and the
//! result names every pair that disagrees so the tampered store can be
//! located.

use std::fmt;

use futures::stream::{self, StreamExt};
use seal_ledger::{CommittedTx, LedgerGateway};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::attest::{HASH_KEY, SUBJECT_KEY};
use crate::device::{lookup_device, RegisteredDevice};
use crate::error::{AttestError, Result, Stage};
use crate::hash::{ContentHasher, HashAnchor};
use crate::record::{RecordStore, StoreError};
use crate::types::{ContentHash, PublicKey};

/// Default number of verifications [`VerificationEngine::check_all`] runs at once.
pub const DEFAULT_CHECK_CONCURRENCY: usize = 4;

/// A disagreement found by verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Divergence {
    /// Local record and ledger anchor disagree.
    LocalVsLedger,
    /// Local record does not match its own payload.
    LocalVsRecomputed,
    /// Ledger anchor does not match the recorded payload.
    LedgerVsRecomputed,
    /// The ledger has the transaction but there is no local record.
    LocalRecordMissing,
    /// The local record exists but cannot be read as a record.
    LocalRecordCorrupt,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LocalVsLedger => "local-vs-ledger",
            Self::LocalVsRecomputed => "local-vs-recomputed",
            Self::LedgerVsRecomputed => "ledger-vs-recomputed",
            Self::LocalRecordMissing => "local-record-missing",
            Self::LocalRecordCorrupt => "local-record-corrupt",
        })
    }
}

/// Outcome of a verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VerificationStatus {
    /// All three hashes agree.
    Match,
    /// At least one pair disagrees or a source is missing.
    Mismatch {
        /// Every divergence found.
        divergences: Vec<Divergence>,
    },
}

impl VerificationStatus {
    /// Whether all three hashes agree.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// Divergences found; empty on a match.
    #[must_use]
    pub fn divergences(&self) -> &[Divergence] {
        match self {
            Self::Match => &[],
            Self::Mismatch { divergences } => divergences,
        }
    }
}

/// Everything verification learned about one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    /// Verified transaction.
    pub tx_id: String,
    /// Subject anchored on the ledger.
    pub subject_id: Option<String>,
    /// Hash in the local record, if the record could be read.
    pub hash_local: Option<ContentHash>,
    /// Hash anchored on the ledger.
    pub hash_ledger: ContentHash,
    /// Hash recomputed from the recorded payload, if the record could be read.
    pub hash_recomputed: Option<ContentHash>,
    /// Primitive that recomputed the hash.
    pub hash_anchor: HashAnchor,
    /// Match or mismatch with divergences.
    #[serde(flatten)]
    pub status: VerificationStatus,
    /// Key that signed the ledger transaction.
    pub signer_public_key: PublicKey,
    /// Registration of the signer, if it registered.
    pub signer_device: Option<RegisteredDevice>,
}

/// Verification of one local record during [`VerificationEngine::check_all`].
#[derive(Debug)]
pub struct CheckOutcome {
    /// Transaction named by the record.
    pub tx_id: String,
    /// Verification result or why verification could not run.
    pub result: Result<VerificationResult>,
}

/// Reconciles local records, ledger anchors and recomputed hashes.
///
/// Read-only: any number of verifications may run concurrently.
#[derive(Debug)]
pub struct VerificationEngine<L, H> {
    ledger: L,
    records: RecordStore,
    hasher: H,
    concurrency: usize,
}

impl<L: LedgerGateway, H: ContentHasher> VerificationEngine<L, H> {
    /// Verify against `ledger` and `records`, recomputing with `hasher`.
    #[must_use]
    pub fn new(ledger: L, records: RecordStore, hasher: H) -> Self {
        if hasher.anchor() == HashAnchor::Software {
            warn!("verifying with a software hash; results are not anchored in hardware");
        }
        Self {
            ledger,
            records,
            hasher,
            concurrency: DEFAULT_CHECK_CONCURRENCY,
        }
    }

    /// Limit how many verifications [`check_all`](Self::check_all) runs at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The local record store.
    #[must_use]
    pub const fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Where recomputed hashes come from.
    #[must_use]
    pub fn hash_anchor(&self) -> HashAnchor {
        self.hasher.anchor()
    }

    /// Verify the attestation anchored by `tx_id`.
    ///
    /// A missing or unreadable local record is a mismatch, not an error.
    /// A transaction unknown to the ledger is
    /// [`AttestError::TransactionNotFound`]. If the signer's registration
    /// cannot be looked up right now, the signer is left unresolved.
    pub async fn verify(&self, tx_id: &str) -> Result<VerificationResult> {
        let tx = self
            .ledger
            .retrieve(tx_id)
            .await
            .map_err(|e| AttestError::ledger(Stage::Retrieve, e, Some(tx_id)))?;
        let hash_ledger = anchored_hash(&tx)?;
        let signer_public_key = PublicKey::from_bytes(tx.signer_public_key().map_err(|e| {
            AttestError::MalformedTransaction {
                tx_id: tx.id.clone(),
                reason: e.to_string(),
            }
        })?);

        let (hash_local, hash_recomputed, divergences) = match self.records.load(tx_id) {
            Ok(record) => {
                let recomputed = self
                    .hasher
                    .hash(&record.subject_data)
                    .map_err(|e| AttestError::hardware(Stage::Hash, &e))?;
                let divergences = compare(&record.content_hash, &hash_ledger, &recomputed);
                (Some(record.content_hash), Some(recomputed), divergences)
            }
            Err(StoreError::NotFound(_)) => (None, None, vec![Divergence::LocalRecordMissing]),
            Err(StoreError::Corrupt { reason, .. }) => {
                warn!(tx_id, reason = %reason, "local record is corrupt");
                (None, None, vec![Divergence::LocalRecordCorrupt])
            }
            Err(source) => {
                return Err(AttestError::Store {
                    stage: Stage::Load,
                    source,
                });
            }
        };

        let signer_device = match lookup_device(&self.ledger, &signer_public_key).await {
            Ok(device) => device,
            Err(e) if e.is_retryable() => {
                warn!(tx_id, error = %e, "signer lookup unavailable, reporting the signer unresolved");
                None
            }
            Err(e) => return Err(e),
        };

        let status = if divergences.is_empty() {
            VerificationStatus::Match
        } else {
            VerificationStatus::Mismatch { divergences }
        };
        match &status {
            VerificationStatus::Match => {
                info!(tx_id, content_hash = %hash_ledger, "attestation verified");
            }
            VerificationStatus::Mismatch { divergences } => {
                let divergences: Vec<String> = divergences.iter().map(ToString::to_string).collect();
                warn!(tx_id, divergences = ?divergences, "attestation mismatch");
            }
        }

        Ok(VerificationResult {
            tx_id: tx.id.clone(),
            subject_id: tx.asset_str(SUBJECT_KEY).map(str::to_string),
            hash_local,
            hash_ledger,
            hash_recomputed,
            hash_anchor: self.hasher.anchor(),
            status,
            signer_public_key,
            signer_device,
        })
    }

    /// Verify every local record, sorted by transaction id.
    ///
    /// A failure to verify one record does not stop the others.
    pub async fn check_all(&self) -> Result<Vec<CheckOutcome>> {
        let ids = self.records.list().map_err(|source| AttestError::Store {
            stage: Stage::Load,
            source,
        })?;
        debug!(records = ids.len(), concurrency = self.concurrency, "checking all records");

        let mut outcomes: Vec<CheckOutcome> = stream::iter(ids)
            .map(|tx_id| async move {
                let result = self.verify(&tx_id).await;
                CheckOutcome { tx_id, result }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.tx_id.cmp(&b.tx_id));
        Ok(outcomes)
    }
}

fn anchored_hash(tx: &CommittedTx) -> Result<ContentHash> {
    let malformed = |reason: String| AttestError::MalformedTransaction {
        tx_id: tx.id.clone(),
        reason,
    };
    tx.asset_str(HASH_KEY)
        .ok_or_else(|| malformed(format!("asset carries no '{HASH_KEY}' field")))?
        .parse()
        .map_err(malformed)
}

/// Pairwise comparison of the three hashes.
fn compare(local: &ContentHash, ledger: &ContentHash, recomputed: &ContentHash) -> Vec<Divergence> {
    let mut divergences = Vec::new();
    if local != ledger {
        divergences.push(Divergence::LocalVsLedger);
    }
    if local != recomputed {
        divergences.push(Divergence::LocalVsRecomputed);
    }
    if ledger != recomputed {
        divergences.push(Divergence::LedgerVsRecomputed);
    }
    divergences
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn hash(byte: u8) -> ContentHash {
        ContentHash::from_bytes([byte; 32])
    }

    #[test_case(1, 1, 1, &[] ; "all agree")]
    #[test_case(1, 2, 1, &[Divergence::LocalVsLedger, Divergence::LedgerVsRecomputed] ; "ledger differs")]
    #[test_case(2, 1, 1, &[Divergence::LocalVsLedger, Divergence::LocalVsRecomputed] ; "local differs")]
    #[test_case(1, 1, 2, &[Divergence::LocalVsRecomputed, Divergence::LedgerVsRecomputed] ; "payload differs")]
    #[test_case(1, 2, 3, &[Divergence::LocalVsLedger, Divergence::LocalVsRecomputed, Divergence::LedgerVsRecomputed] ; "all differ")]
    fn compare_names_diverging_pairs(local: u8, ledger: u8, recomputed: u8, expected: &[Divergence]) {
        assert_eq!(compare(&hash(local), &hash(ledger), &hash(recomputed)), expected);
    }

    mod flows {
        use std::sync::Arc;

        use seal_element::{ElementSession, SimulatedElement};
        use seal_ledger::MemoryLedger;
        use serde_json::json;
        use tempfile::TempDir;

        use super::super::*;
        use crate::attest::{AttestRequest, AttestationService};
        use crate::hash::SoftwareHasher;
        use crate::identity::{IdentityManager, Regeneration};
        use crate::types::DeviceIdentity;

        type Service = AttestationService<SimulatedElement, Arc<MemoryLedger>>;

        fn setup() -> (TempDir, DeviceIdentity, Service, Arc<MemoryLedger>) {
            let dir = TempDir::new().expect("tempdir");
            let session = Arc::new(ElementSession::open(SimulatedElement::new()).expect("open"));
            let identity = IdentityManager::new(Arc::clone(&session))
                .generate(Regeneration::Refuse)
                .expect("identity");
            let ledger = Arc::new(MemoryLedger::new());
            let records = RecordStore::open(dir.path()).expect("records");
            let service = AttestationService::new(session, Arc::clone(&ledger), records);
            (dir, identity, service, ledger)
        }

        fn engine(service: &Service, ledger: &Arc<MemoryLedger>) -> VerificationEngine<Arc<MemoryLedger>, SoftwareHasher> {
            VerificationEngine::new(Arc::clone(ledger), service.records().clone(), SoftwareHasher)
        }

        #[tokio::test]
        async fn fresh_attestation_matches() {
            let (_dir, identity, service, ledger) = setup();
            let record = service
                .attest(&identity, b"reading=42", AttestRequest::new("sensor-1"))
                .await
                .expect("attest");

            let result = engine(&service, &ledger).verify(&record.tx_id).await.expect("verify");
            assert!(result.status.is_match());
            assert_eq!(result.hash_anchor, HashAnchor::Software);
            assert_eq!(result.signer_public_key, identity.public_key);
            assert_eq!(result.subject_id.as_deref(), Some("sensor-1"));
            assert!(result.signer_device.is_none());
        }

        #[tokio::test]
        async fn signer_lookup_outage_keeps_the_verdict() {
            let (_dir, identity, service, ledger) = setup();
            let record = service
                .attest(&identity, b"reading=42", AttestRequest::new("sensor-1"))
                .await
                .expect("attest");
            ledger.fail_next_searches(1);

            let result = engine(&service, &ledger).verify(&record.tx_id).await.expect("verify");
            assert!(result.status.is_match());
            assert_eq!(result.signer_public_key, identity.public_key);
            assert!(result.signer_device.is_none());
        }

        #[tokio::test]
        async fn unparsable_ledger_hash_is_malformed() {
            let (_dir, identity, service, ledger) = setup();
            let record = service
                .attest(&identity, b"x", AttestRequest::new("s"))
                .await
                .expect("attest");
            ledger.overwrite_asset_field(&record.tx_id, "sha", json!("not-a-hash"));

            let err = engine(&service, &ledger).verify(&record.tx_id).await.expect_err("malformed");
            assert!(matches!(err, AttestError::MalformedTransaction { .. }));
        }

        #[tokio::test]
        async fn corrupt_record_is_reported_as_divergence() {
            let (_dir, identity, service, ledger) = setup();
            let record = service
                .attest(&identity, b"x", AttestRequest::new("s"))
                .await
                .expect("attest");
            let path = service.records().path_for(&record.tx_id).expect("path");
            std::fs::write(path, b"garbage").expect("overwrite");

            let result = engine(&service, &ledger).verify(&record.tx_id).await.expect("verify");
            assert_eq!(result.status.divergences(), &[Divergence::LocalRecordCorrupt]);
            assert!(result.hash_local.is_none());
        }

        #[tokio::test]
        async fn check_all_reports_every_record_in_order() {
            let (_dir, identity, service, ledger) = setup();
            let mut ids = Vec::new();
            for n in 0..5u8 {
                let record = service
                    .attest(&identity, &[n], AttestRequest::new(format!("s{n}")))
                    .await
                    .expect("attest");
                ids.push(record.tx_id);
            }
            ids.sort();
            ledger.overwrite_asset_field(&ids[2], "sha", json!("00".repeat(32)));

            let outcomes = engine(&service, &ledger)
                .with_concurrency(2)
                .check_all()
                .await
                .expect("check");
            let seen: Vec<&str> = outcomes.iter().map(|o| o.tx_id.as_str()).collect();
            assert_eq!(seen, ids.iter().map(String::as_str).collect::<Vec<_>>());

            let mismatches: Vec<&str> = outcomes
                .iter()
                .filter(|o| o.result.as_ref().is_ok_and(|r| !r.status.is_match()))
                .map(|o| o.tx_id.as_str())
                .collect();
            assert_eq!(mismatches, vec![ids[2].as_str()]);
        }
    }

    #[test]
    fn status_serialises_with_divergences() {
        let status = VerificationStatus::Mismatch {
            divergences: vec![Divergence::LocalRecordMissing],
        };
        assert_eq!(
            serde_json::to_value(&status).expect("json"),
            serde_json::json!({"status": "mismatch", "divergences": ["local-record-missing"]})
        );
        assert!(!status.is_match());
        assert!(VerificationStatus::Match.divergences().is_empty());
    }
}
