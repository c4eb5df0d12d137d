//! Hash-and-sign attestation of payloads.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use seal_element::{ElementSession, SecureKeyStore};
use seal_ledger::{CommittedTx, LedgerGateway, Operation, SignedTx};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::device::{lookup_device, DeviceProfile, RegisteredDevice};
use crate::error::{AttestError, Result, Stage};
use crate::hash::ContentHasher;
use crate::identity::ElementSigner;
use crate::record::{AttestationRecord, RecordStore};
use crate::types::{ContentHash, DeviceIdentity, PublicKey};

/// Asset key holding the subject id.
pub const SUBJECT_KEY: &str = "id";

/// Asset key holding the hex content hash.
pub const HASH_KEY: &str = "sha";

/// What to anchor alongside a payload's hash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttestRequest {
    /// Subject the payload is about, anchored as the asset `id`.
    pub subject_id: String,
    /// Extra asset fields. `id` and `sha` are reserved.
    pub fields: Map<String, Value>,
    /// Transaction metadata.
    pub metadata: Map<String, Value>,
}

impl AttestRequest {
    /// A request for `subject_id` with no extra fields.
    #[must_use]
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            ..Self::default()
        }
    }

    /// Add an asset field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    fn asset(self, hash: &ContentHash) -> (Map<String, Value>, Map<String, Value>) {
        let mut asset = self.fields;
        asset.insert(SUBJECT_KEY.to_string(), json!(self.subject_id));
        asset.insert(HASH_KEY.to_string(), json!(hash.to_hex()));
        (asset, self.metadata)
    }
}

/// Turns payloads into ledger-anchored, locally recorded attestations.
///
/// Submissions for one identity are serialised; different identities
/// proceed concurrently.
#[derive(Debug)]
pub struct AttestationService<S: SecureKeyStore, L> {
    session: Arc<ElementSession<S>>,
    ledger: L,
    records: RecordStore,
    submit_locks: Mutex<HashMap<PublicKey, Arc<AsyncMutex<()>>>>,
}

impl<S: SecureKeyStore, L: LedgerGateway> AttestationService<S, L> {
    /// Attest through `session`, anchoring on `ledger` and recording in `records`.
    #[must_use]
    pub fn new(session: Arc<ElementSession<S>>, ledger: L, records: RecordStore) -> Self {
        Self {
            session,
            ledger,
            records,
            submit_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The ledger gateway.
    #[must_use]
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The local record store.
    #[must_use]
    pub const fn records(&self) -> &RecordStore {
        &self.records
    }

    /// SHA-256 of `payload`, computed on the element.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::HardwareFault`] if the element cannot hash.
    pub fn hash(&self, payload: &[u8]) -> Result<ContentHash> {
        self.session
            .hash(payload)
            .map_err(|e| AttestError::hardware(Stage::Hash, &e))
    }

    fn submit_lock(&self, public_key: &PublicKey) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.submit_locks.lock().entry(*public_key).or_default())
    }

    /// Hash `payload` on the element, anchor the hash on the ledger and
    /// record the payload locally.
    ///
    /// The ledger is never retried here. A timed-out submission is reported
    /// as [`AttestError::LedgerUnavailable`] carrying the transaction id; use
    /// [`find_anchored`](Self::find_anchored) before attesting again. If the
    /// record cannot be written after commit the error is
    /// [`AttestError::PartialCommit`].
    pub async fn attest(
        &self,
        identity: &DeviceIdentity,
        payload: &[u8],
        request: AttestRequest,
    ) -> Result<AttestationRecord> {
        let lock = self.submit_lock(&identity.public_key);
        let _guard = lock.lock().await;

        let content_hash = self.hash(payload)?;
        let subject_id = request.subject_id.clone();
        let (asset, metadata) = request.asset(&content_hash);

        let signed = self.sign(identity, asset, Some(metadata))?;
        let committed = self.submit(signed).await?;

        let record = AttestationRecord {
            tx_id: committed.id.clone(),
            subject_id,
            subject_data: payload.to_vec(),
            content_hash,
            created_at: Utc::now(),
        };
        if let Err(source) = self.records.persist(&record) {
            error!(
                tx_id = %committed.id,
                content_hash = %content_hash,
                error = %source,
                "ledger committed but local record was not persisted"
            );
            return Err(AttestError::PartialCommit {
                tx_id: committed.id,
                source,
            });
        }

        info!(
            tx_id = %record.tx_id,
            content_hash = %content_hash,
            public_key = %identity.public_key,
            "payload attested"
        );
        Ok(record)
    }

    /// Anchor `profile` as the registration of `identity`.
    ///
    /// The asset names the public key as its id so the device can later be
    /// found by key.
    pub async fn register_device(
        &self,
        identity: &DeviceIdentity,
        profile: &DeviceProfile,
    ) -> Result<RegisteredDevice> {
        let lock = self.submit_lock(&identity.public_key);
        let _guard = lock.lock().await;

        let asset = profile.to_asset(&identity.public_key)?;
        let signed = self.sign(identity, asset, None)?;
        let committed = self.submit(signed).await?;

        info!(
            tx_id = %committed.id,
            public_key = %identity.public_key,
            name = %profile.name,
            "device registered"
        );
        Ok(RegisteredDevice {
            public_key: identity.public_key,
            profile: profile.clone(),
            location: profile.location.clone(),
            tx_id: committed.id,
        })
    }

    /// Attestations on the ledger anchoring `content_hash`.
    pub async fn find_anchored(&self, content_hash: &ContentHash) -> Result<Vec<CommittedTx>> {
        let hex = content_hash.to_hex();
        search_field(&self.ledger, HASH_KEY, &hex).await
    }

    /// Transactions on the ledger whose subject is `subject_id`.
    ///
    /// A base58 public key as subject finds the device registration.
    pub async fn query_subject(&self, subject_id: &str) -> Result<Vec<CommittedTx>> {
        query_subject(&self.ledger, subject_id).await
    }

    /// Resolve a public key to its registration.
    pub async fn lookup_device(&self, public_key: &PublicKey) -> Result<Option<RegisteredDevice>> {
        lookup_device(&self.ledger, public_key).await
    }

    fn sign(
        &self,
        identity: &DeviceIdentity,
        asset: Map<String, Value>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<SignedTx> {
        let unsigned = self
            .ledger
            .prepare(
                Operation::Create,
                identity.public_key.as_bytes(),
                asset,
                metadata,
            )
            .map_err(|e| AttestError::ledger(Stage::Prepare, e, None))?;
        let signer = ElementSigner::new(Arc::clone(&self.session), *identity);
        self.ledger
            .fulfill(unsigned, &signer)
            .map_err(|e| AttestError::ledger(Stage::Sign, e, None))
    }

    async fn submit(&self, signed: SignedTx) -> Result<CommittedTx> {
        let tx_id = signed.id().to_string();
        self.ledger
            .submit_and_await_commit(signed)
            .await
            .map_err(|e| {
                let err = AttestError::ledger(Stage::Submit, e, Some(&tx_id));
                if matches!(err, AttestError::LedgerUnavailable { timed_out: true, .. }) {
                    warn!(%tx_id, "submission timed out; it may still commit");
                }
                err
            })
    }
}

/// Transactions on `ledger` whose subject is `subject_id`.
///
/// A base58 public key as subject finds the device registration.
pub async fn query_subject<L: LedgerGateway>(
    ledger: &L,
    subject_id: &str,
) -> Result<Vec<CommittedTx>> {
    search_field(ledger, SUBJECT_KEY, subject_id).await
}

// Full-text search narrowed to an exact match on one asset field.
async fn search_field<L: LedgerGateway>(
    ledger: &L,
    key: &str,
    value: &str,
) -> Result<Vec<CommittedTx>> {
    let hits = ledger
        .search_assets(value)
        .await
        .map_err(|e| AttestError::ledger(Stage::Lookup, e, None))?;
    Ok(hits
        .into_iter()
        .filter(|tx| tx.asset_str(key) == Some(value))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityManager, Regeneration};
    use crate::record::StoreError;
    use seal_element::{ElementOp, SimulatedElement, SimulatorControl};
    use seal_ledger::{LedgerError, MemoryLedger};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        control: SimulatorControl,
        identity: DeviceIdentity,
        service: AttestationService<SimulatedElement, Arc<MemoryLedger>>,
        ledger: Arc<MemoryLedger>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().expect("tempdir");
        let element = SimulatedElement::new();
        let control = element.control();
        let session = Arc::new(ElementSession::open(element).expect("open"));
        let identity = IdentityManager::new(Arc::clone(&session))
            .generate(Regeneration::Refuse)
            .expect("identity");
        let ledger = Arc::new(MemoryLedger::new());
        let records = RecordStore::open(dir.path().join("database")).expect("records");
        Fixture {
            _dir: dir,
            control,
            identity,
            service: AttestationService::new(session, Arc::clone(&ledger), records),
            ledger,
        }
    }

    #[tokio::test]
    async fn attest_hello_anchors_its_sha256() {
        let fx = fixture();
        let record = fx
            .service
            .attest(&fx.identity, b"hello", AttestRequest::new("lot-1"))
            .await
            .expect("attest");

        assert_eq!(
            record.content_hash.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        let tx = fx.ledger.retrieve(&record.tx_id).await.expect("on ledger");
        assert_eq!(tx.asset_str(HASH_KEY), Some(record.content_hash.to_hex().as_str()));
        assert_eq!(tx.asset_str(SUBJECT_KEY), Some("lot-1"));
        assert_eq!(
            tx.signer_public_key().expect("signer"),
            *fx.identity.public_key.as_bytes()
        );
        assert_eq!(fx.service.records().load(&record.tx_id).expect("local"), record);
    }

    #[tokio::test]
    async fn reserved_fields_cannot_be_overridden() {
        let fx = fixture();
        let request = AttestRequest::new("lot-1")
            .with_field("sha", json!("forged"))
            .with_field("line", json!("A"))
            .with_metadata("operator", json!("ci"));
        let record = fx
            .service
            .attest(&fx.identity, b"payload", request)
            .await
            .expect("attest");

        let tx = fx.ledger.retrieve(&record.tx_id).await.expect("on ledger");
        assert_eq!(tx.asset_str("sha"), Some(record.content_hash.to_hex().as_str()));
        assert_eq!(tx.asset_str("line"), Some("A"));
        assert_eq!(
            tx.metadata.as_ref().and_then(|m| m.get("operator")),
            Some(&json!("ci"))
        );
    }

    #[test]
    fn hash_runs_on_the_element() {
        let fx = fixture();
        let hash = fx.service.hash(b"hello").expect("hash");
        assert_eq!(
            hash.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        fx.control.fail(ElementOp::Hash);
        assert!(matches!(
            fx.service.hash(b"hello"),
            Err(AttestError::HardwareFault { stage: Stage::Hash, .. })
        ));
    }

    #[tokio::test]
    async fn hash_fault_anchors_nothing() {
        let fx = fixture();
        fx.control.fail(ElementOp::Hash);
        let err = fx
            .service
            .attest(&fx.identity, b"hello", AttestRequest::new("lot-1"))
            .await
            .expect_err("fault");

        assert!(matches!(err, AttestError::HardwareFault { stage: Stage::Hash, .. }));
        assert!(fx.ledger.is_empty());
        assert!(fx.service.records().list().expect("list").is_empty());
    }

    #[tokio::test]
    async fn signing_fault_is_reported_at_sign_stage() {
        let fx = fixture();
        fx.control.fail(ElementOp::ReadProtected);
        let err = fx
            .service
            .attest(&fx.identity, b"hello", AttestRequest::new("lot-1"))
            .await
            .expect_err("fault");

        assert!(matches!(err, AttestError::HardwareFault { stage: Stage::Sign, .. }));
        assert!(fx.ledger.is_empty());
    }

    #[tokio::test]
    async fn ledger_outage_is_retryable_and_writes_no_record() {
        let fx = fixture();
        fx.ledger.fail_next_submits(1);
        let err = fx
            .service
            .attest(&fx.identity, b"hello", AttestRequest::new("lot-1"))
            .await
            .expect_err("outage");

        assert!(err.is_retryable());
        assert!(fx.service.records().list().expect("list").is_empty());

        fx.service
            .attest(&fx.identity, b"hello", AttestRequest::new("lot-1"))
            .await
            .expect("retry succeeds");
    }

    #[tokio::test]
    async fn timed_out_submission_can_be_found_by_hash() {
        let fx = fixture();
        fx.ledger.commit_then_time_out(1);
        let err = fx
            .service
            .attest(&fx.identity, b"hello", AttestRequest::new("lot-1"))
            .await
            .expect_err("timeout");

        let AttestError::LedgerUnavailable {
            timed_out: true,
            tx_id: Some(tx_id),
            ..
        } = err
        else {
            panic!("expected timed-out submission, got {err:?}");
        };

        let hash = fx.service.hash(b"hello").expect("hash");
        let anchored = fx.service.find_anchored(&hash).await.expect("search");
        assert_eq!(anchored.len(), 1);
        assert_eq!(anchored[0].id, tx_id);
    }

    #[tokio::test]
    async fn persistence_failure_after_commit_is_partial_commit() {
        let fx = fixture();
        let record = fx
            .service
            .attest(&fx.identity, b"first", AttestRequest::new("lot-1"))
            .await
            .expect("attest");
        // Make the record directory unusable.
        let dir = fx.service.records().dir().to_path_buf();
        std::fs::remove_file(dir.join(format!("{}.json", record.tx_id))).expect("remove");
        std::fs::remove_dir(&dir).expect("remove dir");
        std::fs::write(&dir, b"not a directory").expect("block");

        let err = fx
            .service
            .attest(&fx.identity, b"second", AttestRequest::new("lot-2"))
            .await
            .expect_err("partial");

        let AttestError::PartialCommit { tx_id, source } = err else {
            panic!("expected partial commit, got {err:?}");
        };
        assert!(matches!(source, StoreError::Io { .. }));
        assert!(fx.ledger.retrieve(&tx_id).await.is_ok());
    }

    #[tokio::test]
    async fn query_subject_filters_exact_subject() {
        let fx = fixture();
        fx.service
            .attest(&fx.identity, b"a", AttestRequest::new("lot-1"))
            .await
            .expect("attest");
        fx.service
            .attest(&fx.identity, b"b", AttestRequest::new("lot-10"))
            .await
            .expect("attest");

        let hits = fx.service.query_subject("lot-1").await.expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].asset_str(SUBJECT_KEY), Some("lot-1"));
    }

    #[tokio::test]
    async fn registered_device_can_be_looked_up() {
        let fx = fixture();
        let registered = fx
            .service
            .register_device(&fx.identity, &DeviceProfile::named("press-4"))
            .await
            .expect("register");

        let found = fx
            .service
            .lookup_device(&fx.identity.public_key)
            .await
            .expect("lookup")
            .expect("registered");
        assert_eq!(found.tx_id, registered.tx_id);
        assert_eq!(found.profile.name, "press-4");
    }

    #[tokio::test]
    async fn concurrent_attestations_by_one_identity_all_commit() {
        let fx = fixture();
        let service = Arc::new(fx.service);
        let mut tasks = Vec::new();
        for n in 0..8u8 {
            let service = Arc::clone(&service);
            let identity = fx.identity;
            tasks.push(tokio::spawn(async move {
                service
                    .attest(&identity, &[n], AttestRequest::new(format!("lot-{n}")))
                    .await
            }));
        }
        for task in tasks {
            task.await.expect("join").expect("attest");
        }
        assert_eq!(fx.ledger.len(), 8);
        assert_eq!(service.records().list().expect("list").len(), 8);
    }

    #[test]
    fn ledger_errors_keep_their_kind() {
        let err = AttestError::ledger(
            Stage::Submit,
            LedgerError::Rejected("double spend".to_string()),
            None,
        );
        assert!(matches!(err, AttestError::LedgerRejected { stage: Stage::Submit, .. }));
    }
}
