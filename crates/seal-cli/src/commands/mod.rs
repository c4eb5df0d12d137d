//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`identity`] - Device key pair and machine registration
//! - [`attest`] - Hashing and anchoring a file
//! - [`query`] - Transactions by subject, devices by key
//! - [`verify`] - Three-way verification of one or all records

pub mod attest;
pub mod identity;
pub mod query;
pub mod verify;

pub use attest::AttestCommand;
pub use identity::IdentityCommand;
pub use query::QueryCommand;
pub use verify::VerifyCommand;

#[cfg(test)]
pub(crate) mod fixture {
    use std::sync::Arc;

    use seal_attest::{
        AttestationService, DeviceIdentity, IdentityManager, RecordStore, Regeneration,
    };
    use seal_element::{ElementSession, SimulatedElement};
    use seal_ledger::MemoryLedger;
    use tempfile::TempDir;

    /// A simulated element, an in-memory ledger and a temporary record store.
    pub struct Fixture {
        _dir: TempDir,
        pub session: Arc<ElementSession<SimulatedElement>>,
        pub ledger: Arc<MemoryLedger>,
        pub records: RecordStore,
    }

    impl Fixture {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let records = RecordStore::open(dir.path().join("database")).expect("store");
            let session =
                Arc::new(ElementSession::open(SimulatedElement::new()).expect("open element"));
            Self {
                _dir: dir,
                session,
                ledger: Arc::new(MemoryLedger::new()),
                records,
            }
        }

        pub fn with_identity() -> Self {
            let fx = Self::new();
            IdentityManager::new(Arc::clone(&fx.session))
                .generate(Regeneration::Refuse)
                .expect("generate");
            fx
        }

        pub fn identity(&self) -> DeviceIdentity {
            IdentityManager::new(Arc::clone(&self.session))
                .load()
                .expect("identity")
        }

        pub fn service(&self) -> AttestationService<SimulatedElement, Arc<MemoryLedger>> {
            AttestationService::new(
                Arc::clone(&self.session),
                Arc::clone(&self.ledger),
                self.records.clone(),
            )
        }
    }
}
