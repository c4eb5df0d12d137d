//! Device registrations anchored on the ledger.

use seal_ledger::{CommittedTx, LedgerGateway};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{AttestError, Result, Stage};
use crate::types::PublicKey;

/// Asset key holding the machine description.
pub const MACHINE_KEY: &str = "Machine";

/// Asset key holding the installation site.
pub const LOCATION_KEY: &str = "Location";

/// Human-facing description of a device, anchored next to its public key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Machine name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Machine type.
    #[serde(rename = "Type", default)]
    pub kind: String,
    /// Owning organisation.
    #[serde(rename = "Owner", default)]
    pub owner: String,
    /// Street address.
    #[serde(rename = "AddressLine", default)]
    pub address_line: String,
    /// Postal code.
    #[serde(rename = "ZipCode", default)]
    pub zip_code: String,
    /// City.
    #[serde(rename = "City", default)]
    pub city: String,
    /// Site within the premises, anchored beside the machine table.
    #[serde(skip)]
    pub location: Option<String>,
}

impl DeviceProfile {
    /// A profile carrying only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Asset data registering `public_key` as this device.
    pub(crate) fn to_asset(&self, public_key: &PublicKey) -> Result<Map<String, Value>> {
        let machine = serde_json::to_value(self).map_err(|e| AttestError::LedgerRejected {
            stage: Stage::Prepare,
            reason: format!("unencodable device profile: {e}"),
        })?;
        let mut asset = Map::new();
        asset.insert("id".to_string(), json!(public_key.to_base58()));
        asset.insert(MACHINE_KEY.to_string(), machine);
        if let Some(location) = &self.location {
            asset.insert(LOCATION_KEY.to_string(), json!(location));
        }
        Ok(asset)
    }

    fn from_asset(asset: &Map<String, Value>) -> Option<Self> {
        let mut profile: Self = serde_json::from_value(asset.get(MACHINE_KEY)?.clone()).ok()?;
        profile.location = asset
            .get(LOCATION_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(profile)
    }
}

/// A device registration found on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredDevice {
    /// Registered public key.
    pub public_key: PublicKey,
    /// Registered description.
    pub profile: DeviceProfile,
    /// Location anchored with the registration.
    pub location: Option<String>,
    /// Registration transaction.
    pub tx_id: String,
}

impl RegisteredDevice {
    /// Interpret `tx` as a registration of `public_key`.
    ///
    /// A registration must name the key as asset id and be signed by it.
    fn from_tx(tx: &CommittedTx, public_key: &PublicKey) -> Option<Self> {
        let data = tx.asset_data()?;
        if data.get("id").and_then(Value::as_str) != Some(public_key.to_base58().as_str()) {
            return None;
        }
        if tx.signer_public_key().ok()? != *public_key.as_bytes() {
            return None;
        }
        let profile = DeviceProfile::from_asset(data)?;
        Some(Self {
            public_key: *public_key,
            location: profile.location.clone(),
            profile,
            tx_id: tx.id.clone(),
        })
    }
}

/// Resolve `public_key` to its device registration on the ledger.
///
/// Returns `None` if the key was never registered. Registrations not signed
/// by the key itself are ignored.
pub async fn lookup_device<L: LedgerGateway>(
    ledger: &L,
    public_key: &PublicKey,
) -> Result<Option<RegisteredDevice>> {
    let hits = ledger
        .search_assets(&public_key.to_base58())
        .await
        .map_err(|e| AttestError::ledger(Stage::Lookup, e, None))?;
    let device = hits
        .iter()
        .find_map(|tx| RegisteredDevice::from_tx(tx, public_key));
    debug!(
        public_key = %public_key,
        found = device.is_some(),
        "device lookup answered"
    );
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use seal_ledger::{MemoryLedger, Operation};

    async fn register(ledger: &MemoryLedger, owner: &SigningKey, subject: &PublicKey) -> String {
        let profile = DeviceProfile {
            location: Some("Halle 8".to_string()),
            ..DeviceProfile::named("press-4")
        };
        let asset = profile.to_asset(subject).expect("asset");
        let unsigned = ledger
            .prepare(
                Operation::Create,
                &owner.verifying_key().to_bytes(),
                asset,
                None,
            )
            .expect("prepare");
        let signed = ledger.fulfill(unsigned, owner).expect("fulfill");
        ledger
            .submit_and_await_commit(signed)
            .await
            .expect("commit")
            .id
    }

    #[tokio::test]
    async fn finds_self_signed_registration() {
        let ledger = MemoryLedger::new();
        let key = SigningKey::from_bytes(&[1u8; 32]);
        let public_key = PublicKey::from_bytes(key.verifying_key().to_bytes());
        let tx_id = register(&ledger, &key, &public_key).await;

        let device = lookup_device(&ledger, &public_key)
            .await
            .expect("lookup")
            .expect("registered");
        assert_eq!(device.tx_id, tx_id);
        assert_eq!(device.profile.name, "press-4");
        assert_eq!(device.location.as_deref(), Some("Halle 8"));
    }

    #[tokio::test]
    async fn unknown_key_is_none() {
        let ledger = MemoryLedger::new();
        let device = lookup_device(&ledger, &PublicKey::from_bytes([9u8; 32]))
            .await
            .expect("lookup");
        assert!(device.is_none());
    }

    #[tokio::test]
    async fn registration_by_another_key_is_ignored() {
        let ledger = MemoryLedger::new();
        let impostor = SigningKey::from_bytes(&[2u8; 32]);
        let victim = PublicKey::from_bytes(SigningKey::from_bytes(&[3u8; 32]).verifying_key().to_bytes());
        register(&ledger, &impostor, &victim).await;

        assert!(lookup_device(&ledger, &victim).await.expect("lookup").is_none());
    }

    #[test]
    fn profile_uses_machine_field_names() {
        let asset = DeviceProfile {
            kind: "Lucky Puncher".to_string(),
            city: "Linz".to_string(),
            ..DeviceProfile::named("m1")
        }
        .to_asset(&PublicKey::from_bytes([4u8; 32]))
        .expect("asset");

        let machine = &asset[MACHINE_KEY];
        assert_eq!(machine["Name"], "m1");
        assert_eq!(machine["Type"], "Lucky Puncher");
        assert_eq!(machine["City"], "Linz");
        assert!(!asset.contains_key(LOCATION_KEY));
    }
}
