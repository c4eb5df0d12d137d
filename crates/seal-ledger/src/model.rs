//! Ledger transaction model.
//!
//! Field names and nesting follow the BigchainDB 2.0 transaction schema so
//! that bodies serialise to exactly what the network hashes and signs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LedgerError, Result};

/// Transaction schema version produced by this crate.
pub const TX_VERSION: &str = "2.0";

/// Length of a transaction id in hex characters.
pub const TX_ID_LEN: usize = 64;

/// Ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Anchor a new asset.
    Create,
    /// Move an existing asset to new owners.
    Transfer,
}

impl Operation {
    /// Get the operation as it appears on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Transfer => "TRANSFER",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Asset carried by a transaction.
///
/// `CREATE` transactions carry `data`; `TRANSFER` transactions reference
/// the created asset by `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset payload of a `CREATE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// Id of the created asset, for `TRANSFER`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Reference to an output being spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfills {
    /// Transaction holding the output.
    pub transaction_id: String,
    /// Index of the output in that transaction.
    pub output_index: u32,
}

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// Base58 public keys that must sign this input.
    pub owners_before: Vec<String>,
    /// Output being spent; `None` for `CREATE`.
    pub fulfills: Option<Fulfills>,
    /// Serialised crypto-condition fulfillment; `None` until signed.
    pub fulfillment: Option<String>,
}

/// Crypto-condition locking an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Structured description of the condition.
    pub details: Value,
    /// Condition URI (`ni:///sha-256;...`).
    pub uri: String,
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Amount as a decimal string.
    pub amount: String,
    /// Condition that must be fulfilled to spend this output.
    pub condition: Condition,
    /// Base58 public keys of the new owners.
    pub public_keys: Vec<String>,
}

/// Full transaction body as exchanged with the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxBody {
    /// Asset of the transaction.
    pub asset: Asset,
    /// Transaction id; `None` until the transaction is fulfilled.
    pub id: Option<String>,
    /// Inputs.
    pub inputs: Vec<Input>,
    /// Free-form metadata.
    pub metadata: Option<Map<String, Value>>,
    /// Operation.
    pub operation: Operation,
    /// Outputs.
    pub outputs: Vec<Output>,
    /// Schema version.
    pub version: String,
}

/// A prepared transaction awaiting signatures.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTx(pub(crate) TxBody);

impl UnsignedTx {
    /// Borrow the transaction body.
    #[must_use]
    pub const fn body(&self) -> &TxBody {
        &self.0
    }
}

/// A fully signed transaction with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTx(pub(crate) TxBody);

impl SignedTx {
    /// Borrow the transaction body.
    #[must_use]
    pub const fn body(&self) -> &TxBody {
        &self.0
    }

    /// The transaction id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.0.id.as_deref().unwrap_or_default()
    }

    /// Consume into the raw body.
    #[must_use]
    pub fn into_body(self) -> TxBody {
        self.0
    }
}

/// Read-only projection of a transaction committed to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedTx {
    /// Transaction id.
    pub id: String,
    /// Operation.
    pub operation: Operation,
    /// Asset payload (`CREATE`) or reference (`TRANSFER`).
    pub asset: Asset,
    /// Free-form metadata.
    pub metadata: Option<Map<String, Value>>,
    /// Inputs.
    pub inputs: Vec<Input>,
    /// Outputs.
    pub outputs: Vec<Output>,
}

impl CommittedTx {
    /// Build the projection from a body returned by the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Malformed`] if the body carries no valid id.
    pub fn from_body(body: TxBody) -> Result<Self> {
        let id = body
            .id
            .ok_or_else(|| LedgerError::Malformed("transaction without id".to_string()))?;
        if !is_transaction_id(&id) {
            return Err(LedgerError::Malformed(format!("invalid transaction id '{id}'")));
        }
        Ok(Self {
            id,
            operation: body.operation,
            asset: body.asset,
            metadata: body.metadata,
            inputs: body.inputs,
            outputs: body.outputs,
        })
    }

    /// Asset data of a `CREATE` transaction.
    #[must_use]
    pub const fn asset_data(&self) -> Option<&Map<String, Value>> {
        self.asset.data.as_ref()
    }

    /// String field of the asset data.
    #[must_use]
    pub fn asset_str(&self, key: &str) -> Option<&str> {
        self.asset_data()?.get(key)?.as_str()
    }

    /// Public key of the signer.
    ///
    /// Read from the first input's `owners_before`, falling back to the first
    /// output's `public_keys`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Malformed`] if no key is present or it does not
    /// decode to 32 bytes.
    pub fn signer_public_key(&self) -> Result<[u8; 32]> {
        let encoded = self
            .inputs
            .first()
            .and_then(|input| input.owners_before.first())
            .or_else(|| {
                self.outputs
                    .first()
                    .and_then(|output| output.public_keys.first())
            })
            .ok_or_else(|| {
                LedgerError::Malformed(format!("transaction {} names no signer", self.id))
            })?;
        decode_public_key(encoded)
    }
}

/// Encode a public key as base58, the ledger's key format.
#[must_use]
pub fn encode_public_key(key: &[u8; 32]) -> String {
    bs58::encode(key).into_string()
}

/// Decode a base58 public key.
///
/// # Errors
///
/// Returns [`LedgerError::Malformed`] if the text is not base58 or not 32 bytes.
pub fn decode_public_key(encoded: &str) -> Result<[u8; 32]> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| LedgerError::Malformed(format!("invalid base58 key '{encoded}': {e}")))?;
    bytes
        .try_into()
        .map_err(|_| LedgerError::Malformed(format!("key '{encoded}' is not 32 bytes")))
}

/// Whether `id` has the shape of a transaction id (64 lowercase hex chars).
#[must_use]
pub fn is_transaction_id(id: &str) -> bool {
    id.len() == TX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Explorer URL of a transaction on a ledger node.
#[must_use]
pub fn transaction_url(base_url: &str, tx_id: &str) -> String {
    format!("{}/api/v1/transactions/{tx_id}", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn body_with(owners_before: Vec<String>, public_keys: Vec<String>) -> TxBody {
        TxBody {
            asset: Asset {
                data: json!({"id": "x"}).as_object().cloned(),
                id: None,
            },
            id: Some("a".repeat(64)),
            inputs: vec![Input {
                owners_before,
                fulfills: None,
                fulfillment: None,
            }],
            metadata: None,
            operation: Operation::Create,
            outputs: vec![Output {
                amount: "1".to_string(),
                condition: Condition {
                    details: Value::Null,
                    uri: String::new(),
                },
                public_keys,
            }],
            version: TX_VERSION.to_string(),
        }
    }

    #[test_case(&"a".repeat(64), true ; "lowercase hex")]
    #[test_case(&"A".repeat(64), false ; "uppercase hex")]
    #[test_case("nonexistent", false ; "word")]
    #[test_case(&"a".repeat(63), false ; "too short")]
    #[test_case("../../etc/passwd", false ; "path traversal")]
    fn transaction_id_shape(id: &str, expected: bool) {
        assert_eq!(is_transaction_id(id), expected);
    }

    #[test]
    fn public_key_round_trips_through_base58() {
        let key = [42u8; 32];
        let encoded = encode_public_key(&key);
        assert_eq!(decode_public_key(&encoded).expect("decode"), key);
    }

    #[test]
    fn short_key_is_malformed() {
        let encoded = bs58::encode([1u8; 16]).into_string();
        assert!(matches!(
            decode_public_key(&encoded),
            Err(LedgerError::Malformed(_))
        ));
    }

    #[test]
    fn signer_prefers_owners_before() {
        let signer = encode_public_key(&[1; 32]);
        let owner = encode_public_key(&[2; 32]);
        let tx = CommittedTx::from_body(body_with(vec![signer], vec![owner])).expect("tx");
        assert_eq!(tx.signer_public_key().expect("signer"), [1; 32]);
    }

    #[test]
    fn signer_falls_back_to_outputs() {
        let owner = encode_public_key(&[2; 32]);
        let tx = CommittedTx::from_body(body_with(vec![], vec![owner])).expect("tx");
        assert_eq!(tx.signer_public_key().expect("signer"), [2; 32]);
    }

    #[test]
    fn committed_requires_valid_id() {
        let mut body = body_with(vec![], vec![]);
        body.id = None;
        assert!(CommittedTx::from_body(body.clone()).is_err());
        body.id = Some("nope".to_string());
        assert!(CommittedTx::from_body(body).is_err());
    }

    #[test]
    fn operation_serialises_uppercase() {
        assert_eq!(
            serde_json::to_string(&Operation::Create).expect("json"),
            "\"CREATE\""
        );
    }

    #[test]
    fn transaction_url_trims_trailing_slash() {
        assert_eq!(
            transaction_url("https://ledger.example/", "ab"),
            "https://ledger.example/api/v1/transactions/ab"
        );
    }
}
