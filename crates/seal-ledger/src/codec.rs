//! BigchainDB 2.0 transaction codec.
//!
//! - Canonical JSON: sorted keys, compact separators, UTF-8 unescaped.
//! - Transaction id: SHA3-256 (hex) of the canonical body with `id: null`.
//! - Signing message: SHA3-256 of the canonical body with `id: null` and
//!   every fulfillment `null`, extended with the spent output reference for
//!   inputs that fulfill one.
//! - Ed25519-SHA-256 crypto-conditions: DER fulfillment, base64url without
//!   padding, and `ni:///sha-256` condition URIs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use crate::error::{LedgerError, Result};
use crate::model::{
    decode_public_key, encode_public_key, Asset, Condition, Input, Operation, Output, SignedTx,
    TxBody, UnsignedTx, TX_VERSION,
};
use crate::signer::TxSigner;

/// Crypto-condition type of single-key Ed25519 outputs.
pub const ED25519_CONDITION_TYPE: &str = "ed25519-sha-256";

/// Fixed cost of an Ed25519-SHA-256 condition.
pub const ED25519_CONDITION_COST: u32 = 131_072;

/// Amount placed on the single output of a `CREATE`.
pub const CREATE_AMOUNT: &str = "10";

// DER tags of the Ed25519-SHA-256 fulfillment and fingerprint.
const FULFILLMENT_TAG: u8 = 0xA4;
const FINGERPRINT_TAG: u8 = 0x30;
const PUBLIC_KEY_TAG: u8 = 0x80;
const SIGNATURE_TAG: u8 = 0x81;
const FULFILLMENT_LEN: usize = 2 + 2 + 32 + 2 + 64;

/// Serialise `value` to canonical JSON.
///
/// # Errors
///
/// Returns [`LedgerError::Malformed`] if the value cannot be represented as JSON.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    // `Value` objects are key-sorted maps.
    let value = serde_json::to_value(value)
        .map_err(|e| LedgerError::Malformed(format!("unserialisable transaction: {e}")))?;
    serde_json::to_string(&value)
        .map_err(|e| LedgerError::Malformed(format!("unserialisable transaction: {e}")))
}

/// Condition URI locking an output to `public_key`.
#[must_use]
pub fn condition_uri(public_key: &[u8; 32]) -> String {
    let mut fingerprint = Vec::with_capacity(36);
    fingerprint.extend_from_slice(&[FINGERPRINT_TAG, 0x22, PUBLIC_KEY_TAG, 0x20]);
    fingerprint.extend_from_slice(public_key);
    let digest = Sha256::digest(&fingerprint);
    format!(
        "ni:///sha-256;{}?fpt={ED25519_CONDITION_TYPE}&cost={ED25519_CONDITION_COST}",
        URL_SAFE_NO_PAD.encode(digest)
    )
}

/// Structured condition details for `public_key`.
#[must_use]
pub fn condition_details(public_key: &[u8; 32]) -> Value {
    json!({
        "public_key": encode_public_key(public_key),
        "type": ED25519_CONDITION_TYPE,
    })
}

/// Serialise an Ed25519-SHA-256 fulfillment.
#[must_use]
pub fn encode_fulfillment(public_key: &[u8; 32], signature: &[u8; 64]) -> String {
    let mut der = Vec::with_capacity(FULFILLMENT_LEN);
    der.extend_from_slice(&[FULFILLMENT_TAG, 0x64, PUBLIC_KEY_TAG, 0x20]);
    der.extend_from_slice(public_key);
    der.extend_from_slice(&[SIGNATURE_TAG, 0x40]);
    der.extend_from_slice(signature);
    URL_SAFE_NO_PAD.encode(der)
}

/// Parse an Ed25519-SHA-256 fulfillment into its public key and signature.
///
/// # Errors
///
/// Returns [`LedgerError::Malformed`] if the fulfillment is not a well-formed
/// Ed25519-SHA-256 fulfillment.
pub fn decode_fulfillment(encoded: &str) -> Result<([u8; 32], [u8; 64])> {
    let der = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| LedgerError::Malformed(format!("fulfillment is not base64url: {e}")))?;
    if der.len() != FULFILLMENT_LEN
        || der[..4] != [FULFILLMENT_TAG, 0x64, PUBLIC_KEY_TAG, 0x20]
        || der[36..38] != [SIGNATURE_TAG, 0x40]
    {
        return Err(LedgerError::Malformed(
            "fulfillment is not an ed25519-sha-256 fulfillment".to_string(),
        ));
    }
    let mut public_key = [0u8; 32];
    public_key.copy_from_slice(&der[4..36]);
    let mut signature = [0u8; 64];
    signature.copy_from_slice(&der[38..]);
    Ok((public_key, signature))
}

/// Compute the id of a transaction body.
///
/// # Errors
///
/// Returns [`LedgerError::Malformed`] if the body cannot be serialised.
pub fn transaction_id(body: &TxBody) -> Result<String> {
    let mut unidentified = body.clone();
    unidentified.id = None;
    let serialized = canonical_json(&unidentified)?;
    Ok(hex::encode(Sha3_256::digest(serialized.as_bytes())))
}

/// Compute the message the owner of `input` signs.
///
/// # Errors
///
/// Returns [`LedgerError::Malformed`] if the body cannot be serialised.
pub fn signing_message(body: &TxBody, input: &Input) -> Result<[u8; 32]> {
    let mut stripped = body.clone();
    stripped.id = None;
    for input in &mut stripped.inputs {
        input.fulfillment = None;
    }
    let serialized = canonical_json(&stripped)?;

    let mut hasher = Sha3_256::new();
    hasher.update(serialized.as_bytes());
    if let Some(fulfills) = &input.fulfills {
        hasher.update(format!("{}{}", fulfills.transaction_id, fulfills.output_index).as_bytes());
    }
    Ok(hasher.finalize().into())
}

/// Build an unsigned `CREATE` owned by `signer`.
///
/// An empty metadata map is sent as `null`.
///
/// # Errors
///
/// Returns [`LedgerError::Unsupported`] for operations other than `CREATE`.
pub fn prepare(
    operation: Operation,
    signer: &[u8; 32],
    asset: Map<String, Value>,
    metadata: Option<Map<String, Value>>,
) -> Result<UnsignedTx> {
    if operation != Operation::Create {
        return Err(LedgerError::Unsupported(format!(
            "only CREATE can be prepared, got {operation}"
        )));
    }
    let owner = encode_public_key(signer);
    Ok(UnsignedTx(TxBody {
        asset: Asset {
            data: Some(asset),
            id: None,
        },
        id: None,
        inputs: vec![Input {
            owners_before: vec![owner.clone()],
            fulfills: None,
            fulfillment: None,
        }],
        metadata: metadata.filter(|m| !m.is_empty()),
        operation,
        outputs: vec![Output {
            amount: CREATE_AMOUNT.to_string(),
            condition: Condition {
                details: condition_details(signer),
                uri: condition_uri(signer),
            },
            public_keys: vec![owner],
        }],
        version: TX_VERSION.to_string(),
    }))
}

/// Sign every input of `tx` with `signer` and assign the transaction id.
///
/// # Errors
///
/// Returns [`LedgerError::Signer`] if the signer does not own an input or
/// cannot sign.
pub fn fulfill(tx: UnsignedTx, signer: &dyn TxSigner) -> Result<SignedTx> {
    let mut body = tx.0;
    let public_key = signer.public_key();
    let owner = encode_public_key(&public_key);

    let mut fulfillments = Vec::with_capacity(body.inputs.len());
    for (index, input) in body.inputs.iter().enumerate() {
        if input.owners_before != [owner.as_str()] {
            return Err(LedgerError::Signer(format!(
                "signer {owner} is not the sole owner of input {index}"
            )));
        }
        let message = signing_message(&body, input)?;
        let signature = signer.sign(&message)?;
        fulfillments.push(encode_fulfillment(&public_key, &signature));
    }
    for (input, fulfillment) in body.inputs.iter_mut().zip(fulfillments) {
        input.fulfillment = Some(fulfillment);
    }

    body.id = Some(transaction_id(&body)?);
    Ok(SignedTx(body))
}

/// Check a submitted body's id and every input's fulfillment.
///
/// # Errors
///
/// Returns [`LedgerError::Rejected`] describing the first failed check.
pub fn validate_signed(body: &TxBody) -> Result<()> {
    let expected = transaction_id(body)?;
    if body.id.as_deref() != Some(expected.as_str()) {
        return Err(LedgerError::Rejected(format!(
            "transaction id does not match body (expected {expected})"
        )));
    }

    for (index, input) in body.inputs.iter().enumerate() {
        let encoded = input.fulfillment.as_deref().ok_or_else(|| {
            LedgerError::Rejected(format!("input {index} has no fulfillment"))
        })?;
        let (public_key, signature) = decode_fulfillment(encoded)
            .map_err(|e| LedgerError::Rejected(format!("input {index}: {e}")))?;
        let owner = input
            .owners_before
            .first()
            .ok_or_else(|| LedgerError::Rejected(format!("input {index} has no owner")))?;
        if decode_public_key(owner)? != public_key {
            return Err(LedgerError::Rejected(format!(
                "input {index} is fulfilled by a key other than its owner"
            )));
        }
        let verifying_key = VerifyingKey::from_bytes(&public_key)
            .map_err(|e| LedgerError::Rejected(format!("input {index}: invalid key: {e}")))?;
        let message = signing_message(body, input)?;
        verifying_key
            .verify_strict(&message, &Signature::from_bytes(&signature))
            .map_err(|_| LedgerError::Rejected(format!("input {index}: invalid signature")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[3u8; 32])
    }

    fn asset() -> Map<String, Value> {
        json!({"id": "lot-17", "sha": "ab"})
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    fn signed() -> SignedTx {
        let key = key();
        let unsigned =
            prepare(Operation::Create, &key.verifying_key().to_bytes(), asset(), None).expect("prepare");
        fulfill(unsigned, &key).expect("fulfill")
    }

    #[test]
    fn canonical_json_sorts_keys_compactly() {
        let value = json!({"b": 1, "a": {"d": [1, 2], "c": "é"}});
        assert_eq!(
            canonical_json(&value).expect("json"),
            r#"{"a":{"c":"é","d":[1,2]},"b":1}"#
        );
    }

    #[test]
    fn fulfillment_round_trips() {
        let encoded = encode_fulfillment(&[1; 32], &[2; 64]);
        let (pk, sig) = decode_fulfillment(&encoded).expect("decode");
        assert_eq!(pk, [1; 32]);
        assert_eq!(sig, [2; 64]);
    }

    #[test]
    fn fulfillment_rejects_other_condition_types() {
        let encoded = URL_SAFE_NO_PAD.encode([0xA0, 0x02, 0x80, 0x00]);
        assert!(decode_fulfillment(&encoded).is_err());
    }

    #[test]
    fn condition_uri_has_expected_shape() {
        let uri = condition_uri(&[0; 32]);
        assert!(uri.starts_with("ni:///sha-256;"));
        assert!(uri.ends_with("?fpt=ed25519-sha-256&cost=131072"));
    }

    #[test]
    fn prepare_rejects_transfer() {
        let result = prepare(Operation::Transfer, &[0; 32], asset(), None);
        assert!(matches!(result, Err(LedgerError::Unsupported(_))));
    }

    #[test]
    fn empty_metadata_becomes_null() {
        let unsigned = prepare(Operation::Create, &[0; 32], asset(), Some(Map::new())).expect("prepare");
        assert!(unsigned.body().metadata.is_none());
    }

    #[test]
    fn fulfilled_transaction_validates() {
        let tx = signed();
        assert_eq!(tx.id().len(), 64);
        validate_signed(tx.body()).expect("valid");
    }

    #[test]
    fn tampered_asset_breaks_id() {
        let mut body = signed().into_body();
        if let Some(data) = body.asset.data.as_mut() {
            data.insert("sha".to_string(), json!("cd"));
        }
        assert!(matches!(validate_signed(&body), Err(LedgerError::Rejected(_))));
    }

    #[test]
    fn tampered_asset_with_recomputed_id_breaks_signature() {
        let mut body = signed().into_body();
        if let Some(data) = body.asset.data.as_mut() {
            data.insert("sha".to_string(), json!("cd"));
        }
        body.id = Some(transaction_id(&body).expect("id"));
        let err = validate_signed(&body).expect_err("must fail");
        assert!(err.to_string().contains("invalid signature"));
    }

    #[test]
    fn foreign_signer_is_refused() {
        let owner = key();
        let stranger = SigningKey::from_bytes(&[4u8; 32]);
        let unsigned =
            prepare(Operation::Create, &owner.verifying_key().to_bytes(), asset(), None).expect("prepare");
        assert!(matches!(
            fulfill(unsigned, &stranger),
            Err(LedgerError::Signer(_))
        ));
    }

    #[test]
    fn transaction_id_is_stable() {
        let tx = signed();
        assert_eq!(transaction_id(tx.body()).expect("id"), tx.id());
    }
}
