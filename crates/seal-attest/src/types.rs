//! Identity and hash value types.

use std::fmt;
use std::str::FromStr;

use seal_element::{DIGEST_LEN, KEY_LEN, PRIVATE_KEY_OFFSET};
use seal_ledger::{decode_public_key, encode_public_key};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ed25519 public key of a device, displayed as base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Base58 rendering, the ledger's key format.
    #[must_use]
    pub fn to_base58(&self) -> String {
        encode_public_key(&self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl FromStr for PublicKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_public_key(s).map(Self).map_err(|e| e.to_string())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// SHA-256 digest of an attested payload, displayed as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; DIGEST_LEN]);

impl ContentHash {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, as anchored in ledger assets.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

impl FromStr for ContentHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid hex digest '{s}': {e}"))?;
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| format!("digest '{s}' is not {DIGEST_LEN} bytes"))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Where the private key of an identity lives in protected storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRef {
    /// Offset of the 32 private key bytes.
    pub offset: u16,
}

impl Default for KeyRef {
    fn default() -> Self {
        Self {
            offset: PRIVATE_KEY_OFFSET,
        }
    }
}

/// The device's single cryptographic identity.
///
/// Holds no private key bytes, only where to find them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Public key anchored as signer on the ledger.
    pub public_key: PublicKey,
    /// Location of the private key.
    pub key_ref: KeyRef,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn public_key_round_trips_through_base58() {
        let key = PublicKey::from_bytes([7u8; 32]);
        let parsed: PublicKey = key.to_string().parse().expect("parse");
        assert_eq!(parsed, key);
        assert_eq!(serde_json::to_value(key).expect("json"), key.to_base58());
    }

    #[test]
    fn content_hash_renders_lowercase_hex() {
        let hash = ContentHash::from_bytes([0xAB; 32]);
        assert_eq!(hash.to_string(), "ab".repeat(32));
    }

    #[test_case("zz" ; "not hex")]
    #[test_case("abcd" ; "too short")]
    #[test_case("" ; "empty")]
    fn content_hash_rejects(input: &str) {
        assert!(input.parse::<ContentHash>().is_err());
    }

    #[test]
    fn key_ref_defaults_to_private_key_offset() {
        assert_eq!(KeyRef::default().offset, PRIVATE_KEY_OFFSET);
    }
}
