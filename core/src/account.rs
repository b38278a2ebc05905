use std::fmt;
use std::str::FromStr;

use secp256k1::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tiny_keccak::{Hasher, Keccak};

use crate::error::ChainError;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// A 20-byte account address, derived from a secp256k1 public key the same
/// way Ethereum does it: keccak256 of the uncompressed key without its 0x04
/// tag byte, keeping the last 20 bytes.
///
/// Text form is the EIP-55 checksummed hex with a 0x prefix. The checksum is
/// not validated on input; any mix of cases is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Account([u8; 20]);

impl Account {
    pub fn new(bytes: [u8; 20]) -> Self {
        Account(bytes)
    }

    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let uncompressed = public_key.serialize_uncompressed();
        let digest = keccak256(&uncompressed[1..]);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Account(out)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Plain lowercase hex, no prefix. Used for keystore file names.
    pub fn raw_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// EIP-55: uppercase a hex letter when the matching nibble of
    /// keccak256(lowercase_hex) is >= 8.
    pub fn checksum_hex(&self) -> String {
        let lower = hex::encode(self.0);
        let digest = keccak256(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                digest[i / 2] >> 4
            } else {
                digest[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.checksum_hex())
    }
}

impl FromStr for Account {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(stripped).map_err(|_| ChainError::InvalidAddress(s.to_string()))?;
        if bytes.len() != 20 {
            return Err(ChainError::InvalidAddress(s.to_string()));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Account(out))
    }
}

impl Serialize for Account {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.checksum_hex())
    }
}

impl<'de> Deserialize<'de> for Account {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
