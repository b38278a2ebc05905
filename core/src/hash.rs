use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::ChainError;

/// A 32-byte SHA-256 digest. Text form is lowercase hex without a 0x prefix,
/// which is also how it travels in JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn sha256(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Hash(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The all-zero hash, used as the parent of the genesis block and as the
    /// "give me everything" marker in sync queries.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl FromStr for Hash {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Hash::default());
        }
        let bytes = hex::decode(s).map_err(|_| ChainError::InvalidHash(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(ChainError::InvalidHash(s.to_string()));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Hash(out))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A block hash satisfies the difficulty predicate when its hex rendering
/// starts with exactly `difficulty` zero nibbles: the nibble right after them
/// must be non-zero, so a "too good" hash does not count.
pub fn is_block_hash_valid(hash: &Hash, difficulty: u64) -> bool {
    let hex = hash.hex();
    let d = difficulty as usize;
    if d >= hex.len() {
        return false;
    }
    hex.as_bytes()[..d].iter().all(|&b| b == b'0') && hex.as_bytes()[d] != b'0'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_from_hex(s: &str) -> Hash {
        s.parse().unwrap()
    }

    #[test]
    fn hex_round_trip() {
        let h = Hash::sha256(b"hello");
        let parsed: Hash = h.hex().parse().unwrap();
        assert_eq!(h, parsed);
        assert_eq!(h.hex().len(), 64);
    }

    #[test]
    fn empty_hash() {
        assert!(Hash::default().is_empty());
        assert!(!Hash::sha256(b"x").is_empty());
        let parsed: Hash = "".parse().unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn difficulty_requires_exact_zero_count() {
        let three_zeroes = hash_from_hex(&format!("000f{}", "ab".repeat(30)));
        assert!(is_block_hash_valid(&three_zeroes, 3));
        assert!(!is_block_hash_valid(&three_zeroes, 2));

        // four leading zeroes fail a difficulty-3 check outright
        let four_zeroes = hash_from_hex(&format!("0000{}", "ab".repeat(30)));
        assert!(!is_block_hash_valid(&four_zeroes, 3));
        assert!(is_block_hash_valid(&four_zeroes, 4));
    }

    #[test]
    fn difficulty_zero_wants_nonzero_first_nibble() {
        let no_zeroes = hash_from_hex(&"ab".repeat(32));
        assert!(is_block_hash_valid(&no_zeroes, 0));
        let leading_zero = hash_from_hex(&format!("0a{}", "ab".repeat(31)));
        assert!(!is_block_hash_valid(&leading_zero, 0));
    }
}
