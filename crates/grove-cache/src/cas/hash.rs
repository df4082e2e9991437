//! Blake3 content hashes

use std::fmt;
use std::str::FromStr;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use grove_core::error::GroveError;

/// A Blake3 content hash, serialized as lowercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash {
    bytes: [u8; 32],
}

impl ContentHash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Hash of `content`
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(content);
        Self::new(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, GroveError> {
        let bytes = hex::decode(hex_str).map_err(|e| GroveError::IntegrityFailure {
            package: "cache".to_string(),
            expected: "hex encoded blake3 hash".to_string(),
            actual: format!("invalid hex: {}", e),
        })?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| GroveError::IntegrityFailure {
            package: "cache".to_string(),
            expected: "32 bytes".to_string(),
            actual: format!("{} bytes", bytes.len()),
        })?;
        Ok(Self { bytes })
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = GroveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = GroveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_invalid_length() {
        assert!(ContentHash::from_hex("abcd").is_err());
        assert!(ContentHash::from_hex("not hex").is_err());
    }

    #[test]
    fn test_matches_blake3() {
        let hash = ContentHash::of(b"hello world");
        assert_eq!(hash.to_hex(), blake3::hash(b"hello world").to_hex().to_string());
        assert_ne!(hash, ContentHash::of(b"hello world!"));
    }

    #[test]
    fn test_serializes_as_hex() {
        let hash = ContentHash::of(b"archive");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    proptest! {
        #[test]
        fn hash_is_deterministic(content in prop::collection::vec(any::<u8>(), 0..512)) {
            let first = ContentHash::of(&content);
            prop_assert_eq!(first, ContentHash::of(&content));
            prop_assert_eq!(ContentHash::from_hex(&first.to_hex()).unwrap(), first);
        }
    }
}
