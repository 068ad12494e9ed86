//! Content hashes and signature identities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use xxhash_rust::xxh3::xxh3_128;

use crate::config::SignatureError;

/// Width of a content hash in bytes.
pub const HASH_LEN: usize = 16;

/// 16-byte content hash (typically the MD5 of the source file).
///
/// Rendered as 32 lower-case hex characters. The all-zero hash stands for
/// "unknown".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    pub const ZERO: ContentHash = ContentHash([0; HASH_LEN]);

    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; HASH_LEN]
    }

    /// Derive a hash from raw source bytes when the caller has none.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(xxh3_128(data).to_be_bytes())
    }

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
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != HASH_LEN * 2 {
            return Err(SignatureError::InvalidHashLength { len: s.len() });
        }
        let mut bytes = [0u8; HASH_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| SignatureError::InvalidHash {
            value: s.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl From<[u8; HASH_LEN]> for ContentHash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of a signature before it is folded into an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureId {
    /// Known content hash.
    Hash(ContentHash),
    /// Ephemeral numeric id used until a hash is known.
    Ephemeral(u32),
}

impl SignatureId {
    pub fn hash(&self) -> Option<ContentHash> {
        match self {
            SignatureId::Hash(hash) => Some(*hash),
            SignatureId::Ephemeral(_) => None,
        }
    }

    /// Hash stored in index metadata; unknown identities collapse to zero.
    pub fn hash_or_zero(&self) -> ContentHash {
        self.hash().unwrap_or(ContentHash::ZERO)
    }
}

impl Default for SignatureId {
    fn default() -> Self {
        SignatureId::Hash(ContentHash::ZERO)
    }
}

impl From<ContentHash> for SignatureId {
    fn from(hash: ContentHash) -> Self {
        SignatureId::Hash(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

    #[test]
    fn parses_and_formats_lowercase_hex() {
        let hash: ContentHash = MD5.to_uppercase().parse().unwrap();
        assert_eq!(hash.to_string(), MD5);
        assert_eq!(hash.as_bytes()[0], 0xd4);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = "abcd".parse::<ContentHash>().unwrap_err();
        assert!(matches!(err, SignatureError::InvalidHashLength { len: 4 }));
        assert!(err.to_string().contains("hash length invalid"));
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "zz1d8cd98f00b204e9800998ecf8427e";
        assert!(matches!(
            bad.parse::<ContentHash>(),
            Err(SignatureError::InvalidHash { .. })
        ));
    }

    #[test]
    fn derived_hash_is_stable() {
        let a = ContentHash::of_bytes(b"pixels");
        let b = ContentHash::of_bytes(b"pixels");
        let c = ContentHash::of_bytes(b"other pixels");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_zero());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let hash: ContentHash = MD5.parse().unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{MD5}\""));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn ephemeral_ids_have_no_hash() {
        assert_eq!(SignatureId::Ephemeral(7).hash(), None);
        assert!(SignatureId::Ephemeral(7).hash_or_zero().is_zero());
    }
}
