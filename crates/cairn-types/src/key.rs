use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of a [`Key`] in bytes.
pub const KEY_LEN: usize = 32;

/// Content address of a stored chunk.
///
/// A `Key` is a BLAKE3 digest. Identical content always produces the same
/// `Key`. Keys are totally ordered so backends can keep them sorted, but the
/// ordering carries no meaning beyond identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Create a `Key` from a pre-computed digest.
    pub const fn from_hash(hash: [u8; KEY_LEN]) -> Self {
        Self(hash)
    }

    /// Plain BLAKE3 digest of `data`, without any domain separation.
    ///
    /// Chunk stores use a domain-separated digest instead; this is for
    /// fixtures and callers that need an arbitrary stable key.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Build a key from a slice, which must be exactly [`KEY_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.short_hex())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; KEY_LEN]> for Key {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Key> for [u8; KEY_LEN] {
    fn from(key: Key) -> Self {
        key.0
    }
}
