use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Byte width of every entry hash.
pub const HASH_LEN: usize = 32;

/// Hash identifying a ledger entry and linking it to its predecessor.
///
/// Computed by `pok-crypto`; this type only carries the bytes. The first
/// entry of every ledger links to [`EntryHash::GENESIS`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryHash([u8; HASH_LEN]);

impl EntryHash {
    /// Fixed predecessor of entry 0 (all zeros).
    pub const GENESIS: Self = Self([0u8; HASH_LEN]);

    /// Wrap a pre-computed digest.
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, which must be exactly [`HASH_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; HASH_LEN] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: HASH_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Returns `true` if this is the genesis constant.
    pub fn is_genesis(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
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

impl fmt::Debug for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryHash({})", self.short_hex())
    }
}

impl fmt::Display for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; HASH_LEN]> for EntryHash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<EntryHash> for [u8; HASH_LEN] {
    fn from(hash: EntryHash) -> Self {
        hash.0
    }
}
