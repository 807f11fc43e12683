//! Hashing primitives
//!
//! Every digest in the chain (block headers, Merkle nodes, transaction
//! signing digests) comes from one `Hasher`. BLAKE3 is the default;
//! SHA-256 is available as a drop-in alternative.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 32-byte hash output
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// All-zero hash, the genesis `previous_hash` sentinel
    pub const fn zero() -> Self {
        Hash([0u8; 32])
    }

    /// Create hash from a byte slice of exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Hash(arr))
    }

    /// Create hash from hex string
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        Hash::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Number of leading zero bits, read big-endian from byte 0
    pub fn leading_zero_bits(&self) -> u32 {
        let mut bits = 0;
        for byte in self.0 {
            if byte == 0 {
                bits += 8;
            } else {
                bits += byte.leading_zeros();
                break;
            }
        }
        bits
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A collision-resistant hash function producing 32-byte digests
pub trait Hasher: Send + Sync {
    /// Stable name, used in configuration
    fn name(&self) -> &'static str;

    fn hash(&self, data: &[u8]) -> Hash;

    /// Hash two digests together (Merkle interior node)
    fn hash_pair(&self, left: &Hash, right: &Hash) -> Hash {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&left.0);
        data.extend_from_slice(&right.0);
        self.hash(&data)
    }
}

/// BLAKE3, the default chain hash
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn hash(&self, data: &[u8]) -> Hash {
        Hash(*blake3::hash(data).as_bytes())
    }
}

/// SHA-256
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn hash(&self, data: &[u8]) -> Hash {
        Hash(Sha256::digest(data).into())
    }
}

/// Hash arbitrary bytes using the default hasher (BLAKE3)
pub fn hash_bytes(data: &[u8]) -> Hash {
    Blake3Hasher.hash(data)
}

/// Hash two hashes together with the default hasher
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    Blake3Hasher.hash_pair(left, right)
}
