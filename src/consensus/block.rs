//! Block structure
//!
//! A block is a header plus its ordered transactions. The header hash is
//! cached on the block; `reseal` must be called after any header change.

use serde::{Deserialize, Serialize};

use crate::crypto::{compute_merkle_root_with, Hash, Hasher};
use crate::validation::Transaction;

/// Block header containing all hashed metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Position in the chain, 0 for genesis
    pub index: u64,
    /// Hash of the previous block (all zeros for genesis)
    pub previous_hash: Hash,
    /// Merkle root of all transactions
    pub merkle_root: Hash,
    /// Block timestamp (seconds since Unix epoch)
    pub timestamp: u64,
    /// Required leading zero bits of the block hash
    pub difficulty: u32,
    /// Nonce used for PoW
    pub nonce: u64,
}

impl BlockHeader {
    pub fn new(
        index: u64,
        previous_hash: Hash,
        merkle_root: Hash,
        timestamp: u64,
        difficulty: u32,
        nonce: u64,
    ) -> Self {
        Self {
            index,
            previous_hash,
            merkle_root,
            timestamp,
            difficulty,
            nonce,
        }
    }

    /// Serialize the header for hashing (fixed 92 bytes, little-endian)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(92);
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&self.previous_hash.0);
        bytes.extend_from_slice(&self.merkle_root.0);
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.difficulty.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Calculate the hash of this header
    pub fn hash(&self, hasher: &dyn Hasher) -> Hash {
        hasher.hash(&self.to_bytes())
    }
}

/// A complete block containing header, cached hash and transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// Cached header hash
    pub hash: Hash,
    /// Ordered transactions; order defines Merkle leaf order
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a block from a header, caching the header hash
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>, hasher: &dyn Hasher) -> Self {
        let hash = header.hash(hasher);
        Self {
            header,
            hash,
            transactions,
        }
    }

    /// Build an unsealed candidate (nonce 0) whose Merkle root covers
    /// `transactions`
    pub fn candidate(
        index: u64,
        previous_hash: Hash,
        timestamp: u64,
        difficulty: u32,
        transactions: Vec<Transaction>,
        hasher: &dyn Hasher,
    ) -> Self {
        let merkle_root = merkle_root_of(&transactions, hasher);
        let header = BlockHeader::new(index, previous_hash, merkle_root, timestamp, difficulty, 0);
        Self::new(header, transactions, hasher)
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn index(&self) -> u64 {
        self.header.index
    }

    pub fn previous_hash(&self) -> &Hash {
        &self.header.previous_hash
    }

    /// Recompute the header hash without touching the cache
    pub fn compute_hash(&self, hasher: &dyn Hasher) -> Hash {
        self.header.hash(hasher)
    }

    /// Recompute the Merkle root from the transaction list
    pub fn compute_merkle_root(&self, hasher: &dyn Hasher) -> Hash {
        merkle_root_of(&self.transactions, hasher)
    }

    /// Refresh the cached hash after a header change
    pub fn reseal(&mut self, hasher: &dyn Hasher) {
        self.hash = self.header.hash(hasher);
    }

    /// Set the nonce and refresh the cached hash
    pub fn set_nonce(&mut self, nonce: u64, hasher: &dyn Hasher) {
        self.header.nonce = nonce;
        self.reseal(hasher);
    }

    /// Whether the cached hash matches the header as currently set
    pub fn is_hash_current(&self, hasher: &dyn Hasher) -> bool {
        self.hash == self.compute_hash(hasher)
    }

    pub fn is_genesis(&self) -> bool {
        self.header.index == 0 && self.header.previous_hash == Hash::zero()
    }

    /// Persisted encoding
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Merkle root over the transaction ids, in order
pub fn merkle_root_of(transactions: &[Transaction], hasher: &dyn Hasher) -> Hash {
    let ids: Vec<Hash> = transactions.iter().map(|tx| tx.id(hasher)).collect();
    compute_merkle_root_with(hasher, &ids)
}
