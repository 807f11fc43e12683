//! Merkle tree implementation
//!
//! Used for computing transaction merkle roots in blocks. Mining and
//! validation both go through `compute_merkle_root_with`, so the odd-leaf
//! policy is shared.

use super::{Blake3Hasher, Hash, Hasher};

/// Root of an empty transaction list: the hash of the empty byte string
pub fn empty_root(hasher: &dyn Hasher) -> Hash {
    hasher.hash(&[])
}

/// Compute the merkle root of a list of hashes with the default hasher
pub fn compute_merkle_root(hashes: &[Hash]) -> Hash {
    compute_merkle_root_with(&Blake3Hasher, hashes)
}

/// Compute the merkle root of a list of hashes
///
/// If the list is empty, returns `empty_root`.
/// If odd number of elements at any level, duplicates the last element.
pub fn compute_merkle_root_with(hasher: &dyn Hasher, hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return empty_root(hasher);
    }

    let mut current_level: Vec<Hash> = hashes.to_vec();

    while current_level.len() > 1 {
        current_level = next_level(hasher, current_level);
    }

    current_level[0]
}

fn next_level(hasher: &dyn Hasher, mut level: Vec<Hash>) -> Vec<Hash> {
    if level.len() % 2 == 1 {
        let last = level[level.len() - 1];
        level.push(last);
    }

    level
        .chunks(2)
        .map(|pair| hasher.hash_pair(&pair[0], &pair[1]))
        .collect()
}

/// Merkle proof for a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Index of the transaction in the block
    pub index: usize,
    /// Sibling hashes from leaf to root
    pub siblings: Vec<(Hash, bool)>, // (hash, is_left)
}

impl MerkleProof {
    /// Verify this proof against a root hash
    pub fn verify(&self, hasher: &dyn Hasher, leaf: &Hash, root: &Hash) -> bool {
        let mut current = *leaf;

        for (sibling, is_left) in &self.siblings {
            current = if *is_left {
                hasher.hash_pair(sibling, &current)
            } else {
                hasher.hash_pair(&current, sibling)
            };
        }

        current == *root
    }
}

/// Build a merkle proof for the leaf at `index`
pub fn build_merkle_proof(hasher: &dyn Hasher, hashes: &[Hash], index: usize) -> Option<MerkleProof> {
    if index >= hashes.len() {
        return None;
    }

    let mut current_level: Vec<Hash> = hashes.to_vec();
    let mut current_index = index;
    let mut siblings = Vec::new();

    while current_level.len() > 1 {
        if current_level.len() % 2 == 1 {
            let last = current_level[current_level.len() - 1];
            current_level.push(last);
        }

        let sibling_index = current_index ^ 1;
        let is_left = current_index % 2 == 1;
        siblings.push((current_level[sibling_index], is_left));

        current_level = next_level(hasher, current_level);
        current_index /= 2;
    }

    Some(MerkleProof { index, siblings })
}
