//! Genesis block generation
//!
//! The genesis block is fixed: index 0, the zero sentinel as previous hash,
//! no transactions, difficulty 0, nonce 0 and a constant timestamp. It is
//! never mined.

use crate::consensus::Block;
use crate::constants::GENESIS_TIMESTAMP;
use crate::crypto::{Hash, Hasher};

/// Create the genesis block
///
/// Byte-for-byte reproducible for a given hasher.
pub fn create_genesis_block(hasher: &dyn Hasher) -> Block {
    Block::candidate(0, Hash::zero(), GENESIS_TIMESTAMP, 0, vec![], hasher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Blake3Hasher, Sha256Hasher};

    #[test]
    fn test_genesis_determinism() {
        let genesis1 = create_genesis_block(&Blake3Hasher);
        let genesis2 = create_genesis_block(&Blake3Hasher);

        assert_eq!(genesis1, genesis2);
        assert_eq!(genesis1.hash(), genesis2.hash());
    }

    #[test]
    fn test_genesis_shape() {
        let genesis = create_genesis_block(&Blake3Hasher);
        assert!(genesis.is_genesis());
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.header.merkle_root, Blake3Hasher.hash(b""));
        assert!(genesis.is_hash_current(&Blake3Hasher));
    }

    #[test]
    fn test_genesis_depends_on_hasher() {
        assert_ne!(
            create_genesis_block(&Blake3Hasher).hash(),
            create_genesis_block(&Sha256Hasher).hash()
        );
    }
}
