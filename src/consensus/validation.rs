//! Block and chain validation
//!
//! Validation only reports. The first failing block in chain order is
//! returned together with the violated rule.

use rayon::prelude::*;
use std::collections::HashSet;
use std::ops::Range;
use thiserror::Error;

use crate::consensus::{calculate_work, meets_difficulty, Block};
use crate::crypto::{CryptoSuite, Hash, Hasher};

/// Validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Genesis block must have index 0 and the zero previous hash")]
    InvalidGenesis,
    #[error("Merkle root does not match the transactions")]
    MerkleMismatch,
    #[error("Stored hash does not match the header")]
    HashMismatch,
    #[error("Insufficient work: {actual} leading zero bits, {required} required")]
    InsufficientWork { required: u32, actual: u32 },
    #[error("Previous hash does not match the preceding block")]
    BrokenLink,
    #[error("Index {found} does not follow {previous}")]
    IndexGap { previous: u64, found: u64 },
    #[error("Transaction {tx} has an invalid or missing signature")]
    InvalidSignature { tx: usize },
    #[error("Transaction {tx} has a negative or non-finite amount")]
    InvalidAmount { tx: usize },
    #[error("Transaction {tx} repeats an earlier transaction in the block")]
    DuplicateTransaction { tx: usize },
}

/// A validation error located at a chain position
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("block {index}: {error}")]
pub struct ValidationFailure {
    /// Position of the failing block in the validated chain
    pub index: u64,
    pub error: ValidationError,
}

/// Check the stored Merkle root against the transactions
pub fn validate_merkle_root(block: &Block, hasher: &dyn Hasher) -> Result<(), ValidationError> {
    if block.compute_merkle_root(hasher) != block.header.merkle_root {
        return Err(ValidationError::MerkleMismatch);
    }
    Ok(())
}

/// Check the cached hash against the header
pub fn validate_hash(block: &Block, hasher: &dyn Hasher) -> Result<(), ValidationError> {
    if !block.is_hash_current(hasher) {
        return Err(ValidationError::HashMismatch);
    }
    Ok(())
}

/// Validate proof of work against `required` leading zero bits
pub fn validate_pow(hash: &Hash, required: u32) -> Result<(), ValidationError> {
    if !meets_difficulty(hash, required) {
        return Err(ValidationError::InsufficientWork {
            required,
            actual: hash.leading_zero_bits(),
        });
    }
    Ok(())
}

/// Chain validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainValidationResult {
    /// Number of blocks checked
    pub blocks_checked: usize,
    /// Sum of per-block work over the checked blocks
    pub total_work: u128,
    /// Hash of the last checked block (zero when nothing was checked)
    pub tip_hash: Hash,
}

/// Validates blocks and chains under one crypto suite and minimum difficulty
#[derive(Debug, Clone)]
pub struct Validator {
    suite: CryptoSuite,
    min_difficulty: u32,
}

impl Validator {
    pub fn new(suite: CryptoSuite, min_difficulty: u32) -> Self {
        Self {
            suite,
            min_difficulty,
        }
    }

    pub fn suite(&self) -> &CryptoSuite {
        &self.suite
    }

    pub fn min_difficulty(&self) -> u32 {
        self.min_difficulty
    }

    /// Validate a single block. `previous` is `None` only for the block at
    /// chain position 0, which must be a genesis block.
    pub fn validate_block(
        &self,
        block: &Block,
        previous: Option<&Block>,
    ) -> Result<(), ValidationError> {
        let hasher = self.suite.hasher.as_ref();

        if previous.is_none() && !block.is_genesis() {
            return Err(ValidationError::InvalidGenesis);
        }

        validate_merkle_root(block, hasher)?;
        validate_hash(block, hasher)?;

        // Genesis is not mined; it only has to meet the difficulty it records
        let required = match previous {
            Some(_) => block.header.difficulty.max(self.min_difficulty),
            None => block.header.difficulty,
        };
        validate_pow(&block.hash, required)?;

        if let Some(prev) = previous {
            if block.header.previous_hash != prev.hash {
                return Err(ValidationError::BrokenLink);
            }
            if prev.header.index.checked_add(1) != Some(block.header.index) {
                return Err(ValidationError::IndexGap {
                    previous: prev.header.index,
                    found: block.header.index,
                });
            }
        }

        self.validate_transactions(block)
    }

    /// Per-transaction rules. Repeated ids must be caught here: duplicating
    /// the last leaf of an odd level leaves the Merkle root unchanged.
    fn validate_transactions(&self, block: &Block) -> Result<(), ValidationError> {
        let hasher = self.suite.hasher.as_ref();
        let mut seen = HashSet::with_capacity(block.transactions.len());

        for (tx_index, tx) in block.transactions.iter().enumerate() {
            if !seen.insert(tx.id(hasher)) {
                return Err(ValidationError::DuplicateTransaction { tx: tx_index });
            }
            if tx.check_amount().is_err() {
                return Err(ValidationError::InvalidAmount { tx: tx_index });
            }
            if tx.verify_with(&self.suite) != Ok(true) {
                return Err(ValidationError::InvalidSignature { tx: tx_index });
            }
        }
        Ok(())
    }

    /// Validate a whole chain, genesis included
    pub fn validate_chain(&self, blocks: &[Block]) -> Result<ChainValidationResult, ValidationFailure> {
        if blocks.is_empty() {
            return Err(ValidationFailure {
                index: 0,
                error: ValidationError::InvalidGenesis,
            });
        }
        self.validate_range(blocks, 0..blocks.len())
    }

    /// Validate `blocks[range]`. The genesis rules apply only when the range
    /// starts at 0; otherwise the first block links against its
    /// predecessor. The range is clamped to the slice.
    ///
    /// Blocks are checked in parallel; the failure at the lowest position
    /// wins.
    pub fn validate_range(
        &self,
        blocks: &[Block],
        range: Range<usize>,
    ) -> Result<ChainValidationResult, ValidationFailure> {
        let end = range.end.min(blocks.len());
        let start = range.start.min(end);

        let failure = (start..end).into_par_iter().find_map_first(|i| {
            let previous = i.checked_sub(1).map(|p| &blocks[p]);
            self.validate_block(&blocks[i], previous)
                .err()
                .map(|error| ValidationFailure {
                    index: i as u64,
                    error,
                })
        });

        if let Some(failure) = failure {
            tracing::warn!(index = failure.index, error = %failure.error, "chain validation failed");
            return Err(failure);
        }

        let checked = &blocks[start..end];
        Ok(ChainValidationResult {
            blocks_checked: checked.len(),
            total_work: checked.iter().fold(0u128, |acc, b| {
                acc.saturating_add(calculate_work(b.header.difficulty))
            }),
            tip_hash: checked.last().map(|b| b.hash).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{hash_bytes, Blake3Hasher, PrivateKey};
    use crate::validation::Transaction;

    fn validator() -> Validator {
        Validator::new(CryptoSuite::default(), 0)
    }

    fn signed_tx(amount: f64) -> Transaction {
        let key = PrivateKey::generate();
        let mut tx = Transaction::new(key.public_key().0, b"dave".to_vec(), amount).unwrap();
        tx.sign(&key).unwrap();
        tx
    }

    /// Validly signed transaction whose amount the constructors would refuse
    fn bad_amount_tx(amount: f64) -> Transaction {
        let key = PrivateKey::generate();
        let suite = CryptoSuite::default();
        let mut tx = Transaction {
            sender_public_key: key.public_key().0,
            recipient_address: b"dave".to_vec(),
            amount,
            timestamp: 1_700_000_000,
            signature: Vec::new(),
        };
        let digest = tx.signing_hash(suite.hasher.as_ref());
        tx.signature = suite.signer.sign(&key.to_bytes(), digest.as_bytes()).unwrap();
        tx
    }

    fn genesis() -> Block {
        Block::candidate(0, Hash::zero(), 0, 0, vec![], &Blake3Hasher)
    }

    fn child(prev: &Block, txs: Vec<Transaction>) -> Block {
        Block::candidate(prev.index() + 1, prev.hash, 1, 0, txs, &Blake3Hasher)
    }

    #[test]
    fn test_merkle_validation() {
        let block = child(&genesis(), vec![signed_tx(5.0)]);
        assert!(validate_merkle_root(&block, &Blake3Hasher).is_ok());
    }

    #[test]
    fn test_invalid_merkle_root() {
        let mut block = child(&genesis(), vec![signed_tx(5.0)]);
        block.header.merkle_root = hash_bytes(b"wrong");
        assert_eq!(
            validate_merkle_root(&block, &Blake3Hasher),
            Err(ValidationError::MerkleMismatch)
        );
    }

    #[test]
    fn test_validate_pow() {
        assert!(validate_pow(&Hash::zero(), 256).is_ok());
        assert_eq!(
            validate_pow(&Hash([0xFF; 32]), 1),
            Err(ValidationError::InsufficientWork { required: 1, actual: 0 })
        );
    }

    #[test]
    fn test_empty_chain_has_no_genesis() {
        let err = validator().validate_chain(&[]).unwrap_err();
        assert_eq!(err.error, ValidationError::InvalidGenesis);
    }

    #[test]
    fn test_bad_genesis() {
        let mut g = genesis();
        g.header.previous_hash = hash_bytes(b"not zero");
        g.reseal(&Blake3Hasher);
        let err = validator().validate_chain(&[g]).unwrap_err();
        assert_eq!(err, ValidationFailure { index: 0, error: ValidationError::InvalidGenesis });
    }

    #[test]
    fn test_valid_chain() {
        let g = genesis();
        let b1 = child(&g, vec![signed_tx(1.0)]);
        let b2 = child(&b1, vec![signed_tx(2.0), signed_tx(3.0)]);
        let result = validator().validate_chain(&[g, b1, b2.clone()]).unwrap();

        assert_eq!(result.blocks_checked, 3);
        assert_eq!(result.tip_hash, b2.hash);
        assert_eq!(result.total_work, 3);
    }

    #[test]
    fn test_broken_link() {
        let g = genesis();
        let mut b1 = child(&g, vec![]);
        b1.header.previous_hash = hash_bytes(b"elsewhere");
        b1.reseal(&Blake3Hasher);

        let err = validator().validate_chain(&[g, b1]).unwrap_err();
        assert_eq!(err, ValidationFailure { index: 1, error: ValidationError::BrokenLink });
    }

    #[test]
    fn test_index_gap() {
        let g = genesis();
        let mut b1 = child(&g, vec![]);
        b1.header.index = 5;
        b1.reseal(&Blake3Hasher);

        let err = validator().validate_chain(&[g, b1]).unwrap_err();
        assert_eq!(err.error, ValidationError::IndexGap { previous: 0, found: 5 });
    }

    #[test]
    fn test_stale_cached_hash() {
        let g = genesis();
        let mut b1 = child(&g, vec![]);
        b1.header.timestamp += 10;

        let err = validator().validate_chain(&[g, b1]).unwrap_err();
        assert_eq!(err.error, ValidationError::HashMismatch);
    }

    #[test]
    fn test_minimum_difficulty_enforced() {
        let g = genesis();
        let b1 = child(&g, vec![]);
        let strict = Validator::new(CryptoSuite::default(), 250);
        assert_eq!(strict.min_difficulty(), 250);

        let err = strict.validate_chain(&[g, b1]).unwrap_err();
        assert!(matches!(
            err.error,
            ValidationError::InsufficientWork { required: 250, .. }
        ));
    }

    #[test]
    fn test_unsigned_transaction_rejected() {
        let g = genesis();
        let key = PrivateKey::generate();
        let unsigned = Transaction::new(key.public_key().0, vec![1, 2], 1.0).unwrap();
        let b1 = child(&g, vec![signed_tx(1.0), unsigned]);

        let err = validator().validate_chain(&[g, b1]).unwrap_err();
        assert_eq!(err, ValidationFailure { index: 1, error: ValidationError::InvalidSignature { tx: 1 } });
    }

    #[test]
    fn test_lowest_failure_reported() {
        let g = genesis();
        let b1 = child(&g, vec![]);
        let b2 = child(&b1, vec![]);
        let b3 = child(&b2, vec![]);
        let mut chain = vec![g, b1, b2, b3];
        chain[3].header.merkle_root = hash_bytes(b"x");
        chain[2].header.merkle_root = hash_bytes(b"y");

        let err = validator().validate_chain(&chain).unwrap_err();
        assert_eq!(err.index, 2);
    }

    #[test]
    fn test_validate_subrange() {
        let g = genesis();
        let b1 = child(&g, vec![]);
        let b2 = child(&b1, vec![]);
        let mut b3 = child(&b2, vec![]);
        b3.header.merkle_root = hash_bytes(b"bad");
        let chain = vec![g, b1, b2, b3];

        let ok = validator().validate_range(&chain, 1..3).unwrap();
        assert_eq!(ok.blocks_checked, 2);
        assert_eq!(ok.tip_hash, chain[2].hash);

        let err = validator().validate_range(&chain, 2..10).unwrap_err();
        assert_eq!(err.index, 3);
    }

    #[test]
    fn test_duplicated_last_transaction_rejected() {
        let g = genesis();
        let mut b1 = child(&g, vec![signed_tx(1.0), signed_tx(2.0), signed_tx(3.0)]);
        let root = b1.header.merkle_root;

        // Odd level: repeating the last leaf keeps the same root
        let last = b1.transactions[2].clone();
        b1.transactions.push(last);
        assert_eq!(b1.compute_merkle_root(&Blake3Hasher), root);

        let err = validator().validate_chain(&[g, b1]).unwrap_err();
        assert_eq!(
            err,
            ValidationFailure { index: 1, error: ValidationError::DuplicateTransaction { tx: 3 } }
        );
    }

    #[test]
    fn test_bad_amount_rejected() {
        for amount in [-5.0, f64::NAN] {
            let g = genesis();
            let tx = bad_amount_tx(amount);
            assert_eq!(tx.verify(), Ok(true));
            let b1 = child(&g, vec![signed_tx(1.0), tx]);

            let err = validator().validate_chain(&[g, b1]).unwrap_err();
            assert_eq!(err, ValidationFailure { index: 1, error: ValidationError::InvalidAmount { tx: 1 } });
        }
    }
}
