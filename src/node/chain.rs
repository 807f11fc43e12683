//! The chain: block sequence, pending pool and write-through persistence
//!
//! A `Chain` owns its blocks and pending transactions; storage is only a
//! durability sink. Appends persist the block first and the `last_hash`
//! pointer second, and touch in-memory state only after both writes
//! succeed.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ChainConfig, ConfigError};
use crate::consensus::{Block, ChainValidationResult, ValidationError, ValidationFailure, Validator};
use crate::crypto::{CryptoSuite, Hash};
use crate::mining::{Miner, MiningError};
use crate::node::create_genesis_block;
use crate::storage::{block_key, SledStorage, Storage, StorageError, BLOCK_PREFIX, LAST_HASH_KEY};
use crate::validation::{Transaction, TransactionError};

/// Chain errors
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Block not found: {0}")]
    NotFound(String),
    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StorageError),
    #[error("Transaction rejected: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Mining failed: {0}")]
    Mining(#[from] MiningError),
    #[error("Chain invalid: {0}")]
    Validation(#[from] ValidationFailure),
    #[error("Block rejected: {0}")]
    InvalidBlock(#[from] ValidationError),
    #[error("Stale block: expected index {expected} on tip {tip}, got index {found}")]
    StaleBlock { expected: u64, tip: Hash, found: u64 },
    #[error("Transaction {0} is already pending or confirmed")]
    DuplicateTransaction(Hash),
    #[error("No pending transactions to mine")]
    NothingToMine,
    #[error("Corrupt chain data: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Statistics about the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStats {
    pub height: u64,
    pub tip_hash: Hash,
    pub pending: usize,
    pub difficulty: u32,
}

pub struct Chain {
    storage: Arc<dyn Storage>,
    blocks: Vec<Block>,
    /// hash -> position in `blocks`
    index: HashMap<Hash, usize>,
    /// ids of transactions already in a block
    confirmed: HashSet<Hash>,
    pending: Vec<Transaction>,
    validator: Validator,
    miner: Miner,
    difficulty: u32,
    mining_timeout: Option<Duration>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stats", &self.get_stats())
            .field("suite", self.validator.suite())
            .finish()
    }
}

impl Chain {
    /// Open the sled database under `config.data_dir`
    pub fn open_path(config: &ChainConfig) -> Result<Self, ChainError> {
        let storage = SledStorage::open(&config.data_dir)?;
        Self::open(Arc::new(storage), config)
    }

    /// Load the chain from `storage`, writing a genesis block if the store
    /// is empty, then adopt or discard any block persisted past the tip
    pub fn open(storage: Arc<dyn Storage>, config: &ChainConfig) -> Result<Self, ChainError> {
        config.validate()?;
        let suite = config.crypto_suite()?;
        let miner = Miner::new(Arc::clone(&suite.hasher))
            .with_workers(config.mining.workers)
            .with_max_nonce(config.mining.max_nonce);

        let mut chain = Self {
            storage,
            blocks: Vec::new(),
            index: HashMap::new(),
            confirmed: HashSet::new(),
            pending: Vec::new(),
            validator: Validator::new(suite, config.difficulty_bits),
            miner,
            difficulty: config.difficulty_bits,
            mining_timeout: config.mining.timeout(),
        };

        match chain.load_tip_hash()? {
            Some(tip) => chain.load_from(tip)?,
            None => chain.write_genesis()?,
        }
        chain.recover_trailing()?;

        info!(
            height = chain.height(),
            tip = %chain.tip_hash(),
            hasher = chain.suite().hasher.name(),
            workers = chain.miner.workers(),
            "chain opened"
        );
        Ok(chain)
    }

    fn load_tip_hash(&self) -> Result<Option<Hash>, ChainError> {
        match self.storage.get(LAST_HASH_KEY)? {
            Some(bytes) => Hash::from_slice(&bytes)
                .map(Some)
                .ok_or_else(|| ChainError::Corrupt("last_hash is not 32 bytes".into())),
            None => Ok(None),
        }
    }

    fn read_block(&self, hash: &Hash) -> Result<Option<Block>, ChainError> {
        match self.storage.get(&block_key(hash))? {
            Some(bytes) => Block::decode(&bytes)
                .map(Some)
                .map_err(|e| ChainError::Corrupt(format!("block {}: {}", hash, e))),
            None => Ok(None),
        }
    }

    /// Walk back from `tip` through `previous_hash` links to genesis
    ///
    /// Each block must sit under its own hash and carry an index one below
    /// its successor, so the walk ends after at most one read per stored
    /// block.
    fn load_from(&mut self, tip: Hash) -> Result<(), ChainError> {
        let mut blocks: Vec<Block> = Vec::new();
        let mut cursor = tip;

        loop {
            let block = self
                .read_block(&cursor)?
                .ok_or_else(|| ChainError::Corrupt(format!("missing block {}", cursor)))?;
            if block.hash != cursor {
                return Err(ChainError::Corrupt(format!(
                    "block stored under {} claims hash {}",
                    cursor, block.hash
                )));
            }
            if let Some(successor) = blocks.last() {
                if block.index().checked_add(1) != Some(successor.index()) {
                    return Err(ChainError::Corrupt(format!(
                        "block {} has index {}, expected {}",
                        cursor,
                        block.index(),
                        successor.index().saturating_sub(1)
                    )));
                }
            }

            let at_genesis = block.index() == 0;
            cursor = block.header.previous_hash;
            blocks.push(block);

            if at_genesis {
                break;
            }
        }

        blocks.reverse();
        for block in blocks {
            self.push(block);
        }
        debug!(blocks = self.blocks.len(), "chain loaded from storage");
        Ok(())
    }

    fn write_genesis(&mut self) -> Result<(), ChainError> {
        let genesis = create_genesis_block(self.suite().hasher.as_ref());
        self.persist(&genesis)?;
        info!(hash = %genesis.hash, "genesis block written");
        self.push(genesis);
        Ok(())
    }

    /// A crash between persisting a block and advancing `last_hash` leaves
    /// a durable block past the tip. Adopt it if it validates on the tip;
    /// delete anything else that is not on the chain.
    fn recover_trailing(&mut self) -> Result<(), ChainError> {
        let stored = self.storage.scan_prefix(BLOCK_PREFIX)?;
        let mut orphans = Vec::new();

        for (key, value) in stored {
            let block = match Block::decode(&value) {
                Ok(block) => block,
                Err(e) => {
                    warn!(error = %e, "discarding undecodable stored block");
                    self.storage.delete(&key)?;
                    continue;
                }
            };
            if !self.index.contains_key(&block.hash) {
                orphans.push((key, block));
            }
        }

        orphans.sort_by_key(|(_, block)| block.index());

        for (key, block) in orphans {
            let extends_tip = block.header.previous_hash == self.tip_hash()
                && block.index() == self.height() + 1
                && self.validator.validate_block(&block, Some(self.get_last_block())).is_ok()
                && self.check_replay(&block).is_ok();

            if extends_tip {
                self.storage.put(LAST_HASH_KEY, &block.hash.0)?;
                self.storage.flush()?;
                info!(index = block.index(), hash = %block.hash, "adopted trailing block");
                self.push(block);
            } else {
                self.storage.delete(&key)?;
                warn!(index = block.index(), hash = %block.hash, "discarded unindexed block");
            }
        }

        self.storage.flush()?;
        Ok(())
    }

    /// Persist a block, then point `last_hash` at it
    fn persist(&self, block: &Block) -> Result<(), ChainError> {
        let encoded = block
            .encode()
            .map_err(|e| ChainError::Corrupt(format!("encode block: {}", e)))?;
        self.storage.put(&block_key(&block.hash), &encoded)?;
        self.storage.flush()?;
        self.storage.put(LAST_HASH_KEY, &block.hash.0)?;
        self.storage.flush()?;
        Ok(())
    }

    fn push(&mut self, block: Block) {
        let hasher = Arc::clone(&self.validator.suite().hasher);
        self.confirmed
            .extend(block.transactions.iter().map(|tx| tx.id(hasher.as_ref())));
        self.index.insert(block.hash, self.blocks.len());
        self.blocks.push(block);
    }

    pub fn suite(&self) -> &CryptoSuite {
        self.validator.suite()
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Difficulty used for newly mined blocks
    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Index of the tip block
    pub fn height(&self) -> u64 {
        self.get_last_block().index()
    }

    pub fn tip_hash(&self) -> Hash {
        self.get_last_block().hash
    }

    pub fn get_last_block(&self) -> &Block {
        // A chain always holds at least the genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn get_block(&self, hash: &Hash) -> Result<&Block, ChainError> {
        self.index
            .get(hash)
            .map(|&pos| &self.blocks[pos])
            .ok_or_else(|| ChainError::NotFound(hash.to_hex()))
    }

    pub fn get_block_by_index(&self, index: u64) -> Result<&Block, ChainError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.blocks.get(i))
            .ok_or_else(|| ChainError::NotFound(format!("index {}", index)))
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    /// Queue a signed transaction for the next block
    ///
    /// A transaction is rejected if it is malformed, unsigned or forged, or
    /// if the same transaction is already pending or in a block.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        tx.check_amount()?;
        if !tx.verify_with(self.suite())? {
            return Err(TransactionError::InvalidSignature.into());
        }

        let hasher = self.suite().hasher.as_ref();
        let id = tx.id(hasher);
        if self.confirmed.contains(&id) || self.pending.iter().any(|p| p.id(hasher) == id) {
            return Err(ChainError::DuplicateTransaction(id));
        }
        debug!(amount = tx.amount, pending = self.pending.len() + 1, "transaction queued");
        self.pending.push(tx);
        Ok(())
    }

    /// Candidate block over the whole pending pool
    fn pending_template(&self) -> Result<Block, ChainError> {
        if self.pending.is_empty() {
            return Err(ChainError::NothingToMine);
        }
        Ok(self
            .miner
            .assemble_block(self.get_last_block(), self.pending.clone(), self.difficulty))
    }

    /// Mine the pending pool into a block and append it, with no deadline
    ///
    /// The pool is cleared only once the block is appended; any failure
    /// leaves it as it was.
    pub fn mine_pending(&mut self) -> Result<Block, ChainError> {
        let template = self.pending_template()?;
        let block = self.miner.mine_parallel(template, self.difficulty)?;
        self.commit_mined(block)
    }

    /// Like `mine_pending`, failing with `MiningTimedOut` after `timeout`
    /// (or the configured timeout when `None`)
    pub async fn mine_pending_with_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Block, ChainError> {
        let template = self.pending_template()?;
        let block = match timeout.or(self.mining_timeout) {
            Some(limit) => {
                self.miner
                    .mine_with_timeout(template, self.difficulty, limit)
                    .await?
            }
            None => self.miner.mine_parallel(template, self.difficulty)?,
        };
        self.commit_mined(block)
    }

    fn commit_mined(&mut self, block: Block) -> Result<Block, ChainError> {
        self.append_block(block.clone())?;
        self.pending.clear();
        Ok(block)
    }

    /// Append a sealed block on the current tip
    ///
    /// Rejects blocks built on anything but the tip (`StaleBlock`) and
    /// blocks that fail validation. Nothing in memory changes unless both
    /// storage writes succeed.
    pub fn append_block(&mut self, block: Block) -> Result<(), ChainError> {
        let tip = self.get_last_block();
        if block.header.previous_hash != tip.hash || block.index() != tip.index() + 1 {
            return Err(ChainError::StaleBlock {
                expected: tip.index() + 1,
                tip: tip.hash,
                found: block.index(),
            });
        }

        self.validator.validate_block(&block, Some(tip))?;
        self.check_replay(&block)?;
        self.persist(&block)?;

        info!(
            index = block.index(),
            hash = %block.hash,
            transactions = block.transactions.len(),
            "block appended"
        );
        self.push(block);
        Ok(())
    }

    /// Fails if `block` carries a transaction some chain block already holds
    fn check_replay(&self, block: &Block) -> Result<(), ChainError> {
        let hasher = self.suite().hasher.as_ref();
        match block
            .transactions
            .iter()
            .map(|tx| tx.id(hasher))
            .find(|id| self.confirmed.contains(id))
        {
            Some(id) => Err(ChainError::DuplicateTransaction(id)),
            None => Ok(()),
        }
    }

    /// Validate the full chain
    pub fn validate(&self) -> Result<ChainValidationResult, ChainError> {
        Ok(self.validator.validate_chain(&self.blocks)?)
    }

    /// Validate a subrange of the chain by position
    pub fn validate_range(&self, range: Range<usize>) -> Result<ChainValidationResult, ChainError> {
        Ok(self.validator.validate_range(&self.blocks, range)?)
    }

    pub fn get_stats(&self) -> ChainStats {
        ChainStats {
            height: self.height(),
            tip_hash: self.tip_hash(),
            pending: self.pending.len(),
            difficulty: self.difficulty,
        }
    }
}
