//! Block miner implementation
//!
//! Assembles candidate blocks and performs PoW. The nonce space can be split
//! across worker threads; the first worker to seal the block raises the job's
//! cancel flag and the others stop at their next iteration.

use parking_lot::Mutex;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::consensus::{meets_difficulty, Block};
use crate::crypto::{Blake3Hasher, Hasher};
use crate::unix_timestamp;
use crate::validation::Transaction;

/// Mining errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("Nonce space exhausted after {attempts} attempts")]
    MiningExhausted { attempts: u128 },
    #[error("Mining timed out after {0:?}")]
    MiningTimedOut(Duration),
    #[error("Mining cancelled")]
    Cancelled,
    #[error("Mining worker failed: {0}")]
    WorkerFailed(String),
}

/// Where the miner is in its current job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Searching,
    Sealed,
}

/// Block miner
#[derive(Clone)]
pub struct Miner {
    hasher: Arc<dyn Hasher>,
    /// Number of worker threads for `mine_parallel`
    workers: usize,
    /// Highest nonce tried before giving up
    max_nonce: u64,
    /// External stop signal, sticky until `reset`
    stop_signal: Arc<AtomicBool>,
    sealed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Miner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Miner")
            .field("hasher", &self.hasher.name())
            .field("workers", &self.workers)
            .field("max_nonce", &self.max_nonce)
            .field("state", &self.state())
            .finish()
    }
}

impl Default for Miner {
    fn default() -> Self {
        Self::new(Arc::new(Blake3Hasher))
    }
}

impl Miner {
    /// Single-worker miner over the full `u64` nonce space
    pub fn new(hasher: Arc<dyn Hasher>) -> Self {
        Self {
            hasher,
            workers: 1,
            max_nonce: u64::MAX,
            stop_signal: Arc::new(AtomicBool::new(false)),
            sealed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_nonce(mut self, max_nonce: u64) -> Self {
        self.max_nonce = max_nonce;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn state(&self) -> MinerState {
        if self.sealed.load(Ordering::SeqCst) {
            MinerState::Sealed
        } else {
            MinerState::Searching
        }
    }

    /// Get a stop signal handle
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Stop mining
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Reset stop signal
    pub fn reset(&self) {
        self.stop_signal.store(false, Ordering::SeqCst);
    }

    /// Assemble a candidate block on top of `tip`
    pub fn assemble_block(&self, tip: &Block, transactions: Vec<Transaction>, difficulty: u32) -> Block {
        Block::candidate(
            tip.index() + 1,
            tip.hash,
            unix_timestamp(),
            difficulty,
            transactions,
            self.hasher.as_ref(),
        )
    }

    /// Mine a block (find valid nonce) on the calling thread, scanning
    /// `0..=max_nonce` in order
    pub fn mine(&self, template: Block, difficulty: u32) -> Result<Block, MiningError> {
        self.mine_range(template, difficulty, 0..=self.max_nonce)
    }

    /// Mine on the calling thread over an explicit nonce range
    pub fn mine_range(
        &self,
        template: Block,
        difficulty: u32,
        nonces: RangeInclusive<u64>,
    ) -> Result<Block, MiningError> {
        let cancel = AtomicBool::new(false);
        let attempts = AtomicU64::new(0);
        let block = self.prepare(template, difficulty);

        match self.search(block, nonces.clone(), &cancel, &attempts) {
            Some(sealed) => Ok(self.finish(sealed, attempts.load(Ordering::Relaxed))),
            None if self.stop_signal.load(Ordering::SeqCst) => Err(MiningError::Cancelled),
            None => Err(MiningError::MiningExhausted {
                attempts: range_len(&nonces),
            }),
        }
    }

    /// Mine with `workers` threads, each scanning a disjoint slice of
    /// `0..=max_nonce`
    pub fn mine_parallel(&self, template: Block, difficulty: u32) -> Result<Block, MiningError> {
        self.mine_parallel_with(template, difficulty, Arc::new(AtomicBool::new(false)))
    }

    fn mine_parallel_with(
        &self,
        template: Block,
        difficulty: u32,
        cancel: Arc<AtomicBool>,
    ) -> Result<Block, MiningError> {
        let block = self.prepare(template, difficulty);
        let ranges = partition_nonces(self.max_nonce, self.workers);
        let winner: Mutex<Option<Block>> = Mutex::new(None);
        let attempts = AtomicU64::new(0);

        tracing::debug!(
            index = block.index(),
            difficulty,
            workers = ranges.len(),
            "starting nonce search"
        );

        let panicked = std::thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .iter()
                .cloned()
                .map(|range| {
                    let candidate = block.clone();
                    let (winner, cancel, attempts) = (&winner, &cancel, &attempts);
                    scope.spawn(move || {
                        if let Some(sealed) = self.search(candidate, range, cancel, attempts) {
                            let mut slot = winner.lock();
                            if slot.is_none() {
                                *slot = Some(sealed);
                            }
                            cancel.store(true, Ordering::SeqCst);
                        }
                    })
                })
                .collect();

            handles.into_iter().filter_map(|h| h.join().err()).count()
        });

        if let Some(sealed) = winner.into_inner() {
            return Ok(self.finish(sealed, attempts.load(Ordering::Relaxed)));
        }
        if panicked > 0 {
            return Err(MiningError::WorkerFailed(format!("{} worker(s) panicked", panicked)));
        }
        if cancel.load(Ordering::SeqCst) || self.stop_signal.load(Ordering::SeqCst) {
            return Err(MiningError::Cancelled);
        }
        Err(MiningError::MiningExhausted {
            attempts: self.max_nonce as u128 + 1,
        })
    }

    /// Mine in parallel on the blocking pool, giving up after `timeout`
    ///
    /// On expiry the job's workers are cancelled; nothing outside the
    /// discarded candidate has been touched.
    pub async fn mine_with_timeout(
        &self,
        template: Block,
        difficulty: u32,
        timeout: Duration,
    ) -> Result<Block, MiningError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let miner = self.clone();
        let job_cancel = Arc::clone(&cancel);
        let handle = tokio::task::spawn_blocking(move || {
            miner.mine_parallel_with(template, difficulty, job_cancel)
        });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(MiningError::WorkerFailed(join_error.to_string())),
            Err(_) => {
                cancel.store(true, Ordering::SeqCst);
                tracing::warn!(?timeout, "mining deadline expired");
                Err(MiningError::MiningTimedOut(timeout))
            }
        }
    }

    fn prepare(&self, mut template: Block, difficulty: u32) -> Block {
        self.sealed.store(false, Ordering::SeqCst);
        template.header.difficulty = difficulty;
        template.reseal(self.hasher.as_ref());
        template
    }

    fn finish(&self, sealed: Block, attempts: u64) -> Block {
        self.sealed.store(true, Ordering::SeqCst);
        tracing::info!(
            index = sealed.index(),
            nonce = sealed.header.nonce,
            attempts,
            hash = %sealed.hash,
            "block sealed"
        );
        sealed
    }

    /// The PoW loop over one nonce range
    fn search(
        &self,
        mut block: Block,
        nonces: RangeInclusive<u64>,
        cancel: &AtomicBool,
        attempts: &AtomicU64,
    ) -> Option<Block> {
        let hasher = self.hasher.as_ref();
        let difficulty = block.header.difficulty;
        let mut tried = 0u64;

        for nonce in nonces {
            if cancel.load(Ordering::Relaxed) || self.stop_signal.load(Ordering::Relaxed) {
                break;
            }

            block.header.nonce = nonce;
            let hash = block.header.hash(hasher);
            tried += 1;

            if meets_difficulty(&hash, difficulty) {
                block.hash = hash;
                attempts.fetch_add(tried, Ordering::Relaxed);
                return Some(block);
            }
        }

        attempts.fetch_add(tried, Ordering::Relaxed);
        None
    }
}

fn range_len(range: &RangeInclusive<u64>) -> u128 {
    if range.is_empty() {
        0
    } else {
        (*range.end() as u128) - (*range.start() as u128) + 1
    }
}

/// Split `0..=max_nonce` into at most `workers` contiguous, disjoint ranges
pub fn partition_nonces(max_nonce: u64, workers: usize) -> Vec<RangeInclusive<u64>> {
    let total = max_nonce as u128 + 1;
    let workers = (workers.max(1) as u128).min(total);
    let chunk = total.div_ceil(workers);

    (0..workers)
        .filter_map(|i| {
            let start = i * chunk;
            if start >= total {
                return None;
            }
            let end = (start + chunk).min(total) - 1;
            Some(start as u64..=end as u64)
        })
        .collect()
}
