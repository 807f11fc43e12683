//! powchain - proof-of-work ledger core
//!
//! Signed transactions are mined into hash-linked blocks under a
//! leading-zero-bits difficulty, persisted through a key-value store, and
//! re-validated on demand.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod validation;
pub mod storage;
pub mod mining;
pub mod node;

pub use config::ChainConfig;
pub use node::{Chain, ChainError};

/// Protocol constants
pub mod constants {
    /// Genesis timestamp (Unix seconds)
    pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
}

/// Current time in seconds since the Unix epoch (0 if the clock is before it)
pub(crate) fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
