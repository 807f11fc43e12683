//! Storage module - the key-value contract the chain writes through
//!
//! The chain only needs get/put/delete and a prefix scan. Blocks live under
//! `block:` + hash; the current tip hash under `last_hash`.

mod memory;
pub mod db;

pub use memory::MemoryStorage;
pub use db::SledStorage;

use crate::crypto::Hash;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Key prefix for persisted blocks
pub const BLOCK_PREFIX: &[u8] = b"block:";

/// Key holding the hash of the current chain tip
pub const LAST_HASH_KEY: &[u8] = b"last_hash";

/// Key for a block by hash
pub fn block_key(hash: &Hash) -> Vec<u8> {
    let mut key = BLOCK_PREFIX.to_vec();
    key.extend_from_slice(&hash.0);
    key
}

/// Minimal durable key-value store
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Make previous writes durable
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
