//! Cryptography module - hashing, ECDSA signatures, Merkle trees

mod hash;
mod ecdsa;
mod merkle;

pub use hash::*;
pub use ecdsa::*;
pub use merkle::*;

use std::sync::Arc;

/// The hash function and signature scheme a chain runs on
///
/// Both are fixed for the life of a chain: every block hash, Merkle node and
/// signing digest uses `hasher`, every transaction signature uses `signer`.
#[derive(Clone)]
pub struct CryptoSuite {
    pub hasher: Arc<dyn Hasher>,
    pub signer: Arc<dyn SignatureScheme>,
}

impl CryptoSuite {
    pub fn new(hasher: Arc<dyn Hasher>, signer: Arc<dyn SignatureScheme>) -> Self {
        Self { hasher, signer }
    }

    /// Suite for a configured hash algorithm name (`blake3` or `sha256`)
    pub fn for_algorithm(name: &str) -> Option<Self> {
        let hasher: Arc<dyn Hasher> = match name {
            "blake3" => Arc::new(Blake3Hasher),
            "sha256" => Arc::new(Sha256Hasher),
            _ => return None,
        };
        Some(Self::new(hasher, Arc::new(Secp256k1Ecdsa)))
    }
}

impl Default for CryptoSuite {
    fn default() -> Self {
        Self::new(Arc::new(Blake3Hasher), Arc::new(Secp256k1Ecdsa))
    }
}

impl std::fmt::Debug for CryptoSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoSuite")
            .field("hasher", &self.hasher.name())
            .field("signer", &self.signer.name())
            .finish()
    }
}
