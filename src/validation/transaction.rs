//! Transaction structure, signing and verification
//!
//! A transaction moves `amount` from the holder of `sender_public_key` to
//! `recipient_address`. It is signed once; a signed transaction refuses a
//! second signature.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{CryptoSuite, Hash, Hasher, PrivateKey, SignatureError};
use crate::unix_timestamp;

/// Transaction signing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Private key is not a valid curve scalar")]
    InvalidKey,
    #[error("Transaction is already signed")]
    AlreadySigned,
    #[error("Transaction carries no signature")]
    MissingSignature,
    #[error("Private key does not match the sender public key")]
    KeyMismatch,
    #[error("Amount must be finite and non-negative, got {0}")]
    InvalidAmount(String),
    #[error("Transaction signature does not verify")]
    InvalidSignature,
}

impl From<SignatureError> for TransactionError {
    fn from(_: SignatureError) -> Self {
        TransactionError::InvalidKey
    }
}

/// A signed value transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// SEC1-encoded public key of the signer
    pub sender_public_key: Vec<u8>,
    /// Receiver address bytes
    pub recipient_address: Vec<u8>,
    pub amount: f64,
    /// Creation time (seconds since Unix epoch)
    pub timestamp: u64,
    /// Empty until signed
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Create an unsigned transaction stamped with the current time
    pub fn new(
        sender_public_key: Vec<u8>,
        recipient_address: Vec<u8>,
        amount: f64,
    ) -> Result<Self, TransactionError> {
        Self::with_timestamp(sender_public_key, recipient_address, amount, unix_timestamp())
    }

    /// Create an unsigned transaction with an explicit timestamp
    pub fn with_timestamp(
        sender_public_key: Vec<u8>,
        recipient_address: Vec<u8>,
        amount: f64,
        timestamp: u64,
    ) -> Result<Self, TransactionError> {
        let tx = Self {
            sender_public_key,
            recipient_address,
            amount,
            timestamp,
            signature: Vec::new(),
        };
        tx.check_amount()?;
        Ok(tx)
    }

    /// Amount must be finite and non-negative
    ///
    /// Fields are public and decoded blocks bypass the constructors, so
    /// signing, submission and block validation all re-check this.
    pub fn check_amount(&self) -> Result<(), TransactionError> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(TransactionError::InvalidAmount(self.amount.to_string()));
        }
        Ok(())
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Canonical encoding of the signed fields (signature excluded)
    ///
    /// Layout: len-prefixed sender key, len-prefixed recipient, amount as
    /// IEEE-754 bits, timestamp. All integers little-endian.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            4 + self.sender_public_key.len() + 4 + self.recipient_address.len() + 16,
        );
        put_var_bytes(&mut bytes, &self.sender_public_key);
        put_var_bytes(&mut bytes, &self.recipient_address);
        bytes.extend_from_slice(&self.amount.to_bits().to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }

    /// Digest that gets signed
    pub fn signing_hash(&self, hasher: &dyn Hasher) -> Hash {
        hasher.hash(&self.signing_bytes())
    }

    /// Canonical encoding including the signature
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.signing_bytes();
        put_var_bytes(&mut bytes, &self.signature);
        bytes
    }

    /// Transaction id (Merkle leaf); covers the signature too
    pub fn id(&self, hasher: &dyn Hasher) -> Hash {
        hasher.hash(&self.to_bytes())
    }

    /// Sign with the default suite
    pub fn sign(&mut self, private_key: &PrivateKey) -> Result<(), TransactionError> {
        self.sign_with(&CryptoSuite::default(), &private_key.to_bytes())
    }

    /// Sign with raw private key bytes
    pub fn sign_with(
        &mut self,
        suite: &CryptoSuite,
        private_key: &[u8],
    ) -> Result<(), TransactionError> {
        if self.is_signed() {
            return Err(TransactionError::AlreadySigned);
        }
        self.check_amount()?;

        let public_key = suite.signer.public_key(private_key)?;
        if public_key != self.sender_public_key {
            return Err(TransactionError::KeyMismatch);
        }

        let digest = self.signing_hash(suite.hasher.as_ref());
        self.signature = suite.signer.sign(private_key, digest.as_bytes())?;
        Ok(())
    }

    /// Verify with the default suite
    pub fn verify(&self) -> Result<bool, TransactionError> {
        self.verify_with(&CryptoSuite::default())
    }

    /// `Err(MissingSignature)` when unsigned; otherwise whether the
    /// signature checks out against `sender_public_key`
    pub fn verify_with(&self, suite: &CryptoSuite) -> Result<bool, TransactionError> {
        if !self.is_signed() {
            return Err(TransactionError::MissingSignature);
        }

        let digest = self.signing_hash(suite.hasher.as_ref());
        Ok(suite
            .signer
            .verify(&self.sender_public_key, digest.as_bytes(), &self.signature))
    }
}

fn put_var_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Blake3Hasher, Sha256Hasher};
    use std::sync::Arc;

    fn unsigned(key: &PrivateKey, amount: f64) -> Transaction {
        Transaction::with_timestamp(key.public_key().0, b"bob".to_vec(), amount, 1_700_000_000)
            .unwrap()
    }

    #[test]
    fn test_sign_then_verify() {
        let key = PrivateKey::generate();
        let mut tx = unsigned(&key, 1.0);
        tx.sign(&key).unwrap();

        assert!(tx.is_signed());
        assert_eq!(tx.verify(), Ok(true));
    }

    #[test]
    fn test_verify_unsigned_is_missing_signature() {
        let key = PrivateKey::generate();
        let tx = unsigned(&key, 1.0);
        assert_eq!(tx.verify(), Err(TransactionError::MissingSignature));
    }

    #[test]
    fn test_resign_rejected() {
        let key = PrivateKey::generate();
        let mut tx = unsigned(&key, 1.0);
        tx.sign(&key).unwrap();
        let first = tx.signature.clone();

        assert_eq!(tx.sign(&key), Err(TransactionError::AlreadySigned));
        assert_eq!(tx.signature, first);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let key = PrivateKey::generate();
        let mut tx = unsigned(&key, 1.0);
        let suite = CryptoSuite::default();

        assert_eq!(tx.sign_with(&suite, &[0u8; 32]), Err(TransactionError::InvalidKey));
        assert_eq!(tx.sign_with(&suite, &[7u8; 3]), Err(TransactionError::InvalidKey));
        assert!(!tx.is_signed());
    }

    #[test]
    fn test_foreign_key_rejected() {
        let key = PrivateKey::generate();
        let other = PrivateKey::generate();
        let mut tx = unsigned(&key, 1.0);

        assert_eq!(tx.sign(&other), Err(TransactionError::KeyMismatch));
    }

    #[test]
    fn test_negative_and_nan_amounts_rejected() {
        let key = PrivateKey::generate();
        let pk = key.public_key().0;
        assert!(Transaction::new(pk.clone(), vec![1], -1.0).is_err());
        assert!(Transaction::new(pk.clone(), vec![1], f64::NAN).is_err());
        assert!(Transaction::new(pk.clone(), vec![1], f64::INFINITY).is_err());
        assert!(Transaction::new(pk, vec![1], 0.0).is_ok());
    }

    #[test]
    fn test_sign_rejects_bad_amount_literal() {
        let key = PrivateKey::generate();
        for amount in [-5.0, f64::NAN, f64::NEG_INFINITY] {
            let mut tx = Transaction {
                sender_public_key: key.public_key().0,
                recipient_address: b"bob".to_vec(),
                amount,
                timestamp: 1_700_000_000,
                signature: Vec::new(),
            };
            assert!(matches!(tx.sign(&key), Err(TransactionError::InvalidAmount(_))));
            assert!(!tx.is_signed());
        }
    }

    #[test]
    fn test_tampered_fields_fail_verification() {
        let key = PrivateKey::generate();
        let mut tx = unsigned(&key, 1.0);
        tx.sign(&key).unwrap();

        let mut t = tx.clone();
        t.amount = 2.0;
        assert_eq!(t.verify(), Ok(false));

        let mut t = tx.clone();
        t.timestamp += 1;
        assert_eq!(t.verify(), Ok(false));

        let mut t = tx.clone();
        t.recipient_address[0] ^= 0x01;
        assert_eq!(t.verify(), Ok(false));

        let mut t = tx.clone();
        t.signature[10] ^= 0x01;
        assert_eq!(t.verify(), Ok(false));

        let mut t = tx;
        t.sender_public_key[5] ^= 0x01;
        assert_eq!(t.verify(), Ok(false));
    }

    #[test]
    fn test_truncated_signature_verifies_false() {
        let key = PrivateKey::generate();
        let mut tx = unsigned(&key, 1.0);
        tx.sign(&key).unwrap();
        tx.signature.truncate(12);
        assert_eq!(tx.verify(), Ok(false));
    }

    #[test]
    fn test_signature_bound_to_hasher() {
        let key = PrivateKey::generate();
        let mut tx = unsigned(&key, 3.5);
        let sha_suite = CryptoSuite::new(Arc::new(Sha256Hasher), Arc::new(crate::crypto::Secp256k1Ecdsa));
        tx.sign_with(&sha_suite, &key.to_bytes()).unwrap();

        assert_eq!(tx.verify_with(&sha_suite), Ok(true));
        assert_eq!(tx.verify(), Ok(false));
    }

    #[test]
    fn test_id_covers_signature() {
        let key = PrivateKey::generate();
        let unsigned_tx = unsigned(&key, 1.0);
        let mut signed = unsigned_tx.clone();
        signed.sign(&key).unwrap();

        assert_eq!(
            unsigned_tx.signing_hash(&Blake3Hasher),
            signed.signing_hash(&Blake3Hasher)
        );
        assert_ne!(unsigned_tx.id(&Blake3Hasher), signed.id(&Blake3Hasher));
    }
}
