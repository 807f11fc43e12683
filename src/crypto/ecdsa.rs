//! ECDSA signatures over secp256k1
//!
//! Transactions are signed with ECDSA on the secp256k1 curve. The scheme is
//! reachable through the `SignatureScheme` trait so callers can swap it out.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use super::hash_bytes;

/// Signature errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
}

/// An asymmetric signature scheme over raw byte keys
pub trait SignatureScheme: Send + Sync {
    /// Stable name, used in logs
    fn name(&self) -> &'static str;

    /// Derive the encoded public key for a private key
    fn public_key(&self, private_key: &[u8]) -> Result<Vec<u8>, SignatureError>;

    /// Sign a message
    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, SignatureError>;

    /// Verify a signature. Malformed keys or signatures verify `false`.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

/// ECDSA over secp256k1 with SEC1-compressed public keys and 64-byte
/// fixed-width signatures
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Ecdsa;

impl SignatureScheme for Secp256k1Ecdsa {
    fn name(&self) -> &'static str {
        "secp256k1-ecdsa"
    }

    fn public_key(&self, private_key: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let signing_key =
            SigningKey::from_slice(private_key).map_err(|_| SignatureError::InvalidPrivateKey)?;
        Ok(encode_verifying_key(signing_key.verifying_key()))
    }

    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let signing_key =
            SigningKey::from_slice(private_key).map_err(|_| SignatureError::InvalidPrivateKey)?;
        let signature: Signature = signing_key.sign(message);
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let verifying_key = match VerifyingKey::from_sec1_bytes(public_key) {
            Ok(vk) => vk,
            Err(_) => return false,
        };

        let sig = match Signature::from_slice(signature) {
            Ok(s) => s,
            Err(_) => return false,
        };

        verifying_key.verify(message, &sig).is_ok()
    }
}

fn encode_verifying_key(key: &VerifyingKey) -> Vec<u8> {
    key.to_encoded_point(true).as_bytes().to_vec()
}

/// secp256k1 private key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    /// Create from 32 bytes; fails when the bytes are not a valid scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        SigningKey::from_slice(bytes)
            .map(PrivateKey)
            .map_err(|_| SignatureError::InvalidPrivateKey)
    }

    /// SEC1-compressed public key (33 bytes)
    pub fn public_key(&self) -> PublicKey {
        PublicKey(encode_verifying_key(self.0.verifying_key()))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0.to_bytes());
        out
    }
}

/// SEC1-encoded public key
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    /// Create from SEC1 bytes, checking the point is on the curve
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        VerifyingKey::from_sec1_bytes(bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
        Ok(PublicKey(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// 20-byte address: the first 20 bytes of the key's hash
    pub fn address_bytes(&self) -> Vec<u8> {
        hash_bytes(&self.0).0[..20].to_vec()
    }

    /// Human-readable address: base58 of the address bytes plus a
    /// 4-byte checksum
    pub fn to_address(&self) -> String {
        encode_address(&self.address_bytes())
    }
}

/// Base58 rendering of raw address bytes with a 4-byte checksum
pub fn encode_address(address: &[u8]) -> String {
    let checksum = hash_bytes(&hash_bytes(address).0);
    let mut with_checksum = Vec::with_capacity(address.len() + 4);
    with_checksum.extend_from_slice(address);
    with_checksum.extend_from_slice(&checksum.0[0..4]);
    bs58::encode(&with_checksum).into_string()
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let private = PrivateKey::generate();
        let public = private.public_key();
        assert_eq!(public.0.len(), 33);
        assert!(PublicKey::from_bytes(&public.0).is_ok());
    }

    #[test]
    fn test_sign_verify() {
        let private = PrivateKey::generate();
        let public = private.public_key();
        let scheme = Secp256k1Ecdsa;

        let signature = scheme.sign(&private.to_bytes(), b"test message").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(scheme.verify(&public.0, b"test message", &signature));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let private = PrivateKey::generate();
        let scheme = Secp256k1Ecdsa;
        let a = scheme.sign(&private.to_bytes(), b"msg").unwrap();
        let b = scheme.sign(&private.to_bytes(), b"msg").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let private1 = PrivateKey::generate();
        let public2 = PrivateKey::generate().public_key();
        let scheme = Secp256k1Ecdsa;

        let signature = scheme.sign(&private1.to_bytes(), b"test message").unwrap();
        assert!(!scheme.verify(&public2.0, b"test message", &signature));
    }

    #[test]
    fn test_wrong_message_fails() {
        let private = PrivateKey::generate();
        let scheme = Secp256k1Ecdsa;

        let signature = scheme.sign(&private.to_bytes(), b"message 1").unwrap();
        assert!(!scheme.verify(&private.public_key().0, b"message 2", &signature));
    }

    #[test]
    fn test_malformed_inputs_verify_false() {
        let private = PrivateKey::generate();
        let scheme = Secp256k1Ecdsa;
        let signature = scheme.sign(&private.to_bytes(), b"m").unwrap();

        assert!(!scheme.verify(&[0u8; 33], b"m", &signature));
        assert!(!scheme.verify(&private.public_key().0, b"m", &signature[..10]));
        assert!(!scheme.verify(&private.public_key().0, b"m", &[]));
    }

    #[test]
    fn test_invalid_private_key_rejected() {
        // Zero is not a valid scalar
        assert_eq!(
            PrivateKey::from_bytes(&[0u8; 32]).unwrap_err(),
            SignatureError::InvalidPrivateKey
        );
        assert!(Secp256k1Ecdsa.public_key(&[1u8; 5]).is_err());
    }

    #[test]
    fn test_key_serialization() {
        let private = PrivateKey::generate();
        let recovered = PrivateKey::from_bytes(&private.to_bytes()).unwrap();
        assert_eq!(private.public_key(), recovered.public_key());
    }

    #[test]
    fn test_address_generation() {
        let public = PrivateKey::generate().public_key();
        assert_eq!(public.address_bytes().len(), 20);
        assert!(public.to_address().len() > 10);
    }
}
