//! secp256k1 keys and signatures
//!
//! The wallet service never derives or stores keys itself; `KeyPair` backs the
//! in-process ledger used for development and tests. Verification is needed by
//! the signature assembler to match a signature to the input it claims.

use rand::rngs::OsRng;
use ripemd::Ripemd160;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::hash::sha256;

/// Version byte prepended to address payloads
const ADDRESS_VERSION: u8 = 0x28;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature encoding")]
    InvalidSignature,
    #[error("Digest must be 32 bytes, got {0}")]
    InvalidDigest(usize),
}

/// A secp256k1 key pair
#[derive(Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret_key);
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Compressed (33 byte) public key
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.public_key.serialize()
    }

    pub fn address(&self) -> String {
        address_from_public_key(&self.public_key_bytes())
    }

    /// Sign a 32-byte digest, returning the compact 64-byte signature
    pub fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        let message = digest_message(digest)?;
        let signature = Secp256k1::new().sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact().to_vec())
    }
}

/// Base58Check(version || RIPEMD160(SHA256(pubkey)))
pub fn address_from_public_key(public_key: &[u8]) -> String {
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(public_key));
    let ripemd_hash = ripemd.finalize();

    let mut payload = vec![ADDRESS_VERSION];
    payload.extend_from_slice(&ripemd_hash);

    let checksum = Sha256::digest(Sha256::digest(&payload));
    payload.extend_from_slice(&checksum[..4]);

    bs58::encode(payload).into_string()
}

/// Verify a compact signature over a 32-byte digest
///
/// Malformed keys or signatures are errors; a well-formed signature that
/// does not verify is `Ok(false)`.
pub fn verify_digest(public_key: &[u8], digest: &[u8], signature: &[u8]) -> Result<bool, KeyError> {
    let public_key = PublicKey::from_slice(public_key).map_err(|_| KeyError::InvalidPublicKey)?;
    let signature = Signature::from_compact(signature).map_err(|_| KeyError::InvalidSignature)?;
    let message = digest_message(digest)?;

    Ok(Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature, &public_key)
        .is_ok())
}

fn digest_message(digest: &[u8]) -> Result<Message, KeyError> {
    if digest.len() != 32 {
        return Err(KeyError::InvalidDigest(digest.len()));
    }
    Message::from_digest_slice(digest).map_err(|_| KeyError::InvalidDigest(digest.len()))
}
