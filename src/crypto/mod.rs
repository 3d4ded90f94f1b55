//! Cryptographic helpers
//!
//! Hashing for transaction ids and signing digests, plus secp256k1
//! signing/verification used to check that a signature really belongs to
//! the address an input claims to spend from.

pub mod hash;
pub mod keys;

pub use hash::{sha256, sha256_hex};
pub use keys::{address_from_public_key, verify_digest, KeyError, KeyPair};
