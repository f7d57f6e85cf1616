//! Calculator Vault - Cryptographic Core
//!
//! Argon2id + HKDF key derivation and AES-256-GCM sealing.

pub mod keys;
pub mod aead;

pub use keys::*;
pub use aead::*;
