//! Calculator Vault - Key Derivation
//!
//! PIN + per-file salt → Argon2id seed → HKDF-SHA256 → AES-256 key.
//! Keys are never stored; they are re-derived from the PIN on every use,
//! so losing a file's salt makes that file unrecoverable.

use argon2::{Algorithm, Argon2, Version};
use hkdf::Hkdf;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret, SecretString};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::KdfConfig;
use crate::error::{VaultError, VaultResult};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// Per-file salt length
pub const SALT_LEN: usize = 16;

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// Argon2 seed length fed into HKDF
const SEED_LEN: usize = 64;

/// HKDF contexts for key derivation
pub mod contexts {
    /// Context for per-file encryption keys
    pub const FILE_KEY: &[u8] = b"calc-vault:file:v1";

    /// Context for the biometric-wrapped session secret
    pub const BIO_WRAP: &[u8] = b"calc-vault:bio-wrap:v1";
}

/// Secure key wrapper, zeroized on drop
pub struct VaultKey {
    inner: Secret<[u8; KEY_LEN]>,
}

impl VaultKey {
    /// Create a new vault key from bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// Derive the encryption key for one file from the PIN and that file's salt.
///
/// Deterministic for a given (pin, salt, kdf) triple.
pub fn derive_file_key(pin: &SecretString, salt: &[u8], kdf: &KdfConfig) -> VaultResult<VaultKey> {
    let seed = stretch_pin(pin.expose_secret().as_bytes(), salt, kdf)?;
    expand_key(&seed[..], salt, contexts::FILE_KEY)
}

/// Argon2id over the PIN
fn stretch_pin(pin: &[u8], salt: &[u8], kdf: &KdfConfig) -> VaultResult<Zeroizing<[u8; SEED_LEN]>> {
    let params = kdf.params(SEED_LEN)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut seed = Zeroizing::new([0u8; SEED_LEN]);
    argon2
        .hash_password_into(pin, salt, &mut *seed)
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    Ok(seed)
}

/// Derive a key using HKDF-SHA256
pub fn expand_key(ikm: &[u8], salt: &[u8], info: &[u8]) -> VaultResult<VaultKey> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; KEY_LEN];

    hk.expand(info, &mut okm)
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    Ok(VaultKey::new(okm))
}

/// Generate a random per-file salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Generate a random nonce for AES-GCM
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}
