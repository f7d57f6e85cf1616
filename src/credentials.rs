//! Calculator Vault - Credential Store
//!
//! Persists the PIN verifier and the biometric flag. The PIN itself is never
//! written: `vault_pin` holds an Argon2id PHC string.

use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Algorithm, Argon2, PasswordHash, PasswordVerifier, Version,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::config::KdfConfig;
use crate::crypto::{contexts, open, seal, Sealed, VaultKey};
use crate::error::{VaultError, VaultResult};
use crate::store::KeyValueStore;

pub const PIN_KEY: &str = "vault_pin";
pub const BIO_ENABLED_KEY: &str = "bio_enabled";
pub const BIO_WRAPPED_KEY: &str = "bio_wrapped_pin";

/// Verifier salt size
const VERIFIER_SALT_LEN: usize = 16;

/// Non-secret view of the stored credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialRecord {
    pub has_pin: bool,
    pub biometric_enabled: bool,
}

/// Credential store over the durable key-value store
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
    kdf: KdfConfig,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, kdf: KdfConfig) -> Self {
        Self { kv, kdf }
    }

    pub fn has_pin(&self) -> VaultResult<bool> {
        Ok(self.kv.get(PIN_KEY)?.is_some())
    }

    /// Replace the stored verifier with one for `pin`
    pub fn set_pin(&self, pin: &str) -> VaultResult<()> {
        let verifier = self.hash_pin(pin)?;
        self.kv.set(PIN_KEY, &verifier)
    }

    /// Check a candidate against the stored verifier.
    ///
    /// Returns false when no PIN exists; first-time setup is the gate's call.
    pub fn validate(&self, candidate: &str) -> VaultResult<bool> {
        let stored = match self.kv.get(PIN_KEY)? {
            Some(stored) => stored,
            None => return Ok(false),
        };

        if stored.starts_with("$argon2") {
            let parsed = PasswordHash::new(&stored)
                .map_err(|e| VaultError::Persistence(format!("unreadable PIN verifier: {}", e)))?;
            return Ok(self
                .argon2()?
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok());
        }

        // Plaintext value left by the original app
        let matches = Sha256::digest(candidate.as_bytes()) == Sha256::digest(stored.as_bytes());
        if matches {
            log::info!("Upgrading legacy PIN verifier");
            self.set_pin(candidate)?;
        }
        Ok(matches)
    }

    pub fn biometric_enabled(&self) -> VaultResult<bool> {
        Ok(self.kv.get(BIO_ENABLED_KEY)?.as_deref() == Some("true"))
    }

    /// Store the session secret sealed under the device key, then raise the flag
    pub fn enable_biometric(&self, device_key: &VaultKey, secret: &SecretString) -> VaultResult<()> {
        let sealed = seal(device_key, secret.expose_secret().as_bytes(), contexts::BIO_WRAP)?;
        self.kv.set(BIO_WRAPPED_KEY, &STANDARD.encode(sealed.to_bytes()))?;
        self.kv.set(BIO_ENABLED_KEY, "true")
    }

    /// Lower the flag, then drop the wrapped secret
    pub fn disable_biometric(&self) -> VaultResult<()> {
        self.kv.set(BIO_ENABLED_KEY, "false")?;
        self.kv.remove(BIO_WRAPPED_KEY)
    }

    /// Recover the session secret with a released device key
    pub fn unwrap_biometric_secret(&self, device_key: &VaultKey) -> VaultResult<Option<SecretString>> {
        let encoded = match self.kv.get(BIO_WRAPPED_KEY)? {
            Some(encoded) => encoded,
            None => return Ok(None),
        };

        let bytes = STANDARD.decode(encoded).map_err(|_| VaultError::Integrity)?;
        let sealed = Sealed::from_bytes(&bytes)?;
        let plaintext = open(device_key, &sealed, contexts::BIO_WRAP)?;
        let secret = String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::Integrity)?;

        Ok(Some(SecretString::new(secret)))
    }

    pub fn record(&self) -> VaultResult<CredentialRecord> {
        Ok(CredentialRecord {
            has_pin: self.has_pin()?,
            biometric_enabled: self.biometric_enabled()?,
        })
    }

    fn argon2(&self) -> VaultResult<Argon2<'static>> {
        Ok(Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            self.kdf.params(32)?,
        ))
    }

    fn hash_pin(&self, pin: &str) -> VaultResult<String> {
        let mut salt = [0u8; VERIFIER_SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        let salt_string = SaltString::encode_b64(&salt)
            .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

        let hash = self
            .argon2()?
            .hash_password(pin.as_bytes(), &salt_string)
            .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?
            .to_string();

        Ok(hash)
    }
}
