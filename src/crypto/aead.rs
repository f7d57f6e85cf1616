//! Calculator Vault - AEAD Encryption
//!
//! AES-256-GCM with a fresh random nonce per call. The tag is kept apart
//! from the ciphertext so callers can persist the three parts explicitly.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use super::keys::{generate_nonce, VaultKey, NONCE_LEN};
use crate::error::{VaultError, VaultResult};

/// GCM authentication tag size
pub const TAG_LEN: usize = 16;

/// Output of one encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl Sealed {
    /// Serialize to bytes (nonce || ciphertext || tag)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Deserialize from bytes (nonce || ciphertext || tag)
    pub fn from_bytes(data: &[u8]) -> VaultResult<Self> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::Integrity);
        }
        let nonce: [u8; NONCE_LEN] = data[..NONCE_LEN]
            .try_into()
            .map_err(|_| VaultError::Integrity)?;
        Self::from_parts(nonce, &data[NONCE_LEN..])
    }

    /// Rebuild from a nonce and `ciphertext || tag`
    pub fn from_parts(nonce: [u8; NONCE_LEN], ciphertext_and_tag: &[u8]) -> VaultResult<Self> {
        if ciphertext_and_tag.len() < TAG_LEN {
            return Err(VaultError::Integrity);
        }
        let split = ciphertext_and_tag.len() - TAG_LEN;
        let tag: [u8; TAG_LEN] = ciphertext_and_tag[split..]
            .try_into()
            .map_err(|_| VaultError::Integrity)?;

        Ok(Self {
            nonce,
            ciphertext: ciphertext_and_tag[..split].to_vec(),
            tag,
        })
    }

    /// `ciphertext || tag`, the layout aes-gcm works with
    pub fn ciphertext_and_tag(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }
}

/// Encrypt with AES-256-GCM
pub fn seal(key: &VaultKey, plaintext: &[u8], aad: &[u8]) -> VaultResult<Sealed> {
    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let combined = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    Sealed::from_parts(nonce_bytes, &combined)
        .map_err(|_| VaultError::EncryptionFailed("short cipher output".into()))
}

/// Decrypt with AES-256-GCM. Any tag mismatch is an integrity failure.
pub fn open(key: &VaultKey, sealed: &Sealed, aad: &[u8]) -> VaultResult<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new_from_slice(key.expose()).map_err(|_| VaultError::Integrity)?;
    let nonce = Nonce::from_slice(&sealed.nonce);
    let combined = sealed.ciphertext_and_tag();

    cipher
        .decrypt(nonce, Payload { msg: &combined, aad })
        .map(Zeroizing::new)
        .map_err(|_| VaultError::Integrity)
}
