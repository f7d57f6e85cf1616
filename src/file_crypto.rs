//! File encryption for Calculator Vault
//!
//! Blob format (one text line per file):
//! ```text
//! base64(SALT 16B || NONCE 12B) ':' base64(CIPHERTEXT || TAG 16B)
//! ```
//! The salt feeds the PIN KDF, so each file carries everything needed to
//! re-derive its key from the PIN alone.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::SecretString;
use zeroize::Zeroizing;

use crate::config::KdfConfig;
use crate::crypto::{derive_file_key, generate_salt, open, seal, Sealed, NONCE_LEN, SALT_LEN};
use crate::error::{VaultError, VaultResult};
use crate::secure_fs::VaultDirectory;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Associated data bound into every blob
const BLOB_AAD: &[u8] = b"calc-vault:blob:v1";

/// Separator between the two halves
const DELIMITER: char = ':';

// ---------------------------------------------------------------------------
// CiphertextBlob
// ---------------------------------------------------------------------------

/// Parsed on-disk blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextBlob {
    pub salt: [u8; SALT_LEN],
    pub sealed: Sealed,
}

impl CiphertextBlob {
    pub fn encode(&self) -> String {
        let mut head = Vec::with_capacity(SALT_LEN + NONCE_LEN);
        head.extend_from_slice(&self.salt);
        head.extend_from_slice(&self.sealed.nonce);

        format!(
            "{}{}{}",
            STANDARD.encode(head),
            DELIMITER,
            STANDARD.encode(self.sealed.ciphertext_and_tag())
        )
    }

    /// Parse a blob. Anything malformed is an integrity failure.
    pub fn parse(text: &str) -> VaultResult<Self> {
        let mut parts = text.trim_end().split(DELIMITER);
        let (head, body) = match (parts.next(), parts.next(), parts.next()) {
            (Some(head), Some(body), None) => (head, body),
            _ => return Err(VaultError::Integrity),
        };

        let head = STANDARD.decode(head).map_err(|_| VaultError::Integrity)?;
        if head.len() != SALT_LEN + NONCE_LEN {
            return Err(VaultError::Integrity);
        }
        let salt: [u8; SALT_LEN] = head[..SALT_LEN]
            .try_into()
            .map_err(|_| VaultError::Integrity)?;
        let nonce: [u8; NONCE_LEN] = head[SALT_LEN..]
            .try_into()
            .map_err(|_| VaultError::Integrity)?;

        let body = STANDARD.decode(body).map_err(|_| VaultError::Integrity)?;
        let sealed = Sealed::from_parts(nonce, &body)?;

        Ok(Self { salt, sealed })
    }
}

// ---------------------------------------------------------------------------
// FileCrypto
// ---------------------------------------------------------------------------

/// Encrypts files into the vault directory and back
pub struct FileCrypto {
    dir: Arc<VaultDirectory>,
    kdf: KdfConfig,
}

impl FileCrypto {
    pub fn new(dir: Arc<VaultDirectory>, kdf: KdfConfig) -> Self {
        Self { dir, kdf }
    }

    /// Encrypt `source` into a new blob. The source is only read.
    ///
    /// Returns the blob path once it is durable on disk.
    pub fn encrypt_file(&self, source: &Path, pin: &SecretString) -> VaultResult<PathBuf> {
        let plaintext = Zeroizing::new(fs::read(source)?);
        let blob = self.encrypt_bytes(&plaintext, pin)?;

        let stored = self.dir.new_blob_path();
        self.dir.write_atomic(&stored, blob.encode().as_bytes())?;

        log::debug!("Encrypted {} bytes into vault", plaintext.len());
        Ok(stored)
    }

    /// Decrypt a stored blob into memory
    pub fn decrypt_file(&self, stored: &Path, pin: &SecretString) -> VaultResult<Zeroizing<Vec<u8>>> {
        let raw = self.dir.read(stored)?;
        let text = std::str::from_utf8(&raw).map_err(|_| VaultError::Integrity)?;
        let blob = CiphertextBlob::parse(text)?;

        self.decrypt_blob(&blob, pin)
    }

    /// Re-encrypt a stored blob under a new PIN, writing to `dest`.
    ///
    /// The original blob is left in place.
    pub fn reencrypt_to(
        &self,
        stored: &Path,
        old_pin: &SecretString,
        new_pin: &SecretString,
        dest: &Path,
    ) -> VaultResult<()> {
        let plaintext = self.decrypt_file(stored, old_pin)?;
        let blob = self.encrypt_bytes(&plaintext, new_pin)?;
        self.dir.write_atomic(dest, blob.encode().as_bytes())
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8], pin: &SecretString) -> VaultResult<CiphertextBlob> {
        let salt = generate_salt();
        let key = derive_file_key(pin, &salt, &self.kdf)?;
        let sealed = seal(&key, plaintext, BLOB_AAD)?;

        Ok(CiphertextBlob { salt, sealed })
    }

    pub fn decrypt_blob(&self, blob: &CiphertextBlob, pin: &SecretString) -> VaultResult<Zeroizing<Vec<u8>>> {
        let key = derive_file_key(pin, &blob.salt, &self.kdf)?;
        open(&key, &blob.sealed, BLOB_AAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pin(s: &str) -> SecretString {
        SecretString::new(s.to_string())
    }

    fn setup(base: &Path) -> FileCrypto {
        let dir = Arc::new(VaultDirectory::new(&base.join("vault"), &base.join("cache")));
        dir.ensure_initialized().unwrap();
        FileCrypto::new(dir, KdfConfig::for_tests())
    }

    #[test]
    fn test_file_roundtrip_leaves_source_untouched() {
        let tmp = tempdir().unwrap();
        let crypto = setup(tmp.path());

        let source = tmp.path().join("photo.jpg");
        fs::write(&source, b"\xFF\xD8\xFF jpeg bytes").unwrap();

        let stored = crypto.encrypt_file(&source, &pin("123456")).unwrap();
        assert!(stored.starts_with(tmp.path().join("vault")));
        assert_eq!(fs::read(&source).unwrap(), b"\xFF\xD8\xFF jpeg bytes");

        let text = fs::read_to_string(&stored).unwrap();
        assert_eq!(text.matches(':').count(), 1);

        let plain = crypto.decrypt_file(&stored, &pin("123456")).unwrap();
        assert_eq!(plain.as_slice(), b"\xFF\xD8\xFF jpeg bytes");
    }

    #[test]
    fn test_wrong_pin_is_integrity_error() {
        let tmp = tempdir().unwrap();
        let crypto = setup(tmp.path());
        let source = tmp.path().join("a.txt");
        fs::write(&source, b"secret").unwrap();

        let stored = crypto.encrypt_file(&source, &pin("123456")).unwrap();
        let result = crypto.decrypt_file(&stored, &pin("000000"));

        assert!(matches!(result, Err(VaultError::Integrity)));
    }

    #[test]
    fn test_tampered_blob_is_rejected() {
        let tmp = tempdir().unwrap();
        let crypto = setup(tmp.path());
        let blob = crypto.encrypt_bytes(b"payload", &pin("123456")).unwrap();

        let mut tampered = blob.clone();
        tampered.sealed.ciphertext[0] ^= 0x80;
        assert!(matches!(
            crypto.decrypt_blob(&tampered, &pin("123456")),
            Err(VaultError::Integrity)
        ));

        let mut salted = blob;
        salted.salt[0] ^= 0x01;
        assert!(crypto.decrypt_blob(&salted, &pin("123456")).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let tmp = tempdir().unwrap();
        let crypto = setup(tmp.path());
        let blob = crypto.encrypt_bytes(b"x", &pin("123456")).unwrap();
        let text = blob.encode();

        assert_eq!(CiphertextBlob::parse(&text).unwrap(), blob);
        assert_eq!(CiphertextBlob::parse(&format!("{}\n", text)).unwrap(), blob);

        let bad_inputs = vec![
            String::new(),
            "nodelimiter".to_string(),
            "a:b:c".to_string(),
            "!!!:AAAA".to_string(),
            text.replace(':', "::"),
            format!("AAAA:{}", text.split(':').nth(1).unwrap()),
        ];
        for bad in &bad_inputs {
            assert!(
                matches!(CiphertextBlob::parse(bad), Err(VaultError::Integrity)),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_reencrypt_to_new_pin() {
        let tmp = tempdir().unwrap();
        let crypto = setup(tmp.path());
        let source = tmp.path().join("doc.pdf");
        fs::write(&source, b"%PDF-1.7").unwrap();

        let stored = crypto.encrypt_file(&source, &pin("111111")).unwrap();
        let dest = tmp.path().join("vault").join("next.enc");
        crypto
            .reencrypt_to(&stored, &pin("111111"), &pin("222222"), &dest)
            .unwrap();

        assert_eq!(
            crypto.decrypt_file(&dest, &pin("222222")).unwrap().as_slice(),
            b"%PDF-1.7"
        );
        assert!(crypto.decrypt_file(&dest, &pin("111111")).is_err());
        assert!(crypto.decrypt_file(&stored, &pin("111111")).is_ok());
    }
}
