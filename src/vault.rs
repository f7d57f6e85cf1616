//! Calculator Vault - Vault Operations
//!
//! Composes the gate, metadata, directory and file crypto into the
//! operations the vault screen calls. Every operation needs an unlocked
//! session; the file key is re-derived from the session PIN each time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};

use crate::auth::AuthGate;
use crate::config::KdfConfig;
use crate::error::{VaultError, VaultResult};
use crate::file_crypto::FileCrypto;
use crate::metadata::{Category, MetadataStore, VaultEntry};
use crate::secure_fs::VaultDirectory;

/// Consistency report between the listing and the directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Entries listed
    pub entries: usize,
    /// Blobs present on disk
    pub blobs: usize,
    /// Entries whose ciphertext file is gone
    pub missing_ciphertext: Vec<VaultEntry>,
    /// Blobs no entry refers to
    pub stray_blobs: Vec<PathBuf>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_ciphertext.is_empty() && self.stray_blobs.is_empty()
    }
}

/// Result of a PIN change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinChangeReport {
    /// Files now encrypted under the new PIN
    pub reencrypted: usize,
    /// Entries left as they were (missing or unreadable ciphertext)
    pub skipped: Vec<String>,
}

/// The hidden file vault
pub struct Vault {
    gate: Arc<AuthGate>,
    metadata: MetadataStore,
    dir: Arc<VaultDirectory>,
    crypto: FileCrypto,
    /// Serializes add/delete against a PIN change
    op_lock: Mutex<()>,
}

impl Vault {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Open the vault. Creates the directory on first use.
    pub fn open(
        dir: Arc<VaultDirectory>,
        gate: Arc<AuthGate>,
        metadata: MetadataStore,
        kdf: KdfConfig,
    ) -> VaultResult<Self> {
        dir.ensure_initialized()?;

        Ok(Self {
            crypto: FileCrypto::new(dir.clone(), kdf),
            gate,
            metadata,
            dir,
            op_lock: Mutex::new(()),
        })
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn directory(&self) -> &VaultDirectory {
        &self.dir
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LISTING
    // ═══════════════════════════════════════════════════════════════════════

    /// All entries in the order they were added
    pub fn list_entries(&self) -> VaultResult<Vec<VaultEntry>> {
        self.gate.session_secret()?;
        self.metadata.list()
    }

    pub fn entries_in(&self, category: Category) -> VaultResult<Vec<VaultEntry>> {
        Ok(self
            .list_entries()?
            .into_iter()
            .filter(|e| e.category() == category)
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FILE OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Encrypt `source` into the vault and record it.
    ///
    /// The ciphertext is durable before the entry is written. If the entry
    /// cannot be written the fresh ciphertext is removed again.
    pub fn add_file(&self, source: &Path, display_name: &str, mime_type: &str) -> VaultResult<VaultEntry> {
        let (pin, _) = self.gate.session_secret()?;
        let _guard = self.op_lock.lock();

        let stored = self.crypto.encrypt_file(source, &pin)?;

        let original_uri = Some(source.to_string_lossy().into_owned());
        match self
            .metadata
            .add(display_name, mime_type, stored.clone(), original_uri)
        {
            Ok(entry) => {
                log::info!("Added {} entry", entry.category().as_str());
                Ok(entry)
            }
            Err(e) => {
                log::warn!("Metadata write failed: {}", e.kind());
                if let Err(cleanup) = self.dir.secure_delete(&stored) {
                    log::warn!("Orphaned ciphertext left behind: {}", cleanup.kind());
                }
                Err(e)
            }
        }
    }

    /// Remove the ciphertext, then the entry. Unknown ids are ignored.
    pub fn delete_file(&self, id: &str) -> VaultResult<()> {
        self.gate.session_secret()?;
        let _guard = self.op_lock.lock();

        let entry = match self.metadata.get(id)? {
            Some(entry) => entry,
            None => return Ok(()),
        };

        self.dir.secure_delete(&entry.ciphertext_path)?;
        self.metadata.delete(id)?;

        log::info!("Deleted {} entry", entry.category().as_str());
        Ok(())
    }

    /// Decrypt an entry to a temporary file in the cache directory.
    ///
    /// The caller owns the returned file; [`Vault::purge_revealed`] wipes
    /// whatever is left.
    pub fn reveal_file(&self, id: &str) -> VaultResult<PathBuf> {
        let (pin, epoch) = self.gate.session_secret()?;

        let entry = self
            .metadata
            .get(id)?
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;

        let plaintext = self.crypto.decrypt_file(&entry.ciphertext_path, &pin)?;
        let extension = Path::new(&entry.name)
            .extension()
            .and_then(|e| e.to_str());

        // Locked while decrypting: the plaintext never reaches disk
        self.gate
            .with_current_session(epoch, || self.dir.write_revealed(extension, &plaintext))
    }

    /// Wipe every temporary plaintext file
    pub fn purge_revealed(&self) -> VaultResult<usize> {
        self.dir.purge_revealed()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MAINTENANCE
    // ═══════════════════════════════════════════════════════════════════════

    /// Re-encrypt every file under `new_pin` and make it the PIN.
    ///
    /// New blobs are staged first; biometric unlock is turned off, then the
    /// verifier and the listing switch once every readable file has a staged
    /// copy. A failure before the listing switch leaves the old PIN working.
    pub fn change_pin(&self, new_pin: &str) -> VaultResult<PinChangeReport> {
        let (old_pin, epoch) = self.gate.session_secret()?;
        let min = self.gate.min_pin_len();
        if new_pin.chars().count() < min {
            return Err(VaultError::PinTooShort { min });
        }

        let _guard = self.op_lock.lock();
        let new_secret = SecretString::new(new_pin.to_string());

        let mut report = PinChangeReport::default();
        let mut moves: Vec<(String, PathBuf)> = Vec::new();
        let mut old_blobs: Vec<PathBuf> = Vec::new();

        for entry in self.metadata.list()? {
            let dest = self.dir.new_blob_path();
            match self
                .crypto
                .reencrypt_to(&entry.ciphertext_path, &old_pin, &new_secret, &dest)
            {
                Ok(()) => {
                    moves.push((entry.id.clone(), dest));
                    old_blobs.push(entry.ciphertext_path);
                }
                Err(e @ (VaultError::EntryNotFound(_) | VaultError::Integrity)) => {
                    log::warn!("Skipping unreadable entry during PIN change: {}", e.kind());
                    report.skipped.push(entry.id);
                }
                Err(e) => {
                    self.discard(moves.iter().map(|(_, path)| path));
                    return Err(e);
                }
            }
        }

        // Locked while staging: leave the old PIN in place
        if !self.gate.is_current(epoch) {
            self.discard(moves.iter().map(|(_, path)| path));
            return Err(VaultError::VaultLocked);
        }

        // The wrapped secret is about to go stale
        if let Err(e) = self.gate.credentials().disable_biometric() {
            self.discard(moves.iter().map(|(_, path)| path));
            return Err(e);
        }

        if let Err(e) = self.gate.credentials().set_pin(new_pin) {
            self.discard(moves.iter().map(|(_, path)| path));
            return Err(e);
        }

        if let Err(e) = self.metadata.relocate(&moves) {
            log::warn!("Listing update failed, restoring previous PIN: {}", e.kind());
            if let Err(restore) = self.gate.credentials().set_pin(old_pin.expose_secret()) {
                log::warn!("Could not restore previous PIN: {}", restore.kind());
            }
            self.discard(moves.iter().map(|(_, path)| path));
            return Err(e);
        }

        // Committed: nothing below may fail the change
        if !self.gate.rotate_secret(epoch, new_secret) {
            log::info!("Session closed during PIN change");
        }
        self.discard(old_blobs.iter());

        report.reencrypted = moves.len();
        log::info!(
            "PIN changed, {} file(s) re-encrypted, {} skipped",
            report.reencrypted,
            report.skipped.len()
        );
        Ok(report)
    }

    /// Compare the listing with the blobs on disk. Repairs nothing.
    pub fn audit(&self) -> VaultResult<AuditReport> {
        let entries = self.list_entries()?;
        let blobs = self.dir.list_blobs()?;

        let missing_ciphertext = entries
            .iter()
            .filter(|e| !e.ciphertext_path.exists())
            .cloned()
            .collect();

        let stray_blobs = blobs
            .iter()
            .filter(|blob| !entries.iter().any(|e| &e.ciphertext_path == *blob))
            .cloned()
            .collect();

        Ok(AuditReport {
            entries: entries.len(),
            blobs: blobs.len(),
            missing_ciphertext,
            stray_blobs,
        })
    }

    fn discard<'a>(&self, paths: impl Iterator<Item = &'a PathBuf>) {
        for path in paths {
            if let Err(e) = self.dir.secure_delete(path) {
                log::warn!("Could not remove blob: {}", e.kind());
            }
        }
    }
}
