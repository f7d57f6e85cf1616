//! Calculator Vault - Public API
//!
//! Single entry point the calculator UI talks to. Wires the durable store,
//! credentials, gate and vault together from one [`VaultConfig`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::auth::{AuthGate, AuthSession, AuthState, UnlockMethod};
use crate::biometrics::{BiometricAuthenticator, NoBiometrics};
use crate::config::VaultConfig;
use crate::credentials::CredentialStore;
use crate::error::{ErrorKind, VaultError, VaultResult};
use crate::metadata::{Category, MetadataStore, VaultEntry};
use crate::secure_fs::VaultDirectory;
use crate::store::{KeyValueStore, SqliteStore};
use crate::vault::{AuditReport, PinChangeReport, Vault};

// ═══════════════════════════════════════════════════════════════════════════════
// REPORT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of one PIN submission, shaped for the calculator screen
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PinSubmission {
    pub ok: bool,
    /// Host must show the crash cover and exit
    pub lockout_triggered: bool,
    pub failed_attempts: u32,
    pub method: Option<UnlockMethod>,
    /// Cover text to display when `ok` is false
    pub message: Option<&'static str>,
}

/// Non-secret overview of the vault
#[derive(Debug, Clone, Serialize)]
pub struct VaultStatus {
    pub state: AuthState,
    pub session: AuthSession,
    pub has_pin: bool,
    pub biometric_enabled: bool,
    pub biometric_available: bool,
    pub terminated: bool,
    /// Only reported while unlocked
    pub entries: Option<usize>,
    pub vault_bytes: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALC VAULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Calculator Vault API
///
/// ```rust,ignore
/// use calc_vault::{CalcVault, VaultConfig};
///
/// let vault = CalcVault::open_without_biometrics(VaultConfig::for_data_dir("/data/calc"))?;
///
/// // Long-press, then digits, then "="
/// vault.begin_pin_entry()?;
/// let result = vault.submit_pin("654321")?;
/// if result.lockout_triggered {
///     // show "Calculator crashed." and exit
/// }
///
/// let entry = vault.add_file("/sdcard/DCIM/photo.jpg".as_ref(), "photo.jpg", "image/jpeg")?;
/// let temp = vault.reveal_file(&entry.id)?;
///
/// // App goes to background
/// vault.on_app_foreground_change(false);
/// ```
pub struct CalcVault {
    config: VaultConfig,
    gate: Arc<AuthGate>,
    vault: Vault,
}

impl CalcVault {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Open (or create) the vault described by `config`
    pub fn open(config: VaultConfig, biometrics: Arc<dyn BiometricAuthenticator>) -> VaultResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| VaultError::Storage(format!("cannot create data directory: {}", e)))?;

        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&config.store_path())?);
        let credentials = Arc::new(CredentialStore::new(kv.clone(), config.kdf.clone()));
        let gate = Arc::new(AuthGate::new(&config, credentials, biometrics));

        let metadata = MetadataStore::new(kv);
        let dir = Arc::new(VaultDirectory::new(&config.vault_dir(), &config.cache_dir()));
        let vault = Vault::open(dir, gate.clone(), metadata, config.kdf.clone())?;

        // Plaintext left over from a previous run
        vault.purge_revealed()?;

        log::info!("Vault opened");
        Ok(Self { config, gate, vault })
    }

    /// Open with no biometric hardware
    pub fn open_without_biometrics(config: VaultConfig) -> VaultResult<Self> {
        Self::open(config, Arc::new(NoBiometrics))
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // AUTHENTICATION
    // ═══════════════════════════════════════════════════════════════════════

    pub fn begin_pin_entry(&self) -> VaultResult<()> {
        self.gate.begin_pin_entry()
    }

    /// Submit a PIN. Credential outcomes are folded into the result;
    /// storage failures are returned as errors.
    pub fn submit_pin(&self, candidate: &str) -> VaultResult<PinSubmission> {
        match self.gate.submit_pin(candidate) {
            Ok(method) => Ok(PinSubmission {
                ok: true,
                lockout_triggered: false,
                failed_attempts: 0,
                method: Some(method),
                message: None,
            }),
            Err(e) if matches!(e.kind(), ErrorKind::Credential | ErrorKind::Lockout) => {
                log::debug!("PIN submission rejected: {}", e.kind());
                let failed_attempts = match e {
                    VaultError::InvalidPin { failed_attempts } => failed_attempts,
                    // The gate has already reset its counter
                    VaultError::Lockout => self.config.lockout_threshold,
                    _ => self.gate.session().failed_attempts,
                };
                Ok(PinSubmission {
                    ok: false,
                    lockout_triggered: e.requires_lockdown(),
                    failed_attempts,
                    method: None,
                    message: Some(e.user_message()),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn attempt_biometric(&self) -> bool {
        self.gate.attempt_biometric().await
    }

    pub async fn enable_biometric(&self, enabled: bool) -> VaultResult<()> {
        self.gate.enable_biometric(enabled).await
    }

    /// Host lifecycle hook. Backgrounding locks and wipes revealed files.
    pub fn on_app_foreground_change(&self, is_foreground: bool) {
        self.gate.on_app_foreground_change(is_foreground);
        if !is_foreground {
            if let Err(e) = self.vault.purge_revealed() {
                log::warn!("Purge on background failed: {}", e.kind());
            }
        }
    }

    pub fn lock(&self) {
        self.gate.lock();
    }

    pub fn is_unlocked(&self) -> bool {
        self.gate.state() == AuthState::Unlocked
    }

    pub fn session(&self) -> AuthSession {
        self.gate.session()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FILE OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn list_entries(&self) -> VaultResult<Vec<VaultEntry>> {
        self.vault.list_entries()
    }

    pub fn entries_in(&self, category: Category) -> VaultResult<Vec<VaultEntry>> {
        self.vault.entries_in(category)
    }

    pub fn add_file(&self, source: &Path, display_name: &str, mime_type: &str) -> VaultResult<VaultEntry> {
        self.vault.add_file(source, display_name, mime_type)
    }

    pub fn delete_file(&self, id: &str) -> VaultResult<()> {
        self.vault.delete_file(id)
    }

    /// Decrypt to a temporary file; the caller removes it when done
    pub fn reveal_file(&self, id: &str) -> VaultResult<PathBuf> {
        self.vault.reveal_file(id)
    }

    pub fn purge_revealed(&self) -> VaultResult<usize> {
        self.vault.purge_revealed()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MAINTENANCE
    // ═══════════════════════════════════════════════════════════════════════

    pub fn change_pin(&self, new_pin: &str) -> VaultResult<PinChangeReport> {
        self.vault.change_pin(new_pin)
    }

    pub fn audit(&self) -> VaultResult<AuditReport> {
        self.vault.audit()
    }

    pub fn status(&self) -> VaultResult<VaultStatus> {
        let record = self.gate.credentials().record()?;
        let entries = if self.is_unlocked() {
            Some(self.vault.list_entries()?.len())
        } else {
            None
        };

        Ok(VaultStatus {
            state: self.gate.state(),
            session: self.gate.session(),
            has_pin: record.has_pin,
            biometric_enabled: record.biometric_enabled,
            biometric_available: self.gate.biometric_available(),
            terminated: self.gate.is_terminated(),
            entries,
            vault_bytes: self.vault.directory().total_size()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KdfConfig;
    use std::fs;
    use tempfile::tempdir;

    fn config(dir: &Path) -> VaultConfig {
        VaultConfig {
            kdf: KdfConfig::for_tests(),
            ..VaultConfig::for_data_dir(dir)
        }
    }

    #[test]
    fn test_open_creates_layout() {
        let dir = tempdir().unwrap();
        let api = CalcVault::open_without_biometrics(config(dir.path())).unwrap();

        assert!(dir.path().join("vault").join(".nomedia").exists());
        assert!(dir.path().join("vault.db").exists());

        let status = api.status().unwrap();
        assert_eq!(status.state, AuthState::Locked);
        assert!(!status.has_pin);
        assert!(!status.biometric_available);
        assert_eq!(status.entries, None);
    }

    #[test]
    fn test_submission_results() {
        let dir = tempdir().unwrap();
        let api = CalcVault::open_without_biometrics(config(dir.path())).unwrap();

        api.begin_pin_entry().unwrap();
        let short = api.submit_pin("12345").unwrap();
        assert!(!short.ok);
        assert!(!short.lockout_triggered);
        assert!(!api.status().unwrap().has_pin);

        let first = api.submit_pin("123456").unwrap();
        assert!(first.ok);
        assert_eq!(first.method, Some(UnlockMethod::Bootstrap));

        api.lock();
        api.begin_pin_entry().unwrap();
        let one = api.submit_pin("000000").unwrap();
        let two = api.submit_pin("000000").unwrap();
        let three = api.submit_pin("000000").unwrap();

        assert_eq!((one.ok, one.failed_attempts, one.lockout_triggered), (false, 1, false));
        assert_eq!((two.ok, two.failed_attempts, two.lockout_triggered), (false, 2, false));
        assert!(three.lockout_triggered);
        assert_eq!(three.failed_attempts, 3);
        assert_eq!(three.message, Some("Calculator crashed."));
        assert_eq!(one.message, Some("Error"));
        assert!(api.status().unwrap().terminated);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        fs::write(&source, b"moving pictures").unwrap();

        let id = {
            let api = CalcVault::open_without_biometrics(config(dir.path())).unwrap();
            api.begin_pin_entry().unwrap();
            api.submit_pin("654321").unwrap();
            api.add_file(&source, "clip.mp4", "video/mp4").unwrap().id
        };

        let api = CalcVault::open_without_biometrics(config(dir.path())).unwrap();
        assert!(matches!(api.list_entries(), Err(VaultError::VaultLocked)));

        api.begin_pin_entry().unwrap();
        let result = api.submit_pin("654321").unwrap();
        assert_eq!(result.method, Some(UnlockMethod::Pin));
        assert_eq!(api.session().failed_attempts, 0);

        let entries = api.entries_in(Category::Videos).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);

        let revealed = api.reveal_file(&id).unwrap();
        assert_eq!(fs::read(&revealed).unwrap(), b"moving pictures");
        assert_eq!(api.status().unwrap().entries, Some(1));
    }

    #[test]
    fn test_background_locks_and_wipes_revealed() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        fs::write(&source, b"a").unwrap();

        let api = CalcVault::open_without_biometrics(config(dir.path())).unwrap();
        api.begin_pin_entry().unwrap();
        api.submit_pin("123456").unwrap();
        let entry = api.add_file(&source, "a.jpg", "image/jpeg").unwrap();
        let revealed = api.reveal_file(&entry.id).unwrap();
        assert!(revealed.exists());

        api.on_app_foreground_change(false);
        assert!(!api.is_unlocked());
        assert!(!revealed.exists());
        assert_eq!(api.session().failed_attempts, 0);
        assert!(!api.session().auth_mode_active);
    }

    #[test]
    fn test_leftover_plaintext_is_wiped_on_open() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("left.jpg"), b"plain").unwrap();

        let _api = CalcVault::open_without_biometrics(config(dir.path())).unwrap();
        assert!(!cache.join("left.jpg").exists());
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let dir = tempdir().unwrap();
        let bad = VaultConfig {
            min_pin_len: 0,
            ..config(dir.path())
        };
        assert!(matches!(
            CalcVault::open_without_biometrics(bad),
            Err(VaultError::Config(_))
        ));
    }
}
