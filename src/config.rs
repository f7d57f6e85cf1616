//! Calculator Vault - Configuration
//!
//! Loaded from JSON; every field has a default so a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use argon2::Params;
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Upper bound for the PIN-entry and biometric windows
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Argon2id parameters used for both file keys and the PIN verifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KdfConfig {
    /// Iterations
    pub time_cost: u32,
    /// Memory in KiB
    pub memory_cost_kib: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            time_cost: 3,
            memory_cost_kib: 64 * 1024, // 64 MiB
            parallelism: 2,
        }
    }
}

impl KdfConfig {
    /// Preset for older phones
    pub fn low_memory() -> Self {
        Self {
            time_cost: 4,
            memory_cost_kib: 16 * 1024, // 16 MiB
            parallelism: 1,
        }
    }

    /// Preset for strong devices
    pub fn high_security() -> Self {
        Self {
            time_cost: 4,
            memory_cost_kib: 256 * 1024, // 256 MiB
            parallelism: 4,
        }
    }

    /// Build argon2 params with the requested output length
    pub fn params(&self, output_len: usize) -> VaultResult<Params> {
        Params::new(
            self.memory_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(output_len),
        )
        .map_err(|e| VaultError::KeyDerivationFailed(format!("Invalid Argon2 params: {}", e)))
    }

    /// Cheap parameters so unit tests stay fast
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            time_cost: 1,
            memory_cost_kib: 64,
            parallelism: 1,
        }
    }
}

/// Vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root data directory
    pub data_dir: PathBuf,
    /// Ciphertext directory name under `data_dir`
    pub vault_dir_name: String,
    /// Temporary plaintext directory name under `data_dir`
    pub cache_dir_name: String,
    /// Key-value database file under `data_dir`
    pub store_file: String,
    /// Minimum PIN length accepted at first-time setup
    pub min_pin_len: usize,
    /// Failed PIN submissions that end the session
    pub lockout_threshold: u32,
    /// How long PIN entry stays open after the long-press
    pub pin_entry_timeout_secs: u64,
    /// How long a biometric prompt may stay open
    pub biometric_timeout_secs: u64,
    /// Argon2id parameters
    pub kdf: KdfConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./calc_vault_data"),
            vault_dir_name: "vault".into(),
            cache_dir_name: "cache".into(),
            store_file: "vault.db".into(),
            min_pin_len: 6,
            lockout_threshold: 3,
            pin_entry_timeout_secs: 120,
            biometric_timeout_secs: 60,
            kdf: KdfConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Default configuration rooted at `dir`
    pub fn for_data_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            data_dir: dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            VaultError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let config: VaultConfig =
            serde_json::from_str(&raw).map_err(|e| VaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> VaultResult<()> {
        if self.min_pin_len == 0 {
            return Err(VaultError::Config("min_pin_len must be at least 1".into()));
        }
        if self.lockout_threshold == 0 {
            return Err(VaultError::Config("lockout_threshold must be at least 1".into()));
        }
        if self.pin_entry_timeout_secs == 0 || self.biometric_timeout_secs == 0 {
            return Err(VaultError::Config("timeouts must be non-zero".into()));
        }
        if self.pin_entry_timeout_secs > MAX_TIMEOUT_SECS
            || self.biometric_timeout_secs > MAX_TIMEOUT_SECS
        {
            return Err(VaultError::Config(format!(
                "timeouts must not exceed {} seconds",
                MAX_TIMEOUT_SECS
            )));
        }
        self.kdf
            .params(32)
            .map_err(|e| VaultError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn vault_dir(&self) -> PathBuf {
        self.data_dir.join(&self.vault_dir_name)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join(&self.cache_dir_name)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.store_file)
    }

    pub fn pin_entry_timeout(&self) -> Duration {
        Duration::from_secs(self.pin_entry_timeout_secs)
    }

    pub fn biometric_timeout(&self) -> Duration {
        Duration::from_secs(self.biometric_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = VaultConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_pin_len, 6);
        assert_eq!(config.lockout_threshold, 3);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "data_dir": "/tmp/calc", "kdf": { "memory_cost_kib": 16384 } }"#,
        )
        .unwrap();

        let config = VaultConfig::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/calc"));
        assert_eq!(config.kdf.memory_cost_kib, 16384);
        assert_eq!(config.kdf.time_cost, 3);
        assert_eq!(config.vault_dir(), PathBuf::from("/tmp/calc/vault"));
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let config = VaultConfig {
            lockout_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_kdf() {
        let config = VaultConfig {
            kdf: KdfConfig {
                time_cost: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_timeouts() {
        let config = VaultConfig {
            pin_entry_timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));

        let config = VaultConfig {
            biometric_timeout_secs: MAX_TIMEOUT_SECS + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));

        let config = VaultConfig {
            pin_entry_timeout_secs: MAX_TIMEOUT_SECS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
