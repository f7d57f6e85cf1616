//! Calculator Vault - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Coarse error classes. Log lines may mention these and nothing finer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Credential,
    Lockout,
    Integrity,
    Storage,
    Persistence,
    Locked,
    NotFound,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Credential => "credential",
            ErrorKind::Lockout => "lockout",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Storage => "storage",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Locked => "locked",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // CREDENTIAL ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Invalid PIN ({failed_attempts} failed attempts)")]
    InvalidPin { failed_attempts: u32 },

    #[error("PIN must be at least {min} characters")]
    PinTooShort { min: usize },

    #[error("PIN entry is not active")]
    PinEntryInactive,

    #[error("PIN entry window expired")]
    PinEntryExpired,

    #[error("Biometric authentication unavailable")]
    BiometricUnavailable,

    #[error("Biometric authentication failed")]
    BiometricFailed,

    // ═══════════════════════════════════════════════════════════════
    // LOCKOUT
    // ═══════════════════════════════════════════════════════════════

    #[error("Too many failed attempts - session terminated")]
    Lockout,

    #[error("Vault is locked")]
    VaultLocked,

    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Integrity check failed - wrong key or corrupted data")]
    Integrity,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // ═══════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    // ═══════════════════════════════════════════════════════════════
    // PERSISTENCE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Metadata corrupted: {0}")]
    MetadataCorrupted(String),

    // ═══════════════════════════════════════════════════════════════
    // CONFIG ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::InvalidPin { .. }
            | VaultError::PinTooShort { .. }
            | VaultError::PinEntryInactive
            | VaultError::PinEntryExpired
            | VaultError::BiometricUnavailable
            | VaultError::BiometricFailed => ErrorKind::Credential,
            VaultError::Lockout => ErrorKind::Lockout,
            VaultError::VaultLocked => ErrorKind::Locked,
            VaultError::Integrity => ErrorKind::Integrity,
            VaultError::EncryptionFailed(_)
            | VaultError::Storage(_)
            | VaultError::IoError(_) => ErrorKind::Storage,
            VaultError::EntryNotFound(_) => ErrorKind::NotFound,
            VaultError::Persistence(_) | VaultError::MetadataCorrupted(_) => {
                ErrorKind::Persistence
            }
            VaultError::KeyDerivationFailed(_) | VaultError::Config(_) => ErrorKind::Config,
        }
    }

    /// Text safe to show behind the calculator cover.
    ///
    /// Credential and integrity failures read the same, so an unreadable file
    /// never reveals whether the credential or the ciphertext is at fault.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Lockout => "Calculator crashed.",
            ErrorKind::Credential | ErrorKind::Integrity | ErrorKind::Locked => "Error",
            ErrorKind::Storage
            | ErrorKind::Persistence
            | ErrorKind::NotFound
            | ErrorKind::Config => "Operation failed",
        }
    }

    /// Check if this is a security-critical error
    pub fn is_security_critical(&self) -> bool {
        matches!(self.kind(), ErrorKind::Lockout | ErrorKind::Integrity)
    }

    /// Check if the host must end the session after this error
    pub fn requires_lockdown(&self) -> bool {
        matches!(self, VaultError::Lockout)
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Persistence(e.to_string())
    }
}
