//! # Calculator Vault
//!
//! Security core of a calculator app that hides an encrypted file vault.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     CALCULATOR UI                         │
//! │     long-press / double-tap / "=" / app lifecycle         │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │
//! ┌────────────────────────────┴─────────────────────────────┐
//! │  api::CalcVault                                           │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐  │
//! │  │  AUTH GATE   │──▶│    VAULT     │──▶│  FILE CRYPTO │  │
//! │  │  PIN / bio   │   │  add / list  │   │  Argon2id +  │  │
//! │  │  lockout     │   │  reveal / rm │   │  AES-256-GCM │  │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘  │
//! │  ┌──────┴───────┐   ┌──────┴───────┐   ┌──────┴───────┐  │
//! │  │ CREDENTIALS  │   │   METADATA   │   │  VAULT DIR   │  │
//! │  │ vault_pin    │   │ @vault_files │   │  .nomedia    │  │
//! │  └──────┬───────┘   └──────┬───────┘   └──────────────┘  │
//! │         └────── SQLite key-value store ──┘                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Only an Argon2id verifier of the PIN is stored
//! - Each file has its own salt; its key is re-derived from the PIN on use
//! - AES-256-GCM: tampering and wrong PINs are detected, never decrypted
//! - Third wrong PIN ends the session behind a fake crash
//! - Backgrounding locks at once and wipes revealed plaintext

pub mod api;
pub mod auth;
pub mod biometrics;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod file_crypto;
pub mod metadata;
pub mod secure_fs;
pub mod store;
pub mod vault;

#[cfg(feature = "android")]
pub mod android;

pub use api::{CalcVault, PinSubmission, VaultStatus};
pub use auth::{AuthGate, AuthSession, AuthState, UnlockMethod};
pub use biometrics::{BiometricAuthenticator, BiometricOutcome, HostBiometrics, NoBiometrics};
pub use config::{KdfConfig, VaultConfig};
pub use error::{ErrorKind, VaultError, VaultResult};
pub use metadata::{Category, VaultEntry};
pub use vault::{AuditReport, PinChangeReport, Vault};

/// Calculator Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
