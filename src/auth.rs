//! Calculator Vault - Authentication Gate
//!
//! State machine behind the calculator cover:
//!
//! ```text
//!   Locked ──long-press──▶ AwaitingPin ──valid PIN──▶ Unlocked
//!     ▲  └──────────── biometric ───────────────────────▶ │
//!     └──────────── lock / background / timeout ──────────┘
//! ```
//!
//! Reaching the failure threshold terminates the gate for the rest of the
//! process; the host shows the "crashed" cover and exits.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use secrecy::SecretString;
use serde::Serialize;

use crate::biometrics::{BiometricAuthenticator, BiometricOutcome};
use crate::config::{VaultConfig, MAX_TIMEOUT_SECS};
use crate::credentials::CredentialStore;
use crate::crypto::VaultKey;
use crate::error::{VaultError, VaultResult};

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthState {
    Locked,
    AwaitingPin,
    Unlocked,
}

/// How the current session was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnlockMethod {
    /// Matched the stored verifier
    Pin,
    /// No PIN existed; the candidate became the PIN
    Bootstrap,
    Biometric,
}

/// Snapshot of the ephemeral session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthSession {
    pub unlocked: bool,
    pub auth_mode_active: bool,
    pub failed_attempts: u32,
}

struct GateState {
    state: AuthState,
    failed_attempts: u32,
    auth_mode_since: Option<DateTime<Utc>>,
    secret: Option<Arc<SecretString>>,
    unlocked_by: Option<UnlockMethod>,
    /// Bumped on every lock
    epoch: u64,
    terminated: bool,
}

impl GateState {
    fn new() -> Self {
        Self {
            state: AuthState::Locked,
            failed_attempts: 0,
            auth_mode_since: None,
            secret: None,
            unlocked_by: None,
            epoch: 0,
            terminated: false,
        }
    }

    fn reset(&mut self) {
        self.state = AuthState::Locked;
        self.failed_attempts = 0;
        self.auth_mode_since = None;
        self.secret = None;
        self.unlocked_by = None;
        self.epoch += 1;
    }

    fn unlock(&mut self, secret: SecretString, method: UnlockMethod) {
        self.state = AuthState::Unlocked;
        self.failed_attempts = 0;
        self.auth_mode_since = None;
        self.secret = Some(Arc::new(secret));
        self.unlocked_by = Some(method);
    }
}

/// Single entry point for vault access
pub struct AuthGate {
    credentials: Arc<CredentialStore>,
    biometrics: Arc<dyn BiometricAuthenticator>,
    min_pin_len: usize,
    lockout_threshold: u32,
    pin_entry_timeout: chrono::Duration,
    biometric_timeout: Duration,
    inner: RwLock<GateState>,
}

impl AuthGate {
    pub fn new(
        config: &VaultConfig,
        credentials: Arc<CredentialStore>,
        biometrics: Arc<dyn BiometricAuthenticator>,
    ) -> Self {
        Self {
            credentials,
            biometrics,
            min_pin_len: config.min_pin_len,
            lockout_threshold: config.lockout_threshold,
            pin_entry_timeout: chrono::Duration::seconds(
                config.pin_entry_timeout_secs.min(MAX_TIMEOUT_SECS) as i64,
            ),
            biometric_timeout: config.biometric_timeout().min(Duration::from_secs(MAX_TIMEOUT_SECS)),
            inner: RwLock::new(GateState::new()),
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    // ═══════════════════════════════════════════════════════════════
    // PIN
    // ═══════════════════════════════════════════════════════════════

    /// Long-press: start soliciting a PIN through the calculator keys
    pub fn begin_pin_entry(&self) -> VaultResult<()> {
        let mut inner = self.inner.write();
        if inner.terminated {
            return Err(VaultError::Lockout);
        }
        if inner.state == AuthState::Unlocked {
            return Ok(());
        }

        inner.state = AuthState::AwaitingPin;
        inner.auth_mode_since = Some(Utc::now());
        log::debug!("PIN entry started");
        Ok(())
    }

    /// Submit a PIN candidate while PIN entry is active
    pub fn submit_pin(&self, candidate: &str) -> VaultResult<UnlockMethod> {
        let mut inner = self.inner.write();

        if inner.terminated {
            return Err(VaultError::Lockout);
        }
        if inner.state != AuthState::AwaitingPin {
            return Err(VaultError::PinEntryInactive);
        }
        if self.entry_expired(&inner) {
            inner.reset();
            log::info!("PIN entry window expired");
            return Err(VaultError::PinEntryExpired);
        }

        if !self.credentials.has_pin()? {
            if candidate.chars().count() < self.min_pin_len {
                return Err(VaultError::PinTooShort {
                    min: self.min_pin_len,
                });
            }
            self.credentials.set_pin(candidate)?;
            inner.unlock(SecretString::new(candidate.to_string()), UnlockMethod::Bootstrap);
            log::info!("PIN created, vault unlocked");
            return Ok(UnlockMethod::Bootstrap);
        }

        if self.credentials.validate(candidate)? {
            inner.unlock(SecretString::new(candidate.to_string()), UnlockMethod::Pin);
            log::info!("Vault unlocked with PIN");
            return Ok(UnlockMethod::Pin);
        }

        inner.failed_attempts += 1;
        let failed_attempts = inner.failed_attempts;

        if failed_attempts >= self.lockout_threshold {
            inner.reset();
            inner.terminated = true;
            log::warn!("Lockout after {} failed attempts", failed_attempts);
            return Err(VaultError::Lockout);
        }

        log::warn!(
            "PIN rejected ({}/{})",
            failed_attempts,
            self.lockout_threshold
        );
        Err(VaultError::InvalidPin { failed_attempts })
    }

    fn entry_expired(&self, inner: &GateState) -> bool {
        match inner.auth_mode_since {
            Some(since) => Utc::now() - since > self.pin_entry_timeout,
            None => false,
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // BIOMETRICS
    // ═══════════════════════════════════════════════════════════════

    /// Double-tap: try to unlock with biometrics.
    ///
    /// Denial, cancellation, timeout and missing hardware all yield `false`
    /// and leave the failure counter alone.
    pub async fn attempt_biometric(&self) -> bool {
        {
            let inner = self.inner.read();
            if inner.terminated {
                return false;
            }
            if inner.state == AuthState::Unlocked {
                return true;
            }
        }

        match self.credentials.biometric_enabled() {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                log::warn!("Biometric check skipped: {}", e.kind());
                return false;
            }
        }
        if !self.biometrics.is_available() {
            log::debug!("Biometric hardware unavailable");
            return false;
        }

        let device_key = match self.prompt("Unlock").await {
            Some(key) => key,
            None => return false,
        };

        let secret = match self.credentials.unwrap_biometric_secret(&device_key) {
            Ok(Some(secret)) => secret,
            Ok(None) => return false,
            Err(e) => {
                log::warn!("Biometric unlock failed: {}", e.kind());
                return false;
            }
        };

        let mut inner = self.inner.write();
        if inner.terminated {
            return false;
        }
        inner.unlock(secret, UnlockMethod::Biometric);
        log::info!("Vault unlocked with biometrics");
        true
    }

    /// Turn biometric unlock on or off. Requires an unlocked session;
    /// enabling also requires a successful prompt.
    pub async fn enable_biometric(&self, enabled: bool) -> VaultResult<()> {
        let (secret, _) = self.session_secret()?;

        if !enabled {
            self.credentials.disable_biometric()?;
            log::info!("Biometric unlock disabled");
            return Ok(());
        }

        if !self.biometrics.is_available() {
            return Err(VaultError::BiometricUnavailable);
        }

        let device_key = self
            .prompt("Enable biometric unlock")
            .await
            .ok_or(VaultError::BiometricFailed)?;

        self.credentials.enable_biometric(&device_key, &secret)?;
        log::info!("Biometric unlock enabled");
        Ok(())
    }

    async fn prompt(&self, reason: &str) -> Option<VaultKey> {
        let rx = self.biometrics.prompt(reason);

        let outcome = match tokio::time::timeout(self.biometric_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => BiometricOutcome::Cancelled,
            Err(_) => {
                log::info!("Biometric prompt timed out");
                BiometricOutcome::Cancelled
            }
        };

        match outcome {
            BiometricOutcome::Authenticated(key) => Some(key),
            BiometricOutcome::Failed => {
                log::info!("Biometric check failed");
                None
            }
            BiometricOutcome::Cancelled => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // LOCKING
    // ═══════════════════════════════════════════════════════════════

    /// Lock immediately and reset the session
    pub fn lock(&self) {
        let mut inner = self.inner.write();
        let was_unlocked = inner.state == AuthState::Unlocked;
        inner.reset();
        if was_unlocked {
            log::info!("Vault locked");
        }
    }

    /// Host lifecycle hook. Leaving the foreground locks unconditionally.
    pub fn on_app_foreground_change(&self, is_foreground: bool) {
        if !is_foreground {
            self.lock();
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════════════════════════

    pub fn state(&self) -> AuthState {
        self.expire_stale_entry();
        self.inner.read().state
    }

    pub fn session(&self) -> AuthSession {
        self.expire_stale_entry();
        let inner = self.inner.read();
        AuthSession {
            unlocked: inner.state == AuthState::Unlocked,
            auth_mode_active: inner.state == AuthState::AwaitingPin,
            failed_attempts: inner.failed_attempts,
        }
    }

    pub fn unlocked_by(&self) -> Option<UnlockMethod> {
        self.inner.read().unlocked_by
    }

    pub fn biometric_available(&self) -> bool {
        self.biometrics.is_available()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.read().terminated
    }

    fn expire_stale_entry(&self) {
        let mut inner = self.inner.write();
        if inner.state == AuthState::AwaitingPin && self.entry_expired(&inner) {
            inner.reset();
        }
    }

    /// Secret of the open session with the epoch it belongs to
    pub(crate) fn session_secret(&self) -> VaultResult<(Arc<SecretString>, u64)> {
        let inner = self.inner.read();
        if inner.terminated {
            return Err(VaultError::Lockout);
        }
        match (&inner.secret, inner.state) {
            (Some(secret), AuthState::Unlocked) => Ok((secret.clone(), inner.epoch)),
            _ => Err(VaultError::VaultLocked),
        }
    }

    /// True while the session that produced `epoch` is still open
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        let inner = self.inner.read();
        inner.state == AuthState::Unlocked && inner.epoch == epoch
    }

    /// Run `f` while the session that produced `epoch` is open.
    ///
    /// Holds the gate so a concurrent lock waits until `f` returns.
    pub(crate) fn with_current_session<T>(
        &self,
        epoch: u64,
        f: impl FnOnce() -> VaultResult<T>,
    ) -> VaultResult<T> {
        let inner = self.inner.read();
        if inner.state != AuthState::Unlocked || inner.epoch != epoch {
            return Err(VaultError::VaultLocked);
        }
        let result = f();
        drop(inner);
        result
    }

    pub(crate) fn min_pin_len(&self) -> usize {
        self.min_pin_len
    }

    /// Swap in a new secret after a PIN change, if that session is still open
    pub(crate) fn rotate_secret(&self, epoch: u64, secret: SecretString) -> bool {
        let mut inner = self.inner.write();
        if inner.state != AuthState::Unlocked || inner.epoch != epoch {
            return false;
        }
        inner.secret = Some(Arc::new(secret));
        true
    }

    #[cfg(test)]
    pub(crate) fn backdate_pin_entry(&self, secs: i64) {
        let mut inner = self.inner.write();
        if let Some(since) = inner.auth_mode_since {
            inner.auth_mode_since = Some(since - chrono::Duration::seconds(secs));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::tests::ScriptedBiometrics;
    use crate::biometrics::{HostBiometrics, NoBiometrics};
    use crate::config::KdfConfig;
    use crate::store::SqliteStore;
    use secrecy::ExposeSecret;

    fn config() -> VaultConfig {
        VaultConfig {
            kdf: KdfConfig::for_tests(),
            biometric_timeout_secs: 1,
            ..Default::default()
        }
    }

    fn gate_with(biometrics: Arc<dyn BiometricAuthenticator>) -> AuthGate {
        let config = config();
        let kv = Arc::new(SqliteStore::in_memory().unwrap());
        let creds = Arc::new(CredentialStore::new(kv, config.kdf.clone()));
        AuthGate::new(&config, creds, biometrics)
    }

    fn gate() -> AuthGate {
        gate_with(Arc::new(NoBiometrics))
    }

    fn gate_with_pin(pin: &str) -> AuthGate {
        let gate = gate();
        gate.credentials().set_pin(pin).unwrap();
        gate
    }

    #[test]
    fn test_starts_locked() {
        let gate = gate();
        assert_eq!(gate.state(), AuthState::Locked);
        assert_eq!(
            gate.session(),
            AuthSession {
                unlocked: false,
                auth_mode_active: false,
                failed_attempts: 0
            }
        );
        assert!(matches!(gate.session_secret(), Err(VaultError::VaultLocked)));
    }

    #[test]
    fn test_submit_requires_pin_entry() {
        let gate = gate_with_pin("123456");
        assert!(matches!(
            gate.submit_pin("123456"),
            Err(VaultError::PinEntryInactive)
        ));
        assert_eq!(gate.session().failed_attempts, 0);
    }

    #[test]
    fn test_bootstrap_rejects_short_pin() {
        let gate = gate();
        gate.begin_pin_entry().unwrap();

        assert!(matches!(
            gate.submit_pin("12345"),
            Err(VaultError::PinTooShort { min: 6 })
        ));
        assert!(!gate.credentials().has_pin().unwrap());
        assert_eq!(gate.state(), AuthState::AwaitingPin);
        assert_eq!(gate.session().failed_attempts, 0);

        assert_eq!(gate.submit_pin("123456").unwrap(), UnlockMethod::Bootstrap);
        assert_eq!(gate.state(), AuthState::Unlocked);
        assert!(gate.credentials().validate("123456").unwrap());
    }

    #[test]
    fn test_lockout_on_third_failure() {
        let gate = gate_with_pin("123456");
        gate.begin_pin_entry().unwrap();

        assert!(matches!(
            gate.submit_pin("000000"),
            Err(VaultError::InvalidPin { failed_attempts: 1 })
        ));
        assert!(matches!(
            gate.submit_pin("000000"),
            Err(VaultError::InvalidPin { failed_attempts: 2 })
        ));
        assert_eq!(gate.session().failed_attempts, 2);

        let err = gate.submit_pin("000000").unwrap_err();
        assert!(matches!(err, VaultError::Lockout));
        assert!(err.requires_lockdown());
        assert!(gate.is_terminated());

        // Nothing works afterwards, not even the right PIN
        assert!(matches!(gate.begin_pin_entry(), Err(VaultError::Lockout)));
        assert!(matches!(gate.submit_pin("123456"), Err(VaultError::Lockout)));
        assert_eq!(gate.state(), AuthState::Locked);
    }

    #[test]
    fn test_success_clears_failures() {
        let gate = gate_with_pin("123456");
        gate.begin_pin_entry().unwrap();
        let _ = gate.submit_pin("111111");
        let _ = gate.submit_pin("222222");

        assert_eq!(gate.submit_pin("123456").unwrap(), UnlockMethod::Pin);
        assert_eq!(gate.session().failed_attempts, 0);
        assert_eq!(gate.unlocked_by(), Some(UnlockMethod::Pin));

        let (secret, _) = gate.session_secret().unwrap();
        assert_eq!(secret.expose_secret(), "123456");
    }

    #[test]
    fn test_background_locks_unconditionally() {
        let gate = gate_with_pin("123456");
        gate.begin_pin_entry().unwrap();
        let _ = gate.submit_pin("000000");
        gate.submit_pin("123456").unwrap();
        let (_, epoch) = gate.session_secret().unwrap();
        assert!(gate.is_current(epoch));

        gate.on_app_foreground_change(true);
        assert_eq!(gate.state(), AuthState::Unlocked);

        gate.on_app_foreground_change(false);
        assert_eq!(
            gate.session(),
            AuthSession {
                unlocked: false,
                auth_mode_active: false,
                failed_attempts: 0
            }
        );
        assert!(!gate.is_current(epoch));

        // Also from the middle of PIN entry
        gate.begin_pin_entry().unwrap();
        let _ = gate.submit_pin("000000");
        gate.on_app_foreground_change(false);
        assert_eq!(gate.session().failed_attempts, 0);
        assert!(!gate.session().auth_mode_active);
    }

    #[test]
    fn test_pin_entry_window_expires() {
        let gate = gate_with_pin("123456");
        gate.begin_pin_entry().unwrap();
        gate.backdate_pin_entry(3600);

        assert!(matches!(
            gate.submit_pin("123456"),
            Err(VaultError::PinEntryExpired)
        ));
        assert_eq!(gate.state(), AuthState::Locked);

        gate.begin_pin_entry().unwrap();
        gate.backdate_pin_entry(3600);
        assert_eq!(gate.state(), AuthState::Locked);
    }

    #[test]
    fn test_huge_entry_window_is_clamped() {
        let config = VaultConfig {
            pin_entry_timeout_secs: u64::MAX,
            ..config()
        };
        let kv = Arc::new(SqliteStore::in_memory().unwrap());
        let creds = Arc::new(CredentialStore::new(kv, config.kdf.clone()));
        creds.set_pin("123456").unwrap();
        let gate = AuthGate::new(&config, creds, Arc::new(NoBiometrics));

        gate.begin_pin_entry().unwrap();
        assert_eq!(gate.state(), AuthState::AwaitingPin);
        assert_eq!(gate.submit_pin("123456").unwrap(), UnlockMethod::Pin);

        gate.lock();
        gate.begin_pin_entry().unwrap();
        gate.backdate_pin_entry(MAX_TIMEOUT_SECS as i64 + 1);
        assert_eq!(gate.state(), AuthState::Locked);
    }

    #[test]
    fn test_bootstrap_then_relock_then_unlock() {
        let gate = gate();
        gate.begin_pin_entry().unwrap();
        gate.submit_pin("654321").unwrap();
        gate.lock();
        assert_eq!(gate.state(), AuthState::Locked);

        gate.begin_pin_entry().unwrap();
        assert_eq!(gate.submit_pin("654321").unwrap(), UnlockMethod::Pin);
        assert_eq!(
            gate.session(),
            AuthSession {
                unlocked: true,
                auth_mode_active: false,
                failed_attempts: 0
            }
        );
    }

    #[tokio::test]
    async fn test_biometric_disabled_or_unavailable() {
        let gate = gate_with(Arc::new(ScriptedBiometrics::accepting([1u8; 32])));
        // Not enabled yet
        assert!(!gate.attempt_biometric().await);

        let gate = gate_with(Arc::new(NoBiometrics));
        gate.credentials().set_pin("123456").unwrap();
        gate.begin_pin_entry().unwrap();
        gate.submit_pin("123456").unwrap();
        assert!(matches!(
            gate.enable_biometric(true).await,
            Err(VaultError::BiometricUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_biometric_unlock_after_enrolment() {
        let gate = gate_with(Arc::new(ScriptedBiometrics::accepting([5u8; 32])));
        assert!(matches!(
            gate.enable_biometric(true).await,
            Err(VaultError::VaultLocked)
        ));

        gate.begin_pin_entry().unwrap();
        gate.submit_pin("123456").unwrap();
        gate.enable_biometric(true).await.unwrap();
        assert!(gate.credentials().biometric_enabled().unwrap());

        gate.lock();
        assert!(gate.attempt_biometric().await);
        assert_eq!(gate.state(), AuthState::Unlocked);
        assert_eq!(gate.unlocked_by(), Some(UnlockMethod::Biometric));
        let (secret, _) = gate.session_secret().unwrap();
        assert_eq!(secret.expose_secret(), "123456");
    }

    #[tokio::test]
    async fn test_biometric_failure_does_not_count() {
        let accepting = gate_with(Arc::new(ScriptedBiometrics::accepting([5u8; 32])));
        accepting.begin_pin_entry().unwrap();
        accepting.submit_pin("123456").unwrap();
        accepting.enable_biometric(true).await.unwrap();

        // Same credentials, sensor now rejects
        let config = config();
        let gate = AuthGate::new(
            &config,
            accepting.credentials.clone(),
            Arc::new(ScriptedBiometrics::rejecting()),
        );
        for _ in 0..5 {
            assert!(!gate.attempt_biometric().await);
        }
        assert_eq!(gate.session().failed_attempts, 0);
        assert!(!gate.is_terminated());
    }

    #[tokio::test]
    async fn test_biometric_prompt_times_out() {
        let host = Arc::new(HostBiometrics::new(true));
        let enroller = gate_with(Arc::new(ScriptedBiometrics::accepting([5u8; 32])));
        enroller.begin_pin_entry().unwrap();
        enroller.submit_pin("123456").unwrap();
        enroller.enable_biometric(true).await.unwrap();

        let config = config();
        let gate = AuthGate::new(&config, enroller.credentials.clone(), host.clone());

        // Nobody answers the prompt
        assert!(!gate.attempt_biometric().await);
        assert_eq!(gate.state(), AuthState::Locked);
    }

    #[tokio::test]
    async fn test_wrong_device_key_is_rejected() {
        let enroller = gate_with(Arc::new(ScriptedBiometrics::accepting([5u8; 32])));
        enroller.begin_pin_entry().unwrap();
        enroller.submit_pin("123456").unwrap();
        enroller.enable_biometric(true).await.unwrap();

        let config = config();
        let gate = AuthGate::new(
            &config,
            enroller.credentials.clone(),
            Arc::new(ScriptedBiometrics::accepting([6u8; 32])),
        );
        assert!(!gate.attempt_biometric().await);
        assert_eq!(gate.state(), AuthState::Locked);
    }

    #[tokio::test]
    async fn test_biometric_refused_after_lockout() {
        let gate = gate_with(Arc::new(ScriptedBiometrics::accepting([5u8; 32])));
        gate.begin_pin_entry().unwrap();
        gate.submit_pin("123456").unwrap();
        gate.enable_biometric(true).await.unwrap();
        gate.lock();

        gate.begin_pin_entry().unwrap();
        for _ in 0..3 {
            let _ = gate.submit_pin("999999");
        }
        assert!(gate.is_terminated());
        assert!(!gate.attempt_biometric().await);
    }
}
