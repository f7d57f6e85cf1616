//! Calculator Vault - Biometric Authentication
//!
//! The platform prompt is asynchronous: the core asks for a prompt and gets a
//! oneshot receiver that the host completes once the user has responded.
//! A successful check releases a device key from the platform keystore.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::crypto::{VaultKey, KEY_LEN};

/// Result of one biometric prompt
#[derive(Debug)]
pub enum BiometricOutcome {
    /// User verified; carries the key released by the keystore
    Authenticated(VaultKey),
    /// Sensor rejected the user
    Failed,
    /// Prompt dismissed
    Cancelled,
}

impl BiometricOutcome {
    /// Build an outcome from raw keystore bytes
    pub fn authenticated(device_key: [u8; KEY_LEN]) -> Self {
        BiometricOutcome::Authenticated(VaultKey::new(device_key))
    }
}

/// Platform biometric prompt
pub trait BiometricAuthenticator: Send + Sync {
    /// Hardware present and at least one biometric enrolled
    fn is_available(&self) -> bool;

    /// Show a prompt. Dropping the sender counts as cancellation.
    fn prompt(&self, reason: &str) -> oneshot::Receiver<BiometricOutcome>;
}

/// No biometric hardware (desktop, CLI)
pub struct NoBiometrics;

impl BiometricAuthenticator for NoBiometrics {
    fn is_available(&self) -> bool {
        false
    }

    fn prompt(&self, _reason: &str) -> oneshot::Receiver<BiometricOutcome> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(BiometricOutcome::Cancelled);
        rx
    }
}

/// Prompt completed by the host UI
///
/// The host shows its own dialog when `prompt` is called and reports back
/// through [`HostBiometrics::complete`].
pub struct HostBiometrics {
    available: Mutex<bool>,
    pending: Mutex<Option<oneshot::Sender<BiometricOutcome>>>,
}

impl HostBiometrics {
    pub fn new(available: bool) -> Self {
        Self {
            available: Mutex::new(available),
            pending: Mutex::new(None),
        }
    }

    pub fn set_available(&self, available: bool) {
        *self.available.lock() = available;
    }

    /// Deliver the user's response. Returns false if no prompt was open.
    pub fn complete(&self, outcome: BiometricOutcome) -> bool {
        match self.pending.lock().take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

impl BiometricAuthenticator for HostBiometrics {
    fn is_available(&self) -> bool {
        *self.available.lock()
    }

    fn prompt(&self, reason: &str) -> oneshot::Receiver<BiometricOutcome> {
        let (tx, rx) = oneshot::channel();
        // An older prompt still open is dropped, which cancels it
        if self.pending.lock().replace(tx).is_some() {
            log::debug!("Replaced pending biometric prompt");
        }
        log::debug!("Biometric prompt requested: {}", reason);
        rx
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Answers every prompt immediately
    pub(crate) struct ScriptedBiometrics {
        pub available: bool,
        pub answer: Mutex<Option<[u8; KEY_LEN]>>,
    }

    impl ScriptedBiometrics {
        /// Always authenticates with `device_key`
        pub(crate) fn accepting(device_key: [u8; KEY_LEN]) -> Self {
            Self {
                available: true,
                answer: Mutex::new(Some(device_key)),
            }
        }

        /// Always reports a sensor failure
        pub(crate) fn rejecting() -> Self {
            Self {
                available: true,
                answer: Mutex::new(None),
            }
        }
    }

    impl BiometricAuthenticator for ScriptedBiometrics {
        fn is_available(&self) -> bool {
            self.available
        }

        fn prompt(&self, _reason: &str) -> oneshot::Receiver<BiometricOutcome> {
            let (tx, rx) = oneshot::channel();
            let outcome = match *self.answer.lock() {
                Some(key) => BiometricOutcome::authenticated(key),
                None => BiometricOutcome::Failed,
            };
            let _ = tx.send(outcome);
            rx
        }
    }

    #[tokio::test]
    async fn test_no_biometrics_cancels() {
        let bio = NoBiometrics;
        assert!(!bio.is_available());
        assert!(matches!(
            bio.prompt("unlock").await,
            Ok(BiometricOutcome::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_host_completes_prompt() {
        let bio = HostBiometrics::new(true);
        assert!(!bio.complete(BiometricOutcome::Failed));

        let rx = bio.prompt("unlock");
        assert!(bio.has_pending());
        assert!(bio.complete(BiometricOutcome::authenticated([9u8; KEY_LEN])));
        assert!(!bio.has_pending());

        match rx.await {
            Ok(BiometricOutcome::Authenticated(key)) => assert_eq!(key.expose(), &[9u8; KEY_LEN]),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_prompt_cancels_first() {
        let bio = HostBiometrics::new(true);
        let first = bio.prompt("one");
        let second = bio.prompt("two");

        // Dropped sender surfaces as a receive error
        assert!(first.await.is_err());

        bio.complete(BiometricOutcome::Cancelled);
        assert!(matches!(second.await, Ok(BiometricOutcome::Cancelled)));
    }
}
