//! Calculator Vault - Android JNI Bindings
//!
//! Exposes the vault core to Kotlin/Java via JNI. Structured results are
//! returned as JSON strings; failures come back as `null` / `false` and are
//! logged by kind only.

#![cfg(feature = "android")]

use std::path::PathBuf;
use std::sync::Arc;

use jni::objects::{JByteArray, JClass, JString};
use jni::sys::{jboolean, jint, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use parking_lot::{const_mutex, Mutex};
use serde::Serialize;
use zeroize::Zeroizing;

use crate::biometrics::{BiometricOutcome, HostBiometrics};
use crate::crypto::KEY_LEN;
use crate::{CalcVault, VaultConfig, VaultResult};

// Process-wide instances (singleton for Android)
static VAULT: Mutex<Option<Arc<CalcVault>>> = const_mutex(None);
static BIOMETRICS: Mutex<Option<Arc<HostBiometrics>>> = const_mutex(None);

/// `completeBiometric` result codes
const BIO_AUTHENTICATED: jint = 0;
const BIO_FAILED: jint = 1;

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn read_string(env: &mut JNIEnv, value: &JString) -> Option<String> {
    env.get_string(value).ok().map(|s| s.into())
}

fn new_jstring(env: &mut JNIEnv, value: &str) -> jstring {
    match env.new_string(value) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

fn json_jstring<T: Serialize>(env: &mut JNIEnv, value: &T) -> jstring {
    match serde_json::to_string(value) {
        Ok(json) => new_jstring(env, &json),
        Err(_) => std::ptr::null_mut(),
    }
}

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

fn current_vault() -> Option<Arc<CalcVault>> {
    VAULT.lock().clone()
}

/// Run `f` against the open vault, logging failures by kind
fn with_vault<T>(op: &str, f: impl FnOnce(&CalcVault) -> VaultResult<T>) -> Option<T> {
    let vault = current_vault()?;
    match f(&vault) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("{} failed: {}", op, e.kind());
            None
        }
    }
}

fn block_on<F: std::future::Future>(future: F) -> Option<F::Output> {
    match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(rt) => Some(rt.block_on(future)),
        Err(e) => {
            log::warn!("Runtime unavailable: {}", e);
            None
        }
    }
}

fn outcome_from(code: jint, device_key: Option<Vec<u8>>) -> BiometricOutcome {
    match code {
        BIO_AUTHENTICATED => {
            let key = device_key.map(Zeroizing::new);
            match key.as_deref().map(|k| <[u8; KEY_LEN]>::try_from(k.as_slice())) {
                Some(Ok(bytes)) => BiometricOutcome::authenticated(bytes),
                _ => BiometricOutcome::Failed,
            }
        }
        BIO_FAILED => BiometricOutcome::Failed,
        _ => BiometricOutcome::Cancelled,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Open the vault under the app's private data directory
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_open(
    mut env: JNIEnv,
    _class: JClass,
    data_dir: JString,
    biometric_available: jboolean,
) -> jboolean {
    let data_dir = match read_string(&mut env, &data_dir) {
        Some(s) => PathBuf::from(s),
        None => return JNI_FALSE,
    };

    let biometrics = Arc::new(HostBiometrics::new(biometric_available != JNI_FALSE));
    match CalcVault::open(VaultConfig::for_data_dir(data_dir), biometrics.clone()) {
        Ok(vault) => {
            *VAULT.lock() = Some(Arc::new(vault));
            *BIOMETRICS.lock() = Some(biometrics);
            JNI_TRUE
        }
        Err(e) => {
            log::warn!("Open failed: {}", e.kind());
            JNI_FALSE
        }
    }
}

/// App moved to or from the foreground
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_onForegroundChange(
    _env: JNIEnv,
    _class: JClass,
    is_foreground: jboolean,
) {
    if let Some(vault) = current_vault() {
        vault.on_app_foreground_change(is_foreground != JNI_FALSE);
    }
}

/// Lock vault
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_lock(_env: JNIEnv, _class: JClass) {
    if let Some(vault) = current_vault() {
        vault.lock();
    }
}

/// Status as JSON
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_status(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match with_vault("status", |v| v.status()) {
        Some(status) => json_jstring(&mut env, &status),
        None => std::ptr::null_mut(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTHENTICATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Long-press detected
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_beginPinEntry(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    to_jboolean(with_vault("begin PIN entry", |v| v.begin_pin_entry()).is_some())
}

/// "=" pressed in auth mode. Returns the submission as JSON.
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_submitPin(
    mut env: JNIEnv,
    _class: JClass,
    pin: JString,
) -> jstring {
    let pin = match read_string(&mut env, &pin) {
        Some(s) => Zeroizing::new(s),
        None => return std::ptr::null_mut(),
    };

    match with_vault("submit PIN", |v| v.submit_pin(&pin)) {
        Some(result) => json_jstring(&mut env, &result),
        None => std::ptr::null_mut(),
    }
}

/// Double-tap detected. Blocks until the prompt is answered, so call it
/// off the UI thread.
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_attemptBiometric(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    let vault = match current_vault() {
        Some(v) => v,
        None => return JNI_FALSE,
    };
    to_jboolean(block_on(vault.attempt_biometric()).unwrap_or(false))
}

/// Host's answer to the pending biometric prompt
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_completeBiometric(
    mut env: JNIEnv,
    _class: JClass,
    result: jint,
    device_key: JByteArray,
) -> jboolean {
    let key = if device_key.is_null() {
        None
    } else {
        env.convert_byte_array(&device_key).ok()
    };

    let biometrics = BIOMETRICS.lock().clone();
    match biometrics {
        Some(bio) => to_jboolean(bio.complete(outcome_from(result, key))),
        None => JNI_FALSE,
    }
}

/// Enrolment or hardware state changed on the device
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_setBiometricAvailable(
    _env: JNIEnv,
    _class: JClass,
    available: jboolean,
) {
    if let Some(bio) = BIOMETRICS.lock().as_ref() {
        bio.set_available(available != JNI_FALSE);
    }
}

/// Turn biometric unlock on or off. Blocks on the enrolment prompt.
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_setBiometricEnabled(
    _env: JNIEnv,
    _class: JClass,
    enabled: jboolean,
) -> jboolean {
    let vault = match current_vault() {
        Some(v) => v,
        None => return JNI_FALSE,
    };
    match block_on(vault.enable_biometric(enabled != JNI_FALSE)) {
        Some(Ok(())) => JNI_TRUE,
        Some(Err(e)) => {
            log::warn!("Biometric toggle failed: {}", e.kind());
            JNI_FALSE
        }
        None => JNI_FALSE,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILES
// ═══════════════════════════════════════════════════════════════════════════════

/// Entries as a JSON array
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_listEntries(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match with_vault("list", |v| v.list_entries()) {
        Some(entries) => json_jstring(&mut env, &entries),
        None => std::ptr::null_mut(),
    }
}

/// Add a file already copied into app storage. Returns the entry as JSON.
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_addFile(
    mut env: JNIEnv,
    _class: JClass,
    source_path: JString,
    name: JString,
    mime_type: JString,
) -> jstring {
    let (source, name, mime) = match (
        read_string(&mut env, &source_path),
        read_string(&mut env, &name),
        read_string(&mut env, &mime_type),
    ) {
        (Some(s), Some(n), Some(m)) => (PathBuf::from(s), n, m),
        _ => return std::ptr::null_mut(),
    };

    match with_vault("add", |v| v.add_file(&source, &name, &mime)) {
        Some(entry) => json_jstring(&mut env, &entry),
        None => std::ptr::null_mut(),
    }
}

/// Delete entry and ciphertext
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_deleteFile(
    mut env: JNIEnv,
    _class: JClass,
    id: JString,
) -> jboolean {
    let id = match read_string(&mut env, &id) {
        Some(s) => s,
        None => return JNI_FALSE,
    };
    to_jboolean(with_vault("delete", |v| v.delete_file(&id)).is_some())
}

/// Decrypt to a temporary file and return its path
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_revealFile(
    mut env: JNIEnv,
    _class: JClass,
    id: JString,
) -> jstring {
    let id = match read_string(&mut env, &id) {
        Some(s) => s,
        None => return std::ptr::null_mut(),
    };

    match with_vault("reveal", |v| v.reveal_file(&id)) {
        Some(path) => new_jstring(&mut env, &path.to_string_lossy()),
        None => std::ptr::null_mut(),
    }
}

/// Wipe revealed files, returning how many were removed (-1 on error)
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_purgeRevealed(
    _env: JNIEnv,
    _class: JClass,
) -> jint {
    with_vault("purge", |v| v.purge_revealed())
        .map(|n| n as jint)
        .unwrap_or(-1)
}

/// Re-encrypt everything under a new PIN
#[no_mangle]
pub extern "system" fn Java_dev_calcvault_NativeVault_changePin(
    mut env: JNIEnv,
    _class: JClass,
    new_pin: JString,
) -> jboolean {
    let new_pin = match read_string(&mut env, &new_pin) {
        Some(s) => Zeroizing::new(s),
        None => return JNI_FALSE,
    };
    to_jboolean(with_vault("change PIN", |v| v.change_pin(&new_pin)).is_some())
}
