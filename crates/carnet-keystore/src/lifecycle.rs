//! Keystore lifecycle orchestration.
//!
//! [`Keystore`] is the single entry point the host application talks to. It
//! owns the local store, the lockout guard, and — while unlocked — the one
//! in-memory copy of the encryption key. Ceremonies:
//!
//! - [`Keystore::setup`] — first-run secret enrollment
//! - [`Keystore::unlock`] / [`Keystore::lock`] — the daily cycle
//! - [`Keystore::change_secret`] — rotate the secret and the key
//! - [`Keystore::unlock_with_recovery`] — redeem a recovery code
//! - [`Keystore::bootstrap_from_remote`] — adopt account state on a new
//!   device
//!
//! An account-scoped keystore can carry an attached [`RemoteAccountStore`];
//! setup and secret rotation then push the fresh salt and verification
//! record to it so other devices never bootstrap stale credentials.
//!
//! The key never leaves this struct except inside a [`SecretRotation`],
//! which exists solely so the data layer can re-encrypt after a rotation.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::BASE64;
use tracing::{info, warn};
use zeroize::Zeroize;

use carnet_crypto_core::{
    cipher, generate_salt, kdf, CryptoError, DerivationMode, SecretBytes, KEY_LEN,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::KeystoreError;
use crate::lockout::LockoutGuard;
use crate::recovery;
use crate::remote::RemoteAccountStore;
use crate::storage::{LocalStore, Namespace};
use crate::verification::{self, VerificationRecord};

/// Sentinel plaintext stored encrypted under the current key. Decrypting
/// it proves key and stored records belong to the same secret epoch.
const KEY_CHECK_PLAINTEXT: &[u8] = b"carnet-key-check-v1";

const KEY_CHECK_FIELD: &str = "keyCheck";

/// Wall clock in epoch seconds. A clock before the epoch reads as 0.
fn current_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Snapshot of the keystore's externally visible state (for the UI shell).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystoreStatus {
    /// A secret has been enrolled.
    pub configured: bool,
    /// The key is currently in memory.
    pub unlocked: bool,
    /// A recovery code has been generated and not invalidated.
    pub recovery_configured: bool,
    /// Attempts left before the lockout triggers.
    pub attempts_remaining: u32,
    /// Seconds left in an active lockout window, if any.
    pub locked_for_secs: Option<u64>,
}

/// Key pair handed to the data layer after a secret rotation so existing
/// blobs can be re-encrypted. Dropping it zeroizes both keys.
pub struct SecretRotation {
    old_key: SecretBytes<KEY_LEN>,
    new_key: SecretBytes<KEY_LEN>,
}

impl SecretRotation {
    /// Decrypt `blob` under the pre-rotation key and re-encrypt it under
    /// the new one.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::DecryptionFailed`] if the blob does not
    /// open under the old key.
    pub fn reencrypt(&self, blob: &str) -> Result<String, KeystoreError> {
        let plaintext = cipher::decrypt(blob, self.old_key.expose()).map_err(map_crypto)?;
        cipher::encrypt(plaintext.expose(), self.new_key.expose()).map_err(map_crypto)
    }
}

impl std::fmt::Debug for SecretRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRotation").finish_non_exhaustive()
    }
}

/// Derive the key for a fresh enrollment. Prefers the slow branch; if it
/// fails on this platform the fast fallback runs instead and the
/// degradation is logged. Invalid inputs are never retried.
fn derive_with_fallback(
    secret: &[u8],
    salt: &[u8],
) -> Result<(DerivationMode, SecretBytes<KEY_LEN>), KeystoreError> {
    let slow = DerivationMode::slow_default();
    match kdf::derive(secret, salt, &slow) {
        Ok(key) => Ok((slow, key)),
        Err(CryptoError::InvalidInput(msg)) => Err(KeystoreError::InvalidInput(msg)),
        Err(e) => {
            warn!(error = %e, "slow key derivation unavailable, falling back to fast hash");
            let key = kdf::derive(secret, salt, &DerivationMode::Fast)?;
            Ok((DerivationMode::Fast, key))
        }
    }
}

/// Collapse crypto errors into the keystore taxonomy.
fn map_crypto(e: CryptoError) -> KeystoreError {
    match e {
        CryptoError::Decryption => KeystoreError::DecryptionFailed,
        CryptoError::MalformedPayload(msg) => KeystoreError::MalformedPayload(msg),
        CryptoError::InvalidInput(msg) => KeystoreError::InvalidInput(msg),
        other => KeystoreError::Crypto(other),
    }
}

// ---------------------------------------------------------------------------
// Keystore
// ---------------------------------------------------------------------------

/// The unlock state machine plus the single in-memory key.
pub struct Keystore {
    store: LocalStore,
    namespace: Namespace,
    lockout: LockoutGuard,
    key: Option<SecretBytes<KEY_LEN>>,
    remote: Option<Box<dyn RemoteAccountStore + Send>>,
    on_unlock: Option<Box<dyn FnMut() + Send>>,
    recovery_notifier: Option<Box<dyn FnMut(&str) -> Result<(), KeystoreError> + Send>>,
    unlock_in_progress: bool,
}

impl Keystore {
    /// Open the keystore over `data_dir` in the unscoped local namespace.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] if the backing file
    /// cannot be opened or is corrupt.
    pub fn open(data_dir: &Path) -> Result<Self, KeystoreError> {
        Self::open_in(data_dir, Namespace::Local)
    }

    /// Open the keystore scoped to an account, first moving any unscoped
    /// records into the account namespace (one-time, idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::InvalidInput`] for an empty account id, or
    /// [`KeystoreError::StorageUnavailable`] on storage failure.
    pub fn open_for_account(data_dir: &Path, account_id: &str) -> Result<Self, KeystoreError> {
        if account_id.is_empty() {
            return Err(KeystoreError::InvalidInput(
                "account id must not be empty".into(),
            ));
        }
        let mut store = LocalStore::open(data_dir)?;
        store.adopt_account(account_id)?;
        let namespace = Namespace::Account(account_id.to_string());
        let lockout = LockoutGuard::load(&store, &namespace);
        Ok(Self {
            store,
            namespace,
            lockout,
            key: None,
            remote: None,
            on_unlock: None,
            recovery_notifier: None,
            unlock_in_progress: false,
        })
    }

    fn open_in(data_dir: &Path, namespace: Namespace) -> Result<Self, KeystoreError> {
        let store = LocalStore::open(data_dir)?;
        let lockout = LockoutGuard::load(&store, &namespace);
        Ok(Self {
            store,
            namespace,
            lockout,
            key: None,
            remote: None,
            on_unlock: None,
            recovery_notifier: None,
            unlock_in_progress: false,
        })
    }

    /// Attach the account backend. Once attached, setup and secret
    /// rotation push the current salt and verification record to it so
    /// other devices bootstrap up-to-date credentials.
    pub fn attach_remote(&mut self, remote: Box<dyn RemoteAccountStore + Send>) {
        self.remote = Some(remote);
    }

    /// Register a callback fired after every successful unlock (secret or
    /// recovery). The data layer uses it to start decrypting content.
    pub fn set_on_unlock(&mut self, callback: Box<dyn FnMut() + Send>) {
        self.on_unlock = Some(callback);
    }

    /// Register an out-of-band delivery hook invoked when a recovery code
    /// is generated for the first time. Best-effort: a failing notifier is
    /// logged and never blocks code generation.
    pub fn set_recovery_notifier(
        &mut self,
        notifier: Box<dyn FnMut(&str) -> Result<(), KeystoreError> + Send>,
    ) {
        self.recovery_notifier = Some(notifier);
    }

    /// Current externally visible state.
    #[must_use]
    pub fn status(&self) -> KeystoreStatus {
        let now = current_epoch_secs();
        KeystoreStatus {
            configured: verification::is_configured(&self.store, &self.namespace),
            unlocked: self.key.is_some(),
            recovery_configured: recovery::is_configured(&self.store, &self.namespace),
            attempts_remaining: self.lockout.attempts_remaining(),
            locked_for_secs: self.lockout.remaining_secs(now),
        }
    }

    /// Whether the key is currently in memory.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.key.is_some()
    }

    // -- Setup --------------------------------------------------------------

    /// Enroll a secret on a fresh installation: generate a salt, persist
    /// the verification record, and leave the keystore unlocked. With a
    /// remote attached and an account scope, the new records are pushed to
    /// the backend best-effort.
    ///
    /// Prefers the slow KDF branch; if it fails the fast fallback is used
    /// and the degradation is logged.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::InvalidInput`] for an empty secret
    /// - [`KeystoreError::AlreadyConfigured`] if a record already exists
    /// - [`KeystoreError::StorageUnavailable`] if persisting fails — setup
    ///   never half-succeeds silently
    pub fn setup(&mut self, secret: &str) -> Result<(), KeystoreError> {
        if secret.is_empty() {
            return Err(KeystoreError::InvalidInput("secret must not be empty".into()));
        }
        if verification::is_configured(&self.store, &self.namespace) {
            return Err(KeystoreError::AlreadyConfigured);
        }

        let salt = generate_salt();
        let (mode, key) = derive_with_fallback(secret.as_bytes(), &salt)?;
        verification::setup(
            &mut self.store,
            &self.namespace,
            secret.as_bytes(),
            &salt,
            &mode,
        )?;

        self.write_key_check(&key)?;
        self.install_key(key);
        self.push_records_best_effort();
        info!(mode = ?mode, "keystore configured");
        Ok(())
    }

    // -- Unlock / lock ------------------------------------------------------

    /// Verify `secret` and cache the key.
    ///
    /// Failed attempts count toward the lockout; a success clears the
    /// counter and fires the unlock callback.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::UnlockInProgress`] if re-entered from the unlock
    ///   callback
    /// - [`KeystoreError::Locked`] while a lockout window is active
    /// - [`KeystoreError::NotConfigured`] before setup
    /// - [`KeystoreError::WrongSecret`] on a failed verification
    pub fn unlock(&mut self, secret: &str) -> Result<(), KeystoreError> {
        if self.unlock_in_progress {
            return Err(KeystoreError::UnlockInProgress);
        }
        self.unlock_in_progress = true;
        let result = self.unlock_inner(secret);
        self.unlock_in_progress = false;
        result
    }

    fn unlock_inner(&mut self, secret: &str) -> Result<(), KeystoreError> {
        if secret.is_empty() {
            return Err(KeystoreError::InvalidInput("secret must not be empty".into()));
        }

        let now = current_epoch_secs();
        self.lockout.check(&mut self.store, &self.namespace, now)?;

        match verification::verify(&self.store, &self.namespace, secret.as_bytes())? {
            Some(verified) => {
                self.verify_key_check(&verified.key, true)?;
                self.lockout.record_success(&mut self.store, &self.namespace);
                self.install_key(verified.key);
                Ok(())
            }
            None => Err(self
                .lockout
                .record_failure(&mut self.store, &self.namespace, now)),
        }
    }

    /// Drop the in-memory key. Idempotent.
    pub fn lock(&mut self) {
        self.key = None;
    }

    fn install_key(&mut self, key: SecretBytes<KEY_LEN>) {
        self.key = Some(key);
        if let Some(callback) = self.on_unlock.as_mut() {
            callback();
        }
    }

    // -- Key check sentinel -------------------------------------------------

    /// Persist the sentinel blob encrypted under `key`.
    fn write_key_check(&mut self, key: &SecretBytes<KEY_LEN>) -> Result<(), KeystoreError> {
        let blob = cipher::encrypt(KEY_CHECK_PLAINTEXT, key.expose()).map_err(map_crypto)?;
        self.store.set(&self.namespace, KEY_CHECK_FIELD, blob)
    }

    /// Confirm `key` opens the stored sentinel. A missing sentinel (older
    /// installations) is written now rather than rejected.
    ///
    /// `record_verified` marks keys already proven by the verification
    /// record: for those a mismatched sentinel can only be the leftover of
    /// an interrupted rotation, so it is rewritten instead of rejected.
    /// Recovery-derived keys stay strict.
    fn verify_key_check(
        &mut self,
        key: &SecretBytes<KEY_LEN>,
        record_verified: bool,
    ) -> Result<(), KeystoreError> {
        let Some(blob) = self.store.get(&self.namespace, KEY_CHECK_FIELD) else {
            return self.write_key_check(key);
        };
        let opens = cipher::decrypt(blob, key.expose())
            .is_ok_and(|plaintext| plaintext.expose() == KEY_CHECK_PLAINTEXT);
        if opens {
            return Ok(());
        }
        if record_verified {
            warn!("stale key-check sentinel, rewriting under the verified key");
            return self.write_key_check(key);
        }
        Err(KeystoreError::DecryptionFailed)
    }

    // -- Secret rotation ----------------------------------------------------

    /// Verify `current`, then enroll `new_secret` over the installation
    /// salt.
    ///
    /// The key is derived from the secret, so rotating the secret rotates
    /// the key: the returned [`SecretRotation`] lets the data layer
    /// re-encrypt existing blobs. Any recovery code is invalidated — it
    /// wrapped the old key. With a remote attached and an account scope,
    /// the updated record is pushed to the backend best-effort.
    ///
    /// Failed verification of `current` counts toward the lockout.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Keystore::unlock`] for the verification step,
    /// plus [`KeystoreError::InvalidInput`] for an empty new secret.
    pub fn change_secret(
        &mut self,
        current: &str,
        new_secret: &str,
    ) -> Result<SecretRotation, KeystoreError> {
        if new_secret.is_empty() {
            return Err(KeystoreError::InvalidInput(
                "new secret must not be empty".into(),
            ));
        }

        let now = current_epoch_secs();
        self.lockout.check(&mut self.store, &self.namespace, now)?;

        let Some(verified) =
            verification::verify(&self.store, &self.namespace, current.as_bytes())?
        else {
            return Err(self
                .lockout
                .record_failure(&mut self.store, &self.namespace, now));
        };
        self.lockout.record_success(&mut self.store, &self.namespace);

        self.rotate_to(new_secret, verified.key)
    }

    /// Enroll a new secret while already unlocked — the post-recovery path,
    /// where the current secret is unknown but the key is in memory.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::NotUnlocked`] if no key is cached
    /// - [`KeystoreError::InvalidInput`] for an empty new secret
    pub fn rotate_secret(&mut self, new_secret: &str) -> Result<SecretRotation, KeystoreError> {
        if new_secret.is_empty() {
            return Err(KeystoreError::InvalidInput(
                "new secret must not be empty".into(),
            ));
        }
        // Copy the live key so a failed rotation leaves it installed.
        let old_key = {
            let key = self.key.as_ref().ok_or(KeystoreError::NotUnlocked)?;
            let mut bytes = [0u8; KEY_LEN];
            bytes.copy_from_slice(key.expose());
            let copy = SecretBytes::new(bytes);
            bytes.zeroize();
            copy
        };
        self.rotate_to(new_secret, old_key)
    }

    fn rotate_to(
        &mut self,
        new_secret: &str,
        old_key: SecretBytes<KEY_LEN>,
    ) -> Result<SecretRotation, KeystoreError> {
        // One salt per installation: the record changes, the salt does
        // not, so a backend holding the pre-rotation salt still derives
        // against the right one.
        let salt = verification::load_salt(&self.store, &self.namespace)?
            .ok_or(KeystoreError::NotConfigured)?;
        let (mode, new_key) = derive_with_fallback(new_secret.as_bytes(), &salt)?;
        verification::setup(
            &mut self.store,
            &self.namespace,
            new_secret.as_bytes(),
            &salt,
            &mode,
        )?;

        self.write_key_check(&new_key)?;

        // The recovery record wrapped the old key; it is now useless.
        recovery::remove_record(&mut self.store, &self.namespace)?;

        let mut rotation_key = [0u8; KEY_LEN];
        rotation_key.copy_from_slice(new_key.expose());
        self.install_key(new_key);
        let rotation_copy = SecretBytes::new(rotation_key);
        rotation_key.zeroize();
        self.push_records_best_effort();
        info!("secret rotated");
        Ok(SecretRotation {
            old_key,
            new_key: rotation_copy,
        })
    }

    // -- Recovery -----------------------------------------------------------

    /// Generate a recovery code for the current key. Requires an unlocked
    /// keystore; replaces any previous code.
    ///
    /// The returned string is shown to the user once and never persisted.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::NotUnlocked`] if no key is cached
    /// - [`KeystoreError::StorageUnavailable`] if the record cannot be
    ///   written
    pub fn generate_recovery(&mut self) -> Result<String, KeystoreError> {
        let key = self.key.as_ref().ok_or(KeystoreError::NotUnlocked)?;
        let first_generation = !recovery::is_configured(&self.store, &self.namespace);

        let mut key_bytes = [0u8; KEY_LEN];
        key_bytes.copy_from_slice(key.expose());
        let code = recovery::generate(&mut self.store, &self.namespace, &key_bytes);
        key_bytes.zeroize();
        let code = code?;

        if first_generation {
            if let Some(notifier) = self.recovery_notifier.as_mut() {
                if let Err(e) = notifier(&code) {
                    warn!(error = %e, "recovery notification failed");
                }
            }
        }
        Ok(code)
    }

    /// Export the cached key as a portable base64 string for a single
    /// authorized same-session outbound call. Explicit and rare; every
    /// export is audit-logged.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::NotUnlocked`] when locked.
    pub fn export_key_material(&self) -> Result<String, KeystoreError> {
        let key = self.key.as_ref().ok_or(KeystoreError::NotUnlocked)?;
        warn!("encryption key exported for same-session outbound use");
        Ok(BASE64.encode(key.expose()))
    }

    /// Redeem a recovery code and cache the unwrapped primary key.
    ///
    /// Invalid codes count toward the lockout like wrong secrets and
    /// surface the guard's accounting, so the attempt that exhausts the
    /// budget reports the lockout directly. The caller should prompt for a
    /// new secret afterwards and call [`Keystore::rotate_secret`].
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::Locked`] while a lockout window is active, or on
    ///   the invalid attempt that starts one
    /// - [`KeystoreError::RecoveryNotConfigured`] if no code was generated
    /// - [`KeystoreError::WrongSecret`] for a wrong or mistyped code, with
    ///   the remaining attempt count
    pub fn unlock_with_recovery(&mut self, code: &str) -> Result<(), KeystoreError> {
        if self.unlock_in_progress {
            return Err(KeystoreError::UnlockInProgress);
        }
        self.unlock_in_progress = true;
        let result = self.recovery_unlock_inner(code);
        self.unlock_in_progress = false;
        result
    }

    fn recovery_unlock_inner(&mut self, code: &str) -> Result<(), KeystoreError> {
        let now = current_epoch_secs();
        self.lockout.check(&mut self.store, &self.namespace, now)?;

        match recovery::unwrap_key(&self.store, &self.namespace, code) {
            Ok(key) => {
                self.verify_key_check(&key, false)?;
                self.lockout.record_success(&mut self.store, &self.namespace);
                self.install_key(key);
                info!("unlocked via recovery code");
                Ok(())
            }
            // Same accounting as a wrong secret: the guard's error carries
            // the remaining attempts or the lockout it just started.
            Err(KeystoreError::InvalidRecoveryCode) => Err(self
                .lockout
                .record_failure(&mut self.store, &self.namespace, now)),
            Err(other) => Err(other),
        }
    }

    // -- Remote bootstrap ---------------------------------------------------

    /// Publish this account's salt and verification record to the attached
    /// backend so other devices can bootstrap. Only non-secret material is
    /// sent. Setup and rotation do this automatically; the explicit call
    /// exists for retries after a failed push.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::InvalidInput`] if the keystore is not
    ///   account-scoped
    /// - [`KeystoreError::NotConfigured`] before setup
    /// - [`KeystoreError::StorageUnavailable`] if no remote is attached or
    ///   the backend is unreachable
    pub fn publish_to_remote(&self) -> Result<(), KeystoreError> {
        let account_id = self.account_id()?;
        let remote = self.remote.as_ref().ok_or_else(|| {
            KeystoreError::StorageUnavailable("no remote account store attached".into())
        })?;
        let salt = verification::load_salt(&self.store, &self.namespace)?
            .ok_or(KeystoreError::NotConfigured)?;
        let record = verification::load_record(&self.store, &self.namespace)?
            .ok_or(KeystoreError::NotConfigured)?;

        remote.save_salt(account_id, &salt)?;
        remote.save_verification_record(account_id, &record)?;
        Ok(())
    }

    /// Push the current records to the attached remote without surfacing
    /// failures: local state is already consistent, and the host retries
    /// via [`Keystore::publish_to_remote`] when connectivity returns.
    fn push_records_best_effort(&self) {
        if self.remote.is_none() || matches!(self.namespace, Namespace::Local) {
            return;
        }
        if let Err(e) = self.publish_to_remote() {
            warn!(error = %e, "failed to publish account records to remote");
        }
    }

    /// Pull the account's salt and verification record from the attached
    /// backend onto this device. After this, [`Keystore::unlock`] with the
    /// account's secret produces the same key as on the original device.
    ///
    /// Existing local records for the account are left untouched — a
    /// device that already has state never has it overwritten by the
    /// backend.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::InvalidInput`] if the keystore is not
    ///   account-scoped
    /// - [`KeystoreError::NotConfigured`] if the backend has no record for
    ///   this account
    /// - [`KeystoreError::StorageUnavailable`] if no remote is attached or
    ///   the backend is unreachable
    pub fn bootstrap_from_remote(&mut self) -> Result<(), KeystoreError> {
        let account_id = self.account_id()?.to_string();
        if verification::is_configured(&self.store, &self.namespace) {
            info!("local records present, skipping remote bootstrap");
            return Ok(());
        }

        let remote = self.remote.as_ref().ok_or_else(|| {
            KeystoreError::StorageUnavailable("no remote account store attached".into())
        })?;
        let salt = remote
            .fetch_salt(&account_id)?
            .ok_or(KeystoreError::NotConfigured)?;
        let record = remote
            .fetch_verification_record(&account_id)?
            .ok_or(KeystoreError::NotConfigured)?;

        let salt: [u8; carnet_crypto_core::SALT_LEN] = salt
            .try_into()
            .map_err(|_| KeystoreError::StorageUnavailable("remote salt has wrong length".into()))?;
        verification::store_salt(&mut self.store, &self.namespace, &salt)?;
        verification::store_record(&mut self.store, &self.namespace, &record)?;
        info!("bootstrapped account records from remote");
        Ok(())
    }

    fn account_id(&self) -> Result<&str, KeystoreError> {
        match &self.namespace {
            Namespace::Account(id) => Ok(id),
            Namespace::Local => Err(KeystoreError::InvalidInput(
                "remote operations require an account-scoped keystore".into(),
            )),
        }
    }

    /// The verification record currently on disk, if any. Exposed for
    /// host-side sync diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] on a corrupt record.
    pub fn verification_record(&self) -> Result<Option<VerificationRecord>, KeystoreError> {
        verification::load_record(&self.store, &self.namespace)
    }

    // -- Data-plane operations ----------------------------------------------

    /// Encrypt a payload under the cached key.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::NotUnlocked`] when locked.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, KeystoreError> {
        let key = self.key.as_ref().ok_or(KeystoreError::NotUnlocked)?;
        cipher::encrypt(plaintext, key.expose()).map_err(map_crypto)
    }

    /// Decrypt a blob under the cached key.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::NotUnlocked`] when locked
    /// - [`KeystoreError::DecryptionFailed`] for any unopenable blob
    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>, KeystoreError> {
        let key = self.key.as_ref().ok_or(KeystoreError::NotUnlocked)?;
        let plaintext = cipher::decrypt(blob, key.expose()).map_err(map_crypto)?;
        Ok(plaintext.expose().to_vec())
    }

    /// Encrypt a serializable value under the cached key.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::NotUnlocked`] when locked.
    pub fn encrypt_object<T: Serialize>(&self, value: &T) -> Result<String, KeystoreError> {
        let key = self.key.as_ref().ok_or(KeystoreError::NotUnlocked)?;
        cipher::encrypt_object(value, key.expose()).map_err(map_crypto)
    }

    /// Decrypt a blob and deserialize the plaintext.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::NotUnlocked`] when locked
    /// - [`KeystoreError::DecryptionFailed`] for any unopenable blob
    /// - [`KeystoreError::MalformedPayload`] when the plaintext is not
    ///   valid JSON for `T`
    pub fn decrypt_object<T: DeserializeOwned>(&self, blob: &str) -> Result<T, KeystoreError> {
        let key = self.key.as_ref().ok_or(KeystoreError::NotUnlocked)?;
        cipher::decrypt_object(blob, key.expose()).map_err(map_crypto)
    }
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystore")
            .field("namespace", &self.namespace)
            .field("unlocked", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Unit tests — lifecycle ceremonies over a temp directory
// ---------------------------------------------------------------------------
