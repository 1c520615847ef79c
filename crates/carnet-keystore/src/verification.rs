//! Salt and verification-record persistence, plus secret verification.
//!
//! The record stores a domain-separated hash of `(secret, salt)` — never
//! the encryption key — together with the derivation mode chosen at setup,
//! so verification and key re-derivation always run the same KDF branch.
//! Comparison is constant-time: an "almost right" secret takes exactly as
//! long to reject as a completely wrong one.

use carnet_crypto_core::{kdf, CryptoError, DerivationMode, SecretBytes, SALT_LEN};
use data_encoding::BASE64;
use ring::constant_time;
use serde::{Deserialize, Serialize};

use crate::error::KeystoreError;
use crate::storage::{LocalStore, Namespace};

/// Current verification-record version.
pub const RECORD_VERSION: u32 = 1;

const SALT_FIELD: &str = "salt";
const RECORD_FIELD: &str = "verification";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Persisted proof-of-secret — a one-way hash, never the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    /// Base64 of the domain-separated verification material.
    pub hash: String,
    /// Record format version.
    pub version: u32,
    /// KDF branch used at setup — verification must reuse it.
    pub mode: DerivationMode,
}

/// Outcome of a successful verification: the derived key comes back with
/// it so callers need no second derivation pass.
pub struct VerifiedKey {
    /// The 256-bit encryption key derived from the verified secret.
    pub key: SecretBytes<32>,
    /// The mode the key was derived with.
    pub mode: DerivationMode,
}

impl std::fmt::Debug for VerifiedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedKey")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Salt persistence
// ---------------------------------------------------------------------------

/// Load the installation salt, if one exists.
///
/// # Errors
///
/// Returns [`KeystoreError::StorageUnavailable`] if a stored salt is not
/// valid base64 or has the wrong length — a mangled salt means existing
/// ciphertext is unrecoverable, which must surface loudly.
pub fn load_salt(
    store: &LocalStore,
    ns: &Namespace,
) -> Result<Option<[u8; SALT_LEN]>, KeystoreError> {
    let Some(encoded) = store.get(ns, SALT_FIELD) else {
        return Ok(None);
    };
    let raw = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| KeystoreError::StorageUnavailable(format!("corrupt salt: {e}")))?;
    let salt: [u8; SALT_LEN] = raw.try_into().map_err(|_| {
        KeystoreError::StorageUnavailable("corrupt salt: wrong length".into())
    })?;
    Ok(Some(salt))
}

/// Persist the installation salt.
///
/// # Errors
///
/// Returns [`KeystoreError::StorageUnavailable`] if the write fails.
pub fn store_salt(
    store: &mut LocalStore,
    ns: &Namespace,
    salt: &[u8; SALT_LEN],
) -> Result<(), KeystoreError> {
    store.set(ns, SALT_FIELD, BASE64.encode(salt))
}

// ---------------------------------------------------------------------------
// Record persistence
// ---------------------------------------------------------------------------

/// True iff both a salt and a verification record exist in the namespace.
#[must_use]
pub fn is_configured(store: &LocalStore, ns: &Namespace) -> bool {
    store.contains(ns, SALT_FIELD) && store.contains(ns, RECORD_FIELD)
}

/// Load the verification record, if one exists.
///
/// # Errors
///
/// Returns [`KeystoreError::StorageUnavailable`] on a corrupt record.
pub fn load_record(
    store: &LocalStore,
    ns: &Namespace,
) -> Result<Option<VerificationRecord>, KeystoreError> {
    let Some(json) = store.get(ns, RECORD_FIELD) else {
        return Ok(None);
    };
    let record = serde_json::from_str(json).map_err(|e| {
        KeystoreError::StorageUnavailable(format!("corrupt verification record: {e}"))
    })?;
    Ok(Some(record))
}

/// Persist a verification record verbatim (used when adopting a record
/// fetched from the remote store).
///
/// # Errors
///
/// Returns [`KeystoreError::StorageUnavailable`] if the write fails.
pub fn store_record(
    store: &mut LocalStore,
    ns: &Namespace,
    record: &VerificationRecord,
) -> Result<(), KeystoreError> {
    let json = serde_json::to_string(record)
        .map_err(|e| KeystoreError::StorageUnavailable(e.to_string()))?;
    store.set(ns, RECORD_FIELD, json)
}

/// Compute and persist the verification record for `(secret, salt, mode)`.
///
/// Hard-fails on storage errors: a setup that cannot persist its record
/// must never pretend to have succeeded. Record and salt land in a single
/// flush — an interrupted write can never leave a record that disagrees
/// with the salt beside it.
///
/// # Errors
///
/// - [`KeystoreError::Crypto`] if derivation rejects the inputs
/// - [`KeystoreError::StorageUnavailable`] if the write fails
pub fn setup(
    store: &mut LocalStore,
    ns: &Namespace,
    secret: &[u8],
    salt: &[u8; SALT_LEN],
    mode: &DerivationMode,
) -> Result<VerificationRecord, KeystoreError> {
    let material = kdf::verification_material(secret, salt, mode)?;
    let record = VerificationRecord {
        hash: BASE64.encode(&material),
        version: RECORD_VERSION,
        mode: *mode,
    };
    let json = serde_json::to_string(&record)
        .map_err(|e| KeystoreError::StorageUnavailable(e.to_string()))?;
    store.set_many(ns, &[(RECORD_FIELD, json), (SALT_FIELD, BASE64.encode(salt))])?;
    Ok(record)
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify a candidate secret against the stored record.
///
/// Recomputes the verification material with the *stored* mode, compares in
/// constant time, and on a match derives and returns the encryption key.
/// Returns `Ok(None)` for a wrong secret — the caller owns attempt
/// accounting.
///
/// # Errors
///
/// - [`KeystoreError::NotConfigured`] if salt or record is missing
/// - [`KeystoreError::StorageUnavailable`] on corrupt stored state
/// - [`KeystoreError::Crypto`] if derivation rejects the inputs
pub fn verify(
    store: &LocalStore,
    ns: &Namespace,
    secret: &[u8],
) -> Result<Option<VerifiedKey>, KeystoreError> {
    let salt = load_salt(store, ns)?.ok_or(KeystoreError::NotConfigured)?;
    let record = load_record(store, ns)?.ok_or(KeystoreError::NotConfigured)?;

    let stored = BASE64.decode(record.hash.as_bytes()).map_err(|e| {
        KeystoreError::StorageUnavailable(format!("corrupt verification hash: {e}"))
    })?;

    let candidate = kdf::verification_material(secret, &salt, &record.mode)?;
    if constant_time::verify_slices_are_equal(&candidate, &stored).is_err() {
        return Ok(None);
    }

    let key = kdf::derive(secret, &salt, &record.mode).map_err(|e| match e {
        CryptoError::InvalidInput(msg) => KeystoreError::InvalidInput(msg),
        other => KeystoreError::Crypto(other),
    })?;
    Ok(Some(VerifiedKey {
        key,
        mode: record.mode,
    }))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use carnet_crypto_core::kdf::MIN_ITERATIONS;
    use tempfile::TempDir;

    const TEST_MODE: DerivationMode = DerivationMode::Slow {
        iterations: MIN_ITERATIONS,
    };
    const TEST_SALT: [u8; SALT_LEN] = [0x42; SALT_LEN];

    fn fresh_store(dir: &TempDir) -> LocalStore {
        LocalStore::open(dir.path()).unwrap()
    }

    #[test]
    fn unconfigured_store_reports_unconfigured() {
        let dir = TempDir::new().unwrap();
        let store = fresh_store(&dir);
        assert!(!is_configured(&store, &Namespace::Local));
    }

    #[test]
    fn setup_makes_store_configured() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir);
        let ns = Namespace::Local;

        setup(&mut store, &ns, b"123456", &TEST_SALT, &TEST_MODE).unwrap();
        assert!(is_configured(&store, &ns));
        assert_eq!(load_salt(&store, &ns).unwrap(), Some(TEST_SALT));
    }

    #[test]
    fn verify_accepts_correct_secret_and_returns_key() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir);
        let ns = Namespace::Local;

        setup(&mut store, &ns, b"123456", &TEST_SALT, &TEST_MODE).unwrap();
        let verified = verify(&store, &ns, b"123456")
            .unwrap()
            .expect("correct secret must verify");

        // The returned key is the same one derive() produces directly.
        let direct = kdf::derive(b"123456", &TEST_SALT, &TEST_MODE).unwrap();
        assert_eq!(verified.key.expose(), direct.expose());
        assert_eq!(verified.mode, TEST_MODE);
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir);
        let ns = Namespace::Local;

        setup(&mut store, &ns, b"123456", &TEST_SALT, &TEST_MODE).unwrap();
        assert!(verify(&store, &ns, b"000000").unwrap().is_none());
    }

    #[test]
    fn verify_unconfigured_fails_with_not_configured() {
        let dir = TempDir::new().unwrap();
        let store = fresh_store(&dir);
        let err = verify(&store, &Namespace::Local, b"123456").expect_err("must fail");
        assert!(matches!(err, KeystoreError::NotConfigured));
    }

    #[test]
    fn stored_hash_is_not_the_key() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir);
        let ns = Namespace::Local;

        let record = setup(&mut store, &ns, b"123456", &TEST_SALT, &TEST_MODE).unwrap();
        let key = kdf::derive(b"123456", &TEST_SALT, &TEST_MODE).unwrap();
        assert_ne!(record.hash, BASE64.encode(key.expose()));
    }

    #[test]
    fn verification_reuses_stored_mode_not_callers() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir);
        let ns = Namespace::Local;

        // Configured with the fast fallback.
        setup(&mut store, &ns, b"123456", &TEST_SALT, &DerivationMode::Fast).unwrap();
        let verified = verify(&store, &ns, b"123456")
            .unwrap()
            .expect("must verify with stored mode");
        assert_eq!(verified.mode, DerivationMode::Fast);

        let fast_key = kdf::derive(b"123456", &TEST_SALT, &DerivationMode::Fast).unwrap();
        assert_eq!(verified.key.expose(), fast_key.expose());
    }

    #[test]
    fn corrupt_salt_surfaces_storage_error() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir);
        let ns = Namespace::Local;

        store.set(&ns, "salt", "!!not-base64!!".into()).unwrap();
        let err = load_salt(&store, &ns).expect_err("corrupt salt must fail");
        assert!(matches!(err, KeystoreError::StorageUnavailable(_)));
    }

    #[test]
    fn verified_key_debug_never_prints_key_bytes() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir);
        let ns = Namespace::Local;

        setup(&mut store, &ns, b"123456", &TEST_SALT, &TEST_MODE).unwrap();
        let verified = verify(&store, &ns, b"123456").unwrap().unwrap();

        let rendered = format!("{verified:?}");
        assert!(rendered.contains("VerifiedKey"));
        assert!(rendered.contains("mode"));
        // The key field is elided entirely, not printed masked.
        assert!(!rendered.contains("key:"));
        assert!(rendered.ends_with(".. }"));
    }

    #[test]
    fn record_serde_roundtrip_uses_camel_case() {
        let record = VerificationRecord {
            hash: "aGFzaA==".into(),
            version: RECORD_VERSION,
            mode: TEST_MODE,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"hash\""));
        assert!(json.contains("\"version\""));
        let back: VerificationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
