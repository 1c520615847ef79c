//! Interface to the account backend for multi-device bootstrap.
//!
//! The keystore never talks HTTP itself — the host application supplies an
//! implementation of [`RemoteAccountStore`] and the keystore calls it to
//! fetch or publish the salt and verification record for an account. Only
//! non-secret material crosses this boundary: never a key, never a secret.
//!
//! Methods take `&self`: a real backend client is a handle over a
//! connection pool and manages its own interior state, and the keystore
//! holds the store boxed alongside its own mutable state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::KeystoreError;
use crate::verification::VerificationRecord;

/// Backend operations the keystore needs for account-scoped state.
///
/// Implementations map these onto whatever transport the host uses. All
/// failures collapse into [`KeystoreError::StorageUnavailable`] — the
/// keystore does not distinguish network failure modes.
pub trait RemoteAccountStore {
    /// Fetch the account's salt, if the backend has one.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] if the backend cannot
    /// be reached.
    fn fetch_salt(&self, account_id: &str) -> Result<Option<Vec<u8>>, KeystoreError>;

    /// Publish the account's salt.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] if the backend cannot
    /// be reached.
    fn save_salt(&self, account_id: &str, salt: &[u8]) -> Result<(), KeystoreError>;

    /// Fetch the account's verification record, if the backend has one.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] if the backend cannot
    /// be reached.
    fn fetch_verification_record(
        &self,
        account_id: &str,
    ) -> Result<Option<VerificationRecord>, KeystoreError>;

    /// Publish the account's verification record.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] if the backend cannot
    /// be reached.
    fn save_verification_record(
        &self,
        account_id: &str,
        record: &VerificationRecord,
    ) -> Result<(), KeystoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryRemoteState {
    salts: HashMap<String, Vec<u8>>,
    records: HashMap<String, VerificationRecord>,
    /// When set, every call fails — simulates an unreachable backend.
    offline: bool,
}

/// In-memory [`RemoteAccountStore`] for tests and offline development.
///
/// Clones share state, so the same backend can be attached to several
/// keystores to model multiple devices on one account.
#[derive(Debug, Default, Clone)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryRemoteState>>,
}

impl MemoryRemoteStore {
    /// Empty store, reachable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle the simulated network: `true` makes every call fail.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.offline = offline;
        }
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut MemoryRemoteState) -> T,
    ) -> Result<T, KeystoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| KeystoreError::StorageUnavailable("remote store poisoned".into()))?;
        if state.offline {
            return Err(KeystoreError::StorageUnavailable(
                "remote store unreachable".into(),
            ));
        }
        Ok(f(&mut state))
    }
}

impl RemoteAccountStore for MemoryRemoteStore {
    fn fetch_salt(&self, account_id: &str) -> Result<Option<Vec<u8>>, KeystoreError> {
        self.with_state(|s| s.salts.get(account_id).cloned())
    }

    fn save_salt(&self, account_id: &str, salt: &[u8]) -> Result<(), KeystoreError> {
        self.with_state(|s| {
            s.salts.insert(account_id.to_string(), salt.to_vec());
        })
    }

    fn fetch_verification_record(
        &self,
        account_id: &str,
    ) -> Result<Option<VerificationRecord>, KeystoreError> {
        self.with_state(|s| s.records.get(account_id).cloned())
    }

    fn save_verification_record(
        &self,
        account_id: &str,
        record: &VerificationRecord,
    ) -> Result<(), KeystoreError> {
        self.with_state(|s| {
            s.records.insert(account_id.to_string(), record.clone());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnet_crypto_core::DerivationMode;

    fn record() -> VerificationRecord {
        VerificationRecord {
            hash: "aGFzaA==".into(),
            version: 1,
            mode: DerivationMode::slow_default(),
        }
    }

    #[test]
    fn memory_store_roundtrips_salt_and_record() {
        let remote = MemoryRemoteStore::new();
        assert_eq!(remote.fetch_salt("alice").unwrap(), None);

        remote.save_salt("alice", b"0123456789abcdef").unwrap();
        remote.save_verification_record("alice", &record()).unwrap();

        assert_eq!(
            remote.fetch_salt("alice").unwrap().as_deref(),
            Some(b"0123456789abcdef".as_slice())
        );
        assert_eq!(
            remote.fetch_verification_record("alice").unwrap(),
            Some(record())
        );
        // Other accounts stay empty.
        assert_eq!(remote.fetch_salt("bob").unwrap(), None);
    }

    #[test]
    fn clones_share_the_same_backend() {
        let remote = MemoryRemoteStore::new();
        let other_handle = remote.clone();

        remote.save_salt("alice", b"0123456789abcdef").unwrap();
        assert_eq!(
            other_handle.fetch_salt("alice").unwrap().as_deref(),
            Some(b"0123456789abcdef".as_slice())
        );
    }

    #[test]
    fn offline_store_fails_every_call() {
        let remote = MemoryRemoteStore::new();
        remote.set_offline(true);

        assert!(matches!(
            remote.fetch_salt("alice"),
            Err(KeystoreError::StorageUnavailable(_))
        ));
        assert!(matches!(
            remote.save_salt("alice", b"x"),
            Err(KeystoreError::StorageUnavailable(_))
        ));

        remote.set_offline(false);
        assert_eq!(remote.fetch_salt("alice").unwrap(), None);
    }
}
