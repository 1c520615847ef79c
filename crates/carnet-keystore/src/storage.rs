//! Local persisted keystore state — a small JSON key-value file.
//!
//! Holds the non-secret security records: salt, verification record,
//! recovery record, lockout state, key-check blob, schema version. The
//! encryption key itself is NEVER written here.
//!
//! Keys are namespaced: `local/...` for an unscoped installation, or
//! `account/{id}/...` once a remote identity is known. A versioned,
//! idempotent migration table upgrades older layouts at open; the one-time
//! local→account move happens when an account is adopted.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::KeystoreError;

/// Store file name inside the data directory.
pub const STORE_FILE: &str = "keystore.json";

/// Current schema version. v1 stored fields unprefixed; v2 namespaces them.
pub const SCHEMA_VERSION: u32 = 2;

/// Reserved key holding the schema version.
const SCHEMA_KEY: &str = "schemaVersion";

/// Fields the keystore persists per namespace.
pub const FIELDS: &[&str] = &["salt", "verification", "recovery", "lockout", "keyCheck"];

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// Storage scope for keystore records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace {
    /// Unscoped per-installation records (no remote identity known).
    Local,
    /// Records scoped to an authenticated account id.
    Account(String),
}

impl Namespace {
    /// Full storage key for a field in this namespace.
    #[must_use]
    pub fn key(&self, field: &str) -> String {
        match self {
            Self::Local => format!("local/{field}"),
            Self::Account(id) => format!("account/{id}/{field}"),
        }
    }
}

// ---------------------------------------------------------------------------
// LocalStore
// ---------------------------------------------------------------------------

/// JSON-backed key-value store, flushed atomically on every mutation.
///
/// The write pattern (tmp file + rename, owner-only permissions on Unix)
/// prevents corruption from partial writes.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl LocalStore {
    /// Open (or create) the store at `{data_dir}/keystore.json` and apply
    /// pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] if the directory cannot
    /// be created, the file cannot be read, or its contents are not valid
    /// JSON. A corrupt store must hard-fail: silently resetting it would
    /// discard the salt and make existing ciphertext unrecoverable.
    pub fn open(data_dir: &Path) -> Result<Self, KeystoreError> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(STORE_FILE);

        let (entries, existed) = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let parsed: BTreeMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| {
                    KeystoreError::StorageUnavailable(format!("corrupt keystore file: {e}"))
                })?;
            (parsed, true)
        } else {
            (BTreeMap::new(), false)
        };

        let mut store = Self { path, entries };

        // Fresh stores start at the current version; files without a
        // version stamp predate the versioning scheme (v1).
        let from_version = store
            .entries
            .get(SCHEMA_KEY)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(if existed { 1 } else { SCHEMA_VERSION });

        store.apply_migrations(from_version)?;
        Ok(store)
    }

    /// Read a field in a namespace.
    #[must_use]
    pub fn get(&self, ns: &Namespace, field: &str) -> Option<&str> {
        self.entries.get(&ns.key(field)).map(String::as_str)
    }

    /// Whether a field exists in a namespace.
    #[must_use]
    pub fn contains(&self, ns: &Namespace, field: &str) -> bool {
        self.entries.contains_key(&ns.key(field))
    }

    /// Write a field and flush to disk.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] if the flush fails.
    pub fn set(&mut self, ns: &Namespace, field: &str, value: String) -> Result<(), KeystoreError> {
        self.entries.insert(ns.key(field), value);
        self.flush()
    }

    /// Write several fields in one flush. Either all fields land on disk
    /// or none do — the single tmp+rename makes interdependent records
    /// (salt + verification hash) impossible to tear.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] if the flush fails.
    pub fn set_many(
        &mut self,
        ns: &Namespace,
        fields: &[(&str, String)],
    ) -> Result<(), KeystoreError> {
        for (field, value) in fields {
            self.entries.insert(ns.key(field), value.clone());
        }
        self.flush()
    }

    /// Remove a field and flush to disk. Removing a missing field is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] if the flush fails.
    pub fn remove(&mut self, ns: &Namespace, field: &str) -> Result<(), KeystoreError> {
        if self.entries.remove(&ns.key(field)).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    /// Move all `local/` fields under `account/{id}/`, preserving any values
    /// already present in the account namespace and deleting the old keys.
    ///
    /// Idempotent: running it again (or with nothing to move) changes
    /// nothing. This is the one-time unscoped→scoped migration triggered
    /// when a remote identity becomes known.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::StorageUnavailable`] if the flush fails.
    pub fn adopt_account(&mut self, account_id: &str) -> Result<(), KeystoreError> {
        let local = Namespace::Local;
        let account = Namespace::Account(account_id.to_string());

        let mut changed = false;
        for field in FIELDS {
            if let Some(value) = self.entries.remove(&local.key(field)) {
                // Existing account-scoped values win — never overwrite.
                self.entries.entry(account.key(field)).or_insert(value);
                changed = true;
            }
        }

        if changed {
            self.flush()?;
        }
        Ok(())
    }

    // -- Schema migrations --------------------------------------------------

    /// Apply every migration from `from_version` up to [`SCHEMA_VERSION`],
    /// then stamp the version. Each transform is idempotent.
    fn apply_migrations(&mut self, from_version: u32) -> Result<(), KeystoreError> {
        for version in from_version..SCHEMA_VERSION {
            match version {
                1 => migrate_v1_unscoped_fields(&mut self.entries),
                _ => {}
            }
        }

        let stamp = SCHEMA_VERSION.to_string();
        if self.entries.get(SCHEMA_KEY) != Some(&stamp) {
            self.entries.insert(SCHEMA_KEY.to_string(), stamp);
            self.flush()?;
        }
        Ok(())
    }

    // -- File I/O -----------------------------------------------------------

    /// Atomic write: serialize, write to a tmp file, rename over the target.
    fn flush(&self) -> Result<(), KeystoreError> {
        let tmp = self.path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| KeystoreError::StorageUnavailable(e.to_string()))?;

        fs::write(&tmp, &json)?;

        // Owner-only permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// v1→v2: move bare field names (`salt`, `verification`, …) under the
/// `local/` prefix. Safe to re-run — bare keys are gone after the first
/// pass, and pre-existing `local/` values are never overwritten.
fn migrate_v1_unscoped_fields(entries: &mut BTreeMap<String, String>) {
    let local = Namespace::Local;
    for field in FIELDS {
        if let Some(value) = entries.remove(*field) {
            entries.entry(local.key(field)).or_insert(value);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
