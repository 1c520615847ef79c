//! `carnet-keystore` — Local security layer for CARNET.
//!
//! Owns everything between the user's secret and the data layer's
//! ciphertext: secret enrollment and verification, brute-force lockout,
//! recovery codes, per-account storage namespacing, and the single
//! in-memory copy of the encryption key. Cryptographic primitives live in
//! `carnet-crypto-core`; this crate adds state, persistence, and policy.
//!
//! Typical flow:
//!
//! ```no_run
//! use carnet_keystore::Keystore;
//! # fn main() -> Result<(), carnet_keystore::KeystoreError> {
//! let mut keystore = Keystore::open(std::path::Path::new("/tmp/carnet"))?;
//! keystore.setup("123456")?;
//! let blob = keystore.encrypt(b"first note")?;
//! keystore.lock();
//!
//! keystore.unlock("123456")?;
//! let plaintext = keystore.decrypt(&blob)?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod storage;

pub mod lockout;
pub mod verification;

pub mod recovery;
pub mod remote;

pub mod lifecycle;

pub use error::KeystoreError;
pub use lifecycle::{Keystore, KeystoreStatus, SecretRotation};
pub use lockout::{LockoutGuard, LOCKOUT_DURATION_SECS, MAX_FAILED_ATTEMPTS};
pub use recovery::{decode_recovery_code, encode_recovery_code, RecoveryRecord};
pub use remote::{MemoryRemoteStore, RemoteAccountStore};
pub use storage::{LocalStore, Namespace, SCHEMA_VERSION};
pub use verification::VerificationRecord;
