//! `carnet-crypto-core` — Pure cryptographic primitives for CARNET.
//!
//! This crate is the audit target: zero I/O, zero persistence, zero
//! knowledge of the keystore's storage layout. Everything here is a
//! deterministic function of its arguments plus the CSPRNG.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod random;

pub mod kdf;
pub mod cipher;

pub use cipher::{decrypt, decrypt_object, encrypt, encrypt_object, NONCE_LEN, TAG_LEN};
pub use error::CryptoError;
pub use kdf::{
    derive, verification_material, DerivationMode, DEFAULT_ITERATIONS, KEY_LEN, MIN_ITERATIONS,
    MIN_SALT_LEN,
};
pub use memory::{disable_core_dumps, LockedRegion, SecretBuffer, SecretBytes};
pub use random::{
    generate_nonce, generate_recovery_entropy, generate_salt, RECOVERY_ENTROPY_LEN, SALT_LEN,
};
