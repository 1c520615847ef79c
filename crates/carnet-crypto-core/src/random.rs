//! Named CSPRNG wrappers for the fixed-size random values the keystore
//! needs: installation salts, AEAD nonces, and recovery-code entropy.
//!
//! All output comes from [`OsRng`]. The wrappers exist so call sites say
//! what they are generating instead of sprinkling `fill_bytes` everywhere.

use rand::rngs::OsRng;
use rand::RngCore;

/// Installation salt length in bytes (128 bits).
pub const SALT_LEN: usize = 16;

/// Recovery-code entropy length in bytes (128 bits).
pub const RECOVERY_ENTROPY_LEN: usize = 16;

/// Generate a fresh 128-bit installation salt.
#[must_use]
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generate a fresh 96-bit AEAD nonce.
#[must_use]
pub fn generate_nonce() -> [u8; crate::cipher::NONCE_LEN] {
    let mut nonce = [0u8; crate::cipher::NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Generate 128 bits of recovery-code entropy.
#[must_use]
pub fn generate_recovery_entropy() -> [u8; RECOVERY_ENTROPY_LEN] {
    let mut entropy = [0u8; RECOVERY_ENTROPY_LEN];
    OsRng.fill_bytes(&mut entropy);
    entropy
}
