//! Key derivation from a low-entropy secret (PIN or password) plus a salt.
//!
//! This module provides:
//! - [`DerivationMode`] — tagged Slow (PBKDF2) / Fast (single hash) selector
//! - [`derive`] — derive the 256-bit encryption key
//! - [`verification_material`] — derive the domain-separated bytes stored
//!   in the verification record
//!
//! # Mode selection
//!
//! The slow path is PBKDF2-HMAC-SHA256 with a configurable iteration count.
//! The fast path is a single SHA-256 over `secret || salt` and exists only
//! as a latency/compatibility fallback with a reduced brute-force margin.
//! The mode chosen at setup is persisted next to the verification record so
//! verification and re-derivation always run the same branch — it is never
//! inferred at runtime.
//!
//! # Domain separation
//!
//! The verification record must never allow recovery of the encryption key,
//! so [`verification_material`] mixes a fixed context tag into the salt
//! before derivation. The stored hash and the key are outputs of two
//! unrelated derivations of the same secret.

use crate::error::CryptoError;
use crate::memory::SecretBytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Output length of every derivation in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Minimum salt length in bytes (128 bits).
pub const MIN_SALT_LEN: usize = 16;

/// Default PBKDF2 iteration count for the slow path.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Lowest iteration count accepted for the slow path. Below this the
/// "slow" KDF no longer meaningfully slows a brute-force attacker.
pub const MIN_ITERATIONS: u32 = 10_000;

/// Context tag mixed into the salt for verification-hash derivation.
const VERIFY_CONTEXT: &[u8] = b"carnet/verify/v1";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How the encryption key is derived from the secret — persisted alongside
/// the verification record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DerivationMode {
    /// PBKDF2-HMAC-SHA256 with the given iteration count.
    Slow {
        /// Number of PBKDF2 iterations (>= [`MIN_ITERATIONS`]).
        iterations: u32,
    },
    /// Single SHA-256 of `secret || salt`. Fallback only — reduced
    /// brute-force resistance.
    Fast,
}

impl DerivationMode {
    /// The default slow mode ([`DEFAULT_ITERATIONS`] PBKDF2 rounds).
    #[must_use]
    pub const fn slow_default() -> Self {
        Self::Slow {
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Whether this is the reduced-guarantee fast path.
    #[must_use]
    pub const fn is_fast(&self) -> bool {
        matches!(self, Self::Fast)
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive the 256-bit encryption key from `(secret, salt, mode)`.
///
/// Deterministic: the same inputs always yield bit-identical keys.
///
/// # Errors
///
/// - `CryptoError::InvalidInput` if the secret is empty or the salt is
///   shorter than [`MIN_SALT_LEN`] — checked before any primitive runs
/// - `CryptoError::KeyDerivation` if a slow-mode iteration count is below
///   [`MIN_ITERATIONS`]
pub fn derive(
    secret: &[u8],
    salt: &[u8],
    mode: &DerivationMode,
) -> Result<SecretBytes<KEY_LEN>, CryptoError> {
    validate_inputs(secret, salt)?;

    let mut output = [0u8; KEY_LEN];
    fill_derived(secret, salt, mode, &mut output)?;

    let key = SecretBytes::new(output);
    output.zeroize();
    Ok(key)
}

/// Derive the bytes stored in the verification record.
///
/// Same KDF as [`derive`] but over a context-tagged salt, so the persisted
/// hash can neither equal nor be converted into the encryption key.
///
/// # Errors
///
/// Same conditions as [`derive`].
pub fn verification_material(
    secret: &[u8],
    salt: &[u8],
    mode: &DerivationMode,
) -> Result<[u8; KEY_LEN], CryptoError> {
    validate_inputs(secret, salt)?;

    let mut tagged_salt = Vec::with_capacity(salt.len().saturating_add(VERIFY_CONTEXT.len()));
    tagged_salt.extend_from_slice(salt);
    tagged_salt.extend_from_slice(VERIFY_CONTEXT);

    let mut output = [0u8; KEY_LEN];
    fill_derived(secret, &tagged_salt, mode, &mut output)?;
    Ok(output)
}

/// Run the selected KDF branch into `output`.
fn fill_derived(
    secret: &[u8],
    salt: &[u8],
    mode: &DerivationMode,
    output: &mut [u8; KEY_LEN],
) -> Result<(), CryptoError> {
    match *mode {
        DerivationMode::Slow { iterations } => {
            if iterations < MIN_ITERATIONS {
                return Err(CryptoError::KeyDerivation(format!(
                    "iteration count {iterations} below minimum {MIN_ITERATIONS}"
                )));
            }
            pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, iterations, output);
        }
        DerivationMode::Fast => {
            let mut hasher = Sha256::new();
            hasher.update(secret);
            hasher.update(salt);
            output.copy_from_slice(&hasher.finalize());
        }
    }
    Ok(())
}

/// Reject empty secrets and short salts before any crypto call.
fn validate_inputs(secret: &[u8], salt: &[u8]) -> Result<(), CryptoError> {
    if secret.is_empty() {
        return Err(CryptoError::InvalidInput("secret must not be empty".into()));
    }
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::InvalidInput(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
