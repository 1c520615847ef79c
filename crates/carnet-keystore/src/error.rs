//! Keystore error types for `carnet-keystore`.
//!
//! Everything that reaches a caller is one of these variants: raw platform,
//! storage, and crypto errors are translated at the orchestrator boundary
//! and never surfaced verbatim to the UI.

use carnet_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by keystore operations.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Empty or malformed secret/salt — rejected before any crypto call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Verification failed. Retryable until the attempt budget runs out.
    #[error("wrong secret ({attempts_remaining} attempts remaining)")]
    WrongSecret {
        /// Attempts left before the lockout triggers.
        attempts_remaining: u32,
    },

    /// Lockout active — no verification until the window elapses.
    #[error("locked out: {remaining_secs}s remaining")]
    Locked {
        /// Seconds remaining in the lockout window (for UI countdown).
        remaining_secs: u64,
    },

    /// AEAD authentication failure — wrong key or tampered data, surfaced
    /// identically in both cases.
    #[error("decryption failed")]
    DecryptionFailed,

    /// API misuse: encrypt/decrypt called without a cached key.
    #[error("keystore is not unlocked")]
    NotUnlocked,

    /// Decrypted payload is not the expected structured data.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Underlying persistence inaccessible or corrupt.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Setup called while a verification record already exists.
    #[error("keystore is already configured")]
    AlreadyConfigured,

    /// Unlock/verify called before any secret was configured.
    #[error("no secret configured")]
    NotConfigured,

    /// Recovery operation attempted without a stored recovery record.
    #[error("no recovery code configured")]
    RecoveryNotConfigured,

    /// Recovery code failed validation (format, checksum, or wrong code).
    #[error("invalid recovery code")]
    InvalidRecoveryCode,

    /// A second unlock was attempted while one is already in flight
    /// (double-tap guard).
    #[error("an unlock attempt is already in progress")]
    UnlockInProgress,

    /// Cryptographic failure not covered by a user-facing variant.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<std::io::Error> for KeystoreError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}
