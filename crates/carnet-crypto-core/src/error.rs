//! Cryptographic error types for `carnet-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Caller-supplied input rejected before any primitive ran
    /// (empty secret, short salt, bad iteration count).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Key derivation failed (PBKDF2 parameter validation or execution).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Symmetric encryption failure (AES-256-GCM setup or seal).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication failed — wrong key, tampered or truncated blob.
    /// Deliberately carries no detail: the caller must not be able to
    /// distinguish the causes.
    #[error("decryption failed")]
    Decryption,

    /// Decryption succeeded but the plaintext is not the expected
    /// structured payload.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Secure memory allocation or CSPRNG failure.
    #[error("secure memory error: {0}")]
    SecureMemory(String),
}
