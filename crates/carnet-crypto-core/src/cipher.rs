//! AES-256-GCM authenticated encryption of note payloads.
//!
//! This module provides:
//! - [`encrypt`] / [`decrypt`] — string blobs in `base64(nonce ‖ ciphertext ‖ tag)`
//!   wire format, a fresh random 96-bit nonce per call
//! - [`encrypt_object`] / [`decrypt_object`] — JSON convenience wrappers
//!
//! The nonce travels inside the blob, so every record is self-describing
//! and records can be stored or synced in any order. Decryption failure is
//! a single opaque error: callers cannot distinguish a wrong key from a
//! tampered or truncated blob.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use crate::random;
use data_encoding::BASE64;
use ring::aead;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroize;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES-256-GCM key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Shortest valid decoded blob: nonce + empty ciphertext + tag.
const MIN_BLOB_LEN: usize = NONCE_LEN + TAG_LEN;

/// Build a `LessSafeKey`, rejecting keys that are not exactly 32 bytes.
fn aead_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::Encryption(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

// ---------------------------------------------------------------------------
// String blobs
// ---------------------------------------------------------------------------

/// Encrypt plaintext under `key`, returning `base64(nonce ‖ ciphertext ‖ tag)`.
///
/// A fresh random nonce is generated on every call — two encryptions of the
/// same plaintext yield different blobs.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key length is wrong or the seal
/// operation fails.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<String, CryptoError> {
    let sealing_key = aead_key(key)?;

    let nonce_bytes = random::generate_nonce();
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    // Encrypt in place — the buffer holds plaintext, then ciphertext.
    let mut in_out = plaintext.to_vec();
    let Ok(tag) =
        sealing_key.seal_in_place_separate_tag(nonce, aead::Aad::empty(), &mut in_out)
    else {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    };

    let mut blob = Vec::with_capacity(
        NONCE_LEN
            .saturating_add(in_out.len())
            .saturating_add(TAG_LEN),
    );
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&in_out);
    blob.extend_from_slice(tag.as_ref());

    Ok(BASE64.encode(&blob))
}

/// Decrypt a blob produced by [`encrypt`], returning the plaintext in a
/// [`SecretBuffer`].
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key length is wrong.
/// Returns `CryptoError::Decryption` for every other failure — bad base64,
/// truncation, tampering, or a wrong key all look identical to the caller.
pub fn decrypt(blob: &str, key: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let opening_key = aead_key(key)?;

    let raw = BASE64
        .decode(blob.as_bytes())
        .map_err(|_| CryptoError::Decryption)?;
    if raw.len() < MIN_BLOB_LEN {
        return Err(CryptoError::Decryption);
    }

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&raw[..NONCE_LEN]);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    // open_in_place wants ciphertext ‖ tag, which is exactly the remainder.
    let mut ct_tag = raw[NONCE_LEN..].to_vec();
    let plaintext_slice = opening_key
        .open_in_place(nonce, aead::Aad::empty(), &mut ct_tag)
        .map_err(|_| CryptoError::Decryption)?;

    let result = SecretBuffer::new(plaintext_slice)
        .map_err(|e| CryptoError::SecureMemory(format!("secure buffer allocation failed: {e}")))?;
    ct_tag.zeroize();
    Ok(result)
}

// ---------------------------------------------------------------------------
// JSON object wrappers
// ---------------------------------------------------------------------------

/// JSON-serialize `value` and encrypt the result.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if serialization or sealing fails.
pub fn encrypt_object<T: Serialize>(value: &T, key: &[u8]) -> Result<String, CryptoError> {
    let mut json = serde_json::to_vec(value)
        .map_err(|e| CryptoError::Encryption(format!("payload serialization failed: {e}")))?;
    let result = encrypt(&json, key);
    json.zeroize();
    result
}

/// Decrypt a blob and JSON-deserialize the plaintext.
///
/// # Errors
///
/// Returns `CryptoError::Decryption` if authentication fails, or
/// `CryptoError::MalformedPayload` if the decrypted text is not valid JSON
/// for `T`.
pub fn decrypt_object<T: DeserializeOwned>(blob: &str, key: &[u8]) -> Result<T, CryptoError> {
    let plaintext = decrypt(blob, key)?;
    serde_json::from_slice(plaintext.expose())
        .map_err(|e| CryptoError::MalformedPayload(format!("not a structured payload: {e}")))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
