//! Recovery codes: generation, encoding, and recovery unlock.
//!
//! A recovery code is 128 bits of CSPRNG entropy shown to the user exactly
//! once. Locally we persist a salted hash of the entropy plus the primary
//! key wrapped under a key derived from that entropy — never the code
//! itself. Redeeming the code therefore restores the *same* key the secret
//! derives, so existing ciphertext stays readable.
//!
//! # Code format
//!
//! - **Alphabet**: 32 characters — `ABCDEFGHJKLMNPQRSTUVWXYZ23456789`
//!   (excludes ambiguous 0/O and 1/I/l)
//! - **Grouping**: 7 dash-separated groups of 4 →
//!   `XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX`
//! - **Length**: 26 data chars (128 bits at 5 bits/char) + 2 checksum chars
//! - **Checksum**: derived from `BLAKE3(entropy)[0]`, catches typos before
//!   any KDF work runs
//! - **Normalization**: decoding trims whitespace, uppercases, and ignores
//!   dashes

use data_encoding::BASE64;
use ring::constant_time;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use carnet_crypto_core::{
    cipher, generate_recovery_entropy, generate_salt, kdf, DerivationMode, SecretBytes, KEY_LEN,
    RECOVERY_ENTROPY_LEN, SALT_LEN,
};

use crate::error::KeystoreError;
use crate::storage::{LocalStore, Namespace};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Base32-like alphabet excluding ambiguous characters (0/O, 1/I/l).
const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Data characters in the encoded code (128 bits at 5 bits/char).
const DATA_CHARS: usize = 26;

/// Total characters including the 2-char checksum.
const TOTAL_CHARS: usize = 28;

/// Characters per dash-separated group.
const GROUP_SIZE: usize = 4;

/// KDF branch for recovery-derived keys. The code is uniform 128-bit
/// entropy, not a low-entropy PIN, so the single-hash branch applies.
const RECOVERY_MODE: DerivationMode = DerivationMode::Fast;

const RECOVERY_FIELD: &str = "recovery";

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Persisted recovery state: proof the code exists, and the primary key
/// wrapped under the code-derived key. The code itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRecord {
    /// Base64 salt for the code-derived key and hash.
    pub salt: String,
    /// Base64 salted hash of the entropy (domain-separated, not the key).
    pub hash: String,
    /// KDF branch used for the code-derived key.
    pub mode: DerivationMode,
    /// AEAD blob: the primary encryption key wrapped under the
    /// code-derived key.
    pub wrapped_key: String,
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Whether a recovery record exists in the namespace.
#[must_use]
pub fn is_configured(store: &LocalStore, ns: &Namespace) -> bool {
    store.contains(ns, RECOVERY_FIELD)
}

/// Load the recovery record, if one exists.
///
/// # Errors
///
/// Returns [`KeystoreError::StorageUnavailable`] on a corrupt record.
pub fn load_record(
    store: &LocalStore,
    ns: &Namespace,
) -> Result<Option<RecoveryRecord>, KeystoreError> {
    let Some(json) = store.get(ns, RECOVERY_FIELD) else {
        return Ok(None);
    };
    let record = serde_json::from_str(json).map_err(|e| {
        KeystoreError::StorageUnavailable(format!("corrupt recovery record: {e}"))
    })?;
    Ok(Some(record))
}

/// Remove the recovery record. Missing record is a no-op.
///
/// # Errors
///
/// Returns [`KeystoreError::StorageUnavailable`] if the flush fails.
pub fn remove_record(store: &mut LocalStore, ns: &Namespace) -> Result<(), KeystoreError> {
    store.remove(ns, RECOVERY_FIELD)
}

/// Generate a fresh recovery code, persist its record, and return the
/// formatted code. Replaces any previous record — the old code stops
/// working immediately.
///
/// The returned string is the only copy of the code; it is never written
/// to storage or logs.
///
/// # Errors
///
/// - [`KeystoreError::Crypto`] if derivation or wrapping fails
/// - [`KeystoreError::StorageUnavailable`] if the record cannot be written
pub fn generate(
    store: &mut LocalStore,
    ns: &Namespace,
    primary_key: &[u8; KEY_LEN],
) -> Result<String, KeystoreError> {
    let mut entropy = generate_recovery_entropy();
    let salt = generate_salt();

    let formatted = encode_recovery_code(&entropy);

    let hash = kdf::verification_material(&entropy, &salt, &RECOVERY_MODE)?;
    let wrapping_key = kdf::derive(&entropy, &salt, &RECOVERY_MODE)?;
    entropy.zeroize();

    let wrapped_key = cipher::encrypt(primary_key, wrapping_key.expose())?;

    let record = RecoveryRecord {
        salt: BASE64.encode(&salt),
        hash: BASE64.encode(&hash),
        mode: RECOVERY_MODE,
        wrapped_key,
    };
    let json = serde_json::to_string(&record)
        .map_err(|e| KeystoreError::StorageUnavailable(e.to_string()))?;
    store.set(ns, RECOVERY_FIELD, json)?;

    Ok(formatted)
}

/// Redeem a recovery code: verify it against the stored hash and unwrap
/// the primary key.
///
/// The hash check runs in constant time and fires before any unwrap
/// attempt, so a wrong code and a tampered record are indistinguishable
/// in timing.
///
/// # Errors
///
/// - [`KeystoreError::RecoveryNotConfigured`] if no record exists
/// - [`KeystoreError::InvalidRecoveryCode`] on bad format, bad checksum,
///   or a code that does not match the stored hash
/// - [`KeystoreError::StorageUnavailable`] on a corrupt record
/// - [`KeystoreError::DecryptionFailed`] if the wrapped key cannot be
///   opened
pub fn unwrap_key(
    store: &LocalStore,
    ns: &Namespace,
    code: &str,
) -> Result<SecretBytes<KEY_LEN>, KeystoreError> {
    let record = load_record(store, ns)?.ok_or(KeystoreError::RecoveryNotConfigured)?;
    let mut entropy = decode_recovery_code(code)?;

    let salt: [u8; SALT_LEN] = BASE64
        .decode(record.salt.as_bytes())
        .ok()
        .and_then(|raw| raw.try_into().ok())
        .ok_or_else(|| KeystoreError::StorageUnavailable("corrupt recovery salt".into()))?;
    let stored_hash = BASE64.decode(record.hash.as_bytes()).map_err(|e| {
        KeystoreError::StorageUnavailable(format!("corrupt recovery hash: {e}"))
    })?;

    let candidate = kdf::verification_material(&entropy, &salt, &record.mode)?;
    if constant_time::verify_slices_are_equal(&candidate, &stored_hash).is_err() {
        entropy.zeroize();
        return Err(KeystoreError::InvalidRecoveryCode);
    }

    let wrapping_key = kdf::derive(&entropy, &salt, &record.mode)?;
    entropy.zeroize();

    let unwrapped = cipher::decrypt(&record.wrapped_key, wrapping_key.expose())
        .map_err(|_| KeystoreError::DecryptionFailed)?;
    let key: [u8; KEY_LEN] = unwrapped
        .expose()
        .try_into()
        .map_err(|_| KeystoreError::DecryptionFailed)?;
    Ok(SecretBytes::new(key))
}

// ---------------------------------------------------------------------------
// Encoding / decoding
// ---------------------------------------------------------------------------

/// Encode raw entropy into the dash-separated human-readable form.
#[must_use]
pub fn encode_recovery_code(entropy: &[u8; RECOVERY_ENTROPY_LEN]) -> String {
    let mut all_chars = String::with_capacity(TOTAL_CHARS);
    all_chars.push_str(&encode_base32(entropy));
    all_chars.push_str(&encode_checksum_byte(blake3::hash(entropy).as_bytes()[0]));
    format_with_dashes(&all_chars)
}

/// Decode a human-readable code back to raw entropy.
///
/// Accepts upper- or lowercase input, with or without dashes, and trims
/// surrounding whitespace.
///
/// # Errors
///
/// Returns [`KeystoreError::InvalidRecoveryCode`] on wrong length, invalid
/// characters, or a checksum mismatch.
pub fn decode_recovery_code(input: &str) -> Result<[u8; RECOVERY_ENTROPY_LEN], KeystoreError> {
    let normalized: String = input
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| *c != '-')
        .collect();

    if normalized.len() != TOTAL_CHARS {
        return Err(KeystoreError::InvalidRecoveryCode);
    }

    let data_str = &normalized[..DATA_CHARS];
    let checksum_str = &normalized[DATA_CHARS..];

    let entropy = decode_base32(data_str)?;
    let expected = encode_checksum_byte(blake3::hash(&entropy).as_bytes()[0]);
    if checksum_str != expected {
        return Err(KeystoreError::InvalidRecoveryCode);
    }

    Ok(entropy)
}

/// Encode bytes as base32-like characters, 5 bits at a time.
fn encode_base32(data: &[u8]) -> String {
    let mut result = String::with_capacity(DATA_CHARS);
    let mut buffer: u32 = 0;
    let mut bits_in_buffer: u32 = 0;
    let mut chars_written: usize = 0;

    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits_in_buffer = bits_in_buffer.saturating_add(8);

        while bits_in_buffer >= 5 && chars_written < DATA_CHARS {
            bits_in_buffer = bits_in_buffer.saturating_sub(5);
            let index = ((buffer >> bits_in_buffer) & 0x1F) as usize;
            result.push(char::from(ALPHABET[index]));
            chars_written = chars_written.saturating_add(1);
        }
    }

    // Remaining bits, zero-padded on the right.
    if bits_in_buffer > 0 && chars_written < DATA_CHARS {
        let index = ((buffer << 5u32.saturating_sub(bits_in_buffer)) & 0x1F) as usize;
        result.push(char::from(ALPHABET[index]));
    }

    result
}

/// Decode base32-like characters back to the fixed entropy length.
fn decode_base32(input: &str) -> Result<[u8; RECOVERY_ENTROPY_LEN], KeystoreError> {
    let mut buffer: u32 = 0;
    let mut bits_in_buffer: u32 = 0;
    let mut result = Vec::with_capacity(RECOVERY_ENTROPY_LEN);

    for ch in input.chars() {
        let value = alphabet_value(ch)?;
        buffer = (buffer << 5) | u32::from(value);
        bits_in_buffer = bits_in_buffer.saturating_add(5);

        while bits_in_buffer >= 8 {
            bits_in_buffer = bits_in_buffer.saturating_sub(8);
            result.push(((buffer >> bits_in_buffer) & 0xFF) as u8);
        }
    }

    // The final character carries padding bits past the entropy length.
    // Canonical encoding leaves them zero; anything else is a distinct
    // string aliasing the same entropy and must be rejected.
    if bits_in_buffer > 0 {
        let padding_mask = (1u32 << bits_in_buffer).saturating_sub(1);
        if buffer & padding_mask != 0 {
            return Err(KeystoreError::InvalidRecoveryCode);
        }
    }

    result
        .try_into()
        .map_err(|_| KeystoreError::InvalidRecoveryCode)
}

/// Numeric value (0..31) of an alphabet character.
fn alphabet_value(ch: char) -> Result<u8, KeystoreError> {
    let upper = ch.to_ascii_uppercase();
    ALPHABET
        .iter()
        .position(|&c| c == upper as u8)
        .and_then(|pos| u8::try_from(pos).ok())
        .ok_or(KeystoreError::InvalidRecoveryCode)
}

/// Encode a single checksum byte as 2 base32 characters.
fn encode_checksum_byte(byte: u8) -> String {
    let hi = (byte >> 3) & 0x1F;
    let lo = (byte & 0x07) << 2;
    let mut s = String::with_capacity(2);
    s.push(char::from(ALPHABET[hi as usize]));
    s.push(char::from(ALPHABET[lo as usize]));
    s
}

/// Insert a dash after every [`GROUP_SIZE`] characters.
fn format_with_dashes(input: &str) -> String {
    let groups: Vec<&str> = input
        .as_bytes()
        .chunks(GROUP_SIZE)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
        .collect();
    groups.join("-")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
