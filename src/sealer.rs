//! Sealed-box encryption of secret values.
//!
//! GitHub only accepts secrets encrypted client-side with a libsodium sealed
//! box against the target's current public key.

use base64::{Engine, engine::general_purpose};
use serde::Serialize;
use sodoken::crypto_box;

use crate::errors::SealingError;
use crate::item::SecretValue;
use crate::key_cache::KeyRecord;

/// The only form a secret value takes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SealedPayload {
    pub key_id: String,
    /// Base64 of the sealed box.
    pub encrypted_value: String,
}

/// Seal `plaintext` for the holder of `key`'s private half.
///
/// Output is non-deterministic: every call uses a fresh ephemeral keypair, so
/// two seals of the same value never compare equal.
pub fn seal(plaintext: &SecretValue, key: &KeyRecord) -> Result<SealedPayload, SealingError> {
    let public_key = decode_public_key(&key.key)?;
    let message = plaintext.expose();

    let mut cipher = vec![0u8; message.len() + crypto_box::XSALSA_SEALBYTES];
    crypto_box::xsalsa_seal(&mut cipher, message, &public_key)
        .map_err(|e| SealingError::Encrypt(e.to_string()))?;

    Ok(SealedPayload {
        key_id: key.key_id.clone(),
        encrypted_value: general_purpose::STANDARD.encode(&cipher),
    })
}

fn decode_public_key(key: &str) -> Result<[u8; crypto_box::XSALSA_PUBLICKEYBYTES], SealingError> {
    let bytes = general_purpose::STANDARD
        .decode(key.trim())
        .map_err(|e| SealingError::Decode(e.to_string()))?;

    let actual = bytes.len();
    bytes.try_into().map_err(|_| SealingError::KeyLength {
        expected: crypto_box::XSALSA_PUBLICKEYBYTES,
        actual,
    })
}
