// Cryptographic helpers: random tokens, keyed MACs and AES-GCM sealed cookies

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Nonce size for AES-256-GCM encryption (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Key size for AES-256 and for the derived HMAC keys (256 bits)
pub const KEY_SIZE: usize = 32;

/// Fill a buffer of `length` bytes from the OS-seeded thread RNG
#[must_use]
pub fn random_bytes(length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a base64url token carrying `length` bytes of randomness
///
/// Session ids use 32 bytes, OAuth `state` values 24.
#[must_use]
pub fn generate_token(length: usize) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(length))
}

/// Derive a purpose-bound 32-byte key from the configured secret
///
/// The same secret feeds both the CSRF MAC and the state cookie cipher; the
/// `purpose` label keeps the two keys independent.
#[must_use]
pub fn derive_key(secret: &[u8], purpose: &str) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    // HMAC accepts keys of any length, so this cannot fail
    if let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret) {
        mac.update(purpose.as_bytes());
        key.copy_from_slice(&mac.finalize().into_bytes());
    }
    key
}

/// HMAC-SHA256 over the concatenation of `parts`
///
/// # Errors
///
/// Returns an error if the key is rejected by the MAC implementation
pub fn hmac_sign(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| anyhow!("Invalid HMAC key length: {e}"))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time check of `tag` against HMAC-SHA256 over `parts`
#[must_use]
pub fn hmac_verify(key: &[u8], parts: &[&[u8]], tag: &[u8]) -> bool {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(key) else {
        return false;
    };
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(tag).is_ok()
}

/// Generic encryption function for any serializable data using AES-256-GCM
///
/// Returns a base64url string containing the nonce followed by the ciphertext.
///
/// # Errors
///
/// Returns an error if:
/// - Serialization fails
/// - Key length is invalid
/// - AES encryption fails
pub fn encrypt_data<T: Serialize>(data: &T, key: &[u8]) -> Result<String> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {KEY_SIZE} bytes, got {}",
            key.len()
        ));
    }

    let json_data = serde_json::to_vec(data).context("Failed to serialize data")?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(nonce, json_data.as_slice())
        .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&combined))
}

/// Generic decryption function for any deserializable data using AES-256-GCM
///
/// # Errors
///
/// Returns an error if:
/// - Key length is invalid
/// - Base64 decoding fails
/// - Data is shorter than a nonce
/// - AES decryption fails (wrong key or tampered data)
/// - Deserialization fails
pub fn decrypt_data<T: DeserializeOwned>(encrypted_data: &str, key: &[u8]) -> Result<T> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {KEY_SIZE} bytes, got {}",
            key.len()
        ));
    }

    let combined = general_purpose::URL_SAFE_NO_PAD
        .decode(encrypted_data)
        .context("Failed to decode base64 data")?;

    if combined.len() < NONCE_SIZE {
        return Err(anyhow!("Invalid data length"));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("AES decryption failed: {e}"))?;

    serde_json::from_slice(&plaintext).context("Failed to deserialize data from decrypted JSON")
}
