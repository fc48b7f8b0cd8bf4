//! Card payload signing
//!
//! The v3 card endpoint expects the charge JSON encrypted with 3-key
//! Triple-DES in ECB mode (PKCS#7 padded) and base64 encoded. The key is
//! either the merchant's encryption key or one derived from the secret key.

use crate::error::{RaveError, RaveResult};
use base64::{Engine, engine::general_purpose::STANDARD};
use des::TdesEde3;
use ecb::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, block_padding::Pkcs7};

/// Prefix stripped from secret keys before derivation
pub const SECRET_KEY_PREFIX: &str = "FLWSECK-";

const BLOCK_SIZE: usize = 8;
const KEY_SIZE: usize = 24;

type TdesEcbEnc = ecb::Encryptor<TdesEde3>;
type TdesEcbDec = ecb::Decryptor<TdesEde3>;

/// Derive the legacy 24-character encryption key from a secret key.
///
/// First 12 characters of the unprefixed key, then the last 12 hex digits of
/// the MD5 digest of the full key.
pub fn derive_key(secret_key: &str) -> String {
    let digest = hex::encode(md5::compute(secret_key.as_bytes()).0);
    let digest_tail = &digest[digest.len() - 12..];

    let adjusted = secret_key.replace(SECRET_KEY_PREFIX, "");
    let head: String = adjusted.chars().take(12).collect();

    format!("{}{}", head, digest_tail)
}

/// Encrypt a JSON payload and return base64 ciphertext
pub fn encrypt(payload: &str, key: &str) -> RaveResult<String> {
    let encryptor = TdesEcbEnc::new_from_slice(&key_bytes(key)?)
        .map_err(|e| RaveError::CryptoUnavailable(format!("3DES key rejected: {}", e)))?;

    Ok(STANDARD.encode(encryptor.encrypt_padded_vec_mut::<Pkcs7>(payload.as_bytes())))
}

/// Decrypt base64 ciphertext produced by [`encrypt`]
pub fn decrypt(ciphertext: &str, key: &str) -> RaveResult<Vec<u8>> {
    let decryptor = TdesEcbDec::new_from_slice(&key_bytes(key)?)
        .map_err(|e| RaveError::CryptoUnavailable(format!("3DES key rejected: {}", e)))?;

    let buf = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| RaveError::Validation(format!("ciphertext is not base64: {}", e)))?;

    if buf.is_empty() || buf.len() % BLOCK_SIZE != 0 {
        return Err(RaveError::Validation(
            "ciphertext length is not a multiple of the block size".to_string(),
        ));
    }

    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(&buf)
        .map_err(|_| RaveError::Validation("invalid padding".to_string()))
}

// Keys are zero-filled or cut to 24 bytes, the same way OpenSSL treats DES-EDE3 keys.
fn key_bytes(key: &str) -> RaveResult<[u8; KEY_SIZE]> {
    if key.is_empty() {
        return Err(RaveError::CryptoUnavailable(
            "encryption key is empty".to_string(),
        ));
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    let len = key.len().min(KEY_SIZE);
    key_bytes[..len].copy_from_slice(&key.as_bytes()[..len]);
    Ok(key_bytes)
}
