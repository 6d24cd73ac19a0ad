//! Webhook payload encryption
//!
//! AES-256-CBC with PKCS#7 padding. The `encrypt` field is base64 of
//! `iv (16 bytes) || base64(ciphertext)`, and the key is the shared secret
//! right-padded with NUL bytes to 32 bytes.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// Encryption errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encrypt key longer than {KEY_LEN} bytes")]
    KeyTooLong,

    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Encrypted payload shorter than the IV")]
    Truncated,

    #[error("Decryption failed")]
    Decrypt,
}

/// Pad the shared secret to an AES-256 key
fn padded_key(secret: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = secret.as_bytes();
    if bytes.len() > KEY_LEN {
        return Err(CryptoError::KeyTooLong);
    }
    let mut key = [0u8; KEY_LEN];
    key[..bytes.len()].copy_from_slice(bytes);
    Ok(key)
}

/// Decrypt the value of an `encrypt` field
pub fn decrypt(encrypted: &str, secret: &str) -> Result<Vec<u8>, CryptoError> {
    let key = padded_key(secret)?;
    let decoded = STANDARD.decode(encrypted.trim())?;
    if decoded.len() <= IV_LEN {
        return Err(CryptoError::Truncated);
    }

    let (iv, encoded_ciphertext) = decoded.split_at(IV_LEN);
    let ciphertext = STANDARD.decode(encoded_ciphertext)?;

    Aes256CbcDec::new_from_slices(&key, iv)
        .map_err(|_| CryptoError::Decrypt)?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Produce an `encrypt` field value for `plaintext`, the inverse of [`decrypt`]
pub fn encrypt(plaintext: &[u8], secret: &str, iv: &[u8; IV_LEN]) -> Result<String, CryptoError> {
    let key = padded_key(secret)?;
    let ciphertext = Aes256CbcEnc::new_from_slices(&key, iv)
        .map_err(|_| CryptoError::Decrypt)?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut inner = iv.to_vec();
    inner.extend_from_slice(STANDARD.encode(ciphertext).as_bytes());
    Ok(STANDARD.encode(inner))
}
