use std::fs;
use std::path::Path;

use crate::crypto::errors::{CryptoResult, Error};
use crate::crypto::utils::generate_random_bytes;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::symm::{Cipher, decrypt_aead, encrypt_aead};
use secrecy::{ExposeSecret, SecretSlice};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// AES-256-GCM cipher for secrets stored in configuration files.
///
/// Ciphertexts are rendered as `base64(nonce || ciphertext || tag)`.
pub struct SymmetricSecretCipher {
    key: SecretSlice<u8>,
}

impl SymmetricSecretCipher {
    pub fn new(key: Vec<u8>) -> CryptoResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(Error::Invalid(format!(
                "AES-256 key must be {KEY_SIZE} bytes, got {}",
                key.len()
            )));
        }
        Ok(Self {
            key: SecretSlice::from(key),
        })
    }

    /// Load the key from a file holding its base64 form.
    pub fn from_key_file(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let encoded = fs::read_to_string(path.as_ref())?;
        Self::new(BASE64.decode(encoded.trim())?)
    }

    /// Generate a fresh random key, returned base64 encoded for writing into a key file.
    pub fn generate_key() -> CryptoResult<String> {
        Ok(BASE64.encode(generate_random_bytes(KEY_SIZE)?))
    }

    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let nonce = generate_random_bytes(NONCE_SIZE)?;
        let mut tag = [0u8; TAG_SIZE];
        let ciphertext = encrypt_aead(
            Cipher::aes_256_gcm(),
            self.key.expose_secret(),
            Some(&nonce),
            &[],
            plaintext.as_bytes(),
            &mut tag,
        )?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len() + TAG_SIZE);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&tag);
        Ok(BASE64.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> CryptoResult<String> {
        let raw = BASE64.decode(encoded.trim())?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::Invalid("ciphertext too short".to_string()));
        }

        let (nonce, rest) = raw.split_at(NONCE_SIZE);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);
        let plaintext = decrypt_aead(
            Cipher::aes_256_gcm(),
            self.key.expose_secret(),
            Some(nonce),
            &[],
            ciphertext,
            tag,
        )?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Invalid("decrypted secret is not UTF-8".to_string()))
    }
}

impl std::fmt::Debug for SymmetricSecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricSecretCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
