use secrecy::SecretString;
use tracing::debug;

use crate::crypto::CryptoResult;
use crate::crypto::sym::SymmetricSecretCipher;

/// Reverses the encryption of secrets stored as `ENC(<ciphertext>)` in property sets.
#[cfg_attr(test, mockall::automock)]
pub trait SecretDecryptor: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String>;
}

impl SecretDecryptor for SymmetricSecretCipher {
    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String> {
        SymmetricSecretCipher::decrypt(self, ciphertext)
    }
}

/// The inner text of an `ENC(...)` wrapped value.
pub fn unwrap_encrypted(value: &str) -> Option<&str> {
    value.trim().strip_prefix("ENC(")?.strip_suffix(')')
}

/// Resolve a configured secret to its plaintext.
///
/// Plain values pass through. Wrapped values go through `decryptor`; without one, or when
/// decryption fails, the unwrapped ciphertext is returned as is.
pub fn resolve_secret(value: &str, decryptor: Option<&dyn SecretDecryptor>) -> SecretString {
    let Some(ciphertext) = unwrap_encrypted(value) else {
        return SecretString::from(value.to_string());
    };

    let Some(decryptor) = decryptor else {
        debug!("no secret decryptor configured, using wrapped value undecrypted");
        return SecretString::from(ciphertext.to_string());
    };

    match decryptor.decrypt(ciphertext) {
        Ok(plaintext) => SecretString::from(plaintext),
        Err(e) => {
            debug!("failed to decrypt wrapped value, using it undecrypted: {e}");
            SecretString::from(ciphertext.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Error;
    use secrecy::ExposeSecret;

    #[test]
    fn test_unwrap_encrypted() {
        assert_eq!(unwrap_encrypted("ENC(abc==)"), Some("abc=="));
        assert_eq!(unwrap_encrypted("  ENC(abc)\n"), Some("abc"));
        assert_eq!(unwrap_encrypted("ENC()"), Some(""));
        assert_eq!(unwrap_encrypted("changeit"), None);
        assert_eq!(unwrap_encrypted("ENC(abc"), None);
        assert_eq!(unwrap_encrypted("enc(abc)"), None);
    }

    #[test]
    fn test_plain_value_passes_through() {
        let mut decryptor = MockSecretDecryptor::new();
        decryptor.expect_decrypt().never();

        let secret = resolve_secret("changeit", Some(&decryptor));
        assert_eq!(secret.expose_secret(), "changeit");
    }

    #[test]
    fn test_wrapped_value_decrypted() {
        let mut decryptor = MockSecretDecryptor::new();
        decryptor
            .expect_decrypt()
            .withf(|ciphertext| ciphertext == "c2VjcmV0")
            .times(1)
            .returning(|_| Ok("changeit".to_string()));

        let secret = resolve_secret("ENC(c2VjcmV0)", Some(&decryptor));
        assert_eq!(secret.expose_secret(), "changeit");
    }

    #[test]
    fn test_wrapped_value_without_decryptor() {
        let secret = resolve_secret("ENC(c2VjcmV0)", None);
        assert_eq!(secret.expose_secret(), "c2VjcmV0");
    }

    #[test]
    fn test_failed_decryption_falls_back_to_ciphertext() {
        let mut decryptor = MockSecretDecryptor::new();
        decryptor
            .expect_decrypt()
            .returning(|_| Err(Error::Invalid("bad tag".to_string())));

        let secret = resolve_secret("ENC(c2VjcmV0)", Some(&decryptor));
        assert_eq!(secret.expose_secret(), "c2VjcmV0");
    }

    #[test]
    fn test_symmetric_cipher_as_decryptor() {
        let key = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            SymmetricSecretCipher::generate_key().unwrap(),
        )
        .unwrap();
        let cipher = SymmetricSecretCipher::new(key).unwrap();
        let wrapped = format!("ENC({})", cipher.encrypt("storepass").unwrap());

        let secret = resolve_secret(&wrapped, Some(&cipher));
        assert_eq!(secret.expose_secret(), "storepass");
    }
}
