use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::error::ErrorStack;
use openssl::pkey::{Id, PKey, PKeyRef, Private};
use openssl::x509::{X509, X509Ref};
use secrecy::SecretString;

use super::{ConfigError, IdentityRole};

/// A private key with its certificate chain, bound to one role.
pub struct CryptoIdentity {
    role: IdentityRole,
    alias: String,
    private_key: PKey<Private>,
    chain: Vec<X509>,
    password: Option<SecretString>,
}

impl CryptoIdentity {
    /// Bind `private_key` and `chain` (leaf first) to `role`.
    ///
    /// Fails when the chain is empty or the key does not belong to the leaf certificate.
    pub fn new(
        role: IdentityRole,
        alias: impl Into<String>,
        private_key: PKey<Private>,
        chain: Vec<X509>,
    ) -> Result<Self, ConfigError> {
        let leaf = chain
            .first()
            .ok_or(ConfigError::MissingCertificate { role })?;
        if !leaf.public_key()?.public_eq(&private_key) {
            return Err(ConfigError::KeyMismatch { role });
        }

        Ok(Self {
            role,
            alias: alias.into(),
            private_key,
            chain,
            password: None,
        })
    }

    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    pub fn role(&self) -> IdentityRole {
        self.role
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.private_key
    }

    pub fn key_type(&self) -> Id {
        self.private_key.id()
    }

    /// The leaf certificate
    pub fn certificate(&self) -> &X509Ref {
        // `new` rejects empty chains
        &self.chain[0]
    }

    pub fn certificate_chain(&self) -> &[X509] {
        &self.chain
    }

    /// The private key password, after unwrapping.
    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    /// Base64 DER of the leaf certificate, as embedded in `X509Certificate` elements.
    pub fn certificate_base64(&self) -> Result<String, ErrorStack> {
        Ok(BASE64.encode(self.certificate().to_der()?))
    }
}

impl fmt::Debug for CryptoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoIdentity")
            .field("role", &self.role)
            .field("alias", &self.alias)
            .field("key_type", &key_type_name(self.key_type()))
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

pub(crate) fn key_type_name(id: Id) -> String {
    [
        (Id::RSA, "RSA"),
        (Id::DSA, "DSA"),
        (Id::EC, "EC"),
        (Id::ED25519, "Ed25519"),
        (Id::ED448, "Ed448"),
    ]
    .into_iter()
    .find(|(known, _)| *known == id)
    .map_or_else(|| format!("NID {}", id.as_raw()), |(_, name)| name.to_string())
}
