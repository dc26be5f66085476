//! Both SAML signature schemes: the detached signature over a Redirect binding query
//! string and the enveloped XML signature inside a protocol message.

mod algorithm;
mod engine;
mod error;
mod profile;
mod query;
mod trust;
mod xml;

pub use algorithm::SignatureAlgorithm;
pub use engine::{DefaultSignatureEngine, SignatureEngine};
pub use error::{Result, SignError};
pub use query::{certificate_from_base64, redirect_signing_input};
pub use trust::TrustedCredentialSource;
pub use xml::XmlSignatureOptions;

#[cfg(test)]
pub use trust::MockTrustedCredentialSource;

use std::sync::Arc;

use crate::credentials::CredentialStore;

/// Signs outbound messages with the local signing identity and validates inbound ones.
#[derive(Clone)]
pub struct SignatureService {
    credentials: Arc<CredentialStore>,
    engine: Arc<dyn SignatureEngine>,
}

impl SignatureService {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self {
            credentials,
            engine: Arc::new(DefaultSignatureEngine),
        }
    }

    /// Use `engine` for signing instead of the openssl default.
    pub fn with_engine(mut self, engine: Arc<dyn SignatureEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }
}

impl std::fmt::Debug for SignatureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureService")
            .field("credentials", &self.credentials.label())
            .finish_non_exhaustive()
    }
}
