use super::{Result, SignError};
use crate::credentials::{CredentialStore, TrustStore, TrustStoreError};

/// Decides whether the certificates presented in a signature's KeyInfo belong to a party
/// the verifier trusts.
#[cfg_attr(test, mockall::automock)]
pub trait TrustedCredentialSource: Send + Sync {
    /// `chain` holds DER certificates, leaf first.
    fn is_trusted(&self, chain: &[Vec<u8>]) -> Result<bool>;
}

impl From<TrustStoreError> for SignError {
    fn from(err: TrustStoreError) -> Self {
        SignError::InvalidCertificate(err.to_string())
    }
}

impl TrustedCredentialSource for TrustStore {
    fn is_trusted(&self, chain: &[Vec<u8>]) -> Result<bool> {
        Ok(self.verify(chain)?)
    }
}

impl TrustedCredentialSource for CredentialStore {
    fn is_trusted(&self, chain: &[Vec<u8>]) -> Result<bool> {
        self.trust_store().is_trusted(chain)
    }
}
