mod errors;
pub mod sym;
mod utils;

pub use errors::{CryptoResult, Error};
pub use utils::*;

use openssl::hash::{Hasher, MessageDigest};
use std::fmt;

/// Digest algorithms usable in XML signature references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-1, the SAML 2.0 default
    #[default]
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// Hash the given data with this digest algorithm
    pub fn hash(&self, data: impl AsRef<[u8]>) -> CryptoResult<Vec<u8>> {
        let mut hasher = Hasher::new(self.into())?;
        hasher.update(data.as_ref())?;
        Ok(hasher.finish()?.to_vec())
    }

    /// Get the output size in bytes
    pub fn output_size(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// The `DigestMethod` algorithm URI.
    pub fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|alg| alg.uri() == uri)
    }
}

impl From<&DigestAlgorithm> for MessageDigest {
    fn from(alg: &DigestAlgorithm) -> Self {
        match alg {
            DigestAlgorithm::Sha1 => MessageDigest::sha1(),
            DigestAlgorithm::Sha256 => MessageDigest::sha256(),
            DigestAlgorithm::Sha384 => MessageDigest::sha384(),
            DigestAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        };
        write!(f, "{name}")
    }
}
