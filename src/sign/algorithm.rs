use std::fmt;

use openssl::hash::MessageDigest;
use openssl::pkey::{HasPublic, Id, PKeyRef};

use super::{Result, SignError};
use crate::credentials::CryptoIdentity;

/// Signature algorithms SAML signatures are produced and accepted with.
///
/// Each entry binds a key family to its wire URI and its native algorithm name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSha1,
    DsaSha1,
}

impl SignatureAlgorithm {
    pub const ALL: [SignatureAlgorithm; 2] = [Self::RsaSha1, Self::DsaSha1];

    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::DsaSha1 => "http://www.w3.org/2000/09/xmldsig#dsa-sha1",
        }
    }

    /// Native (JCA style) algorithm name
    pub const fn native_name(self) -> &'static str {
        match self {
            Self::RsaSha1 => "SHA1withRSA",
            Self::DsaSha1 => "SHA1withDSA",
        }
    }

    pub fn key_id(self) -> Id {
        match self {
            Self::RsaSha1 => Id::RSA,
            Self::DsaSha1 => Id::DSA,
        }
    }

    pub fn digest(self) -> MessageDigest {
        MessageDigest::sha1()
    }

    /// Look up an algorithm by URI. Unknown URIs are rejected, never defaulted.
    pub fn from_uri(uri: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.uri() == uri)
            .ok_or_else(|| SignError::InvalidUri(uri.to_string()))
    }

    pub fn for_key_id(id: Id) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.key_id() == id)
            .ok_or_else(|| SignError::UnsupportedKeyType(format!("NID {}", id.as_raw())))
    }

    pub fn for_key<T: HasPublic>(key: &PKeyRef<T>) -> Result<Self> {
        Self::for_key_id(key.id())
    }

    pub fn for_identity(identity: &CryptoIdentity) -> Result<Self> {
        Self::for_key_id(identity.key_type())
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.native_name())
    }
}
