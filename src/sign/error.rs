use thiserror::Error;

use crate::xmldsig::XmlError;

pub type Result<T> = std::result::Result<T, SignError>;

/// Failures of signature construction and validation.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("Signature algorithm was not provided")]
    SigAlgNotProvided,

    #[error("Signature was not provided")]
    SignatureNotProvided,

    #[error("Unsupported algorithm URI: {0}")]
    InvalidUri(String),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Signature decodes to line feeds or whitespace")]
    LinefeedOrWhitespace,

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Signature carries no KeyInfo certificate")]
    MissingKeyInfo,

    #[error("Signing credential is not trusted: {0}")]
    UntrustedCredential(String),

    #[error("SAML signature profile violation: {0}")]
    ProfileViolation(String),

    #[error("Digest mismatch for reference '{0}'")]
    DigestMismatch(String),

    #[error("Signature value does not match the signed content")]
    SignatureMismatch,

    #[error("XML processing error: {0}")]
    Xml(#[from] XmlError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("URL decode error: {0}")]
    UrlDecode(#[from] std::string::FromUtf8Error),
}

impl From<openssl::error::ErrorStack> for SignError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        SignError::Crypto(err.into())
    }
}

impl From<quick_xml::DeError> for SignError {
    fn from(err: quick_xml::DeError) -> Self {
        SignError::Xml(err.into())
    }
}

impl From<quick_xml::SeError> for SignError {
    fn from(err: quick_xml::SeError) -> Self {
        SignError::Xml(err.into())
    }
}
