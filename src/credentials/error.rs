use std::path::PathBuf;

use thiserror::Error;

use super::IdentityRole;
use super::truststore::TrustStoreError;

/// Fatal problems while bootstrapping the credential store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Cannot read keystore {path}: {source}")]
    KeystoreUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot open keystore {path}: {source}")]
    KeystoreInvalid {
        path: PathBuf,
        source: openssl::error::ErrorStack,
    },

    #[error("Keystore {path} holds no usable {role} identity")]
    NoIdentity { path: PathBuf, role: IdentityRole },

    #[error("Alias '{alias}' not found for the {role} identity (available: {available:?})")]
    AliasNotFound {
        alias: String,
        role: IdentityRole,
        available: Vec<String>,
    },

    #[error("PEM keystore for the {role} identity needs keystore.private_key_file")]
    MissingPrivateKeyFile { role: IdentityRole },

    #[error("The {role} identity has no certificate")]
    MissingCertificate { role: IdentityRole },

    #[error("Private key of the {role} identity does not match its certificate")]
    KeyMismatch { role: IdentityRole },

    #[error("Unsupported {role} key type: {key_type}")]
    UnsupportedKeyType { role: IdentityRole, key_type: String },

    #[error("Secret key error: {0}")]
    SecretKey(#[from] crate::crypto::Error),

    #[error("Trust store error: {0}")]
    TrustStore(#[from] TrustStoreError),

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
}
