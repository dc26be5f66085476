use openssl::error::ErrorStack;
use thiserror::Error;

pub type CryptoResult<T> = Result<T, Error>;

/// Failures of the hashing and secret-cipher primitives.
#[derive(Error, Debug)]
pub enum Error {
    /// Input that cannot be what it claims to be (wrong key size, truncated ciphertext)
    #[error("Invalid data: {0}")]
    Invalid(String),

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Cannot read key material: {0}")]
    Io(#[from] std::io::Error),
}
