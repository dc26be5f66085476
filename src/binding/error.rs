use thiserror::Error;

/// Failures while decoding a SAML message taken off the wire.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Base64 decoding failed: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("URL decoding failed: {0}")]
    UrlDecode(String),

    #[error("Message is empty apart from line feeds or whitespace")]
    LinefeedOrWhitespace,

    #[error("Inflating the message failed: {0}")]
    Inflate(std::io::Error),

    #[error("Decoded message is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Failures while encoding a SAML message for the wire.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Deflating the message failed: {0}")]
    Deflate(#[from] std::io::Error),
}
