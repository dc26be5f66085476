use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

/// Metadata parsing errors
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("XML parsing error: {0}")]
    Xml(String),

    #[error("Not SAML metadata: document element is <{0}>")]
    NotMetadata(String),

    #[error("EntityDescriptor without entityID")]
    MissingEntityId,

    #[error("Invalid xs:duration '{0}'")]
    InvalidDuration(String),

    #[error("Invalid timestamp '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid default cache duration: {0}")]
    DefaultCacheDuration(#[from] humantime::DurationError),

    #[error("Failed to read metadata from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MetadataError {
    pub(crate) fn xml(error: impl Display) -> Self {
        MetadataError::Xml(error.to_string())
    }
}

impl From<std::str::Utf8Error> for MetadataError {
    fn from(err: std::str::Utf8Error) -> Self {
        MetadataError::xml(err)
    }
}

/// Convenient Result type alias
pub type MetadataResult<T> = Result<T, MetadataError>;
