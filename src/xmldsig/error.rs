use std::fmt::Display;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, XmlError>;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML parsing error: {0}")]
    Parse(String),

    #[error("XML serialization error: {0}")]
    Serialize(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl XmlError {
    pub(crate) fn parse(error: impl Display) -> Self {
        Self::Parse(error.to_string())
    }
}

impl From<quick_xml::DeError> for XmlError {
    fn from(error: quick_xml::DeError) -> Self {
        Self::Parse(error.to_string())
    }
}

impl From<quick_xml::SeError> for XmlError {
    fn from(error: quick_xml::SeError) -> Self {
        Self::Serialize(error.to_string())
    }
}
