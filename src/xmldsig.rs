//! XML plumbing for enveloped SAML signatures: canonicalization, element layout of a
//! protocol message, and the serde model of `ds:Signature`.

mod c14n;
mod error;
mod object;
mod types;
mod utils;

pub use c14n::{canonicalize, canonicalize_subtree};
pub use error::{Result, XmlError};
pub use object::{SamlObject, SamlObjectKind};
pub use types::*;
pub use utils::{ElementNode, Span, insert_at, remove_span, scan_elements};

/// XML namespace URIs
pub mod ns {
    pub const DS: &str = "http://www.w3.org/2000/09/xmldsig#";
    pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    pub const SAML_PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
    pub const SAML_ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
    pub const SAML_METADATA: &str = "urn:oasis:names:tc:SAML:2.0:metadata";
}

/// Transform algorithm URIs
pub mod algorithms {
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
    pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    pub const EXC_C14N_WITH_COMMENTS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";
    pub const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
    pub const C14N_WITH_COMMENTS: &str =
        "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";
}

/// Canonicalization methods accepted in `CanonicalizationMethod` and `Transform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanonicalizationAlgorithm {
    #[default]
    Exclusive,
    ExclusiveWithComments,
    Inclusive,
    InclusiveWithComments,
}

impl CanonicalizationAlgorithm {
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Exclusive => algorithms::EXC_C14N,
            Self::ExclusiveWithComments => algorithms::EXC_C14N_WITH_COMMENTS,
            Self::Inclusive => algorithms::C14N,
            Self::InclusiveWithComments => algorithms::C14N_WITH_COMMENTS,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            Self::Exclusive,
            Self::ExclusiveWithComments,
            Self::Inclusive,
            Self::InclusiveWithComments,
        ]
        .into_iter()
        .find(|alg| alg.uri() == uri)
    }

    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }

    pub const fn with_comments(self) -> bool {
        matches!(self, Self::ExclusiveWithComments | Self::InclusiveWithComments)
    }
}
