mod decoder;
mod encoder;
mod error;

pub use decoder::{decode_post, decode_post_form_value, decode_redirect};
pub(crate) use decoder::is_linefeed_or_whitespace;
pub use encoder::{encode_post, encode_redirect};
pub use error::{DecodeError, EncodeError};

use std::fmt;
use std::str::FromStr;

pub const SAML_REQUEST: &str = "SAMLRequest";
pub const SAML_RESPONSE: &str = "SAMLResponse";
pub const RELAY_STATE: &str = "RelayState";
pub const SIG_ALG: &str = "SigAlg";
pub const SIGNATURE: &str = "Signature";

/// Which of the two SAML message parameters a payload travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamlType {
    Request,
    Response,
}

impl SamlType {
    /// Query / form parameter name
    pub const fn param_name(self) -> &'static str {
        match self {
            Self::Request => SAML_REQUEST,
            Self::Response => SAML_RESPONSE,
        }
    }
}

impl fmt::Display for SamlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.param_name())
    }
}

impl FromStr for SamlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SAML_REQUEST => Ok(Self::Request),
            SAML_RESPONSE => Ok(Self::Response),
            other => Err(format!("unknown SAML message parameter: {other}")),
        }
    }
}

/// SAML 2.0 protocol bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    HttpPost,
    HttpRedirect,
    HttpArtifact,
    Soap,
    Paos,
}

impl Binding {
    pub const ALL: [Binding; 5] = [
        Self::HttpPost,
        Self::HttpRedirect,
        Self::HttpArtifact,
        Self::Soap,
        Self::Paos,
    ];

    pub const fn uri(self) -> &'static str {
        match self {
            Self::HttpPost => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST",
            Self::HttpRedirect => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect",
            Self::HttpArtifact => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact",
            Self::Soap => "urn:oasis:names:tc:SAML:2.0:bindings:SOAP",
            Self::Paos => "urn:oasis:names:tc:SAML:2.0:bindings:PAOS",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|binding| binding.uri() == uri)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// The detached signature of an HTTP-Redirect message. Both values are URL-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSignature {
    pub sig_alg: String,
    pub signature: String,
}

/// An outbound binding message as its wire parameters.
///
/// `payload` is the encoded SAML message; `relay_state` and the signature values are held
/// URL-encoded, exactly as they are placed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBindingMessage {
    pub saml_type: SamlType,
    pub payload: String,
    pub relay_state: Option<String>,
    pub signature: Option<RedirectSignature>,
}

impl EncodedBindingMessage {
    pub fn new(saml_type: SamlType, payload: impl Into<String>) -> Self {
        Self {
            saml_type,
            payload: payload.into(),
            relay_state: None,
            signature: None,
        }
    }

    pub fn with_relay_state(mut self, relay_state: impl Into<String>) -> Self {
        self.relay_state = Some(relay_state.into());
        self
    }

    pub fn with_signature(mut self, signature: RedirectSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Parameters in wire order: message, `RelayState`, `SigAlg`, `Signature`.
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![(self.saml_type.param_name(), self.payload.as_str())];
        if let Some(relay_state) = &self.relay_state {
            params.push((RELAY_STATE, relay_state.as_str()));
        }
        if let Some(signature) = &self.signature {
            params.push((SIG_ALG, signature.sig_alg.as_str()));
            params.push((SIGNATURE, signature.signature.as_str()));
        }
        params
    }

    pub fn len(&self) -> usize {
        1 + usize::from(self.relay_state.is_some()) + 2 * usize::from(self.signature.is_some())
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params()
            .into_iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    pub fn to_query_string(&self) -> String {
        self.params()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}
